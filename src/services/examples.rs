//! Worked examples injected into generation prompts.

use serde::{Deserialize, Serialize};

/// One request/response pair shown to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactExample {
    pub widget_url: String,
    pub request: String,
    /// Complete response including the fenced code block
    pub response: String,
}

pub trait ExamplesProvider: Send + Sync {
    fn examples(&self, widget_url: &str) -> Vec<ArtifactExample>;
}

/// Fixed example set
#[derive(Debug, Clone, Default)]
pub struct StaticExamples {
    examples: Vec<ArtifactExample>,
}

impl StaticExamples {
    pub fn new(examples: Vec<ArtifactExample>) -> Self {
        Self { examples }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Small built-in set covering both prop styles
    pub fn builtin() -> Self {
        Self::new(vec![
            ArtifactExample {
                widget_url: "widget://counter".to_string(),
                request: "Make a counter with plus and minus buttons".to_string(),
                response: concat!(
                    "```jsx\n",
                    "function Component(props) {\n",
                    "  const [count, setCount] = React.useState(props.start ?? 0);\n",
                    "  return (\n",
                    "    <div className=\"counter\">\n",
                    "      <button onClick={() => setCount(count - 1)}>-</button>\n",
                    "      <span>{count}</span>\n",
                    "      <button onClick={() => setCount(count + 1)}>+</button>\n",
                    "    </div>\n",
                    "  );\n",
                    "}\n",
                    "```"
                )
                .to_string(),
            },
            ArtifactExample {
                widget_url: "widget://weather".to_string(),
                request: "Show the weather for a city".to_string(),
                response: concat!(
                    "```jsx\n",
                    "function Component({ city, temperature, condition }) {\n",
                    "  return (\n",
                    "    <div className=\"weather\">\n",
                    "      <h2>{city}</h2>\n",
                    "      <p>{temperature}° and {condition}</p>\n",
                    "    </div>\n",
                    "  );\n",
                    "}\n",
                    "```"
                )
                .to_string(),
            },
        ])
    }
}

impl ExamplesProvider for StaticExamples {
    /// Examples for the same widget come first
    fn examples(&self, widget_url: &str) -> Vec<ArtifactExample> {
        let mut examples = self.examples.clone();
        examples.sort_by_key(|e| e.widget_url != widget_url);
        examples
    }
}
