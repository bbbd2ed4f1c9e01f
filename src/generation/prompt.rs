//! Prompt assembly for artifact generation.

use serde::{Deserialize, Serialize};

use crate::domain::{Analysis, ComponentSnapshot, Intent};
use crate::services::ArtifactExample;

/// Fixed instruction preamble
pub const SYSTEM_PREAMBLE: &str = "You generate small self-contained React UI widgets.\n\
Rules:\n\
- Reply with exactly one fenced ```jsx code block.\n\
- The block must start with `function Component(props)` or \
`function Component({ ...named props })` and define nothing else at top level.\n\
- Use React hooks through the global `React` object; do not import anything.\n\
- Keep explanations outside the code block short.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Build the role-tagged message list for one generation.
///
/// The previous artifact is only included for modify intents.
pub fn build_messages(
    analysis: &Analysis,
    examples: &[ArtifactExample],
    previous: Option<&ComponentSnapshot>,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(ChatRole::System, SYSTEM_PREAMBLE)];

    for example in examples {
        messages.push(ChatMessage::new(
            ChatRole::User,
            format!("Widget: {}\nRequest: {}", example.widget_url, example.request),
        ));
        messages.push(ChatMessage::new(ChatRole::Assistant, example.response.clone()));
    }

    let params = serde_json::to_string_pretty(&analysis.params).unwrap_or_else(|_| "{}".into());
    let mut request = format!(
        "Widget: {}\nParams: {}\nRequest: {}",
        if analysis.widget_url.is_empty() {
            "(unspecified)"
        } else {
            analysis.widget_url.as_str()
        },
        params,
        analysis.transcription
    );

    if analysis.intent == Intent::Modify {
        if let Some(previous) = previous {
            request.push_str("\n\nModify this existing component:\n```jsx\n");
            request.push_str(&previous.code);
            request.push_str("\n```");
        }
    }

    messages.push(ChatMessage::new(ChatRole::User, request));
    messages
}
