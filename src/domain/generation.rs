use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ComponentSnapshot, Intent};

/// Output of one successful generation; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    /// Extracted artifact source
    pub code: String,
    pub widget_url: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    pub intent: Intent,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl GenerationResult {
    pub fn component(&self) -> ComponentSnapshot {
        ComponentSnapshot {
            code: self.code.clone(),
            widget_url: self.widget_url.clone(),
            params: self.params.clone(),
        }
    }
}
