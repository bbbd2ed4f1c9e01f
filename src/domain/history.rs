use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{GenerationResult, Intent};

/// The artifact shown for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSnapshot {
    pub code: String,
    pub widget_url: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// One completed turn in a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub component: ComponentSnapshot,
    pub transcript: String,
    pub intent: Intent,
    pub timestamp: i64,
}

impl HistoryEntry {
    pub fn from_result(result: &GenerationResult, transcript: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            component: result.component(),
            transcript: transcript.into(),
            intent: result.intent,
            timestamp: result.timestamp,
        }
    }
}

/// Named, timestamped container of history entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub preview_text: String,
}

impl Conversation {
    pub const DEFAULT_TITLE: &'static str = "New conversation";

    pub fn new() -> Self {
        let now = now_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: Self::DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            preview_text: String::new(),
        }
    }

    pub fn has_default_title(&self) -> bool {
        self.title == Self::DEFAULT_TITLE
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Current wall clock in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
