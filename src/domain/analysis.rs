use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ComponentSnapshot;
use crate::error::{Result, VoxError};
use crate::transcript::TRANSCRIPTION_FIELD;

/// Whether a turn asks for a fresh artifact or edits the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    #[default]
    New,
    Modify,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::New => "new",
            Intent::Modify => "modify",
        }
    }

    /// Lenient parse; anything unrecognised counts as a new artifact
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "modify" | "edit" | "update" => Intent::Modify,
            _ => Intent::New,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transcribed and classified user utterance (or typed input).
///
/// Consumed by value when a generation starts, so one analysis drives at
/// most one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// What the user said; never empty
    pub transcription: String,
    pub intent: Intent,
    /// Opaque identifier of the widget capability being generated
    #[serde(default)]
    pub widget_url: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl Analysis {
    /// Build from a finalized transcript object
    pub fn from_object(object: Map<String, Value>) -> Result<Self> {
        let transcription = match object.get(TRANSCRIPTION_FIELD) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(VoxError::MissingField(TRANSCRIPTION_FIELD.to_string())),
        };

        let intent = object
            .get("intent")
            .and_then(Value::as_str)
            .map(Intent::parse)
            .unwrap_or_default();

        let widget_url = object
            .get("widgetUrl")
            .or_else(|| object.get("widget_url"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let params = match object.get("params") {
            Some(Value::Object(p)) => p.clone(),
            _ => Map::new(),
        };

        Ok(Self {
            transcription,
            intent,
            widget_url,
            params,
        })
    }

    /// Text-input shortcut: typed text edits the current artifact when there is one
    pub fn from_text(text: &str, current: Option<&ComponentSnapshot>) -> Result<Self> {
        let transcription = text.trim();
        if transcription.is_empty() {
            return Err(VoxError::MissingField(TRANSCRIPTION_FIELD.to_string()));
        }

        Ok(match current {
            Some(component) => Self {
                transcription: transcription.to_string(),
                intent: Intent::Modify,
                widget_url: component.widget_url.clone(),
                params: component.params.clone(),
            },
            None => Self {
                transcription: transcription.to_string(),
                intent: Intent::New,
                widget_url: String::new(),
                params: Map::new(),
            },
        })
    }
}
