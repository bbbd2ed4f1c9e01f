//! Wire types for the streaming transcription backend.

use serde::{Deserialize, Serialize};

/// Priming prompt: the backend answers every utterance with one JSON object
pub const DEFAULT_SYSTEM_PROMPT: &str = "You transcribe spoken requests for UI widgets. \
For every utterance reply with exactly one JSON object and nothing else: \
{\"transcription\": <verbatim words>, \"intent\": \"new\" | \"modify\", \
\"widgetUrl\": <widget identifier>, \"params\": {<extracted parameters>}}.";

const PRIMING_REQUEST: &str = "I will describe a widget out loud. \
Reply only with the JSON object described in your instructions.";
const PRIMING_ACK: &str = "Understood. I will reply with a single JSON object per request.";

/// Session creation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub system_prompt: String,
    pub language_hint: String,
    pub medium: Medium,
    pub initial_messages: Vec<InitialMessage>,
}

impl CreateSessionRequest {
    /// Handshake with the priming message pair
    pub fn new(system_prompt: &str, language: &str, sample_rate: u32) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            language_hint: language.to_string(),
            medium: Medium {
                server_web_socket: ServerWebSocket {
                    input_sample_rate: sample_rate,
                    output_sample_rate: sample_rate,
                },
            },
            initial_messages: vec![
                InitialMessage {
                    role: "user".to_string(),
                    text: PRIMING_REQUEST.to_string(),
                },
                InitialMessage {
                    role: "agent".to_string(),
                    text: PRIMING_ACK.to_string(),
                },
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Medium {
    pub server_web_socket: ServerWebSocket,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerWebSocket {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitialMessage {
    pub role: String,
    pub text: String,
}

/// Session creation response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub join_url: String,
}

/// Speaker of a transcript message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[default]
    Agent,
    #[serde(other)]
    Unknown,
}

/// JSON event frame received from the backend
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Backend state change (`listening`, `thinking`, `speaking`, ...)
    State { state: String },

    /// Full snapshot (`text`) or delta (`delta`) of a transcript
    Transcript {
        #[serde(default)]
        role: Role,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        delta: Option<String>,
        #[serde(default, rename = "final")]
        is_final: bool,
    },

    Error {
        #[serde(default)]
        message: String,
    },

    #[serde(other)]
    Other,
}

impl ServerMessage {
    pub fn parse(text: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// States that mean the backend is consuming audio
pub fn is_ready_state(state: &str) -> bool {
    matches!(state, "listening" | "ready")
}
