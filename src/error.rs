//! Error taxonomy shared by every voice/generation component.

use thiserror::Error;

/// Typed failures surfaced by the capture, transcription, generation and
/// orchestration layers.
///
/// Errors travel inside events, so the payloads are plain strings and the
/// type is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VoxError {
    /// Missing or rejected API key
    #[error("Missing credentials: {0}")]
    Credentials(String),

    /// Microphone access denied or no capture device available
    #[error("Microphone permission denied: {0}")]
    Permission(String),

    /// Capture device could not be configured or started
    #[error("Audio capture failed to initialize: {0}")]
    Init(String),

    /// Transport failure while establishing or running a stream
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transcript JSON could not be parsed
    #[error("Failed to parse transcript: {0}")]
    Parse(String),

    /// Transcript JSON parsed but lacks a required field
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// No final transcript arrived within the stop grace period
    #[error("Timed out after {0}ms waiting for the final transcript")]
    Timeout(u64),

    /// Model response contained no fenced code block
    #[error("No code block found in the model response")]
    NoCodeBlock,

    /// Extracted code does not declare the expected component entry point
    #[error("Invalid artifact format: {0}")]
    InvalidArtifactFormat(String),

    /// Explicit cancellation; not a failure
    #[error("Aborted")]
    Aborted,

    /// Artifact compiler rejected the generated source
    #[error("Failed to compile artifact: {0}")]
    Compile(String),

    /// Persistence collaborator failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A state machine refused a transition
    #[error("Invalid transition: cannot {action} while {from}")]
    InvalidTransition { from: String, action: String },
}

impl VoxError {
    /// Cancellation is reported through the same channel as failures but
    /// never moves anything into an error state.
    pub fn is_abort(&self) -> bool {
        matches!(self, VoxError::Aborted)
    }

    /// Message shown to the user while the assistant sits in its error state
    pub fn user_message(&self) -> String {
        match self {
            VoxError::Credentials(_) => {
                format!("{}. Add the key to ~/.voxgen/config.toml or the environment.", self)
            }
            VoxError::Permission(_) => {
                format!("{}. Grant microphone access and try again.", self)
            }
            _ => self.to_string(),
        }
    }

    pub(crate) fn invalid_transition(from: impl std::fmt::Display, action: &str) -> Self {
        VoxError::InvalidTransition {
            from: from.to_string(),
            action: action.to_string(),
        }
    }
}

impl From<serde_json::Error> for VoxError {
    fn from(e: serde_json::Error) -> Self {
        VoxError::Parse(e.to_string())
    }
}

/// Result alias used across the library
pub type Result<T, E = VoxError> = std::result::Result<T, E>;
