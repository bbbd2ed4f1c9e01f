//! Session lifecycle state machine.

use crate::error::{Result, VoxError};

/// Lifecycle of one [`TranscriptionSession`](super::TranscriptionSession)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    /// Acquiring credentials, microphone and connection
    Starting,
    /// Capturing; audio is buffered until the backend is ready
    Active { server_ready: bool },
    /// Capture stopped, waiting for the final transcript
    Stopping { server_ready: bool },
    /// Error reported, teardown pending
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
    Begin,
    Connected,
    ServerReady,
    Stop,
    Fail,
    Reset,
}

impl SessionAction {
    fn as_str(&self) -> &'static str {
        match self {
            SessionAction::Begin => "begin",
            SessionAction::Connected => "connect",
            SessionAction::ServerReady => "mark ready",
            SessionAction::Stop => "stop",
            SessionAction::Fail => "fail",
            SessionAction::Reset => "reset",
        }
    }
}

impl SessionPhase {
    /// Validate and apply one transition
    pub fn apply(self, action: SessionAction) -> Result<SessionPhase> {
        use SessionAction as A;
        use SessionPhase as P;

        let next = match (self, action) {
            // a Stopping session may be superseded by a new one
            (P::Idle | P::Stopping { .. }, A::Begin) => P::Starting,
            (P::Starting, A::Connected) => P::Active {
                server_ready: false,
            },
            (P::Active { .. }, A::ServerReady) => P::Active { server_ready: true },
            (P::Stopping { .. }, A::ServerReady) => P::Stopping { server_ready: true },
            (P::Active { server_ready }, A::Stop) => P::Stopping { server_ready },
            (P::Starting | P::Active { .. } | P::Stopping { .. }, A::Fail) => P::Failed,
            (_, A::Reset) => P::Idle,
            (from, action) => return Err(VoxError::invalid_transition(from, action.as_str())),
        };
        Ok(next)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SessionPhase::Idle)
    }

    /// Starting, active or stopping
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionPhase::Starting | SessionPhase::Active { .. } | SessionPhase::Stopping { .. }
        )
    }

    pub fn server_ready(&self) -> bool {
        match self {
            SessionPhase::Active { server_ready } | SessionPhase::Stopping { server_ready } => {
                *server_ready
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Starting => write!(f, "starting"),
            SessionPhase::Active { server_ready: false } => write!(f, "active (buffering)"),
            SessionPhase::Active { server_ready: true } => write!(f, "active"),
            SessionPhase::Stopping { .. } => write!(f, "stopping"),
            SessionPhase::Failed => write!(f, "failed"),
        }
    }
}
