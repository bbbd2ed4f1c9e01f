//! Assistant status state machine.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VoxError};

/// Coarse status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantStatus {
    #[default]
    Idle,
    /// Capturing audio
    Listening,
    /// Waiting for a finalized transcript
    Thinking,
    /// Generation in flight
    Processing,
    Error,
}

impl AssistantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantStatus::Idle => "idle",
            AssistantStatus::Listening => "listening",
            AssistantStatus::Thinking => "thinking",
            AssistantStatus::Processing => "processing",
            AssistantStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for AssistantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Push-to-talk or continuous call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    #[default]
    Ptt,
    Call,
}

/// Inputs that move the status machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    StartRecording,
    SubmitText,
    CaptureStopped,
    TranscriptReady,
    /// `resume` returns to listening (call mode)
    GenerationDone { resume: bool },
    Abort { resume: bool },
    Fail,
    Retry,
    /// Transcription ended without a transcript
    SessionEnded,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::StartRecording => "start recording",
            Trigger::SubmitText => "submit text",
            Trigger::CaptureStopped => "stop capture",
            Trigger::TranscriptReady => "start generation",
            Trigger::GenerationDone { .. } => "complete generation",
            Trigger::Abort { .. } => "abort",
            Trigger::Fail => "fail",
            Trigger::Retry => "retry",
            Trigger::SessionEnded => "end session",
        }
    }
}

impl AssistantStatus {
    /// Validate and apply one transition
    pub fn apply(self, trigger: Trigger) -> Result<AssistantStatus> {
        use AssistantStatus as S;

        let resume_or_idle = |resume: bool| if resume { S::Listening } else { S::Idle };

        let next = match (self, trigger) {
            (S::Idle | S::Thinking, Trigger::StartRecording) => S::Listening,
            (S::Idle, Trigger::SubmitText) => S::Thinking,
            (S::Listening, Trigger::CaptureStopped) => S::Thinking,
            (S::Thinking, Trigger::TranscriptReady) => S::Processing,
            (S::Processing, Trigger::GenerationDone { resume }) => resume_or_idle(resume),
            (_, Trigger::Abort { resume }) => resume_or_idle(resume),
            (_, Trigger::Fail) => S::Error,
            (S::Error, Trigger::Retry) => S::Idle,
            (S::Listening | S::Thinking, Trigger::SessionEnded) => S::Idle,
            (from, trigger) => return Err(VoxError::invalid_transition(from, trigger.as_str())),
        };
        Ok(next)
    }
}
