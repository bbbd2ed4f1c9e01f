//! Assistant orchestration.
//!
//! [`Assistant`] owns the transcription session, starts a generation for
//! every final transcript and records completed turns in the active
//! conversation. Status moves only along [`AssistantStatus::apply`].

mod history;
mod orchestrator;
mod state;


pub use history::{ConversationHistory, ConversationStore, MAX_HISTORY_ENTRIES};
pub use orchestrator::{Assistant, AssistantDeps, AssistantEvent, AssistantSnapshot};
pub use state::{AssistantStatus, InputMode, Trigger};
