//! Core domain types for voxgen

mod analysis;
mod generation;
mod history;


pub use analysis::{Analysis, Intent};
pub use generation::GenerationResult;
pub use history::{ComponentSnapshot, Conversation, HistoryEntry, now_millis};
