//! Code generation pipeline.
//!
//! A [`GenerationSession`] turns one [`Analysis`](crate::Analysis) into one
//! artifact: it builds the prompt, streams completion text (forwarding each
//! chunk as progress), then extracts and validates the first fenced code
//! block of the full response.

mod completion;
mod extract;
mod prompt;
mod scripted;
mod session;
mod sse;


pub use completion::{CompletionEndpoint, CompletionRequest, TokenStream};
pub use extract::{extract_artifact, extract_code_block, validate_artifact};
pub use prompt::{ChatMessage, ChatRole, SYSTEM_PREAMBLE, build_messages};
pub use scripted::ScriptedCompletion;
pub use session::{
    GenerationContext, GenerationEvent, GenerationOptions, GenerationSession, GenerationStatus,
};
pub use sse::{HttpCompletionClient, SseEvent, decode_payload};
