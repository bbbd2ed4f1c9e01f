//! Streaming completion endpoint seam.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use super::prompt::ChatMessage;
use crate::error::Result;

/// Body of a streaming completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub stream: bool,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            stream: true,
            max_tokens,
            messages,
        }
    }
}

/// Incremental text deltas; ends when the backend sends its sentinel
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

#[async_trait]
pub trait CompletionEndpoint: Send + Sync {
    async fn stream(&self, api_key: &str, request: CompletionRequest) -> Result<TokenStream>;
}
