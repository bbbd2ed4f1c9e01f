//! Completion endpoint replaying canned chunks.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use futures::StreamExt;

use super::completion::{CompletionEndpoint, CompletionRequest, TokenStream};
use crate::error::{Result, VoxError};

#[derive(Default)]
struct Script {
    chunks: Vec<String>,
    /// Yielded after the chunks
    stream_error: Option<VoxError>,
    /// Returned instead of a stream
    connect_error: Option<VoxError>,
    /// Never finish after the chunks
    hang: bool,
    requests: Vec<(String, CompletionRequest)>,
}

/// Deterministic [`CompletionEndpoint`] for tests and demos
#[derive(Clone, Default)]
pub struct ScriptedCompletion {
    script: Arc<Mutex<Script>>,
}

impl ScriptedCompletion {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let completion = Self::default();
        completion.set_chunks(chunks);
        completion
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Replace the chunks served by later calls
    pub fn set_chunks<I, S>(&self, chunks: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().chunks = chunks.into_iter().map(Into::into).collect();
    }

    pub fn fail_stream(&self, error: VoxError) {
        self.lock().stream_error = Some(error);
    }

    pub fn fail_connect(&self, error: VoxError) {
        self.lock().connect_error = Some(error);
    }

    /// Keep the stream open forever after the last chunk
    pub fn hang(&self) {
        self.lock().hang = true;
    }

    /// `(api_key, request)` pairs received so far
    pub fn requests(&self) -> Vec<(String, CompletionRequest)> {
        self.lock().requests.clone()
    }
}

#[async_trait]
impl CompletionEndpoint for ScriptedCompletion {
    async fn stream(&self, api_key: &str, request: CompletionRequest) -> Result<TokenStream> {
        let mut script = self.lock();
        script.requests.push((api_key.to_string(), request));
        if let Some(error) = script.connect_error.clone() {
            return Err(error);
        }

        let mut items: Vec<Result<String>> = script.chunks.iter().cloned().map(Ok).collect();
        if let Some(error) = script.stream_error.clone() {
            items.push(Err(error));
        }

        let stream = futures::stream::iter(items);
        if script.hang {
            Ok(stream.chain(futures::stream::pending()).boxed())
        } else {
            Ok(stream.boxed())
        }
    }
}
