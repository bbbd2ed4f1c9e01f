//! One-shot artifact generation.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::completion::{CompletionEndpoint, CompletionRequest};
use super::extract::extract_artifact;
use super::prompt::build_messages;
use crate::domain::{Analysis, ComponentSnapshot, GenerationResult, now_millis};
use crate::error::{Result, VoxError};
use crate::events::EventBus;
use crate::services::{CredentialsProvider, ExamplesProvider};

/// Progress of a [`GenerationSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Idle,
    Streaming,
    Completed,
    Failed,
    Aborted,
}

impl GenerationStatus {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            GenerationStatus::Completed | GenerationStatus::Failed | GenerationStatus::Aborted
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    Started,
    /// One streamed chunk, exactly as received
    Progress(String),
    Completed(GenerationResult),
    Failed(VoxError),
    /// Cancelled by `abort()`; not a failure
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOptions {
    /// Overrides the model selected in settings
    pub model: Option<String>,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
        }
    }
}

/// Collaborators shared by every generation
#[derive(Clone)]
pub struct GenerationContext {
    pub endpoint: Arc<dyn CompletionEndpoint>,
    pub credentials: Arc<dyn CredentialsProvider>,
    pub examples: Arc<dyn ExamplesProvider>,
    pub options: GenerationOptions,
}

/// Streams one artifact for one [`Analysis`].
///
/// `start()` runs at most once; later calls return `None` without side
/// effects.
pub struct GenerationSession {
    context: GenerationContext,
    analysis: Analysis,
    previous: Option<ComponentSnapshot>,
    status: Mutex<GenerationStatus>,
    response: Mutex<String>,
    cancel: CancellationToken,
    events: EventBus<GenerationEvent>,
}

impl GenerationSession {
    pub fn new(
        context: GenerationContext,
        analysis: Analysis,
        previous: Option<ComponentSnapshot>,
    ) -> Self {
        Self {
            context,
            analysis,
            previous,
            status: Mutex::new(GenerationStatus::Idle),
            response: Mutex::new(String::new()),
            cancel: CancellationToken::new(),
            events: EventBus::new(),
        }
    }

    fn status_lock(&self) -> MutexGuard<'_, GenerationStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> &EventBus<GenerationEvent> {
        &self.events
    }

    pub fn status(&self) -> GenerationStatus {
        *self.status_lock()
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    /// Everything streamed so far
    pub fn response_text(&self) -> String {
        self.response.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Stream, extract and validate the artifact
    pub async fn start(&self) -> Option<GenerationResult> {
        {
            let mut status = self.status_lock();
            if *status != GenerationStatus::Idle {
                tracing::debug!("Generation already {:?}; start ignored", *status);
                return None;
            }
            *status = GenerationStatus::Streaming;
        }

        tracing::info!(
            "Generating {} artifact for '{}'",
            self.analysis.intent,
            self.analysis.transcription
        );
        self.events.emit(&GenerationEvent::Started);

        let outcome = self.run().await;

        let event = {
            let mut status = self.status_lock();
            if *status == GenerationStatus::Aborted {
                GenerationEvent::Aborted
            } else {
                match &outcome {
                    Ok(result) => {
                        *status = GenerationStatus::Completed;
                        GenerationEvent::Completed(result.clone())
                    }
                    Err(VoxError::Aborted) => {
                        *status = GenerationStatus::Aborted;
                        GenerationEvent::Aborted
                    }
                    Err(e) => {
                        *status = GenerationStatus::Failed;
                        GenerationEvent::Failed(e.clone())
                    }
                }
            }
        };

        match &event {
            GenerationEvent::Completed(_) => tracing::info!("Generation completed"),
            GenerationEvent::Aborted => tracing::info!("Generation aborted"),
            GenerationEvent::Failed(e) => tracing::warn!("Generation failed: {}", e),
            _ => {}
        }
        self.events.emit(&event);

        match event {
            GenerationEvent::Completed(result) => Some(result),
            _ => None,
        }
    }

    async fn run(&self) -> Result<GenerationResult> {
        let api_key = self.context.credentials.api_keys().require_secondary()?;
        let model = self
            .context
            .options
            .model
            .clone()
            .unwrap_or_else(|| self.context.credentials.selected_model());

        let examples = self.context.examples.examples(&self.analysis.widget_url);
        let messages = build_messages(&self.analysis, &examples, self.previous.as_ref());
        let request = CompletionRequest::new(model, self.context.options.max_tokens, messages);

        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(VoxError::Aborted),
            stream = self.context.endpoint.stream(&api_key, request) => stream?,
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(VoxError::Aborted),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    self.response
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .push_str(&chunk);
                    self.events.emit(&GenerationEvent::Progress(chunk));
                }
                Some(Err(e)) => return Err(e),
                None => break,
            }
        }

        let code = extract_artifact(&self.response_text())?;
        Ok(GenerationResult {
            code,
            widget_url: self.analysis.widget_url.clone(),
            params: self.analysis.params.clone(),
            intent: self.analysis.intent,
            timestamp: now_millis(),
        })
    }

    /// Cancel the generation. Returns false when it had already finished.
    pub fn abort(&self) -> bool {
        let previous = {
            let mut status = self.status_lock();
            let previous = *status;
            if previous.is_finished() {
                return false;
            }
            *status = GenerationStatus::Aborted;
            previous
        };

        self.cancel.cancel();
        // A running start() reports the abort itself
        if previous == GenerationStatus::Idle {
            self.events.emit(&GenerationEvent::Aborted);
        }
        true
    }
}
