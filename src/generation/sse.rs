//! HTTP completion client reading a server-sent-events stream.

use std::io::{BufRead, BufReader, Read};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::completion::{CompletionEndpoint, CompletionRequest, TokenStream};
use crate::error::{Result, VoxError};

/// One decoded SSE payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// Decode one `data:` payload. Payloads without text (role headers,
/// pings, usage) decode to `None`.
pub fn decode_payload(payload: &str) -> Result<Option<SseEvent>> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Ok(None);
    }
    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let value: Value = serde_json::from_str(payload)?;
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(VoxError::Connection(message));
    }
    if value.get("type").and_then(Value::as_str) == Some("message_stop") {
        return Ok(Some(SseEvent::Done));
    }

    let text = value
        .pointer("/choices/0/delta/content")
        .or_else(|| value.pointer("/delta/text"))
        .and_then(Value::as_str);

    Ok(text
        .filter(|t| !t.is_empty())
        .map(|t| SseEvent::Delta(t.to_string())))
}

/// Iterator over `data:` payloads of an SSE body
pub(super) struct SseLines<R: Read> {
    reader: BufReader<R>,
    buffer: String,
}

impl<R: Read> SseLines<R> {
    pub(super) fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: String::new(),
        }
    }
}

impl<R: Read> Iterator for SseLines<R> {
    type Item = Result<SseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_line(&mut self.buffer) {
                Ok(0) => return None, // EOF
                Ok(_) => {
                    let line = self.buffer.trim_end_matches(['\r', '\n']);
                    // comments, `event:` and `id:` lines carry nothing we need
                    let Some(payload) = line.strip_prefix("data:") else {
                        continue;
                    };
                    match decode_payload(payload) {
                        Ok(Some(event)) => return Some(Ok(event)),
                        Ok(None) => continue,
                        Err(e) => return Some(Err(e)),
                    }
                }
                Err(e) => {
                    return Some(Err(VoxError::Connection(format!(
                        "Failed to read completion stream: {}",
                        e
                    ))));
                }
            }
        }
    }
}

/// Completion endpoint over HTTP with bearer authentication
#[derive(Clone)]
pub struct HttpCompletionClient {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpCompletionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(120))
            .build();

        Self {
            endpoint: endpoint.into(),
            agent,
        }
    }

    /// Open the stream, retrying transport failures up to 3 times
    fn open(&self, api_key: &str, request: &CompletionRequest) -> Result<Box<dyn Read + Send>> {
        const MAX_RETRIES: u32 = 3;
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            let response = self
                .agent
                .post(&self.endpoint)
                .set("Authorization", &format!("Bearer {}", api_key))
                .set("Accept", "text/event-stream")
                .send_json(request);

            match response {
                Ok(resp) => return Ok(Box::new(resp.into_reader())),
                Err(ureq::Error::Status(code @ (401 | 403), _)) => {
                    return Err(VoxError::Credentials(format!(
                        "completion backend rejected the API key ({})",
                        code
                    )));
                }
                Err(ureq::Error::Status(code, resp)) => {
                    let detail = resp.into_string().unwrap_or_default();
                    return Err(VoxError::Connection(format!(
                        "Completion request failed ({}): {}",
                        code,
                        detail.trim()
                    )));
                }
                Err(e) => {
                    tracing::warn!(
                        "Completion attempt {}/{} failed: {}",
                        attempt,
                        MAX_RETRIES,
                        e
                    );
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        // Exponential backoff: 500ms, 1s
                        let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        Err(VoxError::Connection(match last_error {
            Some(e) => format!(
                "Failed to reach completion backend after {} attempts: {}",
                MAX_RETRIES, e
            ),
            None => "Failed to reach completion backend".to_string(),
        }))
    }
}

#[async_trait]
impl CompletionEndpoint for HttpCompletionClient {
    async fn stream(&self, api_key: &str, request: CompletionRequest) -> Result<TokenStream> {
        let (tx, rx) = mpsc::unbounded_channel::<Result<String>>();
        let this = self.clone();
        let api_key = api_key.to_string();

        // Blocking reader; stops as soon as the receiving side is dropped
        tokio::task::spawn_blocking(move || {
            let reader = match this.open(&api_key, &request) {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            for event in SseLines::new(reader) {
                let item = match event {
                    Ok(SseEvent::Delta(text)) => Ok(text),
                    Ok(SseEvent::Done) => break,
                    Err(e) => Err(e),
                };
                let failed = item.is_err();
                if tx.send(item).is_err() || failed {
                    break;
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(Box::pin(stream))
    }
}
