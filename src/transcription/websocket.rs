//! WebSocket transport.
//!
//! Session creation is a blocking HTTP call (run on the blocking pool); the
//! returned join URL is then opened as a WebSocket. Outbound PCM goes out as
//! binary messages, inbound text messages are forwarded verbatim.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::connection::{
    ConnectRequest, Connection, InboundFrame, TranscriptionConnector, TransportEnds,
};
use super::protocol::CreateSessionResponse;
use crate::error::{Result, VoxError};

/// Connector for the hosted transcription backend
#[derive(Clone)]
pub struct WebSocketConnector {
    session_url: String,
    agent: ureq::Agent,
}

impl WebSocketConnector {
    pub fn new(session_url: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(30))
            .build();

        Self {
            session_url: session_url.into(),
            agent,
        }
    }

    fn create_session(&self, request: &ConnectRequest) -> Result<String> {
        let response = self
            .agent
            .post(&self.session_url)
            .set("X-API-Key", &request.api_key)
            .send_json(&request.session);

        match response {
            Ok(resp) => {
                let body: CreateSessionResponse = resp
                    .into_json()
                    .map_err(|e| VoxError::Connection(format!("Invalid session response: {}", e)))?;
                Ok(body.join_url)
            }
            Err(ureq::Error::Status(code @ (401 | 403), _)) => Err(VoxError::Credentials(
                format!("transcription backend rejected the API key ({})", code),
            )),
            Err(ureq::Error::Status(code, resp)) => {
                let detail = resp.into_string().unwrap_or_default();
                Err(VoxError::Connection(format!(
                    "Session creation failed ({}): {}",
                    code,
                    detail.trim()
                )))
            }
            Err(e) => Err(VoxError::Connection(format!(
                "Failed to reach transcription backend: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl TranscriptionConnector for WebSocketConnector {
    async fn connect(&self, request: ConnectRequest) -> Result<Connection> {
        let this = self.clone();
        let join_url = tokio::task::spawn_blocking(move || this.create_session(&request))
            .await
            .map_err(|e| VoxError::Connection(format!("Session creation task failed: {}", e)))??;

        tracing::debug!("Joining transcription stream");
        let (stream, _) = connect_async(join_url.as_str())
            .await
            .map_err(|e| VoxError::Connection(format!("WebSocket connect failed: {}", e)))?;

        let (connection, ends) = Connection::pair();
        let TransportEnds {
            mut outbound,
            inbound,
            closed,
        } = ends;
        let (mut sink, mut source) = stream.split();

        let writer_closed = closed.clone();
        let writer_inbound = inbound.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = writer_closed.cancelled() => break,
                    frame = outbound.recv() => {
                        let Some(pcm) = frame else { break };
                        if let Err(e) = sink.send(Message::Binary(pcm.into())).await {
                            let _ = writer_inbound.send(InboundFrame::Failed(e.to_string()));
                            break;
                        }
                    }
                }
            }
            let _ = sink.send(Message::Close(None)).await;
            let _ = sink.close().await;
            tracing::debug!("Transcription writer finished");
        });

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    biased;
                    _ = closed.cancelled() => break,
                    message = source.next() => message,
                };
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if inbound.send(InboundFrame::Text(text.to_string())).is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|r| !r.is_empty());
                        let _ = inbound.send(InboundFrame::Closed(reason));
                        break;
                    }
                    // agent audio and pings
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        let _ = inbound.send(InboundFrame::Failed(e.to_string()));
                        break;
                    }
                    None => {
                        let _ = inbound.send(InboundFrame::Closed(None));
                        break;
                    }
                }
            }
            // stop the writer too
            closed.cancel();
        });

        Ok(connection)
    }
}
