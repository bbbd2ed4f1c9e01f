//! In-process connector driven by the caller.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::connection::{
    ConnectRequest, Connection, InboundFrame, TranscriptionConnector, TransportEnds,
};
use crate::error::{Result, VoxError};

#[derive(Default)]
struct ScriptedState {
    requests: Vec<ConnectRequest>,
    failures: VecDeque<VoxError>,
    links: Vec<ScriptedLink>,
}

/// Connector whose connections are [`ScriptedLink`]s the test drives by hand
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `connect` fail with `error`
    pub fn fail_next(&self, error: VoxError) {
        self.lock().failures.push_back(error);
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.lock().requests.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().links.len()
    }

    pub fn link(&self, index: usize) -> Option<ScriptedLink> {
        self.lock().links.get(index).cloned()
    }

    /// Most recently opened connection
    pub fn last_link(&self) -> Option<ScriptedLink> {
        self.lock().links.last().cloned()
    }
}

#[async_trait]
impl TranscriptionConnector for ScriptedConnector {
    async fn connect(&self, request: ConnectRequest) -> Result<Connection> {
        let mut state = self.lock();
        state.requests.push(request);
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let (connection, ends) = Connection::pair();
        state.links.push(ScriptedLink::new(ends));
        Ok(connection)
    }
}

/// Remote end of one scripted connection
#[derive(Clone)]
pub struct ScriptedLink {
    outbound: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
    inbound: mpsc::UnboundedSender<InboundFrame>,
    closed: CancellationToken,
}

impl ScriptedLink {
    fn new(ends: TransportEnds) -> Self {
        Self {
            outbound: Arc::new(Mutex::new(ends.outbound)),
            inbound: ends.inbound,
            closed: ends.closed,
        }
    }

    /// Deliver a raw text frame
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.inbound.send(InboundFrame::Text(text.into()));
    }

    pub fn send_state(&self, state: &str) {
        self.send_text(json!({"type": "state", "state": state}).to_string());
    }

    /// Agent transcript delta
    pub fn send_delta(&self, delta: &str, is_final: bool) {
        self.send_text(
            json!({"type": "transcript", "role": "agent", "delta": delta, "final": is_final})
                .to_string(),
        );
    }

    /// Agent transcript full snapshot
    pub fn send_snapshot(&self, text: &str, is_final: bool) {
        self.send_text(
            json!({"type": "transcript", "role": "agent", "text": text, "final": is_final})
                .to_string(),
        );
    }

    pub fn send_error(&self, message: &str) {
        self.send_text(json!({"type": "error", "message": message}).to_string());
    }

    /// Remote close
    pub fn close_remote(&self, reason: Option<&str>) {
        let _ = self
            .inbound
            .send(InboundFrame::Closed(reason.map(str::to_string)));
    }

    /// Transport failure
    pub fn fail(&self, message: &str) {
        let _ = self.inbound.send(InboundFrame::Failed(message.to_string()));
    }

    /// Audio frames sent by the session so far (drained)
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        let mut outbound = self.outbound.lock().unwrap_or_else(|e| e.into_inner());
        let mut frames = Vec::new();
        while let Ok(frame) = outbound.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// True once the session closed its side
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
