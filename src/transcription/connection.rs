//! Transport-neutral connection handles.
//!
//! A [`TranscriptionConnector`] turns a [`ConnectRequest`] into a
//! [`Connection`]: an outbound channel for PCM frames and an inbound channel
//! of [`InboundFrame`]s. The transport owns the other ends
//! ([`TransportEnds`]) and stops when the close token is cancelled.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol::CreateSessionRequest;
use crate::error::Result;

/// What the transport hands to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// JSON event text
    Text(String),
    /// Remote closed the stream, with an optional reason
    Closed(Option<String>),
    /// Transport failure
    Failed(String),
}

/// Session-side handle for outbound audio and closing
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    audio: mpsc::UnboundedSender<Vec<u8>>,
    close: CancellationToken,
}

impl ConnectionSender {
    /// Queue one PCM frame; false once the connection is closed
    pub fn send_audio(&self, pcm: Vec<u8>) -> bool {
        !self.close.is_cancelled() && self.audio.send(pcm).is_ok()
    }

    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }
}

/// Established streaming connection
#[derive(Debug)]
pub struct Connection {
    pub sender: ConnectionSender,
    pub inbound: mpsc::UnboundedReceiver<InboundFrame>,
}

/// Transport-side ends of a [`Connection`]
#[derive(Debug)]
pub struct TransportEnds {
    pub outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    pub inbound: mpsc::UnboundedSender<InboundFrame>,
    pub closed: CancellationToken,
}

impl Connection {
    /// Create a connected pair of session and transport ends
    pub fn pair() -> (Connection, TransportEnds) {
        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let close = CancellationToken::new();
        (
            Connection {
                sender: ConnectionSender {
                    audio: audio_tx,
                    close: close.clone(),
                },
                inbound: inbound_rx,
            },
            TransportEnds {
                outbound: audio_rx,
                inbound: inbound_tx,
                closed: close,
            },
        )
    }
}

/// Everything needed to open one streaming session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub api_key: String,
    pub session: CreateSessionRequest,
}

/// Opens streaming transcription connections
#[async_trait]
pub trait TranscriptionConnector: Send + Sync {
    async fn connect(&self, request: ConnectRequest) -> Result<Connection>;
}
