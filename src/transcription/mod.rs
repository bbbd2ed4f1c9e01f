//! Streaming transcription.
//!
//! A [`TranscriptionSession`] owns one capture source and at most one live
//! connection to the transcription backend. Audio captured before the
//! backend reports readiness is held in a bounded [`FrameBuffer`] and
//! flushed in order once it does. `stop()` halts capture immediately but
//! keeps the connection open until the final transcript arrives or the
//! grace period expires.
//!
//! Transports implement [`TranscriptionConnector`]:
//! - [`WebSocketConnector`]: HTTP session creation plus a WebSocket stream
//! - [`ScriptedConnector`]: in-process links driven by tests

mod buffer;
mod connection;
mod protocol;
mod scripted;
mod session;
mod state;
mod websocket;


pub use buffer::FrameBuffer;
pub use connection::{
    ConnectRequest, Connection, ConnectionSender, InboundFrame, TranscriptionConnector,
    TransportEnds,
};
pub use protocol::{
    CreateSessionRequest, CreateSessionResponse, DEFAULT_SYSTEM_PROMPT, InitialMessage, Role,
    ServerMessage, is_ready_state,
};
pub use scripted::{ScriptedConnector, ScriptedLink};
pub use session::{
    SessionHandle, SessionSettings, StartOptions, TranscriptionEvent, TranscriptionSession,
};
pub use state::{SessionAction, SessionPhase};
pub use websocket::WebSocketConnector;
