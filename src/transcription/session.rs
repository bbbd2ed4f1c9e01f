//! Audio/session lifecycle manager.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::buffer::FrameBuffer;
use super::connection::{ConnectRequest, ConnectionSender, InboundFrame, TranscriptionConnector};
use super::protocol::{
    CreateSessionRequest, DEFAULT_SYSTEM_PROMPT, Role, ServerMessage, is_ready_state,
};
use super::state::{SessionAction, SessionPhase};
use crate::audio::{AudioCaptureSource, CaptureConfig, RawAudioFrame};
use crate::domain::Analysis;
use crate::error::{Result, VoxError};
use crate::events::{EventBus, Subscription};
use crate::services::CredentialsProvider;
use crate::transcript::{IncrementalJsonAssembler, TRANSCRIPTION_FIELD};

/// Tunables for a [`TranscriptionSession`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub language: String,
    pub capture: CaptureConfig,
    /// Grace period for the final transcript after `stop()`
    pub final_timeout: Duration,
    /// Minimum spacing of partial transcript events
    pub partial_interval: Duration,
    /// Pre-ready buffer bound, in milliseconds of audio
    pub max_buffered_ms: u64,
    pub system_prompt: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            capture: CaptureConfig::default(),
            final_timeout: Duration::from_millis(5000),
            partial_interval: Duration::from_millis(250),
            max_buffered_ms: 5000,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl SessionSettings {
    fn max_buffered_bytes(&self) -> usize {
        self.capture.bytes_per_ms() * self.max_buffered_ms as usize
    }
}

/// Per-start overrides
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Overrides the configured language hint
    pub language: Option<String>,
}

/// Identifies one started session; every event carries its epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub epoch: u64,
}

/// Notifications from a [`TranscriptionSession`]
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionEvent {
    Started { epoch: u64 },
    /// Backend signalled readiness; buffered audio has been flushed
    Ready { epoch: u64 },
    /// Level of the latest captured frame, `0.0` after cleanup
    Volume(f32),
    Partial { epoch: u64, text: String },
    /// Emitted before teardown starts
    Final { epoch: u64, analysis: Analysis },
    Error { epoch: u64, error: VoxError },
    /// Teardown finished
    Stopped { epoch: u64 },
}

struct SessionState {
    phase: SessionPhase,
    epoch: u64,
    cleaning_up: bool,
    buffer: FrameBuffer,
    assembler: IncrementalJsonAssembler,
    last_partial: Option<String>,
    last_partial_at: Option<Instant>,
    final_received: bool,
    sender: Option<ConnectionSender>,
    frames: Option<Subscription>,
    /// Stops the reader task
    shutdown: Option<CancellationToken>,
    /// Cancels the stop grace timer
    grace: Option<CancellationToken>,
    runtime: Option<Handle>,
}

/// Connection and capture resources released outside the state lock
struct Teardown {
    sender: Option<ConnectionSender>,
    frames: Option<Subscription>,
    tokens: Vec<CancellationToken>,
}

impl Teardown {
    fn run(self) {
        for token in self.tokens {
            token.cancel();
        }
        if let Some(sender) = self.sender {
            sender.close();
        }
        drop(self.frames);
    }
}

impl SessionState {
    fn new(max_buffered_bytes: usize) -> Self {
        Self {
            phase: SessionPhase::Idle,
            epoch: 0,
            cleaning_up: false,
            buffer: FrameBuffer::new(max_buffered_bytes),
            assembler: IncrementalJsonAssembler::new(),
            last_partial: None,
            last_partial_at: None,
            final_received: false,
            sender: None,
            frames: None,
            shutdown: None,
            grace: None,
            runtime: None,
        }
    }

    /// Detach connection resources and reset session-local state
    fn release(&mut self, max_buffered_bytes: usize) -> Teardown {
        self.buffer.reset(max_buffered_bytes);
        self.assembler.reset();
        self.last_partial = None;
        self.last_partial_at = None;
        self.final_received = false;
        Teardown {
            sender: self.sender.take(),
            frames: self.frames.take(),
            tokens: self
                .shutdown
                .take()
                .into_iter()
                .chain(self.grace.take())
                .collect(),
        }
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch && !self.phase.is_idle()
    }

    /// Move to `Failed` unless another path already reported for this epoch
    fn claim_failure(&mut self, epoch: u64) -> bool {
        if !self.is_current(epoch) || self.cleaning_up {
            return false;
        }
        match self.phase.apply(SessionAction::Fail) {
            Ok(next) => {
                self.phase = next;
                true
            }
            Err(_) => false,
        }
    }
}

enum TranscriptOutcome {
    Nothing,
    Partial(String),
    Final(Result<Analysis>),
}

struct Shared {
    state: Mutex<SessionState>,
    events: EventBus<TranscriptionEvent>,
    capture: Arc<dyn AudioCaptureSource>,
    settings: SessionSettings,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: TranscriptionEvent) {
        self.events.emit(&event);
    }

    fn on_frame(&self, epoch: u64, frame: &RawAudioFrame) {
        {
            let mut st = self.lock();
            if st.epoch != epoch {
                return;
            }
            let SessionPhase::Active { server_ready } = st.phase else {
                return;
            };
            if server_ready {
                if let Some(sender) = &st.sender {
                    sender.send_audio(frame.pcm.clone());
                }
            } else {
                let evicted = st.buffer.push(frame.pcm.clone());
                if evicted > 0 {
                    tracing::warn!(
                        "Backend not ready; dropped {} buffered frame(s) ({} total)",
                        evicted,
                        st.buffer.dropped()
                    );
                }
            }
        }
        self.emit(TranscriptionEvent::Volume(frame.volume()));
    }

    fn on_inbound(self: &Arc<Self>, epoch: u64, frame: InboundFrame) {
        match frame {
            InboundFrame::Text(text) => self.on_message(epoch, &text),
            InboundFrame::Closed(reason) => self.on_remote_closed(epoch, reason),
            InboundFrame::Failed(message) => self.fail(epoch, VoxError::Connection(message)),
        }
    }

    fn on_message(self: &Arc<Self>, epoch: u64, text: &str) {
        let message = match ServerMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!("Ignoring unparseable frame: {}", e);
                return;
            }
        };

        match message {
            ServerMessage::State { state } => {
                if is_ready_state(&state) {
                    self.on_ready(epoch);
                } else {
                    tracing::trace!("Backend state: {}", state);
                }
            }
            ServerMessage::Transcript {
                role,
                text,
                delta,
                is_final,
            } => {
                if role == Role::Agent {
                    self.on_transcript(epoch, text, delta, is_final);
                }
            }
            ServerMessage::Error { message } => {
                self.fail(epoch, VoxError::Connection(message));
            }
            ServerMessage::Other => tracing::debug!("Ignoring unknown frame type"),
        }
    }

    fn on_ready(&self, epoch: u64) {
        {
            let mut st = self.lock();
            if st.epoch != epoch
                || st.phase.server_ready()
                || !matches!(st.phase, SessionPhase::Active { .. } | SessionPhase::Stopping { .. })
            {
                return;
            }
            match st.phase.apply(SessionAction::ServerReady) {
                Ok(next) => st.phase = next,
                Err(e) => {
                    tracing::warn!("{}", e);
                    return;
                }
            }
            // Flush under the lock so no live frame can overtake a buffered one
            let frames = st.buffer.drain();
            tracing::debug!("Backend ready; flushing {} buffered frame(s)", frames.len());
            if let Some(sender) = &st.sender {
                for frame in frames {
                    sender.send_audio(frame);
                }
            }
        }
        self.emit(TranscriptionEvent::Ready { epoch });
    }

    fn on_transcript(
        self: &Arc<Self>,
        epoch: u64,
        text: Option<String>,
        delta: Option<String>,
        is_final: bool,
    ) {
        let outcome = {
            let mut st = self.lock();
            if st.epoch != epoch
                || st.final_received
                || !matches!(st.phase, SessionPhase::Active { .. } | SessionPhase::Stopping { .. })
            {
                return;
            }

            if let Some(text) = text {
                st.assembler.replace(&text);
            } else if let Some(delta) = delta {
                st.assembler.append(&delta);
            }

            if is_final {
                st.final_received = true;
                TranscriptOutcome::Final(
                    st.assembler
                        .finalize()
                        .and_then(Analysis::from_object),
                )
            } else {
                match st.assembler.try_extract_partial_field(TRANSCRIPTION_FIELD) {
                    Some(partial) if st.last_partial.as_deref() != Some(partial.as_str()) => {
                        let now = Instant::now();
                        let due = st.last_partial_at.is_none_or(|at| {
                            now.duration_since(at) >= self.settings.partial_interval
                        });
                        if due {
                            st.last_partial = Some(partial.clone());
                            st.last_partial_at = Some(now);
                            TranscriptOutcome::Partial(partial)
                        } else {
                            TranscriptOutcome::Nothing
                        }
                    }
                    _ => TranscriptOutcome::Nothing,
                }
            }
        };

        match outcome {
            TranscriptOutcome::Nothing => {}
            TranscriptOutcome::Partial(text) => {
                self.emit(TranscriptionEvent::Partial { epoch, text });
            }
            TranscriptOutcome::Final(Ok(analysis)) => {
                tracing::info!("Final transcript: {}", analysis.transcription);
                self.emit(TranscriptionEvent::Final { epoch, analysis });
                self.cleanup(epoch);
            }
            TranscriptOutcome::Final(Err(error)) => {
                tracing::warn!("Final transcript rejected: {}", error);
                self.emit(TranscriptionEvent::Error { epoch, error });
                self.cleanup(epoch);
            }
        }
    }

    /// Finalize whatever the assembler holds, for a session that ended
    /// without a `final` marker. Emits `Final` when that succeeds.
    fn salvage(self: &Arc<Self>, epoch: u64) -> bool {
        let analysis = {
            let mut st = self.lock();
            if !st.is_current(epoch) || st.final_received || st.assembler.is_empty() {
                return false;
            }
            match st.assembler.finalize().and_then(Analysis::from_object) {
                Ok(analysis) => {
                    st.final_received = true;
                    analysis
                }
                Err(_) => return false,
            }
        };
        tracing::info!("Recovered transcript without final marker");
        self.emit(TranscriptionEvent::Final { epoch, analysis });
        true
    }

    fn on_remote_closed(self: &Arc<Self>, epoch: u64, reason: Option<String>) {
        {
            let st = self.lock();
            if !st.is_current(epoch) || st.cleaning_up {
                return;
            }
            if st.final_received {
                drop(st);
                self.cleanup(epoch);
                return;
            }
        }

        if self.salvage(epoch) {
            self.cleanup(epoch);
            return;
        }

        let message = match reason {
            Some(reason) => format!("connection closed before the final transcript: {}", reason),
            None => "connection closed before the final transcript".to_string(),
        };
        self.fail(epoch, VoxError::Connection(message));
    }

    fn on_grace_expired(self: &Arc<Self>, epoch: u64) {
        let quiet = {
            let st = self.lock();
            if st.epoch != epoch || !matches!(st.phase, SessionPhase::Stopping { .. }) {
                return;
            }
            st.final_received
        };

        // a complete document without the final marker is still delivered
        if quiet || self.salvage(epoch) {
            self.cleanup(epoch);
            return;
        }

        let timeout_ms = self.settings.final_timeout.as_millis() as u64;
        tracing::warn!("No final transcript within {}ms", timeout_ms);
        self.fail(epoch, VoxError::Timeout(timeout_ms));
    }

    /// Report `error` once for this epoch and tear down
    fn fail(self: &Arc<Self>, epoch: u64, error: VoxError) {
        if !self.lock().claim_failure(epoch) {
            tracing::debug!("Dropping error for finished session {}: {}", epoch, error);
            return;
        }
        tracing::warn!("Transcription session {} failed: {}", epoch, error);
        self.emit(TranscriptionEvent::Error { epoch, error });
        self.cleanup(epoch);
    }

    /// Idempotent teardown; concurrent callers collapse to one execution
    fn cleanup(&self, epoch: u64) {
        let teardown = {
            let mut st = self.lock();
            if st.epoch != epoch || st.cleaning_up || st.phase.is_idle() {
                return;
            }
            st.cleaning_up = true;
            st.release(self.settings.max_buffered_bytes())
        };

        self.capture.stop();
        teardown.run();

        {
            let mut st = self.lock();
            st.phase = SessionPhase::Idle;
            st.cleaning_up = false;
        }

        tracing::debug!("Transcription session {} cleaned up", epoch);
        self.emit(TranscriptionEvent::Volume(0.0));
        self.emit(TranscriptionEvent::Stopped { epoch });
    }
}

async fn read_loop(
    shared: Weak<Shared>,
    epoch: u64,
    mut inbound: mpsc::UnboundedReceiver<InboundFrame>,
    shutdown: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            frame = inbound.recv() => frame,
        };
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match frame {
            Some(frame) => {
                let terminal = !matches!(frame, InboundFrame::Text(_));
                shared.on_inbound(epoch, frame);
                if terminal {
                    break;
                }
            }
            None => {
                shared.on_remote_closed(epoch, None);
                break;
            }
        }
    }
}

/// Owns one microphone capture and at most one live streaming connection.
///
/// Every start bumps the epoch; callbacks from a connection or timer of an
/// older epoch are ignored. Events are published on [`events`](Self::events).
pub struct TranscriptionSession {
    shared: Arc<Shared>,
    connector: Arc<dyn TranscriptionConnector>,
    credentials: Arc<dyn CredentialsProvider>,
}

impl TranscriptionSession {
    pub fn new(
        capture: Arc<dyn AudioCaptureSource>,
        connector: Arc<dyn TranscriptionConnector>,
        credentials: Arc<dyn CredentialsProvider>,
        settings: SessionSettings,
    ) -> Self {
        let state = SessionState::new(settings.max_buffered_bytes());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                events: EventBus::new(),
                capture,
                settings,
            }),
            connector,
            credentials,
        }
    }

    pub fn events(&self) -> &EventBus<TranscriptionEvent> {
        &self.shared.events
    }

    pub fn phase(&self) -> SessionPhase {
        self.shared.lock().phase
    }

    /// Epoch of the most recent start
    pub fn epoch(&self) -> u64 {
        self.shared.lock().epoch
    }

    /// Frames currently held back waiting for readiness
    pub fn buffered_frames(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.shared.settings
    }

    /// Acquire the microphone and open a streaming connection.
    ///
    /// Returns `None` when the session is busy, when setup fails (an `Error`
    /// event is emitted) or when the start was cancelled or superseded while
    /// it was still setting up. Never panics or returns an error.
    pub async fn start(&self, options: StartOptions) -> Option<SessionHandle> {
        let shared = &self.shared;
        let max_bytes = shared.settings.max_buffered_bytes();

        let (epoch, superseded) = {
            let mut st = shared.lock();
            if st.cleaning_up {
                tracing::warn!("Transcription start rejected: cleanup in progress");
                return None;
            }
            let next = match st.phase.apply(SessionAction::Begin) {
                Ok(next) => next,
                Err(e) => {
                    tracing::warn!("Transcription start rejected: {}", e);
                    return None;
                }
            };
            let superseded = if st.phase.is_idle() {
                None
            } else {
                tracing::info!("Superseding stopping session {}", st.epoch);
                Some((st.epoch, st.release(max_bytes)))
            };
            st.buffer.reset(max_bytes);
            st.phase = next;
            st.epoch += 1;
            st.runtime = Handle::try_current().ok();
            (st.epoch, superseded)
        };

        if let Some((old_epoch, teardown)) = superseded {
            teardown.run();
            shared.emit(TranscriptionEvent::Volume(0.0));
            shared.emit(TranscriptionEvent::Stopped { epoch: old_epoch });
        }

        tracing::debug!("Starting transcription session {}", epoch);
        let api_key = match self.credentials.api_keys().require_primary() {
            Ok(key) => key,
            Err(e) => return self.fail_setup(epoch, e),
        };

        if !shared.capture.request_permission().await {
            return self.fail_setup(
                epoch,
                VoxError::Permission("microphone access was not granted".to_string()),
            );
        }
        if !self.still_starting(epoch) {
            return None;
        }

        if let Err(e) = shared.capture.init(&shared.settings.capture) {
            return self.fail_setup(epoch, e);
        }

        let capture = shared.capture.config();
        let language = options
            .language
            .unwrap_or_else(|| shared.settings.language.clone());
        let request = ConnectRequest {
            api_key,
            session: CreateSessionRequest::new(
                &shared.settings.system_prompt,
                &language,
                capture.sample_rate,
            ),
        };

        let connection = match self.connector.connect(request).await {
            Ok(connection) => connection,
            Err(e) => return self.fail_setup(epoch, e),
        };

        let shutdown = CancellationToken::new();
        {
            let mut st = shared.lock();
            if st.epoch != epoch || st.phase != SessionPhase::Starting {
                drop(st);
                tracing::debug!("Session {} cancelled during connect", epoch);
                connection.sender.close();
                return None;
            }
            match st.phase.apply(SessionAction::Connected) {
                Ok(next) => st.phase = next,
                Err(e) => {
                    drop(st);
                    connection.sender.close();
                    return self.fail_setup(epoch, e);
                }
            }
            st.sender = Some(connection.sender);
            st.shutdown = Some(shutdown.clone());

            let weak = Arc::downgrade(shared);
            st.frames = Some(shared.capture.on_data(Arc::new(move |frame: &RawAudioFrame| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_frame(epoch, frame);
                }
            })));
        }

        if let Err(e) = shared.capture.start() {
            shared.fail(epoch, e);
            return None;
        }

        tracing::info!("Transcription session {} started", epoch);
        shared.emit(TranscriptionEvent::Started { epoch });

        tokio::spawn(read_loop(
            Arc::downgrade(shared),
            epoch,
            connection.inbound,
            shutdown,
        ));

        Some(SessionHandle { epoch })
    }

    fn still_starting(&self, epoch: u64) -> bool {
        let st = self.shared.lock();
        st.epoch == epoch && st.phase == SessionPhase::Starting
    }

    fn fail_setup(&self, epoch: u64, error: VoxError) -> Option<SessionHandle> {
        self.shared.fail(epoch, error);
        None
    }

    /// Stop capturing but keep the connection until the final transcript
    /// arrives or the grace period runs out. Safe to call repeatedly.
    pub fn stop(&self) {
        let shared = &self.shared;
        let (epoch, wait) = {
            let mut st = shared.lock();
            if st.cleaning_up {
                return;
            }
            match st.phase {
                SessionPhase::Idle | SessionPhase::Failed | SessionPhase::Stopping { .. } => return,
                SessionPhase::Starting => (st.epoch, None),
                SessionPhase::Active { .. } if st.final_received => (st.epoch, None),
                SessionPhase::Active { .. } => {
                    match st.phase.apply(SessionAction::Stop) {
                        Ok(next) => st.phase = next,
                        Err(e) => {
                            tracing::warn!("{}", e);
                            return;
                        }
                    }
                    let token = CancellationToken::new();
                    st.grace = Some(token.clone());
                    (st.epoch, Some((token, st.runtime.clone())))
                }
            }
        };

        let Some((token, runtime)) = wait else {
            shared.cleanup(epoch);
            return;
        };

        // No further outbound audio
        shared.capture.stop();
        tracing::debug!("Session {} stopping; awaiting final transcript", epoch);

        let weak = Arc::downgrade(shared);
        let timeout = shared.settings.final_timeout;
        let timer = async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_grace_expired(epoch);
                    }
                }
            }
        };
        match runtime.or_else(|| Handle::try_current().ok()) {
            Some(handle) => {
                handle.spawn(timer);
            }
            None => {
                tracing::warn!("No runtime for the stop grace timer; closing immediately");
                shared.cleanup(epoch);
            }
        }
    }

    /// Tear down immediately without waiting for a final transcript
    pub fn cancel(&self) {
        let epoch = self.shared.lock().epoch;
        self.shared.cleanup(epoch);
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        self.cancel();
    }
}
