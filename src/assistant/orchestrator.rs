//! The assistant: one transcription session, at most one live generation,
//! and the conversation history they feed.

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::history::{ConversationHistory, ConversationStore};
use super::state::{AssistantStatus, InputMode, Trigger};
use crate::audio::AudioCaptureSource;
use crate::domain::{
    Analysis, ComponentSnapshot, Conversation, GenerationResult, HistoryEntry, now_millis,
};
use crate::error::{Result, VoxError};
use crate::events::{EventBus, Subscription};
use crate::generation::{
    CompletionEndpoint, GenerationContext, GenerationEvent, GenerationOptions, GenerationSession,
};
use crate::services::{
    ArtifactCompiler, CredentialsProvider, ExamplesProvider, KeyValueStore, WidgetCache,
};
use crate::transcription::{
    SessionSettings, StartOptions, TranscriptionConnector, TranscriptionEvent,
    TranscriptionSession,
};

/// Collaborators wired into an [`Assistant`]
pub struct AssistantDeps {
    pub capture: Arc<dyn AudioCaptureSource>,
    pub connector: Arc<dyn TranscriptionConnector>,
    pub credentials: Arc<dyn CredentialsProvider>,
    pub completion: Arc<dyn CompletionEndpoint>,
    pub examples: Arc<dyn ExamplesProvider>,
    pub store: Arc<dyn KeyValueStore>,
    /// Optional compile step after extraction
    pub compiler: Option<Arc<dyn ArtifactCompiler>>,
    pub session: SessionSettings,
    pub generation: GenerationOptions,
}

/// Observable assistant state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantSnapshot {
    pub status: AssistantStatus,
    pub mode: InputMode,
    /// Latest input level in `[0, 1]`
    pub volume: f32,
    pub transcript: String,
    pub partial_transcript: String,
    /// Human readable message while in `Error`
    pub error: Option<String>,
    /// Epoch millis when the current call started
    pub call_start_time: Option<i64>,
    /// Text streamed by the current generation; reset when a new one starts
    pub response_stream: String,
    pub current_component: Option<ComponentSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    StatusChanged {
        from: AssistantStatus,
        to: AssistantStatus,
    },
    ModeChanged(InputMode),
    Volume(f32),
    PartialTranscript(String),
    Transcript(String),
    /// One generation chunk, exactly as appended to `response_stream`
    ResponseDelta(String),
    Completed(HistoryEntry),
    Error(String),
    /// Active conversation, its entries or the cursor changed
    HistoryChanged,
}

/// Work handed to the single owner
enum Signal {
    Transcription(TranscriptionEvent),
    Generation { id: u64, event: GenerationEvent },
}

struct ActiveGeneration {
    id: u64,
    session: Arc<GenerationSession>,
    transcript: String,
    _events: Subscription,
}

/// Coordinates voice capture, transcription and generation for one user.
///
/// All state is owned here and mutated only through `&mut self`. Session
/// callbacks are queued in an inbox and applied by
/// [`process_next`](Self::process_next), so history and status never race
/// with a session that is still tearing down.
pub struct Assistant {
    state: AssistantSnapshot,
    transcription: TranscriptionSession,
    /// Epoch of the transcription session whose events are acted upon
    listening_epoch: Option<u64>,
    generation_context: GenerationContext,
    generation: Option<ActiveGeneration>,
    next_generation_id: u64,
    credentials: Arc<dyn CredentialsProvider>,
    conversations: ConversationStore,
    widgets: WidgetCache,
    compiler: Option<Arc<dyn ArtifactCompiler>>,
    inbox_tx: mpsc::UnboundedSender<Signal>,
    inbox_rx: mpsc::UnboundedReceiver<Signal>,
    events: EventBus<AssistantEvent>,
    _transcription_events: Subscription,
}

impl Assistant {
    pub fn new(deps: AssistantDeps) -> Result<Self> {
        let conversations = ConversationStore::open(Arc::clone(&deps.store))?;
        let widgets = WidgetCache::new(Arc::clone(&deps.store));

        let transcription = TranscriptionSession::new(
            deps.capture,
            deps.connector,
            Arc::clone(&deps.credentials),
            deps.session,
        );

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let transcription_events = transcription
            .events()
            .forward_with(inbox_tx.clone(), Signal::Transcription);

        let state = AssistantSnapshot {
            current_component: conversations
                .current_entry()
                .map(|entry| entry.component.clone()),
            ..Default::default()
        };

        Ok(Self {
            state,
            transcription,
            listening_epoch: None,
            generation_context: GenerationContext {
                endpoint: deps.completion,
                credentials: Arc::clone(&deps.credentials),
                examples: deps.examples,
                options: deps.generation,
            },
            generation: None,
            next_generation_id: 1,
            credentials: deps.credentials,
            conversations,
            widgets,
            compiler: deps.compiler,
            inbox_tx,
            inbox_rx,
            events: EventBus::new(),
            _transcription_events: transcription_events,
        })
    }

    pub fn events(&self) -> &EventBus<AssistantEvent> {
        &self.events
    }

    pub fn snapshot(&self) -> &AssistantSnapshot {
        &self.state
    }

    pub fn status(&self) -> AssistantStatus {
        self.state.status
    }

    pub fn mode(&self) -> InputMode {
        self.state.mode
    }

    pub fn transcription(&self) -> &TranscriptionSession {
        &self.transcription
    }

    /// A generation is streaming
    pub fn is_generating(&self) -> bool {
        self.generation.is_some()
    }

    pub fn widgets(&self) -> &WidgetCache {
        &self.widgets
    }

    fn transition(&mut self, trigger: Trigger) -> Result<()> {
        let from = self.state.status;
        let to = from.apply(trigger).inspect_err(|e| tracing::warn!("{}", e))?;
        if from != to {
            tracing::info!("Assistant {} -> {}", from, to);
            self.state.status = to;
            self.events.emit(&AssistantEvent::StatusChanged { from, to });
        }
        Ok(())
    }

    fn set_volume(&mut self, level: f32) {
        self.state.volume = level;
        self.events.emit(&AssistantEvent::Volume(level));
    }

    // ========================================================================
    // Voice
    // ========================================================================

    /// Begin capturing an utterance. The status only moves to `Listening`
    /// once the transcription session is up; setup failures go straight to
    /// `Error` and are returned.
    pub async fn start_recording(&mut self) -> Result<()> {
        self.state.status.apply(Trigger::StartRecording)?;
        let opened = match self.credentials.api_keys().require_primary() {
            Ok(_) => self.open_transcription().await,
            Err(e) => Err(e),
        };
        if let Err(e) = opened {
            self.fail(e.clone());
            return Err(e);
        }
        Ok(())
    }

    /// Stop capturing; the final transcript is still awaited
    pub fn stop_recording(&mut self) -> Result<()> {
        if self.state.status != AssistantStatus::Listening {
            tracing::debug!("stop_recording ignored while {}", self.state.status);
            return Ok(());
        }
        self.transcription.stop();
        self.transition(Trigger::CaptureStopped)
    }

    /// Start a transcription session for the current listening turn and
    /// enter `Listening` if not already there.
    ///
    /// Setup failures are already queued when `start` returns; the one for
    /// this session is returned and anything else queued is applied.
    async fn open_transcription(&mut self) -> Result<()> {
        self.state.transcript.clear();
        self.state.partial_transcript.clear();

        let expected = self.transcription.epoch() + 1;
        self.listening_epoch = Some(expected);

        if let Some(handle) = self.transcription.start(StartOptions::default()).await {
            self.listening_epoch = Some(handle.epoch);
            if self.state.status != AssistantStatus::Listening {
                self.transition(Trigger::StartRecording)?;
            }
            return Ok(());
        }

        self.listening_epoch = None;
        let mut setup_error = None;
        while let Ok(signal) = self.inbox_rx.try_recv() {
            match signal {
                Signal::Transcription(TranscriptionEvent::Error { epoch, error })
                    if epoch == expected =>
                {
                    setup_error = Some(error);
                }
                signal => {
                    let _ = self.handle_signal(signal);
                }
            }
        }
        Err(setup_error.unwrap_or_else(|| {
            VoxError::Init("transcription session could not be started".to_string())
        }))
    }

    // ========================================================================
    // Text input
    // ========================================================================

    /// Generate from typed text instead of speech
    pub fn submit_text(&mut self, text: &str) -> Result<()> {
        self.state.status.apply(Trigger::SubmitText)?;
        let analysis = Analysis::from_text(text, self.state.current_component.as_ref())?;
        self.transition(Trigger::SubmitText)?;

        self.state.transcript = analysis.transcription.clone();
        self.events
            .emit(&AssistantEvent::Transcript(self.state.transcript.clone()));
        self.begin_generation(analysis);
        Ok(())
    }

    // ========================================================================
    // Call mode
    // ========================================================================

    /// Enter continuous call mode and start listening
    pub async fn start_call(&mut self) -> Result<()> {
        if self.state.mode == InputMode::Call {
            return Ok(());
        }
        if self.state.status == AssistantStatus::Error {
            return Err(VoxError::invalid_transition(self.state.status, "start call"));
        }

        self.state.mode = InputMode::Call;
        self.state.call_start_time = Some(now_millis());
        self.events.emit(&AssistantEvent::ModeChanged(InputMode::Call));
        tracing::info!("Call started");

        if self.state.status == AssistantStatus::Idle {
            self.start_recording().await?;
        }
        Ok(())
    }

    /// Leave call mode. An utterance being captured is discarded; work that
    /// is already thinking or processing runs to completion.
    pub fn end_call(&mut self) {
        if self.state.mode != InputMode::Call {
            return;
        }
        self.reset_mode();
        tracing::info!("Call ended");

        if self.state.status == AssistantStatus::Listening {
            self.listening_epoch = None;
            self.transcription.cancel();
            self.state.partial_transcript.clear();
            self.set_volume(0.0);
            let _ = self.transition(Trigger::SessionEnded);
        }
    }

    fn reset_mode(&mut self) {
        self.state.mode = InputMode::Ptt;
        self.state.call_start_time = None;
        self.events.emit(&AssistantEvent::ModeChanged(InputMode::Ptt));
    }

    // ========================================================================
    // Cancellation and errors
    // ========================================================================

    /// Cancel whatever is live. Returns to `Listening` in call mode, else `Idle`.
    pub async fn abort(&mut self) {
        let resume = self.state.mode == InputMode::Call;
        tracing::info!("Assistant abort while {}", self.state.status);
        self.release_sessions();
        self.state.error = None;
        self.state.partial_transcript.clear();
        self.set_volume(0.0);

        if self.transition(Trigger::Abort { resume }).is_ok() && resume {
            if let Err(e) = self.open_transcription().await {
                self.fail(e);
            }
        }
    }

    /// Leave the `Error` state
    pub fn retry(&mut self) -> Result<()> {
        self.transition(Trigger::Retry)?;
        self.state.error = None;
        Ok(())
    }

    fn release_sessions(&mut self) {
        self.listening_epoch = None;
        self.transcription.cancel();
        if let Some(active) = self.generation.take() {
            active.session.abort();
        }
    }

    fn fail(&mut self, error: VoxError) {
        if error.is_abort() {
            tracing::debug!("Abort reported as error; ignored");
            return;
        }
        tracing::error!("Assistant error: {}", error);
        self.release_sessions();

        let message = error.user_message();
        self.state.error = Some(message.clone());
        self.state.partial_transcript.clear();
        self.set_volume(0.0);
        let _ = self.transition(Trigger::Fail);
        if self.state.mode == InputMode::Call {
            self.reset_mode();
            tracing::info!("Call ended by error");
        }
        self.events.emit(&AssistantEvent::Error(message));
    }

    /// Cancel everything; further events are ignored
    pub fn dispose(&mut self) {
        self.release_sessions();
    }

    // ========================================================================
    // Event processing
    // ========================================================================

    /// Wait for and apply one queued session event
    pub async fn process_next(&mut self) -> bool {
        let Some(signal) = self.inbox_rx.recv().await else {
            return false;
        };
        self.dispatch(signal).await;
        true
    }

    /// Apply every event queued so far without waiting
    pub async fn process_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(signal) = self.inbox_rx.try_recv() {
            self.dispatch(signal).await;
            count += 1;
        }
        count
    }

    /// Process events until `done` holds for the snapshot
    pub async fn run_until<F>(&mut self, mut done: F)
    where
        F: FnMut(&AssistantSnapshot) -> bool,
    {
        while !done(&self.state) {
            if !self.process_next().await {
                break;
            }
        }
    }

    async fn dispatch(&mut self, signal: Signal) {
        if self.handle_signal(signal) {
            if let Err(e) = self.open_transcription().await {
                self.fail(e);
            }
        }
    }

    /// Returns true when listening should resume (call mode)
    fn handle_signal(&mut self, signal: Signal) -> bool {
        match signal {
            Signal::Transcription(event) => {
                self.on_transcription(event);
                false
            }
            Signal::Generation { id, event } => {
                if self.generation.as_ref().map(|g| g.id) != Some(id) {
                    tracing::debug!("Ignoring event from stale generation {}", id);
                    return false;
                }
                self.on_generation(event)
            }
        }
    }

    fn is_listening_to(&self, epoch: u64) -> bool {
        let current = self.listening_epoch == Some(epoch);
        if !current {
            tracing::debug!("Ignoring event from stale transcription session {}", epoch);
        }
        current
    }

    fn on_transcription(&mut self, event: TranscriptionEvent) {
        match event {
            TranscriptionEvent::Volume(level) => self.set_volume(level),
            TranscriptionEvent::Started { epoch } | TranscriptionEvent::Ready { epoch } => {
                if self.is_listening_to(epoch) {
                    tracing::debug!("Transcription session {} is live", epoch);
                }
            }
            TranscriptionEvent::Partial { epoch, text } => {
                if self.is_listening_to(epoch) {
                    self.state.partial_transcript = text.clone();
                    self.events.emit(&AssistantEvent::PartialTranscript(text));
                }
            }
            TranscriptionEvent::Final { epoch, analysis } => {
                if self.is_listening_to(epoch) {
                    self.on_final(analysis);
                }
            }
            TranscriptionEvent::Error { epoch, error } => {
                if self.is_listening_to(epoch) {
                    self.listening_epoch = None;
                    match self.state.status {
                        AssistantStatus::Listening | AssistantStatus::Thinking => self.fail(error),
                        status => {
                            tracing::debug!("Transcription error while {}: {}", status, error)
                        }
                    }
                }
            }
            TranscriptionEvent::Stopped { epoch } => {
                if self.is_listening_to(epoch) {
                    self.listening_epoch = None;
                    if matches!(
                        self.state.status,
                        AssistantStatus::Listening | AssistantStatus::Thinking
                    ) {
                        tracing::info!("Transcription ended without a transcript");
                        let _ = self.transition(Trigger::SessionEnded);
                    }
                }
            }
        }
    }

    fn on_final(&mut self, analysis: Analysis) {
        self.listening_epoch = None;
        if self.state.status == AssistantStatus::Listening
            && self.transition(Trigger::CaptureStopped).is_err()
        {
            return;
        }
        if self.state.status != AssistantStatus::Thinking {
            tracing::warn!("Final transcript ignored while {}", self.state.status);
            return;
        }

        self.state.transcript = analysis.transcription.clone();
        self.state.partial_transcript.clear();
        self.events
            .emit(&AssistantEvent::Transcript(self.state.transcript.clone()));
        self.begin_generation(analysis);
    }

    fn begin_generation(&mut self, analysis: Analysis) {
        if self.transition(Trigger::TranscriptReady).is_err() {
            return;
        }
        self.state.response_stream.clear();

        let Ok(runtime) = Handle::try_current() else {
            self.fail(VoxError::Init("no async runtime for generation".to_string()));
            return;
        };

        let id = self.next_generation_id;
        self.next_generation_id += 1;

        let transcript = analysis.transcription.clone();
        let previous = self.state.current_component.clone();
        let session = Arc::new(GenerationSession::new(
            self.generation_context.clone(),
            analysis,
            previous,
        ));
        let events = session
            .events()
            .forward_with(self.inbox_tx.clone(), move |event| Signal::Generation {
                id,
                event,
            });

        let runner = Arc::clone(&session);
        runtime.spawn(async move {
            runner.start().await;
        });

        tracing::debug!("Generation {} started", id);
        self.generation = Some(ActiveGeneration {
            id,
            session,
            transcript,
            _events: events,
        });
    }

    fn on_generation(&mut self, event: GenerationEvent) -> bool {
        match event {
            GenerationEvent::Started => false,
            GenerationEvent::Progress(chunk) => {
                self.state.response_stream.push_str(&chunk);
                self.events.emit(&AssistantEvent::ResponseDelta(chunk));
                false
            }
            GenerationEvent::Completed(result) => self.on_generation_complete(result),
            GenerationEvent::Failed(error) => {
                self.generation = None;
                self.fail(error);
                false
            }
            GenerationEvent::Aborted => {
                self.generation = None;
                false
            }
        }
    }

    fn on_generation_complete(&mut self, result: GenerationResult) -> bool {
        let Some(active) = self.generation.take() else {
            return false;
        };

        if let Some(compiler) = &self.compiler {
            if let Err(e) = compiler.compile(&result.code) {
                self.fail(e);
                return false;
            }
        }

        let entry = match self.conversations.append(&result, &active.transcript) {
            Ok(entry) => entry,
            Err(e) => {
                self.fail(e);
                return false;
            }
        };
        if let Err(e) = self.widgets.put(&result) {
            tracing::warn!("Failed to cache widget {}: {}", result.widget_url, e);
        }

        self.state.current_component = Some(result.component());
        self.events.emit(&AssistantEvent::Completed(entry));
        self.events.emit(&AssistantEvent::HistoryChanged);

        let resume = self.state.mode == InputMode::Call;
        self.transition(Trigger::GenerationDone { resume }).is_ok() && resume
    }

    // ========================================================================
    // Conversations
    // ========================================================================

    /// History is appended to the active conversation, so it only changes
    /// while no turn is in flight
    fn ensure_settled(&self, action: &str) -> Result<()> {
        match self.state.status {
            AssistantStatus::Thinking | AssistantStatus::Processing => {
                Err(VoxError::invalid_transition(self.state.status, action))
            }
            _ => Ok(()),
        }
    }

    fn sync_current_component(&mut self) {
        self.state.current_component = self
            .conversations
            .current_entry()
            .map(|entry| entry.component.clone());
        self.events.emit(&AssistantEvent::HistoryChanged);
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.conversations.active()
    }

    pub fn list_conversations(&self) -> Vec<Conversation> {
        self.conversations.list()
    }

    pub fn history(&self) -> &ConversationHistory {
        self.conversations.history()
    }

    pub fn current_entry(&self) -> Option<&HistoryEntry> {
        self.conversations.current_entry()
    }

    pub fn new_conversation(&mut self) -> Result<Conversation> {
        self.ensure_settled("new conversation")?;
        let conversation = self.conversations.new_conversation()?;
        self.sync_current_component();
        Ok(conversation)
    }

    pub fn switch_conversation(&mut self, id: &str) -> Result<()> {
        self.ensure_settled("switch conversation")?;
        self.conversations.switch(id)?;
        self.sync_current_component();
        Ok(())
    }

    pub fn delete_conversation(&mut self, id: &str) -> Result<()> {
        self.ensure_settled("delete conversation")?;
        self.conversations.delete(id)?;
        self.sync_current_component();
        Ok(())
    }

    pub fn rename_conversation(&mut self, id: &str, title: &str) -> Result<()> {
        self.conversations.rename(id, title)
    }

    pub fn navigate_to(&mut self, index: usize) -> Result<Option<HistoryEntry>> {
        self.ensure_settled("navigate history")?;
        let entry = self.conversations.navigate_to(index)?;
        if entry.is_some() {
            self.sync_current_component();
        }
        Ok(entry)
    }

    pub fn go_back(&mut self) -> Result<Option<HistoryEntry>> {
        self.ensure_settled("navigate history")?;
        let entry = self.conversations.go_back()?;
        if entry.is_some() {
            self.sync_current_component();
        }
        Ok(entry)
    }

    pub fn go_forward(&mut self) -> Result<Option<HistoryEntry>> {
        self.ensure_settled("navigate history")?;
        let entry = self.conversations.go_forward()?;
        if entry.is_some() {
            self.sync_current_component();
        }
        Ok(entry)
    }
}

impl Drop for Assistant {
    fn drop(&mut self) {
        self.dispose();
    }
}
