//! Hand-driven capture source for tests and demos.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{AudioCaptureSource, CaptureConfig, FrameGate, FrameListener, RawAudioFrame};
use crate::error::{Result, VoxError};
use crate::events::Subscription;

/// Capture source whose frames are pushed by the caller
pub struct ScriptedCapture {
    permission: AtomicBool,
    init_error: Mutex<Option<String>>,
    config: Mutex<CaptureConfig>,
    gate: Arc<FrameGate>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self {
            permission: AtomicBool::new(true),
            init_error: Mutex::new(None),
            config: Mutex::new(CaptureConfig::default()),
            gate: Arc::new(FrameGate::default()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn deny_permission(&self) {
        self.permission.store(false, Ordering::SeqCst);
    }

    pub fn fail_init(&self, message: impl Into<String>) {
        *self.init_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.into());
    }

    /// Deliver a frame; returns false when capture is not running
    pub fn push(&self, frame: RawAudioFrame) -> bool {
        match self.gate.current() {
            Some(cycle) => self.gate.deliver(cycle, &frame),
            None => false,
        }
    }

    /// Deliver raw PCM bytes at the configured format
    pub fn push_pcm(&self, pcm: Vec<u8>) -> bool {
        let config = self.config();
        self.push(RawAudioFrame::new(pcm, config.sample_rate, config.channels))
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_open()
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedCapture {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioCaptureSource for ScriptedCapture {
    async fn request_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    fn init(&self, config: &CaptureConfig) -> Result<()> {
        if let Some(message) = self
            .init_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        {
            return Err(VoxError::Init(message));
        }
        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = config.clone();
        Ok(())
    }

    fn start(&self) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.gate.open();
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.gate.close();
    }

    fn on_data(&self, listener: FrameListener) -> Subscription {
        self.gate.subscribe(listener)
    }

    fn config(&self) -> CaptureConfig {
        self.config.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
