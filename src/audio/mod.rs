//! Microphone capture.
//!
//! Capture sources deliver [`RawAudioFrame`]s (little-endian 16-bit PCM) to
//! listeners registered through [`AudioCaptureSource::on_data`]. After
//! `stop()` returns, no listener is invoked again until the next `start()`.
//!
//! Implementations:
//! - [`SoxCapture`]: streams raw PCM from the `rec` program (sox)
//! - [`ScriptedCapture`]: frames pushed by hand, for tests and demos

mod scripted;
mod sox;


use std::sync::{RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::Result;
use crate::events::{EventBus, Listener, Subscription};

pub use scripted::ScriptedCapture;
pub use sox::{DEFAULT_CAPTURE_PROGRAM, SoxCapture};

/// Sample rate expected by the transcription backend
pub const DEFAULT_SAMPLE_RATE: u32 = 16_000;

/// Capture parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Length of each delivered frame
    pub chunk_ms: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            chunk_ms: 100,
        }
    }
}

impl CaptureConfig {
    /// Bytes of PCM per millisecond of audio
    pub fn bytes_per_ms(&self) -> usize {
        (self.sample_rate as usize * self.channels as usize * 2) / 1000
    }

    pub fn chunk_bytes(&self) -> usize {
        (self.bytes_per_ms() * self.chunk_ms as usize).max(2)
    }
}

/// One block of captured audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAudioFrame {
    /// Interleaved little-endian i16 samples
    pub pcm: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl RawAudioFrame {
    pub fn new(pcm: Vec<u8>, sample_rate: u32, channels: u16) -> Self {
        Self {
            pcm,
            sample_rate,
            channels,
        }
    }

    pub fn from_samples(samples: &[i16], sample_rate: u32, channels: u16) -> Self {
        let pcm = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Self::new(pcm, sample_rate, channels)
    }

    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.pcm
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
    }

    /// Normalized level in `[0, 1]`
    pub fn volume(&self) -> f32 {
        volume_level(&self.pcm)
    }

    pub fn duration_ms(&self) -> u64 {
        let per_second = self.sample_rate as u64 * self.channels.max(1) as u64 * 2;
        if per_second == 0 {
            return 0;
        }
        self.pcm.len() as u64 * 1000 / per_second
    }
}

/// Mean absolute sample magnitude divided by the largest representable magnitude
pub fn volume_level(pcm: &[u8]) -> f32 {
    let mut count = 0u64;
    let mut sum = 0u64;
    for b in pcm.chunks_exact(2) {
        sum += i16::from_le_bytes([b[0], b[1]]).unsigned_abs() as u64;
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    let mean = sum as f64 / count as f64;
    (mean / 32768.0).clamp(0.0, 1.0) as f32
}

/// Listener type for captured frames
pub type FrameListener = Listener<RawAudioFrame>;

/// Platform microphone capture
#[async_trait]
pub trait AudioCaptureSource: Send + Sync {
    /// Ask for (or check) microphone access
    async fn request_permission(&self) -> bool;

    /// Configure the device; safe to call again with the same config
    fn init(&self, config: &CaptureConfig) -> Result<()>;

    /// Begin delivering frames
    fn start(&self) -> Result<()>;

    /// Stop delivering frames; idempotent
    fn stop(&self);

    /// Register a frame listener
    fn on_data(&self, listener: FrameListener) -> Subscription;

    /// Configuration in effect after `init`
    fn config(&self) -> CaptureConfig;
}

/// Delivery gate shared by capture implementations.
///
/// Every `open()` starts a new capture cycle and hands out its id; readers
/// deliver with the id they were started with, so frames still draining from
/// an earlier cycle are dropped. Delivery holds the cycle lock for reading,
/// which makes `close()` wait for a frame that is being emitted. Listeners
/// must not stop the capture from inside the callback.
#[derive(Default)]
pub(crate) struct FrameGate {
    cycle: RwLock<Option<u64>>,
    next_cycle: AtomicU64,
    bus: EventBus<RawAudioFrame>,
}

impl FrameGate {
    fn read(&self) -> RwLockReadGuard<'_, Option<u64>> {
        self.cycle.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new cycle; returns its id
    pub(crate) fn open(&self) -> u64 {
        let id = self.next_cycle.fetch_add(1, Ordering::SeqCst) + 1;
        *self.cycle.write().unwrap_or_else(|e| e.into_inner()) = Some(id);
        id
    }

    /// Returns once no delivery is in flight
    pub(crate) fn close(&self) {
        *self.cycle.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.read().is_some()
    }

    pub(crate) fn current(&self) -> Option<u64> {
        *self.read()
    }

    pub(crate) fn subscribe(&self, listener: FrameListener) -> Subscription {
        self.bus.subscribe_shared(listener)
    }

    /// Deliver a frame read during `cycle`; returns false when it was dropped
    pub(crate) fn deliver(&self, cycle: u64, frame: &RawAudioFrame) -> bool {
        let guard = self.read();
        if *guard != Some(cycle) {
            return false;
        }
        self.bus.emit(frame);
        drop(guard);
        true
    }
}
