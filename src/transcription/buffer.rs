//! Outbound audio held back until the backend is ready.

use std::collections::VecDeque;

/// Bounded FIFO of PCM frames.
///
/// Grows only until [`drain`](FrameBuffer::drain) is called; after that it
/// is bypassed for the rest of the session. When the byte bound is exceeded
/// the oldest frames are dropped, but the newest frame is always kept.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    frames: VecDeque<Vec<u8>>,
    bytes: usize,
    max_bytes: usize,
    bypassed: bool,
    dropped: usize,
}

impl FrameBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            bytes: 0,
            max_bytes,
            bypassed: false,
            dropped: 0,
        }
    }

    /// Queue a frame; returns how many old frames were evicted to fit it
    pub fn push(&mut self, frame: Vec<u8>) -> usize {
        if self.bypassed {
            tracing::debug!("Frame pushed after drain; discarding");
            return 0;
        }

        self.bytes += frame.len();
        self.frames.push_back(frame);

        let mut evicted = 0;
        while self.bytes > self.max_bytes && self.frames.len() > 1 {
            if let Some(old) = self.frames.pop_front() {
                self.bytes -= old.len();
                evicted += 1;
            }
        }
        self.dropped += evicted;
        evicted
    }

    /// Take every queued frame in capture order and bypass the buffer
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.bypassed = true;
        self.bytes = 0;
        self.frames.drain(..).collect()
    }

    /// Empty and re-arm for a new session
    pub fn reset(&mut self, max_bytes: usize) {
        self.frames.clear();
        self.bytes = 0;
        self.max_bytes = max_bytes;
        self.bypassed = false;
        self.dropped = 0;
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Frames evicted since the last reset
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }
}
