//! Capture through sox's `rec`, streaming raw PCM on stdout.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use async_trait::async_trait;

use super::{AudioCaptureSource, CaptureConfig, FrameGate, FrameListener, RawAudioFrame};
use crate::error::{Result, VoxError};
use crate::events::Subscription;

/// Default capture program
pub const DEFAULT_CAPTURE_PROGRAM: &str = "rec";

struct SoxState {
    config: Option<CaptureConfig>,
    process: Option<Child>,
}

/// Microphone capture backed by a `rec` child process
pub struct SoxCapture {
    program: String,
    state: Mutex<SoxState>,
    gate: Arc<FrameGate>,
}

impl SoxCapture {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            state: Mutex::new(SoxState {
                config: None,
                process: None,
            }),
            gate: Arc::new(FrameGate::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SoxState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn program_available(program: &str) -> bool {
        Command::new("which")
            .arg(program)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn spawn_process(&self, config: &CaptureConfig) -> Result<Child> {
        Command::new(&self.program)
            .args([
                "-q",
                "-t",
                "raw",
                "-r",
                &config.sample_rate.to_string(),
                "-c",
                &config.channels.to_string(),
                "-b",
                "16",
                "-e",
                "signed-integer",
                "-L", // little endian
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| VoxError::Init(format!("Failed to start {}: {}", self.program, e)))
    }
}

impl Default for SoxCapture {
    fn default() -> Self {
        Self::new(DEFAULT_CAPTURE_PROGRAM)
    }
}

#[async_trait]
impl AudioCaptureSource for SoxCapture {
    async fn request_permission(&self) -> bool {
        // sox triggers the OS microphone prompt itself; the best we can check
        // up front is that the program exists.
        let program = self.program.clone();
        tokio::task::spawn_blocking(move || Self::program_available(&program))
            .await
            .unwrap_or(false)
    }

    fn init(&self, config: &CaptureConfig) -> Result<()> {
        if config.sample_rate == 0 || config.channels == 0 || config.chunk_ms == 0 {
            return Err(VoxError::Init(format!(
                "Unsupported capture config: {}Hz, {}ch, {}ms",
                config.sample_rate, config.channels, config.chunk_ms
            )));
        }
        self.lock().config = Some(config.clone());
        Ok(())
    }

    fn start(&self) -> Result<()> {
        let mut state = self.lock();
        if state.process.is_some() {
            return Ok(());
        }
        let config = state
            .config
            .clone()
            .ok_or_else(|| VoxError::Init("capture started before init".to_string()))?;

        let mut child = self.spawn_process(&config)?;
        let Some(mut stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(VoxError::Init("capture process has no stdout".to_string()));
        };

        let cycle = self.gate.open();
        let gate = Arc::clone(&self.gate);
        let chunk_bytes = config.chunk_bytes();
        thread::spawn(move || {
            let mut buf = vec![0u8; chunk_bytes];
            loop {
                match stdout.read_exact(&mut buf) {
                    Ok(()) => {
                        let frame =
                            RawAudioFrame::new(buf.clone(), config.sample_rate, config.channels);
                        if !gate.deliver(cycle, &frame) {
                            break;
                        }
                    }
                    Err(e) => {
                        if gate.current() == Some(cycle) {
                            tracing::warn!("Capture stream ended: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        tracing::debug!(
            "Capture started: {} ({}Hz, {}ch)",
            self.program,
            config.sample_rate,
            config.channels
        );
        state.process = Some(child);
        Ok(())
    }

    fn stop(&self) {
        self.gate.close();
        let process = self.lock().process.take();
        if let Some(mut process) = process {
            let _ = process.kill();
            let _ = process.wait();
            tracing::debug!("Capture stopped");
        }
    }

    fn on_data(&self, listener: FrameListener) -> Subscription {
        self.gate.subscribe(listener)
    }

    fn config(&self) -> CaptureConfig {
        self.lock().config.clone().unwrap_or_default()
    }
}

impl Drop for SoxCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
