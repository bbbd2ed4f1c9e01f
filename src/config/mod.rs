//! Configuration loading and management

mod io;
mod settings;


pub use io::write_atomic;
pub use settings::{
    CaptureSettings, CredentialSettings, DEFAULT_MODEL, GenerationSettings, StorageSettings,
    TranscriptionSettings,
};

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::audio::CaptureConfig;
use crate::transcription::SessionSettings;

/// Main configuration structure (`~/.voxgen/config.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Streaming transcription backend
    #[serde(default)]
    pub transcription: TranscriptionSettings,

    /// Code generation backend
    #[serde(default)]
    pub generation: GenerationSettings,

    /// API keys (environment variables take precedence)
    #[serde(default)]
    pub credentials: CredentialSettings,

    /// Conversation persistence
    #[serde(default)]
    pub storage: StorageSettings,

    /// Microphone capture
    #[serde(default)]
    pub capture: CaptureSettings,
}

impl Config {
    /// Directory holding conversations and the widget cache
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::global_config_dir().join("data"))
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.transcription.sample_rate,
            channels: self.transcription.channels,
            chunk_ms: self.capture.chunk_ms,
        }
    }

    /// Runtime settings for a transcription session
    pub fn session_settings(&self) -> SessionSettings {
        let t = &self.transcription;
        SessionSettings {
            language: t.language.clone(),
            capture: self.capture_config(),
            final_timeout: std::time::Duration::from_millis(t.final_timeout_ms),
            partial_interval: std::time::Duration::from_millis(t.partial_interval_ms),
            max_buffered_ms: t.max_buffered_ms,
            system_prompt: t.system_prompt.clone(),
        }
    }
}
