//! Config file sections

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transcription::DEFAULT_SYSTEM_PROMPT;

/// Model used when the config does not name one
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

/// Streaming transcription settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSettings {
    /// Endpoint that creates a streaming session and returns its join URL
    #[serde(default = "default_session_url")]
    pub session_url: String,

    /// Language hint (en, de, fr, ...)
    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Grace period after stop while waiting for the final transcript
    #[serde(default = "default_final_timeout_ms")]
    pub final_timeout_ms: u64,

    /// Minimum spacing between partial transcript notifications
    #[serde(default = "default_partial_interval_ms")]
    pub partial_interval_ms: u64,

    /// Audio kept while the backend is not ready yet (oldest dropped first)
    #[serde(default = "default_max_buffered_ms")]
    pub max_buffered_ms: u64,

    /// Priming prompt sent with every session
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_session_url() -> String {
    "https://api.ultravox.ai/api/calls".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_sample_rate() -> u32 {
    crate::audio::DEFAULT_SAMPLE_RATE
}

fn default_channels() -> u16 {
    1
}

fn default_final_timeout_ms() -> u64 {
    5000
}

fn default_partial_interval_ms() -> u64 {
    250
}

fn default_max_buffered_ms() -> u64 {
    5000
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            session_url: default_session_url(),
            language: default_language(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            final_timeout_ms: default_final_timeout_ms(),
            partial_interval_ms: default_partial_interval_ms(),
            max_buffered_ms: default_max_buffered_ms(),
            system_prompt: default_system_prompt(),
        }
    }
}

/// Code generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Server-sent-events completion endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1/chat/completions".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// API keys; `VOXGEN_PRIMARY_KEY` / `VOXGEN_SECONDARY_KEY` override these
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialSettings {
    /// Transcription backend key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,

    /// Completion backend key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_key: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Defaults to ~/.voxgen/data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Microphone capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureSettings {
    /// sox recorder binary
    #[serde(default = "default_capture_program")]
    pub program: String,

    /// Frame length in milliseconds
    #[serde(default = "default_chunk_ms")]
    pub chunk_ms: u32,
}

fn default_capture_program() -> String {
    crate::audio::DEFAULT_CAPTURE_PROGRAM.to_string()
}

fn default_chunk_ms() -> u32 {
    100
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            program: default_capture_program(),
            chunk_ms: default_chunk_ms(),
        }
    }
}
