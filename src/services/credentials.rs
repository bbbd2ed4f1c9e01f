//! API keys and model/language selection.

use std::sync::{Mutex, MutexGuard};

use crate::config::Config;
use crate::error::{Result, VoxError};

pub const PRIMARY_KEY_ENV: &str = "VOXGEN_PRIMARY_KEY";
pub const SECONDARY_KEY_ENV: &str = "VOXGEN_SECONDARY_KEY";

/// Keys for the transcription (primary) and completion (secondary) backends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiKeys {
    pub primary: Option<String>,
    pub secondary: Option<String>,
}

impl ApiKeys {
    /// Transcription key; blank counts as missing
    pub fn require_primary(&self) -> Result<String> {
        non_blank(self.primary.as_deref())
            .ok_or_else(|| VoxError::Credentials("transcription API key is not set".to_string()))
    }

    /// Completion key; blank counts as missing
    pub fn require_secondary(&self) -> Result<String> {
        non_blank(self.secondary.as_deref())
            .ok_or_else(|| VoxError::Credentials("completion API key is not set".to_string()))
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Settings collaborator.
///
/// Keys are read lazily at the point they are needed, so a missing key only
/// fails the operation that requires it.
pub trait CredentialsProvider: Send + Sync {
    fn api_keys(&self) -> ApiKeys;
    fn selected_model(&self) -> String;
    fn selected_language(&self) -> String;
}

/// Fixed credentials, mutable at runtime (tests, embedding)
pub struct StaticCredentials {
    inner: Mutex<(ApiKeys, String, String)>,
}

impl StaticCredentials {
    pub fn new(keys: ApiKeys, model: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new((keys, model.into(), language.into())),
        }
    }

    /// Both keys present, default model and English
    pub fn with_keys(primary: &str, secondary: &str) -> Self {
        Self::new(
            ApiKeys {
                primary: Some(primary.to_string()),
                secondary: Some(secondary.to_string()),
            },
            crate::config::DEFAULT_MODEL,
            "en",
        )
    }

    /// No keys at all
    pub fn missing() -> Self {
        Self::new(ApiKeys::default(), crate::config::DEFAULT_MODEL, "en")
    }

    pub fn set_keys(&self, keys: ApiKeys) {
        self.lock().0 = keys;
    }

    fn lock(&self) -> MutexGuard<'_, (ApiKeys, String, String)> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialsProvider for StaticCredentials {
    fn api_keys(&self) -> ApiKeys {
        self.lock().0.clone()
    }

    fn selected_model(&self) -> String {
        self.lock().1.clone()
    }

    fn selected_language(&self) -> String {
        self.lock().2.clone()
    }
}

/// Credentials resolved from the config file, with environment overrides
#[derive(Debug, Clone)]
pub struct ConfigCredentials {
    keys: ApiKeys,
    model: String,
    language: String,
}

impl ConfigCredentials {
    pub fn from_config(config: &Config) -> Self {
        let primary = std::env::var(PRIMARY_KEY_ENV)
            .ok()
            .or_else(|| config.credentials.primary_key.clone());
        let secondary = std::env::var(SECONDARY_KEY_ENV)
            .ok()
            .or_else(|| config.credentials.secondary_key.clone());

        Self {
            keys: ApiKeys { primary, secondary },
            model: config.generation.model.clone(),
            language: config.transcription.language.clone(),
        }
    }
}

impl CredentialsProvider for ConfigCredentials {
    fn api_keys(&self) -> ApiKeys {
        self.keys.clone()
    }

    fn selected_model(&self) -> String {
        self.model.clone()
    }

    fn selected_language(&self) -> String {
        self.language.clone()
    }
}
