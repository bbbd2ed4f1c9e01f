//! Fragment accumulator with partial and final reads.

use serde_json::{Map, Value};

use super::partial::{parse_partial, strip_code_fence};
use crate::error::{Result, VoxError};

/// Field that must be present in every finalized transcript
pub const TRANSCRIPTION_FIELD: &str = "transcription";

/// Accumulates streamed text fragments of one JSON object.
///
/// Purely in-memory; no I/O and no side effects.
#[derive(Debug, Clone, Default)]
pub struct IncrementalJsonAssembler {
    buffer: String,
}

impl IncrementalJsonAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a delta fragment verbatim
    pub fn append(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
    }

    /// Replace the buffer with a full snapshot (full-text transport style)
    pub fn replace(&mut self, text: &str) {
        self.buffer.clear();
        self.buffer.push_str(text);
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Best-effort read of a string field from the unfinished document.
    ///
    /// Only parses when the buffer already mentions the quoted key, so most
    /// fragments cost a substring scan. Parse failures yield `None`.
    pub fn try_extract_partial_field(&self, name: &str) -> Option<String> {
        let key = format!("\"{}\"", name);
        if !self.buffer.contains(&key) {
            return None;
        }

        let cleaned = strip_code_fence(&self.buffer);
        match parse_partial(cleaned)? {
            Value::Object(map) => match map.get(name) {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    /// Strictly parse the accumulated document.
    ///
    /// The object must carry a non-empty `transcription` string.
    pub fn finalize(&self) -> Result<Map<String, Value>> {
        let cleaned = strip_code_fence(&self.buffer);
        if cleaned.is_empty() {
            return Err(VoxError::Parse("transcript is empty".to_string()));
        }

        let value: Value = serde_json::from_str(cleaned)?;
        let Value::Object(map) = value else {
            return Err(VoxError::Parse("transcript is not a JSON object".to_string()));
        };

        match map.get(TRANSCRIPTION_FIELD) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(map),
            _ => Err(VoxError::MissingField(TRANSCRIPTION_FIELD.to_string())),
        }
    }
}
