//! Code block extraction and artifact validation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, VoxError};

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```[A-Za-z0-9_+.-]*[^\S\n]*\n?([\s\S]*?)```").expect("valid code block regex")
});

/// `function Component()`, `function Component(props)` or
/// `function Component({ a, b })`, optionally exported
static ENTRY_POINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:export\s+(?:default\s+)?)?function\s+Component\s*\(\s*(?:[A-Za-z_$][\w$]*|\{[^{}]*\})?\s*\)",
    )
    .expect("valid entry point regex")
});

/// Contents of the first fenced code block, trimmed
pub fn extract_code_block(response: &str) -> Result<String> {
    let code = CODE_BLOCK
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .ok_or(VoxError::NoCodeBlock)?;

    if code.is_empty() {
        return Err(VoxError::NoCodeBlock);
    }
    Ok(code.to_string())
}

/// The source must open with a single `Component` factory of arity 0 or 1
pub fn validate_artifact(code: &str) -> Result<()> {
    if ENTRY_POINT.is_match(code) {
        return Ok(());
    }
    let first_line = code.lines().next().unwrap_or_default();
    Err(VoxError::InvalidArtifactFormat(format!(
        "expected `function Component(props)`, found `{}`",
        first_line.trim()
    )))
}

/// Extract then validate
pub fn extract_artifact(response: &str) -> Result<String> {
    let code = extract_code_block(response)?;
    validate_artifact(&code)?;
    Ok(code)
}
