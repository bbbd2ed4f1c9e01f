//! Artifact compile hook.

use crate::error::{Result, VoxError};

/// A generated artifact accepted by the compiler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    pub source: String,
    /// Name of the entry-point factory
    pub entry_point: String,
}

/// Turns extracted source text into something runnable.
///
/// Invoked only after code-block extraction and signature validation
/// succeeded. A rejection is reported as [`VoxError::Compile`].
pub trait ArtifactCompiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<CompiledArtifact>;
}

/// Structural check used when no real sandbox is wired in: brackets must
/// balance in code and JSX elements must nest. Quotes only delimit strings
/// in code and inside tags; in JSX text they are ordinary characters.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyntaxCheckCompiler;

impl ArtifactCompiler for SyntaxCheckCompiler {
    fn compile(&self, source: &str) -> Result<CompiledArtifact> {
        check_structure(source).map_err(VoxError::Compile)?;
        Ok(CompiledArtifact {
            source: source.to_string(),
            entry_point: "Component".to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    /// Bracket opened in code
    Open(char),
    /// Inside `<tag ...>`
    Tag,
    /// Between an opening and a closing tag
    Children,
}

type Check<T> = std::result::Result<T, String>;

fn check_structure(source: &str) -> Check<()> {
    let chars: Vec<char> = source.chars().collect();
    let mut stack: Vec<Frame> = Vec::new();
    let mut line = 1usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }

        match stack.last().copied() {
            Some(Frame::Children) => match c {
                '{' => stack.push(Frame::Open('{')),
                '<' if next == Some('/') => {
                    i = skip_past(&chars, i, '>', &mut line)?;
                    stack.pop();
                    continue;
                }
                '<' => stack.push(Frame::Tag),
                _ => {}
            },
            Some(Frame::Tag) => match c {
                '"' | '\'' => {
                    i = skip_string(&chars, i, &mut line)?;
                    continue;
                }
                '{' => stack.push(Frame::Open('{')),
                '/' if next == Some('>') => {
                    stack.pop();
                    i += 2;
                    continue;
                }
                '>' => {
                    stack.pop();
                    stack.push(Frame::Children);
                }
                _ => {}
            },
            _ => match c {
                '"' | '\'' | '`' => {
                    i = skip_string(&chars, i, &mut line)?;
                    continue;
                }
                '/' if next == Some('/') => {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                '/' if next == Some('*') => {
                    i = skip_block_comment(&chars, i, &mut line)?;
                    continue;
                }
                '<' if starts_element(&chars, i) => stack.push(Frame::Tag),
                '(' | '[' | '{' => stack.push(Frame::Open(c)),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(Frame::Open(expected)) {
                        return Err(format!("unexpected '{}' on line {}", c, line));
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }

    match stack.last() {
        None => Ok(()),
        Some(Frame::Open(open)) => Err(format!("unclosed '{}'", open)),
        Some(Frame::Tag) => Err("unterminated JSX tag".to_string()),
        Some(Frame::Children) => Err("unclosed JSX element".to_string()),
    }
}

/// `<` opens an element when followed by a name or `>` in expression position
fn starts_element(chars: &[char], i: usize) -> bool {
    match chars.get(i + 1) {
        Some(c) if c.is_alphabetic() || *c == '>' => {}
        _ => return false,
    }

    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '$';
    let mut j = i;
    while j > 0 && chars[j - 1].is_whitespace() {
        j -= 1;
    }
    if j == 0 {
        return true;
    }

    let prev = chars[j - 1];
    if is_ident(prev) {
        let end = j;
        while j > 0 && is_ident(chars[j - 1]) {
            j -= 1;
        }
        return chars[j..end].iter().collect::<String>() == "return";
    }
    matches!(
        prev,
        '(' | ',' | '=' | ':' | '?' | '{' | '[' | '!' | '&' | '|' | ';' | '>'
    )
}

/// Index just past the closing quote of the string starting at `start`
fn skip_string(chars: &[char], start: usize, line: &mut usize) -> Check<usize> {
    let quote = chars[start];
    let opened_on = *line;
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '\n' if quote != '`' => break,
            '\n' => *line += 1,
            c if c == quote => return Ok(i + 1),
            _ => {}
        }
        i += 1;
    }
    Err(format!("unterminated string on line {}", opened_on))
}

fn skip_block_comment(chars: &[char], start: usize, line: &mut usize) -> Check<usize> {
    let mut i = start + 2;
    while i < chars.len() {
        if chars[i] == '\n' {
            *line += 1;
        }
        if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
            return Ok(i + 2);
        }
        i += 1;
    }
    Err("unterminated block comment".to_string())
}

/// Index just past the next `end`
fn skip_past(chars: &[char], start: usize, end: char, line: &mut usize) -> Check<usize> {
    let mut i = start;
    while i < chars.len() {
        if chars[i] == '\n' {
            *line += 1;
        }
        if chars[i] == end {
            return Ok(i + 1);
        }
        i += 1;
    }
    Err(format!("unterminated closing tag on line {}", line))
}
