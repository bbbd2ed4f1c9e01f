//! Tolerant JSON parsing for text that may stop mid-document.
//!
//! The parser walks the input once and, when it runs out of text, closes
//! whatever is still open: a truncated string keeps the characters seen so
//! far, a truncated object keeps every complete member, and a member whose
//! key or value never started is dropped. Input that is malformed (rather
//! than merely unfinished) yields `None`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Number, Value};

static LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*```[A-Za-z0-9_+.-]*[^\S\n]*\n?").expect("valid fence regex"));
static TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n?[^\S\n]*```\s*$").expect("valid fence regex"));

/// Strip a surrounding markdown code fence (optionally language-tagged).
///
/// A missing closing fence is fine: streamed text usually ends before it.
pub fn strip_code_fence(text: &str) -> &str {
    let start = LEADING_FENCE.find(text).map(|m| m.end()).unwrap_or(0);
    let body = &text[start..];
    let end = TRAILING_FENCE
        .find(body)
        .map(|m| m.start())
        .unwrap_or(body.len());
    body[..end].trim()
}

/// Parse a possibly-truncated JSON document
pub fn parse_partial(input: &str) -> Option<Value> {
    let mut parser = PartialParser::new(input);
    parser.skip_ws();
    if parser.at_end() {
        return None;
    }
    let value = parser.parse_value().ok()??;
    parser.skip_ws();
    if parser.at_end() { Some(value) } else { None }
}

/// Marker for text that is not a prefix of any valid JSON document
struct Malformed;

type Step<T> = Result<Option<T>, Malformed>;

struct PartialParser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> PartialParser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    /// `Ok(None)` means the input ended before the value produced anything usable
    fn parse_value(&mut self) -> Step<Value> {
        self.skip_ws();
        match self.peek() {
            None => Ok(None),
            Some('{') => self.parse_object().map(|o| o.map(Value::Object)),
            Some('[') => self.parse_array().map(|a| a.map(Value::Array)),
            Some('"') => self.parse_string().map(|s| s.map(Value::String)),
            Some('t') => self.parse_literal("true", Value::Bool(true)),
            Some('f') => self.parse_literal("false", Value::Bool(false)),
            Some('n') => self.parse_literal("null", Value::Null),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            Some(_) => Err(Malformed),
        }
    }

    fn parse_object(&mut self) -> Step<Map<String, Value>> {
        self.bump();
        let mut map = Map::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Some(map)),
                Some('}') => {
                    self.bump();
                    return Ok(Some(map));
                }
                Some('"') => {}
                Some(_) => return Err(Malformed),
            }

            let key = match self.parse_string()? {
                Some(k) => k,
                None => return Ok(Some(map)),
            };

            self.skip_ws();
            match self.bump() {
                None => return Ok(Some(map)),
                Some(':') => {}
                Some(_) => return Err(Malformed),
            }

            match self.parse_value()? {
                Some(value) => {
                    map.insert(key, value);
                }
                None => return Ok(Some(map)),
            }

            self.skip_ws();
            match self.bump() {
                None => return Ok(Some(map)),
                Some(',') => continue,
                Some('}') => return Ok(Some(map)),
                Some(_) => return Err(Malformed),
            }
        }
    }

    fn parse_array(&mut self) -> Step<Vec<Value>> {
        self.bump();
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(Some(items)),
                Some(']') => {
                    self.bump();
                    return Ok(Some(items));
                }
                Some(_) => {}
            }

            match self.parse_value()? {
                Some(value) => items.push(value),
                None => return Ok(Some(items)),
            }

            self.skip_ws();
            match self.bump() {
                None => return Ok(Some(items)),
                Some(',') => continue,
                Some(']') => return Ok(Some(items)),
                Some(_) => return Err(Malformed),
            }
        }
    }

    /// Returns whatever was read when the input ends inside the string
    fn parse_string(&mut self) -> Step<String> {
        self.bump();
        let mut out = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Ok(Some(out));
            };
            match c {
                '"' => return Ok(Some(out)),
                '\\' => {
                    let Some(esc) = self.bump() else {
                        // dangling backslash
                        return Ok(Some(out));
                    };
                    match esc {
                        '"' => out.push('"'),
                        '\\' => out.push('\\'),
                        '/' => out.push('/'),
                        'b' => out.push('\u{8}'),
                        'f' => out.push('\u{c}'),
                        'n' => out.push('\n'),
                        'r' => out.push('\r'),
                        't' => out.push('\t'),
                        'u' => match self.parse_unicode_escape()? {
                            Some(ch) => out.push(ch),
                            None => return Ok(Some(out)),
                        },
                        _ => return Err(Malformed),
                    }
                }
                c if (c as u32) < 0x20 => return Err(Malformed),
                c => out.push(c),
            }
        }
    }

    fn read_hex4(&mut self) -> Step<u32> {
        let rest = &self.src[self.pos..];
        if rest.len() < 4 {
            if rest.chars().all(|c| c.is_ascii_hexdigit()) {
                self.pos = self.src.len();
                return Ok(None);
            }
            return Err(Malformed);
        }
        let digits = rest.get(..4).ok_or(Malformed)?;
        let code = u32::from_str_radix(digits, 16).map_err(|_| Malformed)?;
        self.pos += 4;
        Ok(Some(code))
    }

    fn parse_unicode_escape(&mut self) -> Step<char> {
        let Some(high) = self.read_hex4()? else {
            return Ok(None);
        };
        if (0xD800..0xDC00).contains(&high) {
            // surrogate pair: expect \uXXXX low half
            let rest = &self.src[self.pos..];
            if rest.is_empty() || rest == "\\" {
                self.pos = self.src.len();
                return Ok(None);
            }
            if !rest.starts_with("\\u") {
                return Err(Malformed);
            }
            self.pos += 2;
            let Some(low) = self.read_hex4()? else {
                return Ok(None);
            };
            if !(0xDC00..0xE000).contains(&low) {
                return Err(Malformed);
            }
            let combined = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
            return char::from_u32(combined).map(Some).ok_or(Malformed);
        }
        char::from_u32(high).map(Some).ok_or(Malformed)
    }

    fn parse_literal(&mut self, word: &str, value: Value) -> Step<Value> {
        let rest = &self.src[self.pos..];
        if rest.starts_with(word) {
            self.pos += word.len();
            return Ok(Some(value));
        }
        if word.starts_with(rest) {
            // truncated literal: not resolvable yet
            self.pos = self.src.len();
            return Ok(None);
        }
        Err(Malformed)
    }

    fn parse_number(&mut self) -> Step<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = &self.src[start..self.pos];
        let truncated = self.at_end();

        if let Some(n) = parse_number_text(text) {
            return Ok(Some(Value::Number(n)));
        }
        if truncated {
            // "12." or "-" or "1e" at the very end: trim the incomplete tail
            let trimmed = text.trim_end_matches(|c: char| !c.is_ascii_digit());
            return Ok(parse_number_text(trimmed).map(Value::Number));
        }
        Err(Malformed)
    }
}

fn parse_number_text(text: &str) -> Option<Number> {
    if text.is_empty() {
        return None;
    }
    serde_json::from_str::<Number>(text).ok()
}
