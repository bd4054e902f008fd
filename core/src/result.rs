//! The result object shared across the attempts of one lifecycle.
//!
//! # Design
//! One `HttpResult` is created per run and progressively overwritten by each
//! attempt. It is the only value handed back to callers, through the
//! callbacks and as the return value of `RequestLifecycle::run`.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

/// Status codes written into `HttpResult::status_code`.
///
/// Anything other than these is a protocol status parsed from the
/// response headers.
pub mod status {
    pub const SUCCESS: i32 = 200;
    pub const TIMEOUT: i32 = 1;
    pub const CANCELED: i32 = 2;
    pub const FAILED: i32 = -1;
}

/// Synthetic error messages for terminal states the transport never reports.
pub mod messages {
    use std::time::Duration;

    pub fn timed_out(elapsed: Duration, url: &str) -> String {
        format!("Request timeout ({:.2} s) on URL: {url}", elapsed.as_secs_f64())
    }

    pub fn canceled(url: &str) -> String {
        format!("Request canceled on URL: {url}")
    }
}

const STATUS_HEADERS: [&str; 2] = ["Status", "Status-Line"];
const RESPONSE_PREVIEW_CHARS: usize = 256;

/// How a successful response body should be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultKind {
    #[default]
    Text,
    Bytes,
    Texture,
    TextureNonReadable,
    Audio,
}

/// Image payload as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Texture {
    /// Whether the pixel data stays accessible to the caller after upload.
    pub readable: bool,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Audio payload as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// The decoded body of a successful response, one variant per `ResultKind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Texture(Texture),
    Audio(AudioClip),
}

#[derive(Debug, Clone, Default)]
pub struct HttpResult {
    pub is_error: bool,
    pub is_success: bool,
    pub status_code: i32,
    pub error: String,
    /// Raw response text, filled on success and on transport errors.
    pub response: String,
    pub response_headers: HashMap<String, String>,
    /// Wall-clock time since the current attempt started.
    pub time_elapsed: Duration,
    pub payload: Option<Payload>,
    /// Attempts taken so far in this run.
    pub attempts: u32,
}

impl HttpResult {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.response_headers, name)
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Some(Payload::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.payload {
            Some(Payload::Bytes(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn texture(&self) -> Option<&Texture> {
        match &self.payload {
            Some(Payload::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn audio_clip(&self) -> Option<&AudioClip> {
        match &self.payload {
            Some(Payload::Audio(clip)) => Some(clip),
            _ => None,
        }
    }

    /// Render the headers one `key: value` per line, sorted by key.
    pub fn response_headers_text(&self) -> String {
        let mut pairs: Vec<_> = self.response_headers.iter().collect();
        pairs.sort();
        pairs.iter().map(|(k, v)| format!("{k}: {v}\n")).collect()
    }

    /// Back to the pending state before a new attempt. The attempt counter
    /// carries over.
    pub(crate) fn reset_for_attempt(&mut self) {
        let attempts = self.attempts;
        *self = HttpResult {
            attempts,
            ..HttpResult::default()
        };
    }
}

impl fmt::Display for HttpResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "isError: {}", self.is_error)?;
        writeln!(f, "isSuccess: {}", self.is_success)?;
        writeln!(f, "statusCode: {}", self.status_code)?;
        writeln!(f, "error: {}", self.error)?;
        writeln!(f, "response: {}", truncate(&self.response, RESPONSE_PREVIEW_CHARS))?;
        writeln!(f, "response headers: {}", self.response_headers_text())?;
        write!(f, "time elapsed: {:.3}", self.time_elapsed.as_secs_f64())
    }
}

pub(crate) fn find_header<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Status code carried in the response headers, if any.
///
/// `Status` is checked before `Status-Line`; the first value whose leading
/// token parses as an integer wins.
pub fn parse_status_header(headers: &HashMap<String, String>) -> Option<i32> {
    STATUS_HEADERS.iter().find_map(|key| {
        find_header(headers, key)
            .and_then(|value| value.split_whitespace().next())
            .and_then(|token| token.parse::<i32>().ok())
    })
}

/// Cut `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
