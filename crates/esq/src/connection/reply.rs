//! 📬 Reply classification: turning status codes and content types into something typed.
//!
//! 🧠 Knowledge graph:
//! - 2xx + `application/json` → [`Reply::Json`] (or [`Reply::Raw`] when the caller asked for text)
//! - 2xx + `text/plain` → [`Reply::Lines`] (cat APIs love this)
//! - 2xx on HEAD → [`Reply::Found`]
//! - 404 → [`Reply::NotFound`], which is an answer and not an error
//! - everything else → [`Error::Transport`]

use memchr::memchr_iter;
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};

/// 📬 A successfully classified reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Decoded JSON body. An empty body decodes to `Null`.
    Json(Value),
    /// Non-empty lines of a `text/plain` body.
    Lines(Vec<String>),
    /// Body as text, undecoded, because the caller asked for raw mode.
    Raw(String),
    /// Bodiless success: the HEAD request found its target.
    Found,
    /// The engine answered 404.
    NotFound,
}

impl Reply {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Reply::NotFound)
    }

    /// 🔄 The decoded body, or `None` for a 404.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Reply::Json(value) => Some(value),
            Reply::Lines(lines) => Some(Value::Array(lines.into_iter().map(Value::String).collect())),
            Reply::Raw(text) => Some(Value::String(text)),
            Reply::Found => Some(Value::Bool(true)),
            Reply::NotFound => None,
        }
    }

    /// 🎯 Truthiness, the way admin endpoints want it: a non-empty answer means yes.
    pub fn is_truthy(&self) -> bool {
        match self {
            Reply::Json(value) => truthy(value),
            Reply::Lines(lines) => !lines.is_empty(),
            Reply::Raw(text) => !text.is_empty(),
            Reply::Found => true,
            Reply::NotFound => false,
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// 🧾 Everything classification needs to know about a finished exchange.
#[derive(Debug, Clone, Copy)]
pub struct RawResponse<'a> {
    pub is_head: bool,
    pub status: u16,
    pub content_type: Option<&'a str>,
    pub content_length: Option<u64>,
    pub body: &'a [u8],
}

/// 📬 Classify a finished HTTP exchange.
pub fn classify(response: RawResponse<'_>, raw: bool) -> Result<Reply> {
    let RawResponse {
        is_head,
        status,
        content_type,
        content_length,
        body,
    } = response;

    if status == 404 {
        trace!("🕳️ 404, not found, which is an answer, not a tragedy");
        return Ok(Reply::NotFound);
    }

    if !(200..300).contains(&status) {
        let text = String::from_utf8_lossy(body).into_owned();
        return Err(Error::Transport {
            status: Some(status),
            message: format!(
                "Elasticsearch request failed with code {status}. Response body:\n{text}"
            ),
            body: Some(text),
        });
    }

    if is_head {
        return Ok(Reply::Found);
    }

    if let Some(declared) = content_length {
        let received = body.len() as u64;
        if received < declared {
            return Err(Error::transport(format!(
                "Incomplete data received from Elasticsearch: {received} < {declared}"
            )));
        }
    }

    let content_type = content_type.unwrap_or_default();
    if content_type.starts_with("application/json") {
        trace!("📦 {} bytes of JSON", body.len());
        if raw {
            return Ok(Reply::Raw(String::from_utf8_lossy(body).into_owned()));
        }
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Reply::Json(Value::Null));
        }
        return Ok(Reply::Json(serde_json::from_slice(body)?));
    }

    if content_type.starts_with("text/plain") {
        if raw {
            return Ok(Reply::Raw(String::from_utf8_lossy(body).into_owned()));
        }
        return Ok(Reply::Lines(split_lines(body)));
    }

    Err(Error::transport(format!(
        "Unsupported data received from Elasticsearch: {content_type}"
    )))
}

/// ✂️ Non-empty lines of a text body.
fn split_lines(body: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut start = 0;
    for end in memchr_iter(b'\n', body).chain(std::iter::once(body.len())) {
        let line = &body[start..end];
        if !line.is_empty() {
            lines.push(String::from_utf8_lossy(line).into_owned());
        }
        start = end + 1;
    }
    lines
}
