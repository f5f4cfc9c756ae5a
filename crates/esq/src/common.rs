//! 📦 Common data structures: the small load-bearing types every layer passes around.
//!
//! 🧠 Knowledge graph:
//! - [`DslVersion`]: the one compatibility knob. `< 7` means index/type addressing,
//!   `>= 7` means index-only addressing with the fixed `_doc` segment.
//! - [`Options`]: free-form request options that end up in the URL query string.
//! - [`PathSegment`]: one piece of a REST path, either a single name or a comma-joined list.
//! - [`build_url`]: node base + encoded segments + query string, via `url::Url`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

/// 🔧 Free-form request options. Keys become query-string parameters.
pub type Options = serde_json::Map<String, Value>;

/// The fixed document-type segment every 7+ cluster expects.
pub const DOC_TYPE: &str = "_doc";

/// The pre-7 internal identifier field, standing in for `_id` in ranges and sorts.
pub const LEGACY_ID_FIELD: &str = "_uid";

/// 📐 Protocol generation of the target cluster.
///
/// Only the major version matters: everything from 7 on dropped mapping types,
/// everything before still wants them in the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DslVersion(pub u32);

impl DslVersion {
    /// 🎯 First generation without mapping types.
    pub const TYPELESS: DslVersion = DslVersion(7);

    pub fn is_typeless(self) -> bool {
        self >= Self::TYPELESS
    }

    /// 🔄 The type segment to put in a document path: `_doc` on 7+, the caller's type before.
    pub fn doc_segment(self, doc_type: &str) -> &str {
        if self.is_typeless() { DOC_TYPE } else { doc_type }
    }

    /// `_id` is not range- or sort-able before 7; `_uid` is.
    pub fn rangeable_field(self, field: &str) -> &str {
        if !self.is_typeless() && field == "_id" {
            LEGACY_ID_FIELD
        } else {
            field
        }
    }
}

impl Default for DslVersion {
    fn default() -> Self {
        DslVersion(5)
    }
}

impl From<u32> for DslVersion {
    fn from(v: u32) -> Self {
        DslVersion(v)
    }
}

/// 🧩 One segment of a REST path.
///
/// Lists are comma-joined before encoding, which is how the engine spells
/// "several indices at once".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Single(String),
    List(Vec<String>),
}

impl PathSegment {
    /// The segment as it should read once decoded: lists are comma-joined.
    pub fn text(&self) -> String {
        match self {
            PathSegment::Single(s) => s.clone(),
            PathSegment::List(items) => items.join(","),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(s: &str) -> Self {
        PathSegment::Single(s.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(s: String) -> Self {
        PathSegment::Single(s)
    }
}

impl From<&String> for PathSegment {
    fn from(s: &String) -> Self {
        PathSegment::Single(s.clone())
    }
}

impl From<Vec<String>> for PathSegment {
    fn from(items: Vec<String>) -> Self {
        PathSegment::List(items)
    }
}

impl From<&[&str]> for PathSegment {
    fn from(items: &[&str]) -> Self {
        PathSegment::List(items.iter().map(|s| s.to_string()).collect())
    }
}

/// Build a `Vec<PathSegment>` from anything segment-shaped.
#[macro_export]
macro_rules! path {
    ($($segment:expr),* $(,)?) => {
        vec![$($crate::common::PathSegment::from($segment)),*]
    };
}

/// 🔗 `base` + percent-encoded path segments + options as the query string.
pub fn build_url(base: &str, segments: &[PathSegment], options: &Options) -> Result<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::configuration(format!("Invalid node address '{base}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| Error::configuration(format!("Node address '{base}' cannot carry a path")))?
        .pop_if_empty()
        .extend(segments.iter().map(PathSegment::text));

    let pairs = option_pairs(options);
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    Ok(url)
}

/// 🔗 Options as query pairs. Nulls are skipped, lists are comma-joined,
/// nested objects travel as their JSON text.
pub fn option_pairs(options: &Options) -> Vec<(String, String)> {
    options
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), option_text(value)))
        .collect()
}

fn option_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(option_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Pull a key out of an option map, leaving the rest behind.
pub(crate) fn take_option(options: &mut Options, key: &str) -> Option<Value> {
    options.remove(key)
}
