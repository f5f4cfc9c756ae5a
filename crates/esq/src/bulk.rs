//! 📦 BulkCommand: many document operations, one `_bulk` request.
//!
//! 🧠 Knowledge graph:
//! - The body is NDJSON: every action line and every document line is JSON-encoded on its
//!   own line, trailing `\n` included. A `Value::String` line is encoded too (it becomes a
//!   JSON string); pre-rendered NDJSON goes through [`BulkCommand::set_raw_body`] instead.
//! - Endpoint binding: nothing → `/_bulk`, index → `/{index}/_bulk`, index + type →
//!   `/{index}/{type}/_bulk` before 7 and `/{index}/_bulk` after. A type with no index is
//!   refused before anything touches the wire.
//! - Nothing queued and no raw body → the request body is `{}`, and the engine decides how
//!   it feels about that.
//!
//! 🦆 Every line is lonely. That is the format.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::common::Options;
use crate::connection::{Body, Connection};
use crate::endpoints;
use crate::error::Result;

/// 📦 Accumulates bulk actions against one connection.
#[derive(Debug)]
pub struct BulkCommand<'c> {
    connection: &'c mut Connection,
    index: Option<String>,
    doc_type: Option<String>,
    actions: Vec<Value>,
    raw_body: Option<String>,
    options: Options,
}

impl<'c> BulkCommand<'c> {
    pub fn new(connection: &'c mut Connection) -> Self {
        Self {
            connection,
            index: None,
            doc_type: None,
            actions: Vec::new(),
            raw_body: None,
            options: Options::new(),
        }
    }

    /// Default index for actions that do not name one.
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// Default type; only meaningful before 7, and only together with an index.
    pub fn doc_type(mut self, doc_type: impl Into<String>) -> Self {
        self.doc_type = Some(doc_type.into());
        self
    }

    /// URL options, e.g. `refresh` or `pipeline`.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// ➕ Queue an action line, plus its document line when the action takes one.
    ///
    /// `delete` takes no document; `index`, `create` and `update` do. Both lines get
    /// JSON-encoded when the body is built, so hand over parsed values, not JSON text.
    pub fn add_action(&mut self, header: impl Into<Value>, document: Option<Value>) -> &mut Self {
        self.actions.push(header.into());
        if let Some(document) = document {
            self.actions.push(document);
        }
        self
    }

    /// 🗑️ Queue `{"delete": {"_id", "_index"?, "_type"?}}`.
    ///
    /// An empty index or type counts as "not given" and is left out of the action, so the
    /// command's own binding applies.
    pub fn add_delete_action(&mut self, id: &str, index: Option<&str>, doc_type: Option<&str>) -> &mut Self {
        let mut target = Map::new();
        target.insert("_id".into(), json!(id));
        if let Some(index) = index.filter(|i| !i.is_empty()) {
            target.insert("_index".into(), json!(index));
        }
        if let Some(doc_type) = doc_type.filter(|t| !t.is_empty()) {
            target.insert("_type".into(), json!(doc_type));
        }
        self.add_action(json!({"delete": target}), None)
    }

    /// 📜 Send this pre-rendered NDJSON instead of the queued actions. Nothing gets re-encoded.
    pub fn set_raw_body(&mut self, body: impl Into<String>) -> &mut Self {
        self.raw_body = Some(body.into());
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.raw_body.is_none()
    }

    /// 🧵 The request body as it will be sent.
    pub fn body(&self) -> String {
        if let Some(raw) = &self.raw_body {
            return raw.clone();
        }
        if self.actions.is_empty() {
            return "{}".to_string();
        }
        // -- rough guess: 64 bytes per line beats growing from zero
        let mut payload = String::with_capacity(self.actions.len() * 64);
        for line in &self.actions {
            // -- every line is encoded, strings included; one JSON value per line, no exceptions
            payload.push_str(&line.to_string());
            payload.push('\n');
        }
        payload
    }

    /// 🚀 POST the whole thing. The per-item outcome is in the returned body's `items`.
    pub async fn execute(&mut self) -> Result<Option<Value>> {
        let path = endpoints::bulk(
            self.connection.dsl_version(),
            self.index.as_deref(),
            self.doc_type.as_deref(),
        )?;
        let body = self.body();
        debug!("📦 Bulk request: {} lines, {} bytes", self.actions.len(), body.len());
        let reply = self
            .connection
            .post(&path, &self.options, Some(Body::ndjson(body)))
            .await?;
        Ok(reply.into_value())
    }
}
