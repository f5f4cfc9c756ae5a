//! 🏗️ Command: one method per REST endpoint, each a single request.
//!
//! 🧠 Knowledge graph:
//! - A command borrows the [`Connection`] mutably for its whole life. Build it, fire some
//!   requests, drop it.
//! - Bound state (`index`, `doc_type`, `query_parts`, `options`) comes from a compiled
//!   query and only matters to `search`, `delete_by_query` and `suggest`. Every other
//!   method names its own target.
//! - Return shapes: decoded bodies come back as `Option<Value>` (`None` on 404), existence
//!   checks as `bool`, alias mutations as acknowledged-or-not `bool`.
//! - Paths come from [`crate::endpoints`], which owns the version gating.

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::common::{DslVersion, Options, take_option};
use crate::compiler::CompiledQuery;
use crate::connection::{Body, Connection, Reply};
use crate::endpoints;
use crate::error::{Error, Result};

/// 🏗️ A request factory bound to a connection and, optionally, a compiled query.
#[derive(Debug)]
pub struct Command<'c> {
    connection: &'c mut Connection,
    index: Option<String>,
    doc_type: Option<String>,
    query_parts: Map<String, Value>,
    options: Options,
}

impl<'c> Command<'c> {
    /// 🐣 An empty command: no index, no body. Good for document and admin calls.
    pub fn new(connection: &'c mut Connection) -> Self {
        Self {
            connection,
            index: None,
            doc_type: None,
            query_parts: Map::new(),
            options: Options::new(),
        }
    }

    /// 🧮 A command primed with a compiled query: target, body and URL options all come along.
    pub fn from_compiled(connection: &'c mut Connection, compiled: CompiledQuery) -> Self {
        Self {
            connection,
            index: compiled.index,
            doc_type: compiled.doc_type,
            query_parts: compiled.body,
            options: compiled.options,
        }
    }

    /// The index the compiled query targets, if any.
    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    /// 📦 The search body as it will be sent.
    pub fn query_parts(&self) -> &Map<String, Value> {
        &self.query_parts
    }

    /// Tweak the search body before sending it (e.g. force a `_source` filter).
    pub fn query_parts_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.query_parts
    }

    /// ⚙️ URL options merged into every request this command makes. Caller options win.
    pub fn options(&self) -> &Options {
        &self.options
    }

    fn version(&self) -> DslVersion {
        self.connection.dsl_version()
    }

    /// Bound options, overridden by per-call ones.
    fn merged(&self, options: Options) -> Options {
        let mut merged = self.options.clone();
        merged.extend(options);
        merged
    }

    // ===== 🔍 search family =====

    /// 🔍 Run the bound query. An empty body goes out as `{}`.
    pub async fn search(&mut self, options: Options) -> Result<Reply> {
        let path = endpoints::search(self.version(), self.index.as_deref(), self.doc_type.as_deref());
        let options = self.merged(options);
        let body = Body::json(Value::Object(self.query_parts.clone()).to_string());
        self.connection.get(&path, &options, Some(body)).await
    }

    /// 🗑️ Delete whatever the bound query matches. Refuses to run without a query clause.
    pub async fn delete_by_query(&mut self, options: Options) -> Result<Option<Value>> {
        let Some(query) = self.query_parts.get("query") else {
            return Err(Error::QueryExecution(
                "Cannot delete by query when no query is given.".into(),
            ));
        };
        let mut body = Map::new();
        body.insert("query".into(), query.clone());
        if let Some(filter) = self.query_parts.get("filter") {
            body.insert("filter".into(), filter.clone());
        }

        let path = endpoints::delete_by_query(self.index.as_deref());
        let options = self.merged(options);
        let reply = self
            .connection
            .post(&path, &options, Some(Body::json(Value::Object(body).to_string())))
            .await?;
        Ok(reply.into_value())
    }

    /// 💡 Run suggesters only (`size: 0`) and return the `suggest` section.
    pub async fn suggest(&mut self, suggester: Value, options: Options) -> Result<Value> {
        let suggester = if is_blank(&suggester) { json!({}) } else { suggester };
        let body = json!({"suggest": suggester, "size": 0});
        let path = endpoints::suggest(self.index.as_deref());
        let options = self.merged(options);

        let reply = self.connection.post(&path, &options, Some(Body::json(body.to_string()))).await?;
        match reply.into_value() {
            Some(mut response) => Ok(response.get_mut("suggest").map(Value::take).unwrap_or(Value::Null)),
            None => Err(Error::QueryExecution(
                "Elasticsearch suggest query failed.".into(),
            )),
        }
    }

    // ===== 📄 documents =====

    /// 📄 PUT with an id, POST without one (the engine picks the id).
    pub async fn insert(
        &mut self,
        index: &str,
        doc_type: &str,
        data: &Value,
        id: Option<&str>,
        options: Options,
    ) -> Result<Option<Value>> {
        let path = endpoints::document(self.version(), index, doc_type, id);
        let body = Some(document_body(data));
        let reply = match id {
            Some(_) => self.connection.put(&path, &options, body).await?,
            None => self.connection.post(&path, &options, body).await?,
        };
        Ok(reply.into_value())
    }

    /// 📄 One document by id. `None` when the cluster says 404; other failures are errors.
    pub async fn get(&mut self, index: &str, doc_type: &str, id: &str, options: Options) -> Result<Option<Value>> {
        let path = endpoints::document(self.version(), index, doc_type, Some(id));
        Ok(self.connection.get(&path, &options, None).await?.into_value())
    }

    /// 📚 Several documents in one round trip.
    pub async fn mget(
        &mut self,
        index: &str,
        doc_type: &str,
        ids: &[impl AsRef<str>],
        options: Options,
    ) -> Result<Option<Value>> {
        // -- ids go in the body, never the URL
        let ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
        let body = Body::json(json!({"ids": ids}).to_string());
        let path = endpoints::mget(self.version(), index, doc_type);
        Ok(self.connection.get(&path, &options, Some(body)).await?.into_value())
    }

    /// Just the `_source` of one document.
    pub async fn get_source(&mut self, index: &str, doc_type: &str, id: &str) -> Result<Option<Value>> {
        let document = self.get(index, doc_type, id, Options::new()).await?;
        Ok(document.and_then(|mut d| d.get_mut("_source").map(Value::take)))
    }

    /// ❓ HEAD on the document. Only a 404 means no.
    pub async fn exists(&mut self, index: &str, doc_type: &str, id: &str) -> Result<bool> {
        let path = endpoints::document(self.version(), index, doc_type, Some(id));
        Ok(!self.connection.head(&path, &Options::new()).await?.is_not_found())
    }

    /// 🗑️ Delete one document. A missing document comes back as `None`, not an error.
    pub async fn delete(&mut self, index: &str, doc_type: &str, id: &str, options: Options) -> Result<Option<Value>> {
        let path = endpoints::document(self.version(), index, doc_type, Some(id));
        Ok(self.connection.delete(&path, &options, None).await?.into_value())
    }

    /// ✏️ Partial update: `{"doc": patch}`. A `detect_noop` option moves into the body.
    pub async fn update(
        &mut self,
        index: &str,
        doc_type: &str,
        id: &str,
        data: &Value,
        mut options: Options,
    ) -> Result<Option<Value>> {
        // -- a blank patch goes out as {}
        let patch = if is_blank(data) { json!({}) } else { data.clone() };
        let mut body = Map::new();
        body.insert("doc".into(), patch);
        if let Some(detect_noop) = take_option(&mut options, "detect_noop") {
            body.insert("detect_noop".into(), detect_noop);
        }

        let path = endpoints::update(self.version(), index, doc_type, id);
        let body = Body::json(Value::Object(body).to_string());
        Ok(self.connection.post(&path, &options, Some(body)).await?.into_value())
    }

    // ===== 🗄️ indices =====

    /// 🏗️ `PUT /index`, with settings and mappings when given.
    pub async fn create_index(&mut self, index: &str, configuration: Option<Value>) -> Result<Option<Value>> {
        let body = configuration.map(|c| Body::json(c.to_string()));
        debug!("🗄️ Creating index '{index}'");
        Ok(self
            .connection
            .put(&endpoints::index(index), &Options::new(), body)
            .await?
            .into_value())
    }

    /// 💥 Drop one index.
    pub async fn delete_index(&mut self, index: &str) -> Result<Option<Value>> {
        Ok(self
            .connection
            .delete(&endpoints::index(index), &Options::new(), None)
            .await?
            .into_value())
    }

    /// 💀 Every index. Yes, all of them.
    pub async fn delete_all_indexes(&mut self) -> Result<Option<Value>> {
        self.delete_index("_all").await
    }

    /// ❓ HEAD on the index.
    pub async fn index_exists(&mut self, index: &str) -> Result<bool> {
        Ok(!self
            .connection
            .head(&endpoints::index(index), &Options::new())
            .await?
            .is_not_found())
    }

    /// ❓ HEAD on the mapping type. On typeless clusters the path asks about the mapping instead.
    pub async fn type_exists(&mut self, index: &str, doc_type: &str) -> Result<bool> {
        let path = endpoints::type_exists(self.version(), index, doc_type);
        Ok(!self.connection.head(&path, &Options::new()).await?.is_not_found())
    }

    /// ⚙️ `PUT /index/_settings`. A string is sent as already-encoded JSON.
    pub async fn update_settings(&mut self, index: &str, settings: &Value, options: Options) -> Result<Option<Value>> {
        Ok(self
            .connection
            .put(&endpoints::settings(index), &options, Some(encoded_body(settings)))
            .await?
            .into_value())
    }

    /// 🔄 Analyzers only change on a closed index: close, update, reopen.
    ///
    /// The index is reopened even when the update fails; the update's error wins.
    pub async fn update_analyzers(&mut self, index: &str, settings: &Value, options: Options) -> Result<Option<Value>> {
        self.close_index(index).await?;
        let updated = self.update_settings(index, settings, options).await;
        self.open_index(index).await?;
        updated
    }

    /// 🔓 Reopen a closed index.
    pub async fn open_index(&mut self, index: &str) -> Result<Option<Value>> {
        Ok(self
            .connection
            .post(&endpoints::open_index(index), &Options::new(), None)
            .await?
            .into_value())
    }

    /// 🔒 Close an index. Reads and writes fail until it is reopened.
    pub async fn close_index(&mut self, index: &str) -> Result<Option<Value>> {
        Ok(self
            .connection
            .post(&endpoints::close_index(index), &Options::new(), None)
            .await?
            .into_value())
    }

    // ===== 🏷️ aliases =====

    pub async fn alias_exists(&mut self, alias: &str) -> Result<bool> {
        Ok(!self.get_indexes_by_alias(alias).await?.is_empty())
    }

    /// Every alias of every index; `{}` when there are none.
    pub async fn get_alias_info(&mut self) -> Result<Value> {
        let reply = self
            .connection
            .get(&endpoints::all_aliases(), &Options::new(), None)
            .await?;
        Ok(reply.into_value().filter(|v| !is_blank(v)).unwrap_or_else(|| json!({})))
    }

    /// `index → {aliases: ...}` for every index behind `alias`.
    pub async fn get_index_info_by_alias(&mut self, alias: &str) -> Result<Map<String, Value>> {
        let reply = self
            .connection
            .get(&endpoints::alias(alias), &Options::new(), None)
            .await?;
        Ok(match reply.into_value() {
            Some(Value::Object(info)) => info,
            _ => Map::new(),
        })
    }

    /// 🏷️ Names of the indices behind `alias`. Empty when the alias is unknown.
    pub async fn get_indexes_by_alias(&mut self, alias: &str) -> Result<Vec<String>> {
        Ok(self.get_index_info_by_alias(alias).await?.into_iter().map(|(index, _)| index).collect())
    }

    /// The aliases of one index; `{}` when it has none.
    pub async fn get_index_aliases(&mut self, index: &str) -> Result<Value> {
        let reply = self
            .connection
            .get(&endpoints::index_aliases(index), &Options::new(), None)
            .await?;
        Ok(reply
            .into_value()
            .and_then(|mut v| v.get_mut(index).and_then(|i| i.get_mut("aliases")).map(Value::take))
            .unwrap_or_else(|| json!({})))
    }

    /// ➕ Point `alias` at `index`. `true` when the cluster acknowledged it.
    pub async fn add_alias(&mut self, index: &str, alias: &str, parameters: Option<Value>) -> Result<bool> {
        let parameters = parameters.filter(|p| !is_blank(p)).unwrap_or_else(|| json!({}));
        let reply = self
            .connection
            .put(
                &endpoints::index_alias(index, alias),
                &Options::new(),
                Some(Body::json(parameters.to_string())),
            )
            .await?;
        Ok(reply.is_truthy())
    }

    /// ➖ Unhook `alias` from `index`.
    pub async fn remove_alias(&mut self, index: &str, alias: &str) -> Result<bool> {
        let reply = self
            .connection
            .delete(&endpoints::index_alias(index, alias), &Options::new(), None)
            .await?;
        Ok(reply.is_truthy())
    }

    /// Atomic batch of `add`/`remove` alias actions.
    pub async fn alias_actions(&mut self, actions: Vec<Value>) -> Result<bool> {
        let body = Body::json(json!({"actions": actions}).to_string());
        let reply = self
            .connection
            .post(&endpoints::alias_actions(), &Options::new(), Some(body))
            .await?;
        Ok(reply.is_truthy())
    }

    // ===== 📜 scrolling =====

    /// 📜 Next scroll page. `scroll` and `scroll_id` move from the options into the body.
    pub async fn scroll(&mut self, mut options: Options) -> Result<Option<Value>> {
        let mut body = Map::new();
        for key in ["scroll", "scroll_id"] {
            if let Some(value) = take_option(&mut options, key).filter(|v| !is_blank(v)) {
                body.insert(key.into(), value);
            }
        }
        let body = Body::json(Value::Object(body).to_string());
        Ok(self
            .connection
            .post(&endpoints::scroll(), &options, Some(body))
            .await?
            .into_value())
    }

    /// 🧹 Release a scroll context. The `scroll_id` option moves into the body.
    pub async fn clear_scroll(&mut self, mut options: Options) -> Result<Option<Value>> {
        let mut body = Map::new();
        if let Some(scroll_id) = take_option(&mut options, "scroll_id").filter(|v| !is_blank(v)) {
            body.insert("scroll_id".into(), scroll_id);
        }
        let body = Body::json(Value::Object(body).to_string());
        Ok(self
            .connection
            .delete(&endpoints::scroll(), &options, Some(body))
            .await?
            .into_value())
    }

    // ===== 📈 stats and maintenance =====

    /// 📈 `_stats` for one index, or the whole cluster when `index` is `None`.
    pub async fn get_index_stats(&mut self, index: Option<&str>) -> Result<Option<Value>> {
        Ok(self
            .connection
            .get(&endpoints::stats(index), &Options::new(), None)
            .await?
            .into_value())
    }

    /// 🩹 `_recovery`, scoped the same way as [`Command::get_index_stats`].
    pub async fn get_index_recovery_stats(&mut self, index: Option<&str>) -> Result<Option<Value>> {
        Ok(self
            .connection
            .get(&endpoints::recovery(index), &Options::new(), None)
            .await?
            .into_value())
    }

    pub async fn clear_index_cache(&mut self, index: &str) -> Result<Option<Value>> {
        Ok(self
            .connection
            .post(&endpoints::clear_cache(index), &Options::new(), None)
            .await?
            .into_value())
    }

    /// 💾 Flush to disk; every index when `index` is `None`.
    pub async fn flush_index(&mut self, index: Option<&str>) -> Result<Option<Value>> {
        Ok(self
            .connection
            .post(&endpoints::flush(index), &Options::new(), None)
            .await?
            .into_value())
    }

    /// 🔄 Make recent writes searchable.
    pub async fn refresh_index(&mut self, index: Option<&str>) -> Result<Option<Value>> {
        Ok(self
            .connection
            .post(&endpoints::refresh(index), &Options::new(), None)
            .await?
            .into_value())
    }

    // ===== 🗺️ mappings and templates =====

    /// 🗺️ Put a mapping. The path carries the type only on clusters that still have types.
    pub async fn set_mapping(
        &mut self,
        index: &str,
        doc_type: &str,
        mapping: &Value,
        options: Options,
    ) -> Result<Option<Value>> {
        let path = endpoints::set_mapping(self.version(), index, doc_type);
        Ok(self
            .connection
            .put(&path, &options, Some(encoded_body(mapping)))
            .await?
            .into_value())
    }

    /// 🗺️ Read mappings, narrowed by index and type when given.
    pub async fn get_mapping(&mut self, index: Option<&str>, doc_type: Option<&str>) -> Result<Option<Value>> {
        let path = endpoints::get_mapping(self.version(), index, doc_type);
        Ok(self.connection.get(&path, &Options::new(), None).await?.into_value())
    }

    /// 📐 Legacy index template: `pattern` is matched against new index names.
    pub async fn create_template(
        &mut self,
        name: &str,
        pattern: &str,
        settings: Value,
        mappings: Value,
        order: i64,
    ) -> Result<Option<Value>> {
        // -- anything that is not an object becomes {}
        let object_or_empty = |v: Value| if v.is_object() { v } else { json!({}) };
        let body = json!({
            "template": pattern,
            "order": order,
            "settings": object_or_empty(settings),
            "mappings": object_or_empty(mappings),
        });
        Ok(self
            .connection
            .put(&endpoints::template(name), &Options::new(), Some(Body::json(body.to_string())))
            .await?
            .into_value())
    }

    /// 🗑️ Remove a legacy index template.
    pub async fn delete_template(&mut self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .connection
            .delete(&endpoints::template(name), &Options::new(), None)
            .await?
            .into_value())
    }

    pub async fn get_template(&mut self, name: &str) -> Result<Option<Value>> {
        Ok(self
            .connection
            .get(&endpoints::template(name), &Options::new(), None)
            .await?
            .into_value())
    }
}

/// Null, `{}` and `[]` all mean "nothing to say".
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn document_body(data: &Value) -> Body {
    if is_blank(data) {
        Body::json("{}")
    } else {
        encoded_body(data)
    }
}

/// A string is taken as already-encoded JSON; anything else gets serialized.
fn encoded_body(value: &Value) -> Body {
    match value {
        Value::String(text) => Body::json(text.clone()),
        other => Body::json(other.to_string()),
    }
}
