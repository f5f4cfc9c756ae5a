//! 🔎 The Query builder: accumulate intent, then run it.
//!
//! 🧠 Knowledge graph:
//! - Setters take `self` by value and hand it back, so a query reads as one chain.
//! - Terminal operations (`all`, `one`, `count`, ...) compile through
//!   [`Connection::query_builder`], execute through a [`Command`] primed with the compiled
//!   query, and interpret the response shape. They borrow the query; running it twice is fine.
//! - 💀 Error kinds, the same for every terminal operation:
//!   - a 404 from a search is a failed query, not an empty one: [`Error::QueryExecution`];
//!   - any other non-2xx answer from the cluster: [`Error::Transport`];
//!   - a socket that never got an answer: [`Error::Network`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::command::Command;
use crate::common::Options;
use crate::condition::{Condition, Operand};
use crate::connection::{Connection, Reply};
use crate::error::{Error, Result};
use crate::result::{ElasticResult, total_of};

/// 🔃 Sort direction, or a complete sort spec object passed through as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum SortDirection {
    Asc,
    Desc,
    Custom(Value),
}

/// 🔑 How to key rows: by a field, or by whatever a closure says.
#[derive(Clone)]
pub enum IndexBy {
    Field(String),
    Derive(Arc<dyn Fn(&Value) -> String + Send + Sync>),
}

impl fmt::Debug for IndexBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexBy::Field(field) => f.debug_tuple("Field").field(field).finish(),
            IndexBy::Derive(_) => f.write_str("Derive(<fn>)"),
        }
    }
}

impl IndexBy {
    /// The key for one hit. A `fields` projection wins over `_source`.
    pub fn key_for(&self, row: &Value) -> String {
        match self {
            IndexBy::Derive(derive) => derive(row),
            IndexBy::Field(field) => {
                let projected = row.get("fields").and_then(|f| f.get(field)).map(|value| match value {
                    Value::Array(items) => items.first().unwrap_or(&Value::Null),
                    other => other,
                });
                let value = projected
                    .or_else(|| row.get("_source").and_then(|s| s.get(field)))
                    .unwrap_or(&Value::Null);
                key_text(value)
            }
        }
    }
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 📋 What `all()` hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    List(Vec<Value>),
    /// Rows keyed by [`IndexBy`], in first-seen order. A repeated key keeps the last row.
    Keyed(Vec<(String, Value)>),
}

impl Rows {
    pub fn len(&self) -> usize {
        match self {
            Rows::List(rows) => rows.len(),
            Rows::Keyed(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Rows::List(_) => None,
            Rows::Keyed(rows) => rows.iter().find(|(k, _)| k == key).map(|(_, row)| row),
        }
    }

    /// Drop the keys, keep the rows.
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Rows::List(rows) => rows,
            Rows::Keyed(rows) => rows.into_iter().map(|(_, row)| row).collect(),
        }
    }
}

/// 🔎 Everything a search wants to say, accumulated.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub(crate) index: Option<String>,
    pub(crate) doc_type: Option<String>,
    pub(crate) where_: Option<Condition>,
    pub(crate) query: Option<Value>,
    pub(crate) order_by: Vec<(String, SortDirection)>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: Option<usize>,
    pub(crate) source: Option<Value>,
    pub(crate) stored_fields: Option<Value>,
    pub(crate) script_fields: Option<Value>,
    pub(crate) aggregations: Map<String, Value>,
    pub(crate) suggest: Map<String, Value>,
    pub(crate) stats: Option<Value>,
    pub(crate) highlight: Option<Value>,
    pub(crate) post_filter: Option<Value>,
    pub(crate) collapse: Option<Value>,
    pub(crate) min_score: Option<f64>,
    pub(crate) explain: Option<bool>,
    pub(crate) timeout: Option<String>,
    pub(crate) options: Options,
    pub(crate) index_by: Option<IndexBy>,
}

impl Query {
    /// 🐣 A blank query: no index, no conditions, no limits. Everything else is a setter away.
    pub fn new() -> Self {
        Self::default()
    }

    // ===== 🏗️ setters =====

    /// Target index, and a mapping type for clusters that still have them.
    pub fn from(mut self, index: impl Into<String>, doc_type: Option<&str>) -> Self {
        self.index = Some(index.into());
        self.doc_type = doc_type.map(str::to_owned);
        self
    }

    /// 🎯 Set the where-clause, replacing whatever was there.
    pub fn where_(mut self, condition: Condition) -> Self {
        self.where_ = Some(condition);
        self
    }

    /// AND another condition onto the current one, flattening into an existing top-level `and`.
    pub fn and_where(mut self, condition: Condition) -> Self {
        self.where_ = Some(match self.where_.take() {
            None => condition,
            Some(Condition::And(mut operands)) => {
                operands.push(Operand::Condition(condition));
                Condition::And(operands)
            }
            Some(existing) => Condition::And(vec![existing.into(), condition.into()]),
        });
        self
    }

    /// OR another condition onto the current one, flattening into an existing top-level `or`.
    pub fn or_where(mut self, condition: Condition) -> Self {
        self.where_ = Some(match self.where_.take() {
            None => condition,
            Some(Condition::Or(mut operands)) => {
                operands.push(Operand::Condition(condition));
                Condition::Or(operands)
            }
            Some(existing) => Condition::Or(vec![existing.into(), condition.into()]),
        });
        self
    }

    /// A raw DSL fragment, AND'ed with the where-clause when both are present.
    pub fn query(mut self, query: Value) -> Self {
        self.query = Some(query);
        self
    }

    /// Replace the sort with a single directive.
    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by = vec![(field.into(), direction)];
        self
    }

    /// ➕ Append a sort directive after the existing ones. Earlier directives win ties.
    pub fn add_order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    /// 📏 Becomes `size` in the body.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// ⏭️ Becomes `from` in the body.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// 📄 1-based page → `from`/`size`. Page 0 is treated as page 1.
    pub fn page(self, page: usize, limit: usize) -> Self {
        let offset = page.saturating_sub(1) * limit;
        self.limit(limit).offset(offset)
    }

    /// `_source` filtering: a list of fields, `false`, or any source-filter object.
    pub fn source(mut self, source: impl Into<Value>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 🗄️ Stored fields to return, straight into `stored_fields`.
    pub fn stored_fields(mut self, fields: impl Into<Value>) -> Self {
        self.stored_fields = Some(fields.into());
        self
    }

    /// 🧪 Computed fields; the object goes into the body untouched.
    pub fn script_fields(mut self, fields: Value) -> Self {
        self.script_fields = Some(fields);
        self
    }

    /// 📊 Add a named aggregation. Reusing a name replaces the earlier spec.
    ///
    /// ```
    /// use esq::Query;
    /// use serde_json::json;
    ///
    /// let query = Query::new().add_aggregate("price_min", json!({"min": {"field": "price"}}));
    /// assert!(query.get_aggregations().contains_key("price_min"));
    /// ```
    pub fn add_aggregate(mut self, name: impl Into<String>, spec: Value) -> Self {
        self.aggregations.insert(name.into(), spec);
        self
    }

    /// 💡 Add a named suggester. [`Query::suggest`] runs them on their own.
    pub fn add_suggester(mut self, name: impl Into<String>, definition: Value) -> Self {
        self.suggest.insert(name.into(), definition);
        self
    }

    /// 📈 Stats groups to tag the search with.
    pub fn stats(mut self, groups: Value) -> Self {
        self.stats = Some(groups);
        self
    }

    /// 🖍️ Highlighting config, passed through as-is.
    pub fn highlight(mut self, highlight: Value) -> Self {
        self.highlight = Some(highlight);
        self
    }

    /// 🧹 A filter applied after aggregations are computed.
    pub fn post_filter(mut self, filter: Value) -> Self {
        self.post_filter = Some(filter);
        self
    }

    /// 🪗 Field collapsing, passed through as-is.
    pub fn collapse(mut self, collapse: Value) -> Self {
        self.collapse = Some(collapse);
        self
    }

    /// Hits scoring below this are dropped by the cluster.
    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// 🔬 Ask the cluster to explain every score. Slow; meant for debugging.
    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = Some(explain);
        self
    }

    /// Search timeout, e.g. `"5s"`. Travels as a URL option.
    pub fn timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = Some(timeout.into());
        self
    }

    /// ⚙️ Replace the URL options wholesale.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Later keys win.
    pub fn add_options(mut self, options: Options) -> Self {
        self.options.extend(options);
        self
    }

    /// 🔑 Key the rows from [`Query::all`] by this field.
    pub fn index_by(mut self, field: impl Into<String>) -> Self {
        self.index_by = Some(IndexBy::Field(field.into()));
        self
    }

    /// 🔑 Key the rows from [`Query::all`] by whatever the closure returns.
    pub fn index_by_fn(mut self, derive: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.index_by = Some(IndexBy::Derive(Arc::new(derive)));
        self
    }

    // ===== 🔍 getters =====
    // -- read-only peeks at what has been accumulated; the compiler uses the fields directly

    /// 📁 The target index, if [`Query::from`] was called.
    pub fn get_index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// The mapping type. `None` on clusters that no longer have them.
    pub fn get_type(&self) -> Option<&str> {
        self.doc_type.as_deref()
    }

    /// 🎯 The accumulated condition tree.
    pub fn get_where(&self) -> Option<&Condition> {
        self.where_.as_ref()
    }

    /// 🔃 Sort directives, in priority order.
    pub fn get_order_by(&self) -> &[(String, SortDirection)] {
        &self.order_by
    }

    /// 📏 The requested `size`.
    pub fn get_limit(&self) -> Option<usize> {
        self.limit
    }

    /// ⏭️ The requested `from`.
    pub fn get_offset(&self) -> Option<usize> {
        self.offset
    }

    /// 📊 Named aggregations, in insertion order.
    pub fn get_aggregations(&self) -> &Map<String, Value> {
        &self.aggregations
    }

    /// 💡 Named suggesters, in insertion order.
    pub fn get_suggest(&self) -> &Map<String, Value> {
        &self.suggest
    }

    /// ⚙️ URL options that ride along with every terminal operation.
    pub fn get_options(&self) -> &Options {
        &self.options
    }

    // ===== 🚀 terminal operations =====
    // -- all of them: 404 → QueryExecution, other failures → Transport, dead socket → Network

    /// 🏗️ Compile for this connection's DSL version and wrap it in a command.
    pub async fn create_command<'c>(&self, connection: &'c mut Connection) -> Result<Command<'c>> {
        let compiled = connection.query_builder().build(self)?;
        connection.create_command_for(compiled).await
    }

    /// 📋 Every hit, keyed when [`Query::index_by`] is set.
    ///
    /// # Errors
    /// [`Error::QueryExecution`] when the search comes back 404, [`Error::Transport`] for any
    /// other failed answer, [`Error::Network`] when the cluster never answers.
    pub async fn all(&self, connection: &mut Connection) -> Result<Rows> {
        let mut command = self.create_command(connection).await?;
        let response = found(command.search(Options::new()).await?)?;
        Ok(self.populate(hits_of(&response)))
    }

    /// 🔑 Apply [`IndexBy`] to a batch of hits.
    pub fn populate(&self, rows: Vec<Value>) -> Rows {
        let Some(index_by) = &self.index_by else {
            return Rows::List(rows);
        };
        let mut keyed: Vec<(String, Value)> = Vec::with_capacity(rows.len());
        let mut positions: HashMap<String, usize> = HashMap::with_capacity(rows.len());
        for row in rows {
            let key = index_by.key_for(&row);
            match positions.get(&key) {
                Some(&at) => keyed[at].1 = row,
                None => {
                    positions.insert(key.clone(), keyed.len());
                    keyed.push((key, row));
                }
            }
        }
        Rows::Keyed(keyed)
    }

    /// 🥇 The first hit, if any. Asks for `size=1` so the cluster does not send more.
    ///
    /// # Errors
    /// Same kinds as [`Query::all`].
    pub async fn one(&self, connection: &mut Connection) -> Result<Option<Value>> {
        let mut command = self.create_command(connection).await?;
        let response = found(command.search(size_option(1)).await?)?;
        Ok(hits_of(&response).into_iter().next())
    }

    /// 🔍 The full decoded response; hits are re-keyed in place when [`IndexBy`] is set.
    ///
    /// # Errors
    /// Same kinds as [`Query::all`].
    pub async fn search(&self, connection: &mut Connection, options: Options) -> Result<Value> {
        let mut command = self.create_command(connection).await?;
        let mut response = found(command.search(options).await?)?;

        if let Some(index_by) = &self.index_by {
            // -- an empty hit list stays an array; only real rows turn into an object
            let hits = response
                .get_mut("hits")
                .and_then(|h| h.get_mut("hits"))
                .and_then(Value::as_array_mut);
            if let Some(hits) = hits.filter(|h| !h.is_empty()) {
                let mut keyed = Map::new();
                for row in hits.drain(..) {
                    keyed.insert(index_by.key_for(&row), row);
                }
                response["hits"]["hits"] = Value::Object(keyed);
            }
        }
        Ok(response)
    }

    /// 🎯 One field of the first hit. `_id` is read off the hit itself.
    pub async fn scalar(&self, connection: &mut Connection, field: &str) -> Result<Option<Value>> {
        let Some(record) = self.one(connection).await? else {
            return Ok(None);
        };
        if field == "_id" {
            return Ok(record.get("_id").cloned());
        }
        if let Some(projected) = record.get("fields").and_then(|f| f.get(field)) {
            return Ok(Some(match projected {
                Value::Array(items) if items.len() == 1 => items[0].clone(),
                other => other.clone(),
            }));
        }
        Ok(record
            .get("_source")
            .and_then(|s| s.get(field))
            .filter(|v| !v.is_null())
            .cloned())
    }

    /// 📋 One field of every hit; `null` where the hit lacks it.
    pub async fn column(&self, connection: &mut Connection, field: &str) -> Result<Vec<Value>> {
        let mut command = self.create_command(connection).await?;
        command.query_parts_mut().insert("_source".into(), json!([field]));
        let response = found(command.search(Options::new()).await?)?;
        Ok(hits_of(&response)
            .iter()
            .map(|row| {
                row.get("fields")
                    .and_then(|f| f.get(field))
                    .or_else(|| row.get("_source").and_then(|s| s.get(field)))
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect())
    }

    /// 🧮 Total hits, without fetching any.
    ///
    /// # Errors
    /// Same kinds as [`Query::all`].
    pub async fn count(&self, connection: &mut Connection) -> Result<u64> {
        let mut command = self.create_command(connection).await?;
        let response = found(command.search(size_option(0)).await?)?;
        let total = response.get("hits").and_then(|h| h.get("total")).map_or(0, total_of);
        debug!("🧮 count → {total}");
        Ok(total)
    }

    /// ❓ Does anything match? One hit is enough to say yes.
    pub async fn exists(&self, connection: &mut Connection) -> Result<bool> {
        Ok(self.one(connection).await?.is_some())
    }

    /// 🗑️ Delete everything this query matches. Needs a query clause.
    ///
    /// Only the compiled `query` (and `filter`, if any) travel; `size`, `sort` and friends
    /// stay home.
    ///
    /// # Errors
    /// [`Error::QueryExecution`] before any request when there is no where-clause and no raw
    /// query. Otherwise [`Error::Transport`] or [`Error::Network`] like every other operation.
    pub async fn delete(&self, connection: &mut Connection, options: Options) -> Result<Option<Value>> {
        let mut command = self.create_command(connection).await?;
        command.delete_by_query(options).await
    }

    /// 📊 Search and wrap as rows + total + aggregations.
    ///
    /// # Errors
    /// Same kinds as [`Query::all`].
    pub async fn find(&self, connection: &mut Connection) -> Result<ElasticResult> {
        let mut command = self.create_command(connection).await?;
        let response = found(command.search(Options::new()).await?)?;
        Ok(ElasticResult::from_response(&response))
    }

    /// 💡 Run this query's suggesters on their own and return the `suggest` section.
    ///
    /// # Errors
    /// [`Error::QueryExecution`] when the cluster answers 404, otherwise the same kinds as
    /// [`Query::all`].
    pub async fn suggest(&self, connection: &mut Connection, options: Options) -> Result<Value> {
        let suggesters = Value::Object(self.suggest.clone());
        let mut command = self.create_command(connection).await?;
        command.suggest(suggesters, options).await
    }
}

fn size_option(size: u64) -> Options {
    let mut options = Options::new();
    options.insert("size".into(), json!(size));
    options
}

/// 🕳️ A missing search target is a failed query. Other failures already arrived as errors.
fn found(reply: Reply) -> Result<Value> {
    match reply {
        Reply::NotFound => Err(Error::QueryExecution(
            "Elasticsearch search query failed.".into(),
        )),
        other => Ok(other.into_value().unwrap_or(Value::Null)),
    }
}

fn hits_of(response: &Value) -> Vec<Value> {
    response
        .get("hits")
        .and_then(|h| h.get("hits"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Node;
    use wiremock::matchers::{body_json, body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn connection_to(server: &MockServer, version: u32) -> Connection {
        let address = server.uri().trim_start_matches("http://").to_string();
        Connection::new(vec![Node::new(address)])
            .with_autodetect(false)
            .with_dsl_version(version)
    }

    fn hits(rows: Value, total: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "took": 1,
            "hits": {"total": total, "hits": rows}
        }))
    }

    #[test]
    fn the_one_where_and_where_flattens_instead_of_nesting() {
        let query = Query::new()
            .and_where(Condition::eq("a", 1))
            .and_where(Condition::eq("b", 2))
            .and_where(Condition::eq("c", 3));
        match query.get_where() {
            Some(Condition::And(operands)) => assert_eq!(operands.len(), 3),
            other => panic!("💀 expected a flat and, got {other:?}"),
        }

        let mixed = Query::new()
            .where_(Condition::eq("a", 1))
            .and_where(Condition::eq("b", 2))
            .or_where(Condition::eq("c", 3));
        match mixed.get_where() {
            Some(Condition::Or(operands)) => {
                assert_eq!(operands.len(), 2);
                assert!(matches!(operands[0], Operand::Condition(Condition::And(_))));
            }
            other => panic!("💀 expected or(and, c), got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_pages_are_one_based() {
        let query = Query::new().page(3, 25);
        assert_eq!(query.get_limit(), Some(25));
        assert_eq!(query.get_offset(), Some(50));
        assert_eq!(Query::new().page(0, 10).get_offset(), Some(0));
    }

    #[test]
    fn the_one_where_rows_are_keyed_by_fields_before_source() {
        let query = Query::new().index_by("sku");
        let rows = query.populate(vec![
            json!({"_id": "1", "fields": {"sku": ["A-1"]}, "_source": {"sku": "ignored"}}),
            json!({"_id": "2", "_source": {"sku": "B-2"}}),
            json!({"_id": "3", "_source": {"sku": 7}}),
            json!({"_id": "4", "_source": {"sku": "B-2"}}),
        ]);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.get("A-1").and_then(|r| r.get("_id")), Some(&json!("1")));
        assert_eq!(rows.get("B-2").and_then(|r| r.get("_id")), Some(&json!("4")));
        assert!(rows.get("7").is_some());
    }

    #[test]
    fn the_one_where_a_closure_picks_the_key() {
        let query = Query::new().index_by_fn(|row| format!("doc-{}", row["_id"].as_str().unwrap_or("?")));
        let rows = query.populate(vec![json!({"_id": "x"})]);
        assert_eq!(rows, Rows::Keyed(vec![("doc-x".into(), json!({"_id": "x"}))]));
    }

    #[tokio::test]
    async fn the_one_where_the_whole_trip_works() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/_search"))
            .and(body_partial_json(json!({
                "query": {"constant_score": {"filter": {"bool": {"must": [
                    {"bool": {"must": [{"term": {"status": "active"}}]}},
                    {"terms": {"color": ["red", "blue"]}}
                ]}}}},
                "sort": [{"price": "desc"}],
                "size": 10
            })))
            .respond_with(hits(
                json!([{"_id": "1", "_source": {"price": 30}}, {"_id": "2", "_source": {"price": 20}}]),
                json!({"value": 2}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let rows = Query::new()
            .from("products", None)
            .where_(Condition::eq("status", "active"))
            .and_where(Condition::in_list("color", ["red", "blue"]))
            .order_by("price", SortDirection::Desc)
            .limit(10)
            .all(&mut conn)
            .await?;
        assert_eq!(rows.into_values().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_one_asks_for_a_single_hit_with_the_real_query() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/_search"))
            .and(query_param("size", "1"))
            .and(body_partial_json(json!({"query": {"constant_score": {"filter": {
                "bool": {"must": [{"term": {"email": "a@b.c"}}]}
            }}}})))
            .respond_with(hits(json!([{"_id": "abc", "_source": {"name": "Ann"}}]), json!(1)))
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let query = Query::new()
            .from("users", None)
            .where_(Condition::eq("email", "a@b.c"));

        assert_eq!(query.scalar(&mut conn, "_id").await?, Some(json!("abc")));
        assert_eq!(query.scalar(&mut conn, "name").await?, Some(json!("Ann")));
        assert_eq!(query.scalar(&mut conn, "missing").await?, None);
        assert!(query.exists(&mut conn).await?);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_scalar_prefers_the_fields_projection() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/_search"))
            .respond_with(hits(
                json!([{"_id": "abc", "fields": {"name": ["Projected"]}, "_source": {"name": "Ann"}}]),
                json!(1),
            ))
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let query = Query::new().from("users", None);
        assert_eq!(query.scalar(&mut conn, "name").await?, Some(json!("Projected")));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_count_reads_both_total_shapes() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/modern/_search"))
            .and(query_param("size", "0"))
            .respond_with(hits(json!([]), json!({"value": 42, "relation": "eq"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/legacy/_search"))
            .and(query_param("size", "0"))
            .respond_with(hits(json!([]), json!(42)))
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        assert_eq!(Query::new().from("modern", None).count(&mut conn).await?, 42);
        assert_eq!(Query::new().from("legacy", None).count(&mut conn).await?, 42);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_column_filters_source_and_fills_gaps() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/_search"))
            .and(body_partial_json(json!({"_source": ["title"]})))
            .respond_with(hits(
                json!([{"_source": {"title": "Boot"}}, {"_source": {}}]),
                json!(2),
            ))
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let titles = Query::new().from("products", None).column(&mut conn, "title").await?;
        assert_eq!(titles, vec![json!("Boot"), Value::Null]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_404_search_is_a_failed_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "no such index"})))
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let err = Query::new().from("nope", None).all(&mut conn).await.unwrap_err();
        assert!(matches!(err, Error::QueryExecution(_)), "{err:?}");
    }

    #[tokio::test]
    async fn the_one_where_search_rekeys_hits_and_find_wraps_them() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/product/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"total": 1, "hits": [{"_id": "1", "_source": {"sku": "A-1"}}]},
                "aggregations": {"colors": {"buckets": []}}
            })))
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 6);
        let query = Query::new().from("products", Some("product")).index_by("sku");
        let response = query.search(&mut conn, Options::new()).await?;
        assert_eq!(response["hits"]["hits"]["A-1"]["_id"], "1");

        let result = query.find(&mut conn).await?;
        assert_eq!(result.total(), 1);
        assert!(result.aggregations().contains_key("colors"));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_delete_sends_only_the_query() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/logs/_delete_by_query"))
            .and(body_json(json!({
                "query": {"constant_score": {"filter": {"bool": {"must": [{"term": {"level": "debug"}}]}}}}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": 12})))
            .expect(1)
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let deleted = Query::new()
            .from("logs", None)
            .where_(Condition::eq("level", "debug"))
            .limit(5)
            .delete(&mut conn, Options::new())
            .await?;
        assert_eq!(deleted, Some(json!({"deleted": 12})));
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_delete_without_a_where_refuses() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let err = Query::new()
            .from("logs", None)
            .delete(&mut conn, Options::new())
            .await
            .unwrap_err();
        match err {
            Error::QueryExecution(message) => {
                assert_eq!(message, "Cannot delete by query when no query is given.")
            }
            other => panic!("💀 expected a refused delete, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_suggesters_run_alone() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products/_search"))
            .and(body_json(json!({
                "suggest": {"fix": {"text": "shoo", "term": {"field": "title"}}},
                "size": 0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"total": {"value": 0}, "hits": []},
                "suggest": {"fix": [{"text": "shoo", "options": [{"text": "shoe"}]}]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let suggestions = Query::new()
            .from("products", None)
            .add_suggester("fix", json!({"text": "shoo", "term": {"field": "title"}}))
            .suggest(&mut conn, Options::new())
            .await?;
        assert_eq!(suggestions["fix"][0]["options"][0]["text"], "shoe");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_active_products_come_with_a_cheapest_price() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products/_search"))
            .and(body_partial_json(json!({
                "query": {"constant_score": {"filter": {"bool": {"must": [{"term": {"status": "active"}}]}}}},
                "aggregations": {"price_min": {"min": {"field": "price"}}},
                "size": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {"total": {"value": 3}, "hits": [
                    {"_id": "1", "_source": {"price": 10000}},
                    {"_id": "2", "_source": {"price": 15000}},
                    {"_id": "3", "_source": {"price": 20000}}
                ]},
                "aggregations": {"price_min": {"value": 10000}}
            })))
            .expect(2)
            .mount(&server)
            .await;

        let mut conn = connection_to(&server, 7);
        let query = Query::new()
            .from("products", None)
            .and_where(Condition::eq("status", "active"))
            .add_aggregate("price_min", json!({"min": {"field": "price"}}))
            .limit(10);

        assert_eq!(query.all(&mut conn).await?.len(), 3);
        let result = query.find(&mut conn).await?;
        assert_eq!(result.total(), 3);
        assert_eq!(result.rows().len(), 3);
        assert_eq!(result.aggregations()["price_min"], json!({"value": 10000}));
        Ok(())
    }
}
