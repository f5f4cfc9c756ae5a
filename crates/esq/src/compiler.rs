//! 🧮 The compiler: condition trees and query parts in, search DSL out.
//!
//! 🧠 Knowledge graph:
//! - [`QueryBuilder::build_condition`] is the recursive heart. `Ok(None)` means "no
//!   constraint", which is different from "matches nothing" ([`always_false`]).
//! - [`QueryBuilder::build`] assembles a whole [`CompiledQuery`]: request body parts,
//!   index/type binding and URL options.
//! - The only version knob here is `_id` → `_uid` in ranges and sorts before 7.
//!
//! Everything is pure: no I/O, no connection, same input same output.

use serde_json::{Map, Value, json};

use crate::common::{DslVersion, Options};
use crate::condition::{Condition, Operand, RangeOp};
use crate::error::{Error, Result};
use crate::query::{Query, SortDirection};

/// 📦 The compiled form of a [`Query`]: search body parts plus where to send them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledQuery {
    /// Request body parts, in the order the engine documents them.
    pub body: Map<String, Value>,
    pub index: Option<String>,
    pub doc_type: Option<String>,
    /// URL options (timeout lands here, not in the body).
    pub options: Options,
}

impl CompiledQuery {
    /// Does the body carry a `query` clause?
    pub fn has_query(&self) -> bool {
        self.body.contains_key("query")
    }
}

/// `must_not: [match_all]`: matches nothing, on every version.
pub fn always_false() -> Value {
    json!({"bool": {"must_not": [{"match_all": {}}]}})
}

fn missing_field(field: &str) -> Value {
    json!({"bool": {"must_not": {"exists": {"field": field}}}})
}

fn negate(filter: Value) -> Value {
    json!({"bool": {"must_not": filter}})
}

/// 🧮 Compiles queries for one DSL version.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder {
    version: DslVersion,
}

impl QueryBuilder {
    pub fn new(version: DslVersion) -> Self {
        Self { version }
    }

    pub fn version(&self) -> DslVersion {
        self.version
    }

    /// 🏗️ Compile a full query.
    pub fn build(&self, query: &Query) -> Result<CompiledQuery> {
        let mut body = Map::new();

        if let Some(stored_fields) = &query.stored_fields {
            body.insert("stored_fields".into(), stored_fields.clone());
        }
        if let Some(script_fields) = &query.script_fields {
            body.insert("script_fields".into(), script_fields.clone());
        }
        if let Some(source) = &query.source {
            body.insert("_source".into(), source.clone());
        }
        if let Some(limit) = query.limit {
            body.insert("size".into(), json!(limit));
        }
        if let Some(offset) = query.offset.filter(|o| *o > 0) {
            body.insert("from".into(), json!(offset));
        }
        if let Some(min_score) = query.min_score {
            body.insert("min_score".into(), json!(min_score));
        }
        if let Some(explain) = query.explain {
            body.insert("explain".into(), json!(explain));
        }

        let mut clauses = Vec::with_capacity(2);
        if let Some(filter) = self.build_query_from_where(query.where_.as_ref())? {
            clauses.push(filter);
        }
        if let Some(raw) = query.query.as_ref().filter(|q| !is_empty_value(q)) {
            clauses.push(raw.clone());
        }
        match clauses.len() {
            0 => {}
            1 => {
                body.insert("query".into(), clauses.remove(0));
            }
            _ => {
                body.insert("query".into(), json!({"bool": {"must": clauses}}));
            }
        }

        if let Some(highlight) = query.highlight.as_ref().filter(|v| !is_empty_value(v)) {
            body.insert("highlight".into(), highlight.clone());
        }
        if !query.aggregations.is_empty() {
            body.insert("aggregations".into(), Value::Object(query.aggregations.clone()));
        }
        if let Some(stats) = query.stats.as_ref().filter(|v| !is_empty_value(v)) {
            body.insert("stats".into(), stats.clone());
        }
        if !query.suggest.is_empty() {
            body.insert("suggest".into(), Value::Object(query.suggest.clone()));
        }
        if let Some(post_filter) = query.post_filter.as_ref().filter(|v| !is_empty_value(v)) {
            body.insert("post_filter".into(), post_filter.clone());
        }
        if let Some(collapse) = query.collapse.as_ref().filter(|v| !is_empty_value(v)) {
            body.insert("collapse".into(), collapse.clone());
        }

        let sort = self.build_order_by(&query.order_by);
        if !sort.is_empty() {
            body.insert("sort".into(), Value::Array(sort));
        }

        let mut options = query.options.clone();
        if let Some(timeout) = &query.timeout {
            options.insert("timeout".into(), Value::String(timeout.clone()));
        }

        Ok(CompiledQuery {
            body,
            index: query.index.clone(),
            doc_type: query.doc_type.clone(),
            options,
        })
    }

    /// 🔃 `[(field, direction)]` → `[{field: "asc"}]`. Custom specs pass through.
    pub fn build_order_by(&self, order_by: &[(String, SortDirection)]) -> Vec<Value> {
        order_by
            .iter()
            .map(|(field, direction)| {
                let field = self.version.rangeable_field(field);
                let spec = match direction {
                    SortDirection::Asc => json!("asc"),
                    SortDirection::Desc => json!("desc"),
                    SortDirection::Custom(spec) => spec.clone(),
                };
                let mut entry = Map::new();
                entry.insert(field.to_string(), spec);
                Value::Object(entry)
            })
            .collect()
    }

    /// 🎯 A where-clause becomes a non-scoring filter.
    pub fn build_query_from_where(&self, condition: Option<&Condition>) -> Result<Option<Value>> {
        let Some(condition) = condition else {
            return Ok(None);
        };
        Ok(self
            .build_condition(condition)?
            .map(|filter| json!({"constant_score": {"filter": filter}})))
    }

    /// 🌳 Compile one condition node. `None` means the node constrains nothing.
    pub fn build_condition(&self, condition: &Condition) -> Result<Option<Value>> {
        match condition {
            Condition::Hash(pairs) if pairs.is_empty() => Ok(None),
            Condition::Hash(pairs) => Ok(Some(self.build_hash_condition(pairs))),
            Condition::Not(operand) => Ok(self.build_operand(operand)?.map(negate)),
            Condition::And(operands) => self.build_bool_condition("must", operands),
            Condition::Or(operands) => self.build_bool_condition("should", operands),
            Condition::Between {
                field,
                low,
                high,
                negated,
            } => self.build_between_condition(field, low, high, *negated).map(Some),
            Condition::In {
                fields,
                values,
                negated,
            } => self.build_in_condition(fields, values, *negated),
            Condition::Range { field, op, value } => Ok(Some(self.build_range_condition(field, *op, value))),
            Condition::Like { operator } => Err(Error::unsupported(format!(
                "{operator} conditions are not supported by Elasticsearch."
            ))),
        }
    }

    fn build_operand(&self, operand: &Operand) -> Result<Option<Value>> {
        match operand {
            Operand::Condition(condition) => self.build_condition(condition),
            Operand::Raw(value) if is_empty_value(value) => Ok(None),
            Operand::Raw(value) => Ok(Some(value.clone())),
        }
    }

    fn build_hash_condition(&self, pairs: &[(String, Value)]) -> Value {
        let mut must = Vec::with_capacity(pairs.len());
        let mut absent = Vec::new();

        for (field, value) in pairs {
            if field == "_id" {
                must.push(match value {
                    Value::Null => always_false(),
                    Value::Array(ids) => json!({"ids": {"values": ids}}),
                    id => json!({"ids": {"values": [id]}}),
                });
            } else {
                match value {
                    Value::Array(_) => must.push(json!({"terms": {field.as_str(): value}})),
                    Value::Null => absent.push(json!({"exists": {"field": field}})),
                    _ => must.push(json!({"term": {field.as_str(): value}})),
                }
            }
        }

        let mut clause = Map::new();
        clause.insert("must".into(), Value::Array(must));
        if !absent.is_empty() {
            clause.insert("must_not".into(), Value::Array(absent));
        }
        json!({"bool": clause})
    }

    fn build_bool_condition(&self, occurrence: &str, operands: &[Operand]) -> Result<Option<Value>> {
        let mut parts = Vec::with_capacity(operands.len());
        for operand in operands {
            if let Some(part) = self.build_operand(operand)? {
                parts.push(part);
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(json!({"bool": {occurrence: parts}})))
    }

    fn build_between_condition(&self, field: &str, low: &Value, high: &Value, negated: bool) -> Result<Value> {
        if field == "_id" {
            return Err(Error::unsupported(
                "Between condition is not supported for the _id field.",
            ));
        }
        let filter = json!({"range": {field: {"gte": low, "lte": high}}});
        Ok(if negated { negate(filter) } else { filter })
    }

    fn build_in_condition(&self, fields: &[String], values: &[Value], negated: bool) -> Result<Option<Value>> {
        if values.is_empty() || fields.is_empty() {
            return Ok(if negated { None } else { Some(always_false()) });
        }
        if fields.len() > 1 {
            return Err(Error::unsupported(
                "Composite in is not supported by Elasticsearch.",
            ));
        }
        let field = fields[0].as_str();

        // -- rows (objects) contribute their own value for the field; nulls mean "or absent"
        let mut can_be_null = false;
        let mut present = Vec::with_capacity(values.len());
        for value in values {
            let value = match value {
                Value::Object(row) => row.get(field).cloned().unwrap_or(Value::Null),
                Value::Array(_) => Value::Null,
                scalar => scalar.clone(),
            };
            if value.is_null() {
                can_be_null = true;
            } else {
                present.push(value);
            }
        }

        let filter = if field == "_id" {
            if present.is_empty() && can_be_null {
                always_false()
            } else {
                let ids = json!({"ids": {"values": present}});
                if can_be_null {
                    json!({"bool": {"should": [ids, missing_field(field)]}})
                } else {
                    ids
                }
            }
        } else if present.is_empty() && can_be_null {
            missing_field(field)
        } else {
            let terms = json!({"terms": {field: present}});
            if can_be_null {
                json!({"bool": {"should": [terms, missing_field(field)]}})
            } else {
                terms
            }
        };

        Ok(Some(if negated { negate(filter) } else { filter }))
    }

    fn build_range_condition(&self, field: &str, op: RangeOp, value: &Value) -> Value {
        let field = self.version.rangeable_field(field);
        json!({"range": {field: {op.as_str(): value}}})
    }
}

/// 🧮 Compile a lone condition, no query around it.
pub fn compile(condition: &Condition, version: DslVersion) -> Result<Option<Value>> {
    QueryBuilder::new(version).build_condition(condition)
}

/// Empty the way a request body cares about: null, false, "", 0, [] or {}.
fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v5() -> QueryBuilder {
        QueryBuilder::new(DslVersion(5))
    }

    fn v7() -> QueryBuilder {
        QueryBuilder::new(DslVersion(7))
    }

    #[test]
    fn the_one_where_a_hash_covers_equality_membership_and_absence() -> Result<()> {
        let condition = Condition::hash([
            ("status", json!("active")),
            ("tags", json!(["a", "b"])),
            ("deleted_at", Value::Null),
        ]);
        assert_eq!(
            v7().build_condition(&condition)?,
            Some(json!({"bool": {
                "must": [
                    {"term": {"status": "active"}},
                    {"terms": {"tags": ["a", "b"]}}
                ],
                "must_not": [{"exists": {"field": "deleted_at"}}]
            }}))
        );
        Ok(())
    }

    #[test]
    fn the_one_where_ids_get_their_own_query() -> Result<()> {
        let one = v5().build_condition(&Condition::eq("_id", "a1"))?;
        assert_eq!(one, Some(json!({"bool": {"must": [{"ids": {"values": ["a1"]}}]}})));

        let none = v5().build_condition(&Condition::eq("_id", Value::Null))?;
        assert_eq!(none, Some(json!({"bool": {"must": [always_false()]}})));
        Ok(())
    }

    #[test]
    fn the_one_where_empty_means_unconstrained() -> Result<()> {
        assert_eq!(v7().build_condition(&Condition::Hash(vec![]))?, None);
        assert_eq!(v7().build_condition(&Condition::And(vec![]))?, None);
        assert_eq!(v7().build_query_from_where(None)?, None);
        Ok(())
    }

    #[test]
    fn the_one_where_in_with_nothing_matches_nothing_and_not_in_matches_everything() -> Result<()> {
        let empty: Vec<Value> = vec![];
        assert_eq!(
            v7().build_condition(&Condition::in_list("color", empty.clone()))?,
            Some(always_false())
        );
        assert_eq!(v7().build_condition(&Condition::not_in_list("color", empty))?, None);
        Ok(())
    }

    #[test]
    fn the_one_where_in_with_a_null_also_accepts_missing_fields() -> Result<()> {
        let compiled = v7().build_condition(&Condition::in_list("color", [json!("red"), Value::Null]))?;
        assert_eq!(
            compiled,
            Some(json!({"bool": {"should": [
                {"terms": {"color": ["red"]}},
                {"bool": {"must_not": {"exists": {"field": "color"}}}}
            ]}}))
        );

        let only_null = v7().build_condition(&Condition::in_list("color", [Value::Null]))?;
        assert_eq!(only_null, Some(missing_field("color")));

        let only_null_id = v7().build_condition(&Condition::in_list("_id", [Value::Null]))?;
        assert_eq!(only_null_id, Some(always_false()));
        Ok(())
    }

    #[test]
    fn the_one_where_in_reads_the_field_out_of_rows() -> Result<()> {
        let compiled = v7().build_condition(&Condition::in_list(
            "sku",
            [json!({"sku": "A-1", "qty": 2}), json!({"sku": "B-2"})],
        ))?;
        assert_eq!(compiled, Some(json!({"terms": {"sku": ["A-1", "B-2"]}})));
        Ok(())
    }

    #[test]
    fn the_one_where_not_in_wraps_in_must_not() -> Result<()> {
        let compiled = v7().build_condition(&Condition::not_in_list("_id", ["x", "y"]))?;
        assert_eq!(
            compiled,
            Some(json!({"bool": {"must_not": {"ids": {"values": ["x", "y"]}}}}))
        );
        Ok(())
    }

    #[test]
    fn the_one_where_composite_in_is_refused() {
        let condition = Condition::In {
            fields: vec!["a".into(), "b".into()],
            values: vec![json!({"a": 1, "b": 2})],
            negated: false,
        };
        let err = v7().build_condition(&condition).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCondition(_)), "{err:?}");
    }

    #[test]
    fn the_one_where_between_is_inclusive_and_negatable() -> Result<()> {
        assert_eq!(
            v7().build_condition(&Condition::between("price", 10, 20))?,
            Some(json!({"range": {"price": {"gte": 10, "lte": 20}}}))
        );
        assert_eq!(
            v7().build_condition(&Condition::not_between("price", 10, 20))?,
            Some(json!({"bool": {"must_not": {"range": {"price": {"gte": 10, "lte": 20}}}}}))
        );
        assert!(v7().build_condition(&Condition::between("_id", 1, 2)).is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_id_ranges_become_uid_before_seven() -> Result<()> {
        let condition = Condition::lt("_id", 100);
        assert_eq!(
            v5().build_condition(&condition)?,
            Some(json!({"range": {"_uid": {"lt": 100}}}))
        );
        assert_eq!(
            v7().build_condition(&condition)?,
            Some(json!({"range": {"_id": {"lt": 100}}}))
        );
        Ok(())
    }

    #[test]
    fn the_one_where_and_or_skip_the_empties() -> Result<()> {
        let condition = Condition::Or(vec![
            Operand::Condition(Condition::Hash(vec![])),
            Operand::Condition(Condition::eq("a", 1)),
            Operand::Raw(json!({"match": {"title": "shoe"}})),
            Operand::Raw(json!("")),
        ]);
        assert_eq!(
            v7().build_condition(&condition)?,
            Some(json!({"bool": {"should": [
                {"bool": {"must": [{"term": {"a": 1}}]}},
                {"match": {"title": "shoe"}}
            ]}}))
        );
        Ok(())
    }

    #[test]
    fn the_one_where_not_negates_raw_and_nested_alike() -> Result<()> {
        let raw = Condition::Not(Box::new(Operand::Raw(json!({"match_all": {}}))));
        assert_eq!(
            v7().build_condition(&raw)?,
            Some(json!({"bool": {"must_not": {"match_all": {}}}}))
        );
        let nested = Condition::not(Condition::gte("age", 18));
        assert_eq!(
            v7().build_condition(&nested)?,
            Some(json!({"bool": {"must_not": {"range": {"age": {"gte": 18}}}}}))
        );
        Ok(())
    }

    #[test]
    fn the_one_where_like_is_a_hard_no() {
        let err = v7()
            .build_condition(&Condition::Like {
                operator: "like".into(),
            })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported condition: like conditions are not supported by Elasticsearch."
        );
    }

    #[test]
    fn the_one_where_the_whole_query_comes_together() -> Result<()> {
        let query = Query::new()
            .from("products", None)
            .where_(Condition::eq("status", "active"))
            .and_where(Condition::in_list("color", ["red", "blue"]))
            .order_by("price", SortDirection::Desc)
            .limit(10)
            .offset(20)
            .timeout("5s");
        let compiled = v7().build(&query)?;

        assert_eq!(compiled.index.as_deref(), Some("products"));
        assert_eq!(compiled.options["timeout"], "5s");
        assert_eq!(
            Value::Object(compiled.body),
            json!({
                "size": 10,
                "from": 20,
                "query": {"constant_score": {"filter": {"bool": {"must": [
                    {"bool": {"must": [{"term": {"status": "active"}}]}},
                    {"terms": {"color": ["red", "blue"]}}
                ]}}}},
                "sort": [{"price": "desc"}]
            })
        );
        Ok(())
    }

    #[test]
    fn the_one_where_where_and_raw_query_are_both_required() -> Result<()> {
        let query = Query::new()
            .where_(Condition::eq("a", 1))
            .query(json!({"match": {"title": "shoe"}}));
        let compiled = v7().build(&query)?;
        assert_eq!(
            compiled.body["query"],
            json!({"bool": {"must": [
                {"constant_score": {"filter": {"bool": {"must": [{"term": {"a": 1}}]}}}},
                {"match": {"title": "shoe"}}
            ]}})
        );

        let raw_only = v7().build(&Query::new().query(json!({"match_all": {}})))?;
        assert_eq!(raw_only.body["query"], json!({"match_all": {}}));
        Ok(())
    }

    #[test]
    fn the_one_where_zero_offset_and_empty_parts_stay_home() -> Result<()> {
        let compiled = v7().build(&Query::new().offset(0).highlight(json!({})))?;
        assert!(compiled.body.is_empty(), "{:?}", compiled.body);
        assert!(!compiled.has_query());
        Ok(())
    }

    #[test]
    fn the_one_where_sorting_by_id_is_legacy_before_seven() {
        let order = vec![
            ("_id".to_string(), SortDirection::Asc),
            ("_score".to_string(), SortDirection::Custom(json!({"order": "desc"}))),
        ];
        assert_eq!(
            v5().build_order_by(&order),
            vec![json!({"_uid": "asc"}), json!({"_score": {"order": "desc"}})]
        );
        assert_eq!(v7().build_order_by(&order)[0], json!({"_id": "asc"}));
    }

    #[test]
    fn the_one_where_compilation_is_deterministic() -> Result<()> {
        let condition = Condition::from_value(&json!(["and", {"a": [1, 2]}, ["not in", "b", [3, null]]]))?;
        assert_eq!(compile(&condition, DslVersion(6))?, compile(&condition, DslVersion(6))?);
        Ok(())
    }
}
