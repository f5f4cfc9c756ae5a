//! 📊 ElasticResult: a search response, reduced to what callers actually read.

use serde_json::{Map, Value};

/// 📊 Rows, total hits and aggregations of one search response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElasticResult {
    rows: Vec<Value>,
    total: u64,
    aggregations: Map<String, Value>,
}

impl ElasticResult {
    /// 🔍 Read `hits.hits`, `hits.total` and `aggregations`, defaulting each when absent.
    ///
    /// `hits.total` is an object with a `value` on 7+, a bare integer before.
    pub fn from_response(response: &Value) -> Self {
        let hits = response.get("hits");
        let rows = hits
            .and_then(|h| h.get("hits"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let total = hits.and_then(|h| h.get("total")).map_or(0, total_of);
        let aggregations = response
            .get("aggregations")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self {
            rows,
            total,
            aggregations,
        }
    }

    pub fn rows(&self) -> &[Value] {
        &self.rows
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn aggregations(&self) -> &Map<String, Value> {
        &self.aggregations
    }

    pub fn into_rows(self) -> Vec<Value> {
        self.rows
    }

    /// `(name, result)` per aggregation, in response order.
    pub fn aggregation_entries(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.aggregations.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// `{"value": n}` or plain `n`; anything else counts as zero.
pub(crate) fn total_of(total: &Value) -> u64 {
    match total {
        Value::Object(map) => map.get("value").and_then(Value::as_u64).unwrap_or(0),
        other => other.as_u64().unwrap_or(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_everything_is_where_it_should_be() {
        let result = ElasticResult::from_response(&json!({
            "hits": {"total": {"value": 2, "relation": "eq"}, "hits": [{"_id": "1"}, {"_id": "2"}]},
            "aggregations": {"colors": {"buckets": []}, "avg_price": {"value": 9.5}}
        }));
        assert_eq!(result.total(), 2);
        assert_eq!(result.rows().len(), 2);
        let names: Vec<&str> = result.aggregation_entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["colors", "avg_price"]);
    }

    #[test]
    fn the_one_where_the_old_total_is_a_bare_number() {
        let result = ElasticResult::from_response(&json!({"hits": {"total": 42, "hits": []}}));
        assert_eq!(result.total(), 42);
        assert!(result.rows().is_empty());
    }

    #[test]
    fn the_one_where_an_empty_response_is_still_a_result() {
        let result = ElasticResult::from_response(&json!({}));
        assert_eq!(result, ElasticResult::default());
        assert!(result.into_rows().is_empty());
    }
}
