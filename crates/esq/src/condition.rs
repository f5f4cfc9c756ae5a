//! 🌳 The condition AST: logical predicates over document fields.
//!
//! Two shapes, same as the array syntax callers already write:
//! - hash: `{"status": "active", "tags": ["a", "b"], "deleted_at": null}`
//!   (equality, membership, absence; all AND'ed)
//! - operator: `["and", {...}, ["in", "color", ["red", "blue"]]]`
//!
//! [`Condition::from_value`] parses the JSON form and rejects malformed operand counts and
//! unknown operators right there. What survives parsing is well-formed, and whether it
//! is *expressible* is the compiler's call (composite `in`, `like`, `_id` ranges).
//! Conditions are immutable values; nothing downstream mutates them.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// 🌳 One node of a condition tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Value")]
pub enum Condition {
    /// `field → value` pairs, AND'ed. Scalars are equality, arrays membership, null absence.
    Hash(Vec<(String, Value)>),
    Not(Box<Operand>),
    And(Vec<Operand>),
    Or(Vec<Operand>),
    /// Inclusive range, optionally negated.
    Between {
        field: String,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// Membership. More than one field is composite membership, which the compiler refuses.
    In {
        fields: Vec<String>,
        values: Vec<Value>,
        negated: bool,
    },
    Range {
        field: String,
        op: RangeOp,
        value: Value,
    },
    /// Kept only so it can be refused loudly; exact-match indices have no `LIKE`.
    Like { operator: String },
}

/// An operand: a nested condition, or a raw DSL value passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Condition(Condition),
    Raw(Value),
}

/// 📏 Half-bounded range operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeOp {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl RangeOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
        }
    }

    /// Accepts the word forms and the symbolic aliases.
    pub fn parse(operator: &str) -> Option<RangeOp> {
        match operator {
            "lt" | "<" => Some(RangeOp::Lt),
            "lte" | "<=" => Some(RangeOp::Lte),
            "gt" | ">" => Some(RangeOp::Gt),
            "gte" | ">=" => Some(RangeOp::Gte),
            _ => None,
        }
    }
}

impl From<Condition> for Operand {
    fn from(condition: Condition) -> Self {
        Operand::Condition(condition)
    }
}

impl Condition {
    /// 🏗️ A hash condition from `(field, value)` pairs.
    pub fn hash<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Condition::Hash(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// `field = value`
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Hash(vec![(field.into(), value.into())])
    }

    pub fn not(condition: Condition) -> Self {
        Condition::Not(Box::new(Operand::Condition(condition)))
    }

    pub fn and(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::And(conditions.into_iter().map(Operand::Condition).collect())
    }

    pub fn or(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::Or(conditions.into_iter().map(Operand::Condition).collect())
    }

    pub fn between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Condition::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            negated: false,
        }
    }

    pub fn not_between(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Condition::Between {
            field: field.into(),
            low: low.into(),
            high: high.into(),
            negated: true,
        }
    }

    pub fn in_list<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In {
            fields: vec![field.into()],
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<V: Into<Value>>(field: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In {
            fields: vec![field.into()],
            values: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn range(field: impl Into<String>, op: RangeOp, value: impl Into<Value>) -> Self {
        Condition::Range {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Lte, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::range(field, RangeOp::Gte, value)
    }

    /// An empty hash: no constraint at all.
    pub fn is_empty(&self) -> bool {
        matches!(self, Condition::Hash(pairs) if pairs.is_empty())
    }

    /// 🔍 Parse the JSON form: an object is a hash, an array is `[operator, ...operands]`.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Condition::Hash(Vec::new())),
            Value::Object(map) => Ok(Condition::Hash(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            Value::Array(items) if items.is_empty() => Ok(Condition::Hash(Vec::new())),
            Value::Array(items) => parse_operator(items),
            _ => Err(Error::unsupported(
                "String conditions in where() are not supported by Elasticsearch.",
            )),
        }
    }
}

impl TryFrom<Value> for Condition {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Condition::from_value(&value)
    }
}

fn parse_operator(items: &[Value]) -> Result<Condition> {
    let operator = items[0]
        .as_str()
        .ok_or_else(|| {
            Error::unsupported(format!(
                "Operator conditions must start with an operator name, found {}",
                items[0]
            ))
        })?
        .to_lowercase();
    let operands = &items[1..];

    match operator.as_str() {
        "not" => {
            if operands.len() != 1 {
                return Err(Error::unsupported(format!(
                    "Operator '{operator}' requires exactly one operand."
                )));
            }
            Ok(Condition::Not(Box::new(parse_operand(&operands[0])?)))
        }
        "and" | "or" => {
            let parsed = operands.iter().map(parse_operand).collect::<Result<Vec<_>>>()?;
            Ok(if operator == "and" {
                Condition::And(parsed)
            } else {
                Condition::Or(parsed)
            })
        }
        "between" | "not between" => {
            let [field, low, high] = required::<3>(&operator, operands, "three operands")?;
            Ok(Condition::Between {
                field: field_name(&operator, field)?,
                low: low.clone(),
                high: high.clone(),
                negated: operator == "not between",
            })
        }
        "in" | "not in" => {
            let [fields, values] =
                required::<2>(&operator, operands, "array of two operands: column and values")?;
            Ok(Condition::In {
                fields: field_list(&operator, fields)?,
                values: value_list(values),
                negated: operator == "not in",
            })
        }
        "like" | "not like" | "or like" | "or not like" => Ok(Condition::Like { operator }),
        other => match RangeOp::parse(other) {
            Some(op) => {
                let [field, value] = required::<2>(&operator, operands, "two operands")?;
                Ok(Condition::Range {
                    field: field_name(&operator, field)?,
                    op,
                    value: value.clone(),
                })
            }
            None => Err(Error::unsupported(format!(
                "Found unknown operator in query: {other}"
            ))),
        },
    }
}

/// Exactly `N` non-null operands, or an error naming what was expected.
fn required<'a, const N: usize>(
    operator: &str,
    operands: &'a [Value],
    expected: &str,
) -> Result<[&'a Value; N]> {
    let missing = || Error::unsupported(format!("Operator '{operator}' requires {expected}."));
    if operands.len() < N || operands[..N].iter().any(Value::is_null) {
        return Err(missing());
    }
    let mut out = [&Value::Null; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = operand;
    }
    Ok(out)
}

fn parse_operand(value: &Value) -> Result<Operand> {
    match value {
        Value::Array(_) | Value::Object(_) => Ok(Operand::Condition(Condition::from_value(value)?)),
        other => Ok(Operand::Raw(other.clone())),
    }
}

fn field_name(operator: &str, value: &Value) -> Result<String> {
    value.as_str().map(str::to_owned).ok_or_else(|| {
        Error::unsupported(format!(
            "Operator '{operator}' expects a field name, found {value}"
        ))
    })
}

fn field_list(operator: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Array(items) => items.iter().map(|item| field_name(operator, item)).collect(),
        other => Ok(vec![field_name(operator, other)?]),
    }
}

/// A scalar becomes a one-element list; an object contributes its values.
fn value_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.clone(),
        Value::Object(map) => map.values().cloned().collect(),
        scalar => vec![scalar.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_objects_are_hashes() -> Result<()> {
        let condition = Condition::from_value(&json!({"status": "active", "deleted_at": null}))?;
        assert_eq!(
            condition,
            Condition::hash([("status", json!("active")), ("deleted_at", Value::Null)])
        );
        Ok(())
    }

    #[test]
    fn the_one_where_operators_are_case_insensitive() -> Result<()> {
        let condition = Condition::from_value(&json!(["NOT IN", "color", ["red"]]))?;
        assert_eq!(condition, Condition::not_in_list("color", ["red"]));
        Ok(())
    }

    #[test]
    fn the_one_where_nested_operands_are_parsed_and_scalars_stay_raw() -> Result<()> {
        let condition = Condition::from_value(&json!(["or", {"a": 1}, [">=", "b", 2], "raw"]))?;
        assert_eq!(
            condition,
            Condition::Or(vec![
                Operand::Condition(Condition::eq("a", 1)),
                Operand::Condition(Condition::gte("b", 2)),
                Operand::Raw(json!("raw")),
            ])
        );
        Ok(())
    }

    #[test]
    fn the_one_where_operand_counts_are_enforced() {
        for bad in [
            json!(["not"]),
            json!(["not", {"a": 1}, {"b": 2}]),
            json!(["between", "price", 1]),
            json!(["between", "price", null, 10]),
            json!(["in", "color"]),
            json!(["<", "price"]),
        ] {
            let err = Condition::from_value(&bad).unwrap_err();
            assert!(matches!(err, Error::UnsupportedCondition(_)), "{bad} → {err:?}");
        }
    }

    #[test]
    fn the_one_where_unknown_operators_are_rejected_at_parse_time() {
        let err = Condition::from_value(&json!(["xor", {"a": 1}, {"b": 2}])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unsupported condition: Found unknown operator in query: xor"
        );
    }

    #[test]
    fn the_one_where_strings_are_not_conditions() {
        assert!(Condition::from_value(&json!("status = 'active'")).is_err());
    }

    #[test]
    fn the_one_where_in_values_are_normalized() -> Result<()> {
        let scalar = Condition::from_value(&json!(["in", ["sku"], "A-1"]))?;
        assert_eq!(scalar, Condition::in_list("sku", ["A-1"]));

        let nothing = Condition::from_value(&json!(["in", "sku", []]))?;
        assert_eq!(nothing, Condition::in_list("sku", Vec::<Value>::new()));
        Ok(())
    }

    #[test]
    fn the_one_where_like_survives_parsing_to_be_refused_later() -> Result<()> {
        let condition = Condition::from_value(&json!(["or not like", "title", "%shoe%"]))?;
        assert_eq!(
            condition,
            Condition::Like {
                operator: "or not like".into()
            }
        );
        Ok(())
    }

    #[test]
    fn the_one_where_serde_speaks_conditions() -> Result<()> {
        let condition: Condition = serde_json::from_str(r#"["between", "price", 10, 20]"#)?;
        assert_eq!(condition, Condition::between("price", 10, 20));
        Ok(())
    }
}
