//! Metadata filters understood by every index backend.
//!
//! A filter maps a metadata field to either an exact value or a set of
//! accepted values. The JSON shape mirrors the usual vector-store dialect:
//! `{"file_type": "pdf", "doc_id": {"$in": ["a", "b"]}}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::types::Meta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawCondition", into = "RawCondition")]
pub enum Condition {
    Eq(Value),
    In(Vec<Value>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawCondition {
    In {
        #[serde(rename = "$in")]
        values: Vec<Value>,
    },
    Eq {
        #[serde(rename = "$eq")]
        value: Value,
    },
    Exact(Value),
}

impl From<RawCondition> for Condition {
    fn from(raw: RawCondition) -> Self {
        match raw {
            RawCondition::In { values } => Self::In(values),
            RawCondition::Eq { value } | RawCondition::Exact(value) => Self::Eq(value),
        }
    }
}

impl From<Condition> for RawCondition {
    fn from(c: Condition) -> Self {
        match c {
            Condition::Eq(value) => Self::Exact(value),
            Condition::In(values) => Self::In { values },
        }
    }
}

impl Condition {
    pub fn matches(&self, actual: Option<&Value>) -> bool {
        let Some(actual) = actual else { return false };
        match self {
            Self::Eq(expected) => values_equal(expected, actual),
            Self::In(accepted) => accepted.iter().any(|v| values_equal(v, actual)),
        }
    }
}

/// Numbers compare by value so `1` and `1.0` are the same chunk index.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    conditions: BTreeMap<String, Condition>,
}

impl Filter {
    pub fn new() -> Self { Self::default() }

    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), Condition::Eq(value.into()));
        self
    }

    #[must_use]
    pub fn any_of<I, V>(mut self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.conditions.insert(field.into(), Condition::In(values.into_iter().map(Into::into).collect()));
        self
    }

    /// Restricts results to the given documents and file types. Empty slices add no condition.
    pub fn documents(doc_ids: &[String], file_types: &[String]) -> Self {
        let mut filter = Self::new();
        if !doc_ids.is_empty() {
            filter = filter.any_of("doc_id", doc_ids.iter().cloned());
        }
        if !file_types.is_empty() {
            filter = filter.any_of("file_type", file_types.iter().cloned());
        }
        filter
    }

    /// Merges caller conditions with the mandatory ownership condition.
    ///
    /// Whatever the caller says about `scope_field` is discarded.
    pub fn scoped(caller: Option<&Filter>, scope_field: &str, scope_key: &str) -> Self {
        let mut merged = caller.cloned().unwrap_or_default();
        if let Some(attempted) = merged.conditions.remove(scope_field) {
            warn!(field = scope_field, attempted = ?attempted, "Ignoring caller filter on scope field");
        }
        merged.eq(scope_field, scope_key)
    }

    pub fn get(&self, field: &str) -> Option<&Condition> { self.conditions.get(field) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> { self.conditions.iter().map(|(k, v)| (k.as_str(), v)) }

    pub fn is_empty(&self) -> bool { self.conditions.is_empty() }

    pub fn len(&self) -> usize { self.conditions.len() }

    pub fn matches(&self, metadata: &Meta) -> bool {
        self.conditions.iter().all(|(field, cond)| cond.matches(metadata.get(field)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_by_value() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!(1), &json!("1")));
    }

    #[test]
    fn missing_field_never_matches() {
        let cond = Condition::In(vec![json!("a")]);
        assert!(!cond.matches(None));
    }
}
