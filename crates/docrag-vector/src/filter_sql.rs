//! Compiles a metadata `Filter` into a Lance SQL predicate.

use anyhow::{bail, Result};
use serde_json::Value;

use docrag_core::filter::{Condition, Filter};
use docrag_core::types::ChunkId;

use crate::schema::{is_identifier, ChunkSchema, ID_COLUMN};

/// `None` for an empty filter. Fields must be known columns.
pub fn to_sql(filter: &Filter, schema: &ChunkSchema) -> Result<Option<String>> {
    let mut clauses = Vec::with_capacity(filter.len());
    for (field, condition) in filter.iter() {
        if !is_identifier(field) || schema.kind_of(field).is_none() {
            bail!("cannot filter on unknown field '{field}'");
        }
        clauses.push(match condition {
            Condition::Eq(Value::Null) => format!("{field} IS NULL"),
            Condition::Eq(value) => format!("{field} = {}", literal(value)?),
            Condition::In(values) if values.is_empty() => "false".to_string(),
            Condition::In(values) => {
                let items = values.iter().map(literal).collect::<Result<Vec<_>>>()?;
                format!("{field} IN ({})", items.join(", "))
            }
        });
    }
    Ok((!clauses.is_empty()).then(|| clauses.join(" AND ")))
}

pub fn ids_predicate(ids: &[ChunkId]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let quoted: Vec<String> = ids.iter().map(|id| quote(id)).collect();
    Some(format!("{ID_COLUMN} IN ({})", quoted.join(", ")))
}

fn literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::String(s) => quote(s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "NULL".to_string(),
        Value::Array(_) | Value::Object(_) => bail!("filter values must be scalars, got {value}"),
    })
}

fn quote(s: &str) -> String { format!("'{}'", s.replace('\'', "''")) }
