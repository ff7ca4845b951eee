//! `IndexRecord` rows to Arrow record batches.

use std::sync::Arc;

use anyhow::{bail, Result};
use arrow_array::{ArrayRef, FixedSizeListArray, Int64Array, RecordBatch, StringArray, TimestampMillisecondArray};
use chrono::DateTime;
use serde_json::Value;

use docrag_core::types::{meta_u64, IndexRecord, Meta};

use crate::schema::{ChunkSchema, ColumnKind, EXTRA_COLUMN, ID_COLUMN, VECTOR_COLUMN};

pub fn records_to_batch(records: &[IndexRecord], schema: &ChunkSchema) -> Result<RecordBatch> {
    for record in records {
        if record.vector.len() != schema.dimension() {
            bail!("record {} has dimension {}, table expects {}", record.id, record.vector.len(), schema.dimension());
        }
    }

    let mut columns: Vec<ArrayRef> = Vec::new();
    columns.push(Arc::new(StringArray::from_iter_values(records.iter().map(|r| r.id.as_str()))));
    for (name, kind) in schema.columns() {
        columns.push(match kind {
            ColumnKind::Text => Arc::new(records.iter().map(|r| text_value(&r.metadata, name)).collect::<StringArray>()),
            ColumnKind::Int => Arc::new(records.iter().map(|r| int_value(&r.metadata, name)).collect::<Int64Array>()),
            ColumnKind::Timestamp => {
                Arc::new(records.iter().map(|r| timestamp_value(&r.metadata, name)).collect::<TimestampMillisecondArray>())
            }
        });
    }
    columns.push(Arc::new(records.iter().map(|r| extra_json(&r.metadata, schema)).collect::<StringArray>()));

    let vectors = records.iter().map(|r| Some(r.vector.iter().map(|&x| Some(x)).collect::<Vec<_>>()));
    columns.push(Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(
        vectors,
        schema.list_size(),
    )));

    Ok(RecordBatch::try_new(schema.arrow_schema(), columns)?)
}

fn text_value(meta: &Meta, key: &str) -> Option<String> {
    match meta.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn int_value(meta: &Meta, key: &str) -> Option<i64> { meta_u64(meta, key).and_then(|v| i64::try_from(v).ok()) }

fn timestamp_value(meta: &Meta, key: &str) -> Option<i64> {
    match meta.get(key)? {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.timestamp_millis()),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

/// Keys without a typed column, as a JSON object. `None` when there are none.
fn extra_json(meta: &Meta, schema: &ChunkSchema) -> Option<String> {
    let extra: Meta = meta
        .iter()
        .filter(|(k, _)| schema.kind_of(k).is_none() && k.as_str() != EXTRA_COLUMN && k.as_str() != VECTOR_COLUMN && k.as_str() != ID_COLUMN)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if extra.is_empty() { None } else { serde_json::to_string(&extra).ok() }
}
