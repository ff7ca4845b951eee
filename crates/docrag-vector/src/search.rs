//! Arrow result batches back to `SearchCandidate`s.

use anyhow::{anyhow, Result};
use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, StringArray, TimestampMillisecondArray};
use chrono::{DateTime, SecondsFormat};
use serde_json::Value;

use docrag_core::types::{Meta, SearchCandidate};

use crate::schema::{ChunkSchema, ColumnKind, EXTRA_COLUMN, ID_COLUMN};

/// Reads one result batch. Lance reports cosine distance; the score is
/// `1 - distance`, with non-finite distances scored 0.
pub fn batch_to_candidates(batch: &RecordBatch, schema: &ChunkSchema, include_metadata: bool) -> Result<Vec<SearchCandidate>> {
    let ids = batch
        .column_by_name(ID_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("result batch has no id column"))?;
    let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let score = match distances {
            Some(d) if d.is_valid(i) && d.value(i).is_finite() => 1.0 - d.value(i),
            _ => 0.0,
        };
        let metadata = if include_metadata { row_metadata(batch, schema, i) } else { Meta::new() };
        out.push(SearchCandidate::new(ids.value(i), score, metadata));
    }
    Ok(out)
}

fn row_metadata(batch: &RecordBatch, schema: &ChunkSchema, row: usize) -> Meta {
    let mut meta = batch
        .column_by_name(EXTRA_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .filter(|c| c.is_valid(row))
        .and_then(|c| serde_json::from_str::<Meta>(c.value(row)).ok())
        .unwrap_or_default();

    for (name, kind) in schema.columns() {
        let Some(column) = batch.column_by_name(name) else { continue };
        if !column.is_valid(row) {
            continue;
        }
        let value = match kind {
            ColumnKind::Text => column.as_any().downcast_ref::<StringArray>().map(|c| Value::from(c.value(row))),
            ColumnKind::Int => column.as_any().downcast_ref::<Int64Array>().map(|c| Value::from(c.value(row))),
            ColumnKind::Timestamp => column
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .and_then(|c| DateTime::from_timestamp_millis(c.value(row)))
                .map(|dt| Value::from(dt.to_rfc3339_opts(SecondsFormat::Millis, true))),
        };
        if let Some(value) = value {
            meta.insert(name.to_string(), value);
        }
    }
    meta
}
