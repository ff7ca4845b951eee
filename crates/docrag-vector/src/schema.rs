//! Arrow layout of the chunk table.
//!
//! Well-known chunk metadata gets typed columns so filters compile to plain
//! SQL predicates; anything else rides along in `extra_json`.

use std::sync::Arc;

use anyhow::{bail, Result};
use arrow_schema::{DataType, Field, Schema, TimeUnit};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Int,
    Timestamp,
}

pub const ID_COLUMN: &str = "id";
pub const VECTOR_COLUMN: &str = "vector";
pub const EXTRA_COLUMN: &str = "extra_json";

pub const METADATA_COLUMNS: &[(&str, ColumnKind)] = &[
    ("doc_id", ColumnKind::Text),
    ("source_filename", ColumnKind::Text),
    ("file_type", ColumnKind::Text),
    ("chunk_index", ColumnKind::Int),
    ("start_char", ColumnKind::Int),
    ("end_char", ColumnKind::Int),
    ("char_count", ColumnKind::Int),
    ("page_number", ColumnKind::Int),
    ("created_at", ColumnKind::Timestamp),
    ("text", ColumnKind::Text),
    ("embedding_model", ColumnKind::Text),
    ("token_count", ColumnKind::Int),
    ("content_hash", ColumnKind::Text),
];

/// Column set of one chunk table: the fixed metadata columns plus the
/// configured scope column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSchema {
    dimension: usize,
    scope_field: String,
}

impl ChunkSchema {
    pub fn new(dimension: usize, scope_field: &str) -> Result<Self> {
        if dimension == 0 || i32::try_from(dimension).is_err() {
            bail!("unsupported vector dimension {dimension}");
        }
        if !is_identifier(scope_field) {
            bail!("invalid scope field name '{scope_field}'");
        }
        if scope_field == ID_COLUMN || scope_field == VECTOR_COLUMN || scope_field == EXTRA_COLUMN || kind_of_fixed(scope_field).is_some() {
            bail!("scope field '{scope_field}' collides with a built-in column");
        }
        Ok(Self { dimension, scope_field: scope_field.to_string() })
    }

    pub fn dimension(&self) -> usize { self.dimension }
    pub fn scope_field(&self) -> &str { &self.scope_field }

    /// Metadata columns in table order, scope column first.
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnKind)> + '_ {
        std::iter::once((self.scope_field.as_str(), ColumnKind::Text)).chain(METADATA_COLUMNS.iter().copied())
    }

    pub fn kind_of(&self, field: &str) -> Option<ColumnKind> {
        if field == self.scope_field || field == ID_COLUMN {
            return Some(ColumnKind::Text);
        }
        kind_of_fixed(field)
    }

    pub fn arrow_schema(&self) -> Arc<Schema> {
        let mut fields = vec![Field::new(ID_COLUMN, DataType::Utf8, false)];
        fields.extend(self.columns().map(|(name, kind)| Field::new(name, arrow_type(kind), true)));
        fields.push(Field::new(EXTRA_COLUMN, DataType::Utf8, true));
        fields.push(Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), self.list_size()),
            true,
        ));
        Arc::new(Schema::new(fields))
    }

    pub(crate) fn list_size(&self) -> i32 { i32::try_from(self.dimension).unwrap_or(i32::MAX) }
}

fn kind_of_fixed(field: &str) -> Option<ColumnKind> {
    METADATA_COLUMNS.iter().find(|(name, _)| *name == field).map(|(_, kind)| *kind)
}

fn arrow_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Text => DataType::Utf8,
        ColumnKind::Int => DataType::Int64,
        ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_') && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_has_scope_and_vector_columns() {
        let schema = ChunkSchema::new(8, "user_id").unwrap().arrow_schema();
        assert_eq!(schema.field(0).name(), "id");
        assert_eq!(schema.field(1).name(), "user_id");
        assert!(schema.field_with_name("vector").is_ok());
        assert_eq!(schema.fields().len(), METADATA_COLUMNS.len() + 4);
    }

    #[test]
    fn rejects_bad_scope_fields() {
        assert!(ChunkSchema::new(8, "user id").is_err());
        assert!(ChunkSchema::new(8, "doc_id").is_err());
        assert!(ChunkSchema::new(0, "user_id").is_err());
        assert!(is_identifier("_tenant2"));
        assert!(!is_identifier("2tenant"));
    }
}
