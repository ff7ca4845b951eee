//! LanceDB-backed `VectorIndex`.

use anyhow::Result;
use arrow_array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, DistanceType, Table};
use tracing::{debug, info};

use docrag_core::filter::Filter;
use docrag_core::traits::VectorIndex;
use docrag_core::types::{DeleteSelector, IndexRecord, SearchCandidate};

use crate::filter_sql::{ids_predicate, to_sql};
use crate::schema::{ChunkSchema, ID_COLUMN};
use crate::search::batch_to_candidates;
use crate::writer::records_to_batch;

pub async fn open_db(uri: &str) -> Result<Connection> { Ok(connect(uri).execute().await?) }

pub struct LanceVectorIndex {
    db: Connection,
    table_name: String,
    schema: ChunkSchema,
}

impl LanceVectorIndex {
    pub async fn open(uri: &str, table_name: &str, dimension: usize, scope_field: &str) -> Result<Self> {
        let db = open_db(uri).await?;
        let schema = ChunkSchema::new(dimension, scope_field)?;
        info!(uri, table = table_name, dimension, "LanceDB vector index opened");
        Ok(Self { db, table_name: table_name.to_string(), schema })
    }

    pub fn schema(&self) -> &ChunkSchema { &self.schema }

    async fn table(&self) -> Result<Option<Table>> {
        if !self.db.table_names().execute().await?.contains(&self.table_name) {
            return Ok(None);
        }
        Ok(Some(self.db.open_table(&self.table_name).execute().await?))
    }

    pub async fn count(&self) -> Result<usize> {
        match self.table().await? {
            Some(t) => Ok(t.count_rows(None).await?),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn upsert(&self, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let batch = records_to_batch(records, &self.schema)?;
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), self.schema.arrow_schema()));
        match self.table().await? {
            Some(t) => {
                // Upsert behavior via merge_insert: id is unique
                let mut mi = t.merge_insert(&[ID_COLUMN]);
                mi.when_matched_update_all(None).when_not_matched_insert_all();
                mi.execute(reader).await?;
            }
            None => {
                self.db.create_table(&self.table_name, reader).execute().await?;
            }
        }
        debug!(table = %self.table_name, records = records.len(), "Upserted records");
        Ok(records.len())
    }

    async fn query(&self, vector: &[f32], top_k: usize, filter: &Filter, include_metadata: bool) -> Result<Vec<SearchCandidate>> {
        if vector.len() != self.schema.dimension() {
            anyhow::bail!("query vector has dimension {}, table expects {}", vector.len(), self.schema.dimension());
        }
        let Some(table) = self.table().await? else { return Ok(Vec::new()) };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut query = table.vector_search(vector.to_vec())?.distance_type(DistanceType::Cosine).limit(top_k);
        if let Some(predicate) = to_sql(filter, &self.schema)? {
            query = query.only_if(predicate);
        }
        if !include_metadata {
            query = query.select(Select::columns(&[ID_COLUMN]));
        }

        let mut stream = query.execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            hits.extend(batch_to_candidates(&batch, &self.schema, include_metadata)?);
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, selector: &DeleteSelector) -> Result<usize> {
        let predicate = match selector {
            DeleteSelector::Ids(ids) => ids_predicate(ids),
            DeleteSelector::Filter(filter) => to_sql(filter, &self.schema)?,
        };
        // An empty selector never means "everything".
        let Some(predicate) = predicate else { return Ok(0) };
        let Some(table) = self.table().await? else { return Ok(0) };

        let matched = table.count_rows(Some(predicate.clone())).await?;
        if matched > 0 {
            table.delete(&predicate).await?;
        }
        info!(table = %self.table_name, deleted = matched, "Deleted records");
        Ok(matched)
    }
}
