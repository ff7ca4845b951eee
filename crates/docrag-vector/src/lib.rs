//! Vector indexes: LanceDB on disk and an in-memory cosine index.

pub mod filter_sql;
pub mod memory;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use docrag_core::config::{resolve_with_base, Settings, VectorBackend};
use docrag_core::traits::VectorIndex;

pub use memory::MemoryVectorIndex;
pub use schema::ChunkSchema;
pub use table::LanceVectorIndex;

/// Opens the configured backend. Relative Lance URIs resolve against `base`.
pub async fn build_vector_index(settings: &Settings, base: &Path) -> Result<Arc<dyn VectorIndex>> {
    let dimension = settings.embedding.dimension;
    Ok(match settings.vector.backend {
        VectorBackend::Memory => Arc::new(MemoryVectorIndex::new(dimension)),
        VectorBackend::Lance => {
            let uri = resolve_with_base(base, &settings.vector.uri);
            Arc::new(
                LanceVectorIndex::open(&uri.to_string_lossy(), &settings.vector.table, dimension, &settings.retrieval.scope_field)
                    .await?,
            )
        }
    })
}
