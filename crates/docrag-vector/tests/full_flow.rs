use serde_json::json;
use tempfile::TempDir;

use docrag_core::filter::Filter;
use docrag_core::traits::VectorIndex;
use docrag_core::types::{DeleteSelector, IndexRecord, Meta};
use docrag_vector::LanceVectorIndex;

fn record(vector: Vec<f32>, user: &str, doc: &str, chunk_index: u64) -> IndexRecord {
    let mut metadata = Meta::new();
    metadata.insert("user_id".into(), json!(user));
    metadata.insert("doc_id".into(), json!(doc));
    metadata.insert("source_filename".into(), json!(format!("{doc}.txt")));
    metadata.insert("chunk_index".into(), json!(chunk_index));
    metadata.insert("page_number".into(), json!(1));
    metadata.insert("created_at".into(), json!("2024-05-01T12:00:00.000Z"));
    metadata.insert("text".into(), json!(format!("chunk {chunk_index} of {doc}")));
    metadata.insert("section".into(), json!("intro"));
    IndexRecord { id: format!("{doc}:{chunk_index}"), vector, metadata }
}

#[tokio::test]
async fn lancedb_upsert_query_delete() {
    let tmp = TempDir::new().expect("tmp");
    let uri = tmp.path().to_string_lossy().to_string();
    let index = LanceVectorIndex::open(&uri, "chunks_test", 3, "user_id").await.expect("open");

    // Querying before the table exists is empty, not an error.
    assert!(index.query(&[1.0, 0.0, 0.0], 5, &Filter::new(), true).await.expect("query").is_empty());

    let written = index
        .upsert(&[
            record(vec![1.0, 0.0, 0.0], "alice", "doc1", 0),
            record(vec![0.8, 0.6, 0.0], "alice", "doc1", 1),
            record(vec![1.0, 0.0, 0.0], "bob", "doc2", 0),
        ])
        .await
        .expect("upsert");
    assert_eq!(written, 3);
    assert_eq!(index.count().await.unwrap(), 3);

    let hits = index.query(&[1.0, 0.0, 0.0], 5, &Filter::new().eq("user_id", "alice"), true).await.expect("query");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["doc1:0", "doc1:1"]);
    assert!(hits[0].score > hits[1].score);
    let meta = &hits[0].metadata;
    assert_eq!(meta["user_id"], "alice");
    assert_eq!(meta["chunk_index"], 0);
    assert_eq!(meta["section"], "intro");
    assert_eq!(meta["text"], "chunk 0 of doc1");

    // Re-upserting an id replaces the row.
    index.upsert(&[record(vec![0.0, 0.0, 1.0], "alice", "doc1", 0)]).await.expect("re-upsert");
    assert_eq!(index.count().await.unwrap(), 3);

    let removed = index
        .delete(&DeleteSelector::Filter(Filter::new().eq("doc_id", "doc1").eq("user_id", "alice")))
        .await
        .expect("delete");
    assert_eq!(removed, 2);
    assert_eq!(index.count().await.unwrap(), 1);
}

#[tokio::test]
async fn lancedb_rejects_unknown_filter_fields() {
    let tmp = TempDir::new().expect("tmp");
    let uri = tmp.path().to_string_lossy().to_string();
    let index = LanceVectorIndex::open(&uri, "chunks", 2, "user_id").await.expect("open");
    index.upsert(&[record(vec![1.0, 0.0], "alice", "doc1", 0)]).await.expect("upsert");
    assert!(index.query(&[1.0, 0.0], 1, &Filter::new().eq("section", "intro"), true).await.is_err());
}
