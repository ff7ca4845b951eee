use docrag_core::filter::{Condition, Filter};
use docrag_core::types::Meta;
use serde_json::json;

fn meta(value: serde_json::Value) -> Meta {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("metadata fixture must be an object"),
    }
}

#[test]
fn parses_exact_and_set_conditions_from_json() {
    let filter: Filter = serde_json::from_value(json!({
        "file_type": "pdf",
        "doc_id": {"$in": ["a", "b"]},
        "chunk_index": {"$eq": 3}
    }))
    .expect("filter json");

    assert_eq!(filter.len(), 3);
    assert_eq!(filter.get("file_type"), Some(&Condition::Eq(json!("pdf"))));
    assert_eq!(filter.get("doc_id"), Some(&Condition::In(vec![json!("a"), json!("b")])));
    assert_eq!(filter.get("chunk_index"), Some(&Condition::Eq(json!(3))));

    let back = serde_json::to_value(&filter).expect("serialize");
    assert_eq!(back["doc_id"], json!({"$in": ["a", "b"]}));
    assert_eq!(back["file_type"], json!("pdf"));
}

#[test]
fn matches_requires_every_condition() {
    let filter = Filter::new().eq("user_id", "u1").any_of("doc_id", ["d1", "d2"]);
    assert!(filter.matches(&meta(json!({"user_id": "u1", "doc_id": "d2"}))));
    assert!(!filter.matches(&meta(json!({"user_id": "u1", "doc_id": "d3"}))));
    assert!(!filter.matches(&meta(json!({"user_id": "u2", "doc_id": "d1"}))));
    assert!(!filter.matches(&meta(json!({"doc_id": "d1"}))));
    assert!(Filter::new().matches(&Meta::new()));
}

#[test]
fn scope_condition_cannot_be_overridden() {
    let permissive = Filter::new().any_of("user_id", ["userA", "userB"]).eq("file_type", "txt");
    let scoped = Filter::scoped(Some(&permissive), "user_id", "userA");

    assert_eq!(scoped.get("user_id"), Some(&Condition::Eq(json!("userA"))));
    assert_eq!(scoped.get("file_type"), Some(&Condition::Eq(json!("txt"))));
    assert!(!scoped.matches(&meta(json!({"user_id": "userB", "file_type": "txt"}))));

    let bare = Filter::scoped(None, "user_id", "userA");
    assert_eq!(bare.len(), 1);
}

#[test]
fn document_filter_skips_empty_lists() {
    let f = Filter::documents(&["d1".to_string()], &[]);
    assert_eq!(f.len(), 1);
    assert_eq!(f.get("doc_id"), Some(&Condition::In(vec![json!("d1")])));

    let f = Filter::documents(&[], &["pdf".to_string(), "txt".to_string()]);
    assert_eq!(f.get("file_type"), Some(&Condition::In(vec![json!("pdf"), json!("txt")])));
    assert!(Filter::documents(&[], &[]).is_empty());
}
