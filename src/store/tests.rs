use super::*;

fn documents(keywords: &[&str]) -> Vec<Document> {
    keywords
        .iter()
        .map(|keyword| Document::new(*keyword, format!("answer for {}", keyword)))
        .collect()
}

#[test]
fn embedding_text_combines_both_fields() {
    let document = Document::new("男性向け腕時計", "高級腕時計の広告文");
    assert_eq!(
        document.embedding_text(),
        "Keyword: 男性向け腕時計\nText: 高級腕時計の広告文"
    );
}

#[test]
fn positional_lookup() {
    let store = VectorRecordStore::new(
        2,
        vec![1.0, 0.0, 0.0, 1.0, 0.6, 0.8],
        documents(&["a", "b", "c"]),
    )
    .expect("store should build");

    assert_eq!(store.len(), 3);
    assert_eq!(store.dimension(), 2);
    assert_eq!(store.vector(1), Some(&[0.0, 1.0][..]));
    assert_eq!(store.vector(2), Some(&[0.6, 0.8][..]));
    assert_eq!(store.vector(3), None);
    assert_eq!(store.document(0).map(|d| d.keyword.as_str()), Some("a"));
    assert_eq!(store.vectors().len(), 3);
}

#[test]
fn length_mismatch_is_an_integrity_error() {
    let error = VectorRecordStore::new(2, vec![1.0, 0.0, 0.0], documents(&["a", "b"]))
        .expect_err("short buffer should be rejected");
    assert_eq!(error.kind(), crate::ErrorKind::Integrity);

    let error = VectorRecordStore::new(0, Vec::new(), documents(&["a"]))
        .expect_err("zero dimension with records should be rejected");
    assert_eq!(error.kind(), crate::ErrorKind::Integrity);
}

#[test]
fn from_rows_rejects_ragged_vectors() {
    let error = VectorRecordStore::from_rows(
        vec![vec![1.0, 0.0], vec![1.0, 0.0, 0.0]],
        documents(&["a", "b"]),
    )
    .expect_err("ragged rows should be rejected");

    assert!(matches!(
        error,
        MatchError::DimensionMismatch {
            expected: 2,
            actual: 3
        }
    ));
}

#[test]
fn empty_store_is_valid() {
    let store = VectorRecordStore::from_rows(Vec::new(), Vec::new()).expect("empty store");
    assert!(store.is_empty());
    assert_eq!(store.vectors().count(), 0);
    assert_eq!(store.display_name(0), None);
}

#[test]
fn display_name_falls_back_to_keyword() {
    let names = HashMap::from([("a".to_string(), "Audience A".to_string())]);
    let store = VectorRecordStore::from_rows(vec![vec![1.0], vec![1.0]], documents(&["a", "b"]))
        .expect("store should build")
        .with_display_names(names);

    assert_eq!(store.display_name(0), Some("Audience A"));
    assert_eq!(store.display_name(1), Some("b"));
}
