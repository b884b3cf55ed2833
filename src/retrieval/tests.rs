use super::*;
use crate::indexer::{Corpus, IndexBuilder};
use crate::store::{Document, load_store, write_store};
use crate::test_support::{FailingEmbedder, HashEmbedder, SlowEmbedder, TableEmbedder};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

fn documents(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| Document::new(format!("k{}", i), format!("text {}", i)))
        .collect()
}

fn unit_store(rows: Vec<Vec<f32>>) -> VectorRecordStore {
    let count = rows.len();
    VectorRecordStore::from_rows(rows, documents(count)).expect("store should build")
}

async fn hashed_store(corpus: serde_json::Value) -> VectorRecordStore {
    let corpus: Corpus = serde_json::from_value(corpus).expect("corpus should deserialize");
    IndexBuilder::new(Arc::new(HashEmbedder::new()))
        .build(corpus)
        .await
        .expect("build should succeed")
}

fn five_documents() -> serde_json::Value {
    json!({
        "男性向け腕時計": "30代男性をターゲットにした高級腕時計の広告文",
        "女性向けコスメ": "20代女性に人気のスキンケアとメイクアップ",
        "キャンプ用品": "週末のアウトドアを楽しむ家族向けテントと寝袋",
        "ペットフード": "犬と猫の健康を考えた無添加フード",
        "ビジネス書": "若手社会人のためのキャリアと自己啓発の本"
    })
}

#[test]
fn match_percent_maps_and_clamps() {
    assert_eq!(match_percent(1.0), 100.0);
    assert_eq!(match_percent(-1.0), 0.0);
    assert_eq!(match_percent(0.0), 50.0);
    assert_eq!(match_percent(0.5), 75.0);
    assert_eq!(match_percent(0.8), 90.0);
    assert_eq!(match_percent(1.2), 100.0);
    assert_eq!(match_percent(-3.0), 0.0);
    assert_eq!(match_percent(f32::NAN), 0.0);
    assert_eq!(match_percent(f32::NEG_INFINITY), 0.0);
}

#[test]
fn match_percent_has_one_decimal() {
    for cosine in [-0.97_f32, -0.31, 0.123, 0.4567, 0.891, 0.99999] {
        let percent = match_percent(cosine);
        assert!((0.0..=100.0).contains(&percent));
        assert!(((percent * 10.0).round() - percent * 10.0).abs() < 1e-9);
    }
}

#[test]
fn rank_breaks_ties_by_position() {
    let store = unit_store(vec![
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![0.6, 0.8],
    ]);

    let ranked = rank(&store, &[1.0, 0.0], 10);
    let positions: Vec<usize> = ranked.iter().map(|(position, _)| *position).collect();
    assert_eq!(positions, vec![0, 2, 3, 1]);

    let top_two = rank(&store, &[1.0, 0.0], 2);
    assert_eq!(top_two, vec![(0, 1.0), (2, 1.0)]);

    assert!(rank(&store, &[1.0, 0.0], 0).is_empty());
}

#[test]
fn nan_scores_rank_last() {
    let store = unit_store(vec![vec![f32::NAN, 0.0], vec![0.0, 1.0]]);
    let ranked = rank(&store, &[0.0, 1.0], 2);
    assert_eq!(ranked[0], (1, 1.0));
    assert_eq!(ranked[1].0, 0);
    assert_eq!(match_percent(ranked[1].1), 0.0);
}

#[test]
fn signed_zero_scores_tie_on_position() {
    let store = unit_store(vec![vec![-1.0, 0.0], vec![1.0, 0.0]]);
    let ranked = rank(&store, &[0.0, -1.0], 2);
    assert_eq!(ranked.iter().map(|r| r.0).collect::<Vec<_>>(), vec![0, 1]);
    assert!(ranked.iter().all(|r| r.1 == 0.0));
    assert_eq!(match_percent(ranked[0].1), 50.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_first_searches_share_one_load() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let store = hashed_store(five_documents()).await;
    write_store(temp_dir.path(), &store, "char-hash").expect("write should work");

    let loads = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&loads);
    let engine = RetrievalEngine::new(
        temp_dir.path().to_path_buf(),
        Arc::new(HashEmbedder::new()),
        TIMEOUT,
    )
    .with_loader(Arc::new(move |dir: &Path| {
        counted.fetch_add(1, AtomicOrdering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        load_store(dir)
    }));

    let query = "高級腕時計のキャンペーン";
    let (a, b, c, d) = tokio::join!(
        engine.search(query, 3),
        engine.search(query, 3),
        engine.store(),
        engine.search(query, 1),
    );

    assert_eq!(loads.load(AtomicOrdering::SeqCst), 1);
    let a = a.expect("search should succeed");
    assert_eq!(a, b.expect("search should succeed"));
    assert_eq!(c.expect("store should load").len(), 5);
    assert_eq!(d.expect("search should succeed").candidates, a.candidates[..1]);
    assert!(a.warnings.is_empty());
}

#[tokio::test]
async fn failed_custom_load_is_retried() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counted = Arc::clone(&loads);
    let engine = RetrievalEngine::new(
        PathBuf::from("unused"),
        Arc::new(HashEmbedder::new()),
        TIMEOUT,
    )
    .with_loader(Arc::new(move |dir: &Path| {
        if counted.fetch_add(1, AtomicOrdering::SeqCst) == 0 {
            Err(MatchError::StoreUnavailable(dir.to_path_buf()))
        } else {
            Ok(unit_store(vec![vec![1.0, 0.0]]))
        }
    }));

    assert!(engine.store().await.is_err());
    assert!(!engine.is_loaded());
    assert_eq!(engine.store().await.expect("second load succeeds").len(), 1);
    assert_eq!(loads.load(AtomicOrdering::SeqCst), 2);
}

#[tokio::test]
async fn store_loads_once_and_is_reused() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let store = hashed_store(five_documents()).await;
    write_store(temp_dir.path(), &store, "char-hash").expect("write should work");

    let engine = RetrievalEngine::new(
        temp_dir.path().to_path_buf(),
        Arc::new(HashEmbedder::new()),
        TIMEOUT,
    );
    assert!(!engine.is_loaded());

    let first = engine
        .search("高級腕時計のキャンペーン", 3)
        .await
        .expect("search should succeed");
    assert!(engine.is_loaded());

    std::fs::remove_dir_all(temp_dir.path()).expect("store dir removable");

    let second = engine
        .search("高級腕時計のキャンペーン", 3)
        .await
        .expect("cached store should still answer");
    assert_eq!(first, second);
    assert_eq!(second.candidates.len(), 3);
}

#[tokio::test]
async fn missing_store_degrades_then_recovers() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let engine = RetrievalEngine::new(
        temp_dir.path().to_path_buf(),
        Arc::new(HashEmbedder::new()),
        TIMEOUT,
    );

    let retrieval = engine
        .search("高級腕時計のキャンペーン", 3)
        .await
        .expect("missing store is not an error");
    assert!(retrieval.candidates.is_empty());
    assert_eq!(
        retrieval.warnings,
        vec![StageWarning::StoreUnavailable {
            path: temp_dir.path().to_path_buf()
        }]
    );
    assert!(!engine.is_loaded());

    let store = hashed_store(five_documents()).await;
    write_store(temp_dir.path(), &store, "char-hash").expect("write should work");

    let retrieval = engine
        .search("高級腕時計のキャンペーン", 3)
        .await
        .expect("search should succeed");
    assert_eq!(retrieval.candidates.len(), 3);
    assert!(retrieval.warnings.is_empty());
}

#[tokio::test]
async fn corrupt_store_is_an_error() {
    let temp_dir = TempDir::new().expect("should create TempDir");
    let store = hashed_store(five_documents()).await;
    write_store(temp_dir.path(), &store, "char-hash").expect("write should work");
    std::fs::write(temp_dir.path().join("docs.jsonl"), "{\"keyword\":\"a\",\"text\":\"b\"}\n")
        .expect("docs writable");

    let engine = RetrievalEngine::new(
        temp_dir.path().to_path_buf(),
        Arc::new(HashEmbedder::new()),
        TIMEOUT,
    );
    let error = engine
        .search("高級腕時計のキャンペーン", 3)
        .await
        .expect_err("mismatched store must fail");
    assert_eq!(error.kind(), crate::ErrorKind::Integrity);
}

#[tokio::test]
async fn provider_failure_yields_no_candidates() {
    let engine = RetrievalEngine::with_store(
        unit_store(vec![vec![1.0, 0.0]]),
        Arc::new(FailingEmbedder),
        TIMEOUT,
    );

    let retrieval = engine.search("anything", 5).await.expect("soft failure");
    assert!(retrieval.candidates.is_empty());
    assert!(matches!(
        retrieval.warnings.as_slice(),
        [StageWarning::EmbeddingFailed { message }] if message.contains("connection refused")
    ));
}

#[tokio::test]
async fn provider_timeout_yields_no_candidates() {
    let engine = RetrievalEngine::with_store(
        hashed_store(five_documents()).await,
        Arc::new(SlowEmbedder {
            delay: Duration::from_secs(5),
        }),
        Duration::from_millis(20),
    );

    let retrieval = engine.search("anything", 5).await.expect("soft failure");
    assert!(retrieval.candidates.is_empty());
    assert_eq!(
        retrieval.warnings,
        vec![StageWarning::StageTimedOut {
            stage: Stage::Embedding,
            after_ms: 20
        }]
    );
    assert!(engine.is_loaded());
}

#[tokio::test]
async fn query_dimension_mismatch_is_fatal() {
    let engine = RetrievalEngine::with_store(
        unit_store(vec![vec![1.0, 0.0, 0.0]]),
        Arc::new(HashEmbedder::new()),
        TIMEOUT,
    );

    let error = engine.search("腕時計", 1).await.expect_err("dims differ");
    assert!(matches!(
        error,
        MatchError::DimensionMismatch {
            expected: 3,
            actual: 256
        }
    ));
}

#[tokio::test]
async fn candidates_carry_display_name_and_provenance() {
    let store = unit_store(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).with_display_names(
        HashMap::from([("k1".to_string(), "Segment One".to_string())]),
    );
    let embedder = TableEmbedder {
        entries: vec![("query".to_string(), vec![0.0, 2.0])],
    };
    let engine = RetrievalEngine::with_store(store, Arc::new(embedder), TIMEOUT);

    let retrieval = engine.search("query", 2).await.expect("search should succeed");
    assert_eq!(
        retrieval.candidates,
        vec![
            Candidate {
                name: "Segment One".to_string(),
                match_percent: 100.0,
                keyword: "k1".to_string(),
                text: "text 1".to_string(),
            },
            Candidate {
                name: "k0".to_string(),
                match_percent: 50.0,
                keyword: "k0".to_string(),
                text: "text 0".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn zero_k_returns_nothing_without_embedding() {
    let embedder = Arc::new(HashEmbedder::new());
    let engine = RetrievalEngine::with_store(
        unit_store(vec![vec![1.0]]),
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        TIMEOUT,
    );
    let retrieval = engine.search("anything", 0).await.expect("k=0 is fine");
    assert!(retrieval.candidates.is_empty());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn near_duplicate_brief_scores_high() {
    let store = hashed_store(json!({
        "男性向け腕時計": "30代男性をターゲットにした高級腕時計の広告文"
    }))
    .await;
    let engine = RetrievalEngine::with_store(store, Arc::new(HashEmbedder::new()), TIMEOUT);

    let retrieval = engine
        .search("30代男性向けの高級腕時計キャンペーン", 10)
        .await
        .expect("search should succeed");

    assert_eq!(retrieval.candidates.len(), 1);
    let candidate = &retrieval.candidates[0];
    assert_eq!(candidate.keyword, "男性向け腕時計");
    assert!(candidate.match_percent > 75.0, "got {}", candidate.match_percent);
    assert!(candidate.match_percent <= 100.0);
}

#[tokio::test]
async fn top_k_bounds_and_orders_results() {
    let engine = RetrievalEngine::with_store(
        hashed_store(five_documents()).await,
        Arc::new(HashEmbedder::new()),
        TIMEOUT,
    );

    let retrieval = engine
        .search("30代男性向けの高級腕時計キャンペーン", 3)
        .await
        .expect("search should succeed");
    assert_eq!(retrieval.candidates.len(), 3);
    assert_eq!(retrieval.candidates[0].keyword, "男性向け腕時計");
    assert!(
        retrieval
            .candidates
            .windows(2)
            .all(|pair| pair[0].match_percent >= pair[1].match_percent)
    );

    for (query, k) in [("犬の健康", 1), ("家族でキャンプ", 4), ("キャリア", 5), ("x", 50)] {
        let retrieval = engine.search(query, k).await.expect("search should succeed");
        assert!(retrieval.candidates.len() <= k);
        assert!(
            retrieval
                .candidates
                .iter()
                .all(|c| (0.0..=100.0).contains(&c.match_percent))
        );
    }
}
