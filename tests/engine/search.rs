use super::harness::{temp_engine, temp_engine_with};
use engram::memory::{RecordFilter, RecordInput, RecordKind, SearchMode, SearchQuery};

#[tokio::test]
async fn semantic_search_ranks_and_caps_results() {
    let (_tmp, engine) = temp_engine().await;

    engine
        .save(RecordInput::new("rust", "rust borrow checker and lifetimes"))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("cooking", "pasta recipe with tomatoes"))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("gc", "garbage collection in managed runtimes"))
        .await
        .unwrap();

    let results = engine
        .search(
            &SearchQuery::new(SearchMode::Semantic)
                .with_query("rust lifetimes")
                .with_limit(2),
        )
        .await
        .unwrap();

    assert!(results.len() <= 2);
    assert!(!results.is_empty());
    assert_eq!(results[0].record.key, "rust");
    // Similarities are non-increasing (distances non-decreasing).
    assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[tokio::test]
async fn semantic_search_on_empty_store_returns_empty() {
    let (_tmp, engine) = temp_engine().await;

    let results = engine
        .search(&SearchQuery::new(SearchMode::Semantic).with_query("anything"))
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn exact_search_matches_value_substring() {
    let (_tmp, engine) = temp_engine().await;

    engine
        .save(RecordInput::new("note:1", "remember the milk"))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("note:2", "remember the deadline"))
        .await
        .unwrap();

    let results = engine
        .search(
            &SearchQuery::new(SearchMode::Exact)
                .with_query("deadline")
                .with_limit(10),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.key, "note:2");
    assert!((results[0].similarity - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn hybrid_without_query_filters_by_key_and_kind() {
    let (_tmp, engine) = temp_engine().await;

    engine
        .save(RecordInput::new("goal:q1", "ship").with_kind(RecordKind::Goal))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("goal:q2", "scale").with_kind(RecordKind::Goal))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("note:q1", "misc").with_kind(RecordKind::Knowledge))
        .await
        .unwrap();

    let results = engine
        .search(
            &SearchQuery::new(SearchMode::Hybrid)
                .with_key("goal")
                .with_kind(RecordKind::Goal),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.record.kind == RecordKind::Goal));
}

#[tokio::test]
async fn hybrid_with_query_sorts_by_similarity() {
    let (_tmp, engine) = temp_engine().await;

    engine
        .save(RecordInput::new("a", "alpha beta gamma"))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("b", "alpha beta"))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("c", "totally unrelated content"))
        .await
        .unwrap();

    let results = engine
        .search(
            &SearchQuery::new(SearchMode::Hybrid)
                .with_query("alpha beta")
                .with_limit(3),
        )
        .await
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.windows(2).all(|w| w[0].similarity >= w[1].similarity));
}

#[tokio::test]
async fn search_tag_filter_is_set_and() {
    let (_tmp, engine) = temp_engine().await;

    engine
        .save(RecordInput::new("a", "tagged both").with_tags(vec!["x".into(), "y".into()]))
        .await
        .unwrap();
    engine
        .save(RecordInput::new("b", "tagged one").with_tags(vec!["x".into()]))
        .await
        .unwrap();

    let results = engine
        .search(
            &SearchQuery::new(SearchMode::Hybrid)
                .with_query("tagged")
                .with_tags(vec!["x".into(), "y".into()]),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.key, "a");
}

#[tokio::test]
async fn disabled_index_backend_misses_semantic_hits_but_keeps_exact() {
    let (_tmp, engine) = temp_engine_with(|config| {
        config.coordinator.index_enabled = false;
    })
    .await;

    engine
        .save(RecordInput::new("only-primary", "semantic text here"))
        .await
        .unwrap();

    // Never indexed, so semantic search cannot see it.
    let semantic = engine
        .search(
            &SearchQuery::new(SearchMode::Semantic).with_query("semantic text here"),
        )
        .await
        .unwrap();
    assert!(semantic.is_empty());

    // The primary store still has it.
    let loaded = engine
        .load(&RecordFilter::new().by_key("only-primary"), 1)
        .await
        .unwrap();
    assert_eq!(loaded.len(), 1);
}

#[tokio::test]
async fn deleted_records_leave_the_index() {
    let (_tmp, engine) = temp_engine().await;

    engine
        .save(RecordInput::new("gone", "disposable content"))
        .await
        .unwrap();
    engine
        .delete(RecordFilter::new().by_key("gone"))
        .await
        .unwrap();

    let results = engine
        .search(
            &SearchQuery::new(SearchMode::Semantic).with_query("disposable content"),
        )
        .await
        .unwrap();
    assert!(results.is_empty());
}
