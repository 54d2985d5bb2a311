mod helpers;

use mnemo::context::chunk_text;
use mnemo::memory::NewEntry;
use tempfile::TempDir;

fn numbered_text(words: usize) -> String {
    (0..words).map(|i| format!("w{i:05} ")).collect()
}

#[test]
fn reindexing_same_content_inserts_nothing() {
    let tmp = TempDir::new().unwrap();
    let cm = helpers::test_context(tmp.path(), helpers::hashing_embedder());
    let text = numbered_text(300);

    let first = cm.add_content("s1", &NewEntry::text(text.clone())).unwrap();
    assert_eq!(first.len(), chunk_text(&text, 500, 50).len());

    let again = cm.add_content("s1", &NewEntry::text(text)).unwrap();
    assert!(again.is_empty());

    let stats = cm.get_session_stats("s1").unwrap();
    assert_eq!(stats.total_chunks as usize, first.len());
    assert_eq!(stats.embedded_chunks, stats.total_chunks);
}

#[test]
fn overlapping_content_only_adds_new_chunks() {
    let tmp = TempDir::new().unwrap();
    let cm = helpers::test_context(tmp.path(), helpers::no_embedder());

    cm.add_content("s1", &NewEntry::text("alpha")).unwrap();
    cm.add_content("s1", &NewEntry::text("beta")).unwrap();
    let third = cm.add_content("s1", &NewEntry::text("alpha")).unwrap();

    assert!(third.is_empty());
    assert_eq!(cm.get_session_stats("s1").unwrap().total_chunks, 2);
}

#[test]
fn similarity_search_finds_related_chunk() {
    let tmp = TempDir::new().unwrap();
    let cm = helpers::test_context(tmp.path(), helpers::hashing_embedder());

    cm.add_content("s1", &NewEntry::text("database connection pooling strategy"))
        .unwrap();
    cm.add_content("s1", &NewEntry::text("favourite pizza toppings"))
        .unwrap();
    cm.add_content("s2", &NewEntry::text("database connection pooling strategy again"))
        .unwrap();

    let hits = cm
        .search_by_similarity("s1", "connection pooling", 10, 0.3)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.session_id, "s1");
    assert!(hits[0].chunk.content.contains("pooling"));
    let score = hits[0].score.unwrap();
    assert!(score > 0.3 && score <= 1.0);
}

#[test]
fn similarity_results_are_sorted_and_capped() {
    let tmp = TempDir::new().unwrap();
    let cm = helpers::test_context(tmp.path(), helpers::hashing_embedder());
    cm.add_content("s1", &NewEntry::text("rust")).unwrap();
    cm.add_content("s1", &NewEntry::text("rust borrow")).unwrap();
    cm.add_content("s1", &NewEntry::text("rust borrow checker rules"))
        .unwrap();

    let hits = cm.search_by_similarity("s1", "rust", 2, 0.0).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.content, "rust");
    assert!(hits[0].score >= hits[1].score);
}

#[test]
fn keyword_fallback_without_embeddings() {
    let tmp = TempDir::new().unwrap();
    let cm = helpers::test_context(tmp.path(), helpers::no_embedder());
    cm.add_content("s1", &NewEntry::text("Deploy with 100% confidence").with_importance(0.4))
        .unwrap();
    cm.add_content("s1", &NewEntry::text("deploy window is friday").with_importance(0.8))
        .unwrap();
    cm.add_content("s1", &NewEntry::text("unrelated")).unwrap();

    let hits = cm.search_by_similarity("s1", "DEPLOY", 10, 0.3).unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.score.is_none()));
    assert_eq!(hits[0].chunk.content, "deploy window is friday");

    // `%` is matched literally
    let literal = cm.keyword_search("s1", "100%", None, 10).unwrap();
    assert_eq!(literal.len(), 1);
}

#[test]
fn chunks_without_embeddings_are_skipped_by_similarity() {
    let tmp = TempDir::new().unwrap();
    {
        let cm = helpers::test_context(tmp.path(), helpers::no_embedder());
        cm.add_content("s1", &NewEntry::text("indexed before the model existed"))
            .unwrap();
    }
    let cm = helpers::test_context(tmp.path(), helpers::hashing_embedder());
    let hits = cm
        .search_by_similarity("s1", "indexed before the model existed", 10, 0.0)
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn context_assembly_orders_by_importance_and_filters_types() {
    let tmp = TempDir::new().unwrap();
    let cm = helpers::test_context(tmp.path(), helpers::no_embedder());
    cm.add_content("s1", &NewEntry::text("low").with_importance(0.1))
        .unwrap();
    cm.add_content(
        "s1",
        &NewEntry::text("high")
            .with_importance(0.9)
            .with_type("decision")
            .with_tags(["arch"]),
    )
    .unwrap();

    let context = cm.get_context_for_session("s1", 20, None).unwrap();
    let parts: Vec<&str> = context.split("\n\n").collect();
    assert_eq!(parts.len(), 2);
    assert!(parts[0].starts_with("[DECISION - "));
    assert!(parts[0].ends_with("[Tags: arch]]\nhigh"));
    assert!(parts[1].ends_with("]\nlow"));

    let capped = cm.get_context_for_session("s1", 1, None).unwrap();
    assert!(capped.ends_with("\nhigh"));

    let decisions = cm
        .get_context_for_session("s1", 20, Some(&["decision".to_string()]))
        .unwrap();
    assert!(!decisions.contains("low"));

    assert_eq!(cm.get_context_for_session("nobody", 20, None).unwrap(), "");
}
