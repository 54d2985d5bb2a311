mod helpers;

use std::fs;

use mnemo::memory::{NewEntry, RecordSource};
use mnemo::session::MemorySystem;
use tempfile::TempDir;

#[test]
fn add_writes_all_three_tiers() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());

    let outcome = memory.add_to_session_memory(NewEntry::text("remember the milk"));
    assert!(outcome.is_ok());
    let id = outcome.value_or(-1);
    assert!(id > 0);

    let stats = memory.get_memory_stats().value_or_default();
    assert_eq!(stats.session_id, "test-session");
    assert_eq!(stats.ephemeral_entries, 1);
    assert_eq!(stats.persistent_entries, 1);
    assert_eq!(stats.context_chunks, 1);
    assert_eq!(stats.embedded_chunks, 0);
}

#[test]
fn disabled_memory_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("before"));

    memory.set_memory_enabled(false);
    let outcome = memory.add_to_session_memory(NewEntry::text("secret"));
    assert!(outcome.is_ok());
    assert_eq!(outcome.value_or(0), -1);

    let stats = memory.get_memory_stats().value_or_default();
    assert_eq!(stats.persistent_entries, 1);
    assert_eq!(stats.ephemeral_entries, 0);
    assert!(memory
        .search_session_memory("secret", None, 10)
        .value_or_default()
        .is_empty());
    assert_eq!(memory.get_context(20, None).value_or_default(), "");

    let status = memory.get_memory_status().value_or_default();
    assert!(!status.enabled);

    // Durable memory survives the toggle
    memory.set_memory_enabled(true);
    assert_eq!(
        memory.search_session_memory("before", None, 10).value_or_default().len(),
        1
    );
}

#[test]
fn search_merges_and_deduplicates_sources() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::hashing_embedder());

    memory.add_to_session_memory(NewEntry::text("connection pooling notes").with_importance(0.6));
    memory.add_to_session_memory(NewEntry::text("pizza order").with_importance(0.9));

    let results = memory
        .search_session_memory("connection pooling", None, 10)
        .value_or_default();
    // Found by context, ephemeral and store, returned once with context priority
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].content, "connection pooling notes");
    assert_eq!(results[0].source, RecordSource::Context);
}

#[test]
fn search_ranks_by_importance_and_truncates() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("task: low").with_importance(0.2));
    memory.add_to_session_memory(NewEntry::text("task: high").with_importance(0.95));
    memory.add_to_session_memory(NewEntry::text("task: mid").with_importance(0.5));

    let results = memory.search_session_memory("task", None, 2).value_or_default();
    let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
    assert_eq!(contents, vec!["task: high", "task: mid"]);
}

#[test]
fn search_filters_content_type_everywhere() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("build failed").with_type("chat_message"));
    memory.add_to_session_memory(NewEntry::text("build is flaky").with_type("note"));

    let notes = memory
        .search_session_memory("build", Some("note"), 10)
        .value_or_default();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].content_type, "note");
}

#[test]
fn get_context_comes_from_context_manager() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("first").with_importance(0.3));
    memory.add_to_session_memory(NewEntry::text("second").with_type("note"));

    let outcome = memory.get_context(20, None);
    assert!(outcome.is_ok());
    let context = outcome.value_or_default();
    assert!(context.starts_with("[NOTE - "));
    assert!(context.contains("\n\n[TEXT - "));

    let notes_only = memory
        .get_context(20, Some(&["note".to_string()]))
        .value_or_default();
    assert!(!notes_only.contains("first"));
}

#[test]
fn get_context_falls_back_to_store_when_context_store_breaks() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("survives"));

    // Break the context store underneath the manager
    let ready = memory.as_ready().unwrap();
    ready.context().close();
    let conn = rusqlite::Connection::open(tmp.path().join("context.db")).unwrap();
    conn.execute_batch("DROP TABLE context_chunks").unwrap();
    drop(conn);

    let outcome = memory.get_context(20, None);
    assert!(outcome.is_degraded());
    let context = outcome.value_or_default();
    assert!(context.starts_with("[TEXT - "));
    assert!(context.ends_with("] survives"));
}

#[test]
fn clear_variants_touch_the_right_tiers() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("one"));
    memory.add_to_session_memory(NewEntry::text("two"));

    assert!(memory.clear_session_memory().is_ok());
    let stats = memory.get_memory_stats().value_or_default();
    assert_eq!(stats.ephemeral_entries, 0);
    assert_eq!(stats.persistent_entries, 2);

    memory.add_to_session_memory(NewEntry::text("three"));
    assert!(memory.clear_persistent_memory().value_or(false));
    let stats = memory.get_memory_stats().value_or_default();
    assert_eq!(stats.ephemeral_entries, 1);
    assert_eq!(stats.persistent_entries, 0);
    assert_eq!(stats.context_chunks, 0);

    assert!(!memory.clear_all_memory().value_or(true));
    let stats = memory.get_memory_stats().value_or_default();
    assert_eq!(stats.ephemeral_entries, 0);
}

#[test]
fn save_clear_load_round_trip() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    let originals = ["alpha fact", "beta fact", "gamma fact"];
    for (i, text) in originals.iter().enumerate() {
        memory.add_to_session_memory(
            NewEntry::text(*text)
                .with_importance(0.3 * (i + 1) as f64)
                .with_tags([format!("t{i}")]),
        );
    }

    assert!(memory.save_session_memory("my_project").value_or(false));
    assert!(memory.clear_all_memory().value_or(false));
    assert_eq!(memory.get_memory_stats().value_or_default().persistent_entries, 0);

    assert!(memory.load_session_memory("my_project").value_or(false));

    let ready = memory.as_ready().unwrap();
    let mut restored: Vec<String> = ready
        .store()
        .all_memory_entries(ready.session_id())
        .unwrap()
        .into_iter()
        .map(|e| e.content)
        .collect();
    restored.sort();
    assert_eq!(restored, originals.map(String::from).to_vec());

    // Context and ephemeral tiers are repopulated too
    let stats = memory.get_memory_stats().value_or_default();
    assert_eq!(stats.ephemeral_entries, 3);
    assert_eq!(stats.context_chunks, 3);
}

#[test]
fn load_picks_newest_snapshot() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());

    memory.add_to_session_memory(NewEntry::text("version one"));
    assert!(memory.save_session_memory("work").value_or(false));
    std::thread::sleep(std::time::Duration::from_millis(5));

    memory.add_to_session_memory(NewEntry::text("version two"));
    assert!(memory.save_session_memory("work").value_or(false));

    memory.clear_all_memory();
    assert!(memory.load_session_memory("work").value_or(false));
    assert_eq!(memory.get_memory_stats().value_or_default().persistent_entries, 2);
}

#[test]
fn load_unknown_or_disabled_returns_false() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("keep me"));
    assert!(memory.save_session_memory("snap").value_or(false));

    assert!(!memory.load_session_memory("nope").value_or(true));

    memory.set_memory_enabled(false);
    assert!(!memory.load_session_memory("snap").value_or(true));
    // Nothing was cleared
    assert_eq!(memory.get_memory_stats().value_or_default().persistent_entries, 1);
}

#[test]
fn failed_save_leaves_no_loadable_snapshot() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    for text in ["alpha", "beta", "gamma"] {
        memory.add_to_session_memory(NewEntry::text(text));
    }

    let conn = rusqlite::Connection::open(tmp.path().join("memory.db")).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER refuse_gamma BEFORE INSERT ON memory_entries \
         WHEN NEW.session_id LIKE 'saved%' AND NEW.content = 'gamma' \
         BEGIN SELECT RAISE(ABORT, 'refused'); END;",
    )
    .unwrap();

    let saved = memory.save_session_memory("snap");
    assert!(saved.is_fatal());
    assert!(!saved.value_or(true));

    conn.execute_batch("DROP TRIGGER refuse_gamma").unwrap();
    assert!(memory.get_available_sessions().value_or_default().is_empty());
    assert!(!memory.load_session_memory("snap").value_or(true));

    // The live session was not touched
    assert_eq!(memory.get_memory_stats().value_or_default().persistent_entries, 3);
}

#[test]
fn blank_snapshot_name_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    let outcome = memory.save_session_memory("   ");
    assert!(outcome.is_fatal());
    assert!(!outcome.value_or(false));
}

#[test]
fn available_sessions_lists_distinct_names_newest_first() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("x"));

    for name in ["alpha", "beta_release", "alpha"] {
        assert!(memory.save_session_memory(name).value_or(false));
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let names = memory.get_available_sessions().value_or_default();
    assert_eq!(names, vec!["alpha".to_string(), "beta_release".to_string()]);
}

#[test]
fn ephemeral_buffer_is_bounded() {
    let tmp = TempDir::new().unwrap();
    let mut options = helpers::test_options("bounded", tmp.path());
    options.ephemeral_capacity = 3;
    let memory = helpers::test_memory_with(tmp.path(), helpers::no_embedder(), options);

    for i in 0..5 {
        memory.add_to_session_memory(NewEntry::text(format!("item {i}")));
    }

    let stats = memory.get_memory_stats().value_or_default();
    assert_eq!(stats.ephemeral_entries, 3);
    assert_eq!(stats.persistent_entries, 5);
}

#[test]
fn summary_merges_store_and_context_stats() {
    let tmp = TempDir::new().unwrap();
    let memory = helpers::test_memory(tmp.path(), helpers::no_embedder());
    memory.add_to_session_memory(NewEntry::text("a").with_importance(0.5));
    memory.add_to_session_memory(NewEntry::text("b").with_type("note"));

    let overview = memory.get_session_summary().value_or_default();
    assert_eq!(overview.memory.total_entries, 2);
    assert!((overview.memory.average_importance - 0.75).abs() < 1e-9);
    let context = overview.context.unwrap();
    assert_eq!(context.total_chunks, 2);
    assert_eq!(context.by_content_type["note"], 1);
}

#[test]
fn open_from_config_uses_data_dir() {
    let tmp = TempDir::new().unwrap();
    let config = helpers::test_config(tmp.path());

    let memory = MemorySystem::open(&config, Some("cfg-session"), Some(tmp.path()));
    assert!(memory.is_ready());
    assert_eq!(memory.session_id(), "cfg-session");
    memory.add_to_session_memory(NewEntry::text("persisted"));
    memory.close();

    assert!(tmp.path().join("memory.db").exists());
    assert!(tmp.path().join("context.db").exists());

    let reopened = MemorySystem::open(&config, Some("cfg-session"), None);
    assert_eq!(
        reopened.get_memory_stats().value_or_default().persistent_entries,
        1
    );
}

#[test]
fn open_generates_session_id() {
    let tmp = TempDir::new().unwrap();
    let memory = MemorySystem::open(&helpers::test_config(tmp.path()), None, None);
    assert!(memory.session_id().starts_with("session_"));
    assert_eq!(memory.session_id().len(), "session_20260101_000000_000000".len());
}

#[test]
fn unusable_data_dir_yields_fallback() {
    let tmp = TempDir::new().unwrap();
    // A regular file where the data directory should be
    let blocker = tmp.path().join("not-a-dir");
    fs::write(&blocker, "occupied").unwrap();
    let config = helpers::test_config(&blocker);

    let memory = MemorySystem::open(&config, Some("s1"), None);
    assert!(!memory.is_ready());

    let outcome = memory.add_to_session_memory(NewEntry::text("lost"));
    assert!(outcome.is_degraded());
    assert_eq!(outcome.value_or(0), -1);
    assert!(memory.get_available_sessions().value_or_default().is_empty());
    assert!(!memory.get_memory_status().value_or_default().enabled);
}
