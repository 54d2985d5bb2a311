mod helpers;

use mnemo::db::migrations::{get_embedding_model, get_schema_version, CURRENT_SCHEMA_VERSION};
use mnemo::db::{self, StoreKind};
use mnemo::memory::NewEntry;
use tempfile::TempDir;

/// Lay down a file with only the v1 schema, as an older build would have left it.
fn v1_file(path: &std::path::Path, kind: StoreKind) {
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn, kind).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);
}

#[test]
fn fresh_stores_are_at_current_version() {
    let tmp = TempDir::new().unwrap();
    helpers::test_store(tmp.path());
    helpers::test_context(tmp.path(), helpers::no_embedder());

    for name in ["memory.db", "context.db"] {
        let conn = rusqlite::Connection::open(tmp.path().join(name)).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }
}

#[test]
fn v1_memory_store_upgrades_on_open() {
    let tmp = TempDir::new().unwrap();
    v1_file(&tmp.path().join("memory.db"), StoreKind::Memory);

    let store = helpers::test_store(tmp.path());
    store.add_memory_entry("s1", &NewEntry::text("after upgrade")).unwrap();
    store.close();

    let conn = rusqlite::Connection::open(tmp.path().join("memory.db")).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    let index: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = 'idx_memory_entries_ranking'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(index, 1);
}

#[test]
fn v1_context_store_gets_default_model() {
    let tmp = TempDir::new().unwrap();
    v1_file(&tmp.path().join("context.db"), StoreKind::Context);
    {
        let conn = rusqlite::Connection::open(tmp.path().join("context.db")).unwrap();
        assert!(get_embedding_model(&conn).unwrap().is_none());
    }

    helpers::test_context(tmp.path(), helpers::no_embedder());

    let conn = rusqlite::Connection::open(tmp.path().join("context.db")).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert_eq!(
        get_embedding_model(&conn).unwrap(),
        Some("all-MiniLM-L6-v2".to_string())
    );
}

#[test]
fn reopening_is_a_no_op() {
    let tmp = TempDir::new().unwrap();
    for _ in 0..3 {
        let store = helpers::test_store(tmp.path());
        store.close();
    }
    let conn = rusqlite::Connection::open(tmp.path().join("memory.db")).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}
