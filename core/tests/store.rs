//! Store opening tests — file-backed and in-memory databases.

use resonance_core::{matcher::EngineType, store::MatchStore};
use std::{fs, path::PathBuf};

fn temp_db() -> PathBuf {
    std::env::temp_dir().join(format!("resonance-{}.db", uuid::Uuid::new_v4()))
}

fn remove_db(path: &PathBuf) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

#[test]
fn file_store_opens_in_wal_mode_and_migrates() {
    let path = temp_db();
    let path_str = path.to_str().unwrap().to_string();
    {
        let store = MatchStore::open(&path_str).expect("file store");
        assert_eq!(store.journal_mode().unwrap().to_lowercase(), "wal");
        assert_eq!(store.path(), Some(path_str.as_str()));
        store.migrate().unwrap();
        store.set_verified_count("e-0001", EngineType::Time, 2).unwrap();
    }

    // Reopening sees the same data and mode.
    let store = MatchStore::open(&path_str).expect("reopen");
    assert_eq!(store.journal_mode().unwrap().to_lowercase(), "wal");
    drop(store);
    remove_db(&path);
}

#[test]
fn memory_path_through_open_is_not_an_error() {
    let store = MatchStore::open(":memory:").expect(":memory: must open");
    assert_eq!(store.journal_mode().unwrap().to_lowercase(), "memory");
    store.migrate().unwrap();
    assert_eq!(store.entity_count().unwrap(), 0);
}
