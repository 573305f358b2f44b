//! Fingerprint store tests: staleness-aware get, upsert replace semantics, batched lookups.

use incscan::{FingerprintStore, Namespace, ScanError};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn ffprobe() -> Namespace {
    Namespace::new("ffprobe").unwrap()
}

fn open_store(dir: &TempDir) -> FingerprintStore {
    let namespaces = [ffprobe(), Namespace::timestamps(1)];
    FingerprintStore::open(dir.path().join("store").join("fp.db"), &namespaces).unwrap()
}

#[test]
fn test_put_then_get_round_trips_payload() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let path = Path::new("/media/movies/a.mkv");
    let payload = json!({"format": {"duration": "12.5"}, "streams": [1, 2]});

    store.put(&ffprobe(), path, 1_700_000_000, Some(&payload)).unwrap();
    let record = store
        .get(&ffprobe(), path, Some(1_700_000_000))
        .unwrap()
        .unwrap();
    assert_eq!(record.token, 1_700_000_000);
    assert_eq!(record.payload, Some(payload));
    assert!(record.last_update > 0);
}

#[test]
fn test_stale_token_reads_as_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let ns = Namespace::timestamps(1);
    let path = Path::new("/media/movies/a.mkv");

    store.put(&ns, path, 100, None).unwrap();
    assert!(store.get(&ns, path, Some(101)).unwrap().is_none());
    assert!(store.get(&ns, path, Some(99)).unwrap().is_none());
    assert!(store.get(&ns, path, Some(100)).unwrap().is_some());
    // Without an expected token the record is returned as stored.
    assert_eq!(store.get(&ns, path, None).unwrap().unwrap().token, 100);
}

#[test]
fn test_null_payload_is_a_cached_result() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let path = Path::new("/media/movies/silent.mkv");

    store.put(&ffprobe(), path, 5, None).unwrap();
    let record = store.get(&ffprobe(), path, Some(5)).unwrap();
    assert_eq!(record.map(|r| r.payload), Some(None));
}

#[test]
fn test_put_replaces_token_and_payload_together() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let path = Path::new("/media/movies/a.mkv");

    store.put(&ffprobe(), path, 1, Some(&json!({"old": true}))).unwrap();
    store.put(&ffprobe(), path, 2, None).unwrap();
    let record = store.get(&ffprobe(), path, None).unwrap().unwrap();
    assert_eq!(record.token, 2);
    assert_eq!(record.payload, None);
    assert_eq!(store.count(&ffprobe()).unwrap(), 1);
}

#[test]
fn test_put_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let path = Path::new("/media/movies/a.mkv");
    let payload = json!([1, 2, 3]);

    store.put(&ffprobe(), path, 42, Some(&payload)).unwrap();
    let first = store.get(&ffprobe(), path, Some(42)).unwrap().unwrap();
    store.put(&ffprobe(), path, 42, Some(&payload)).unwrap();
    let second = store.get(&ffprobe(), path, Some(42)).unwrap().unwrap();

    assert_eq!(first.token, second.token);
    assert_eq!(first.payload, second.payload);
    assert_eq!(store.count(&ffprobe()).unwrap(), 1);
}

#[test]
fn test_get_many_is_index_aligned() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let ns = Namespace::timestamps(1);
    store.put(&ns, Path::new("/m/a.mkv"), 10, None).unwrap();
    store.put(&ns, Path::new("/m/b.mkv"), 20, None).unwrap();

    let query = [
        PathBuf::from("/m/b.mkv"),
        PathBuf::from("/m/missing.mkv"),
        PathBuf::from("/m/a.mkv"),
        PathBuf::from("/m/b.mkv"),
        PathBuf::from("/m/other.mkv"),
    ];
    let tokens = store.get_tokens(&ns, &query).unwrap();
    assert_eq!(tokens, vec![Some(20), None, Some(10), Some(20), None]);

    let records = store.get_many(&ns, &query).unwrap();
    assert_eq!(records.len(), query.len());
    assert!(records[1].is_none());
    assert_eq!(records[2].as_ref().map(|r| r.token), Some(10));

    let empty: [&Path; 0] = [];
    assert!(store.get_many(&ns, &empty).unwrap().is_empty());
}

#[test]
fn test_put_many_then_reset() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let ns = Namespace::timestamps(1);
    let values = [
        (PathBuf::from("/m/a.mkv"), 111),
        (PathBuf::from("/m/b.mkv"), 222),
    ];
    store.put_many(&ns, &values).unwrap();
    assert_eq!(
        store.get_tokens(&ns, &[Path::new("/m/a.mkv"), Path::new("/m/b.mkv")]).unwrap(),
        vec![Some(111), Some(222)]
    );

    store.put_many(&ns, &[(PathBuf::from("/m/a.mkv"), 0)]).unwrap();
    assert!(store.get(&ns, Path::new("/m/a.mkv"), Some(111)).unwrap().is_none());
    assert_eq!(store.get(&ns, Path::new("/m/a.mkv"), None).unwrap().unwrap().token, 0);
}

#[test]
fn test_remove_and_all_keys() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let ns = Namespace::timestamps(1);
    for (i, name) in ["/m/a.mkv", "/m/b.mkv", "/m/c.mkv"].iter().enumerate() {
        store.put(&ns, Path::new(name), i as i64 + 1, None).unwrap();
    }

    let removed = store
        .remove(&ns, &[Path::new("/m/a.mkv"), Path::new("/m/nope.mkv"), Path::new("/m/c.mkv")])
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.all_keys(&ns).unwrap(), vec![PathBuf::from("/m/b.mkv")]);
}

#[test]
fn test_namespace_created_on_first_use() {
    let dir = TempDir::new().unwrap();
    let no_namespaces: [Namespace; 0] = [];
    let store = FingerprintStore::open(dir.path().join("fp.db"), &no_namespaces).unwrap();
    let ns = Namespace::timestamps(9);
    assert!(store.get(&ns, Path::new("/m/a.mkv"), None).unwrap().is_none());
    store.put(&ns, Path::new("/m/a.mkv"), 3, None).unwrap();
    assert_eq!(store.count(&ns).unwrap(), 1);
}

#[test]
fn test_initialize_is_idempotent_and_persists() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("fp.db");
    {
        let store = FingerprintStore::open(&db, &[ffprobe()]).unwrap();
        store.put(&ffprobe(), Path::new("/m/a.mkv"), 7, Some(&json!("x"))).unwrap();
    }
    let store = FingerprintStore::open(&db, &[ffprobe()]).unwrap();
    store.initialize(&[ffprobe()]).unwrap();
    let record = store.get(&ffprobe(), Path::new("/m/a.mkv"), Some(7)).unwrap();
    assert_eq!(record.unwrap().payload, Some(json!("x")));
}

#[test]
fn test_namespace_names_are_validated() {
    let err = Namespace::new("drop table").unwrap_err();
    assert!(matches!(err, ScanError::InvalidNamespace(_)));
    assert!(Namespace::new("").is_err());
    assert_eq!(Namespace::timestamps(3).as_str(), "timestamps_3");
    assert_eq!(Namespace::timestamps(-3).as_str(), "timestamps_n3");
}

#[test]
fn test_concurrent_sessions_write_distinct_paths() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let ns = Namespace::timestamps(1);

    std::thread::scope(|scope| {
        for worker in 0..4 {
            let store = &store;
            let ns = &ns;
            scope.spawn(move || {
                let session = store.session().unwrap();
                for i in 0..25 {
                    let path = PathBuf::from(format!("/m/{worker}/{i}.mkv"));
                    session.put(ns, &path, i, None).unwrap();
                }
            });
        }
    });

    assert_eq!(store.count(&ns).unwrap(), 100);
    assert_eq!(
        store.get(&ns, Path::new("/m/3/24.mkv"), None).unwrap().unwrap().token,
        24
    );
}

#[cfg(target_os = "linux")]
#[test]
fn test_keys_are_lossless_for_backslash_and_non_utf8_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let ns = Namespace::timestamps(1);
    let slash = PathBuf::from("/media/movies/a/b.mkv");
    let backslash = PathBuf::from("/media/movies/a\\b.mkv");
    let latin1 = Path::new(OsStr::from_bytes(b"/media/movies/caf\xe9.mkv")).to_path_buf();

    store.put(&ns, &slash, 1, None).unwrap();
    store.put(&ns, &backslash, 2, None).unwrap();
    store.put(&ns, &latin1, 3, None).unwrap();
    assert_eq!(store.count(&ns).unwrap(), 3);

    let tokens = store
        .get_tokens(&ns, &[&backslash, &slash, &latin1])
        .unwrap();
    assert_eq!(tokens, vec![Some(2), Some(1), Some(3)]);

    let mut keys = store.all_keys(&ns).unwrap();
    keys.sort();
    let mut expected = vec![slash, backslash.clone(), latin1.clone()];
    expected.sort();
    assert_eq!(keys, expected);

    assert_eq!(store.remove(&ns, &[&backslash, &latin1]).unwrap(), 2);
    assert_eq!(store.all_keys(&ns).unwrap(), vec![PathBuf::from("/media/movies/a/b.mkv")]);
}
