//! Prune job tests: stale timestamp records and orphaned metadata.

use incscan::{
    FingerprintStore, Library, Namespace, PathClassifier, PruneJob, ScanError, Settings,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    store: Arc<FingerprintStore>,
    job: PruneJob,
}

fn ffprobe() -> Namespace {
    Namespace::new("ffprobe").unwrap()
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("movies");
    fs::create_dir_all(&root).unwrap();
    let settings = Arc::new(
        Settings::default()
            .with_library(
                Library {
                    id: 1,
                    name: "Movies".to_string(),
                    path: root.clone(),
                    remote_only: false,
                },
                None,
            )
            .with_library(
                Library {
                    id: 2,
                    name: "Remote".to_string(),
                    path: dir.path().join("remote"),
                    remote_only: true,
                },
                None,
            ),
    );
    let classifier = Arc::new(PathClassifier::new(settings.clone()));
    let store = Arc::new(
        FingerprintStore::open(dir.path().join("fp.db"), &[Namespace::timestamps(1), ffprobe()])
            .unwrap(),
    );
    let job = PruneJob::new(settings, classifier, Arc::clone(&store))
        .with_metadata_namespaces(vec![ffprobe()]);
    Fixture {
        _dir: dir,
        root,
        store,
        job,
    }
}

fn touch(path: &Path) {
    fs::write(path, b"data").unwrap();
}

#[test]
fn test_prune_drops_missing_and_disallowed_records() {
    let f = fixture();
    let ns = Namespace::timestamps(1);
    let kept = f.root.join("a.mkv");
    let notes = f.root.join("notes.txt");
    let gone = f.root.join("gone.mkv");
    touch(&kept);
    touch(&notes);
    for path in [&kept, &notes, &gone] {
        f.store.put(&ns, path, 10, None).unwrap();
    }

    let report = f.job.run(Some(1)).unwrap().unwrap();
    assert_eq!(report.timestamps_pruned, 2);
    assert_eq!(report.metadata_pruned, 0);
    assert_eq!(f.store.all_keys(&ns).unwrap(), vec![kept]);
    assert!(!f.job.is_running());
}

#[test]
fn test_metadata_orphans_pruned_only_on_full_prune() {
    let f = fixture();
    let kept = f.root.join("a.mkv");
    touch(&kept);
    f.store.put(&ffprobe(), &kept, 1, None).unwrap();
    f.store
        .put(&ffprobe(), &f.root.join("deleted.mkv"), 1, None)
        .unwrap();

    let scoped = f.job.run(Some(1)).unwrap().unwrap();
    assert_eq!(scoped.metadata_pruned, 0);
    assert_eq!(f.store.count(&ffprobe()).unwrap(), 2);

    let full = f.job.run(None).unwrap().unwrap();
    assert_eq!(full.metadata_pruned, 1);
    assert_eq!(full.total(), 1);
    assert_eq!(f.store.all_keys(&ffprobe()).unwrap(), vec![kept]);
}

#[test]
fn test_prune_rejects_unknown_and_remote_libraries() {
    let f = fixture();
    let err = f.job.run(Some(7)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScanError>(),
        Some(ScanError::UnknownLibrary(7))
    ));
    let err = f.job.run(Some(2)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ScanError>(),
        Some(ScanError::RemoteOnlyLibrary(2))
    ));
}

#[test]
fn test_spawned_prune_finishes_in_background() {
    let f = fixture();
    let ns = Namespace::timestamps(1);
    f.store.put(&ns, &f.root.join("gone.mkv"), 3, None).unwrap();

    let job = Arc::new(f.job);
    assert!(job.spawn(None).unwrap());
    while job.is_running() {
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    assert_eq!(f.store.count(&ns).unwrap(), 0);
}

#[cfg(target_os = "linux")]
#[test]
fn test_prune_keeps_existing_files_with_unusual_names() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let f = fixture();
    let ns = Namespace::timestamps(1);
    let backslash = f.root.join("a\\b.mkv");
    let latin1 = f.root.join(OsStr::from_bytes(b"caf\xe9.mkv"));
    touch(&backslash);
    touch(&latin1);
    f.store.put(&ns, &backslash, 10, None).unwrap();
    f.store.put(&ns, &latin1, 10, None).unwrap();

    let report = f.job.run(Some(1)).unwrap().unwrap();
    assert_eq!(report.timestamps_pruned, 0);
    let mut keys = f.store.all_keys(&ns).unwrap();
    keys.sort();
    let mut expected = vec![backslash, latin1];
    expected.sort();
    assert_eq!(keys, expected);
}
