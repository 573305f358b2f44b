//! Request dispatcher tests: response shapes and end-to-end flows through the JSON surface.

use crossbeam_channel::Receiver;
use incscan::engine::NoopProgress;
use incscan::{Api, ChannelTaskQueue, Library, ScanItem, Settings};
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    api: Api,
    rx: Receiver<ScanItem>,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("shows");
    fs::create_dir_all(root.join("Season 1")).unwrap();
    fs::write(root.join("Season 1").join("e01.mkv"), b"one").unwrap();
    fs::write(root.join("pilot.mp4"), b"pilot").unwrap();
    fs::write(root.join("readme.txt"), b"text").unwrap();

    let mut settings = Settings::default().with_library(
        Library {
            id: 3,
            name: "Shows".to_string(),
            path: root.clone(),
            remote_only: false,
        },
        None,
    );
    settings.db_path = dir.path().join("fp.db");
    settings.scan.poll_interval = Duration::from_millis(10);

    let (queue, rx) = ChannelTaskQueue::new();
    let api = Api::from_settings(settings, Arc::new(queue), Arc::new(NoopProgress)).unwrap();
    Fixture {
        _dir: dir,
        root,
        api,
        rx,
    }
}

impl Fixture {
    fn call(&self, endpoint: &str, body: Value) -> Value {
        self.api.handle(endpoint, &body.to_string())
    }

    fn wait_idle(&self) {
        while self.api.pipeline().is_running() || self.api.prune().is_running() {
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn root_str(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }
}

#[test]
fn test_libraries_listing() {
    let f = fixture();
    let res = f.api.handle("/libraries", "");
    assert_eq!(res["children"][0]["title"], "Shows");
    assert_eq!(res["children"][0]["library_id"], 3);
    assert_eq!(res["children"][0]["lazy"], true);
}

#[test]
fn test_subtree_and_invalid_path() {
    let f = fixture();
    let res = f.call("/subtree", json!({"library_id": 3, "path": f.root_str()}));
    assert_eq!(res["title"], "shows");
    let children = res["children"].as_array().unwrap();
    let titles: Vec<&str> = children.iter().map(|c| c["title"].as_str().unwrap()).collect();
    assert_eq!(titles, vec!["Season 1", "pilot.mp4"]);
    assert!(children[1]["timestamp"].is_null());

    let res = f.call("/subtree", json!({"library_id": 3, "path": "/etc", "title": "etc"}));
    assert_eq!(res["success"], false);
    assert!(res["error"].as_str().unwrap().starts_with("Invalid path"));
    assert!(res["trace"].is_string());
}

#[test]
fn test_unknown_endpoint_and_bad_body() {
    let f = fixture();
    let res = f.api.handle("/nope", "{}");
    assert_eq!(res, json!({"success": false, "error": "unknown path: /nope"}));

    let res = f.api.handle("/test", "{not json");
    assert_eq!(res["success"], false);
    assert!(res["error"].as_str().unwrap().contains("invalid request body"));
}

#[test]
fn test_process_accepts_bare_item() {
    let f = fixture();
    let res = f.call(
        "/process",
        json!({"library_id": 3, "path": f.root_str(), "priority_score": 4}),
    );
    assert_eq!(res, json!({"success": true}));
    let items: Vec<ScanItem> = f.rx.try_iter().collect();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|i| i.priority_score == Some(4)));
}

#[test]
fn test_timestamp_update_visible_in_subtree() {
    let f = fixture();
    let res = f.call(
        "/timestamp/update",
        json!({"arr": [{"library_id": 3, "path": f.root_str()}]}),
    );
    assert_eq!(res, json!({"success": true}));

    let res = f.call("/subtree", json!({"library_id": 3, "path": f.root_str()}));
    let pilot = &res["children"][1];
    assert_eq!(pilot["title"], "pilot.mp4");
    assert_eq!(pilot["timestamp"], pilot["mtime"]);
}

#[test]
fn test_scan_then_rescan_forwards_nothing() {
    let f = fixture();
    let batch = json!({"arr": [{"library_id": 3, "path": f.root_str()}]});

    assert_eq!(f.call("/test", batch.clone()), json!({"success": true}));
    f.wait_idle();
    assert_eq!(f.rx.try_iter().count(), 2);

    assert_eq!(f.call("/test", batch), json!({"success": true}));
    f.wait_idle();
    assert_eq!(f.rx.try_iter().count(), 0);
}

#[test]
fn test_prune_endpoint() {
    let f = fixture();
    f.call(
        "/timestamp/update",
        json!({"library_id": 3, "path": f.root_str()}),
    );
    fs::remove_file(f.root.join("pilot.mp4")).unwrap();

    assert_eq!(f.api.handle("/prune", ""), json!({"success": true}));
    f.wait_idle();
    let res = f.call("/subtree", json!({"library_id": 3, "path": f.root_str()}));
    assert_eq!(res["children"].as_array().unwrap().len(), 1);
    assert_eq!(
        f.api
            .store()
            .count(&incscan::Namespace::timestamps(3))
            .unwrap(),
        1
    );

    let res = f.call("/prune", json!({"library_id": 99}));
    assert_eq!(res["success"], false);
}

#[test]
fn test_recorded_output_is_not_retested() {
    let f = fixture();
    let produced = f.root.join("Season 1").join("e01.mkv");
    let written = f
        .api
        .timestamps()
        .record_processed(3, &[produced, f.root.join("missing.mkv")])
        .unwrap();
    assert_eq!(written, 1);

    let batch = json!({"library_id": 3, "path": f.root_str()});
    assert_eq!(f.call("/test", batch), json!({"success": true}));
    f.wait_idle();
    let forwarded: Vec<ScanItem> = f.rx.try_iter().collect();
    assert_eq!(forwarded.len(), 1);
    assert!(forwarded[0].path.ends_with("pilot.mp4"));
}
