/// Integration tests for tidywatch
///
/// These tests drive the engine against real temporary directories: the
/// startup sweep, the live watcher, de-duplication, collision handling and
/// the history document.
///
/// Test categories:
/// 1. Startup sweep
/// 2. Live watching
/// 3. Collisions and de-duplication
/// 4. Configuration files
use indexmap::IndexMap;
use std::fs::{self, File};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tidywatch::config::EngineSettings;
use tidywatch::{Engine, EngineConfig, EngineError, HistoryRecord, HistoryStore, MonitoredFolder};

// ============================================================================
// Test Utilities
// ============================================================================

/// A temporary workspace holding one monitored folder and a history file.
struct TestFixture {
    temp_dir: TempDir,
}

impl TestFixture {
    /// Create a new fixture with an empty `inbox` folder.
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::create_dir(temp_dir.path().join("inbox")).expect("Failed to create inbox");
        TestFixture { temp_dir }
    }

    /// The monitored folder.
    fn inbox(&self) -> PathBuf {
        self.temp_dir.path().join("inbox")
    }

    fn history_path(&self) -> PathBuf {
        self.temp_dir.path().join("history.json")
    }

    /// Create a file with content in the monitored folder.
    fn create_file(&self, name: &str, content: &[u8]) -> PathBuf {
        let file_path = self.inbox().join(name);
        let mut file = File::create(&file_path).expect("Failed to create file");
        file.write_all(content).expect("Failed to write file content");
        file_path
    }

    /// Config with `Images -> Pictures` and `Documents -> Docs`, fast
    /// stability timings and the fixture's history file.
    fn config(&self) -> EngineConfig {
        self.config_for(vec![self.inbox()])
    }

    fn config_for(&self, folders: Vec<PathBuf>) -> EngineConfig {
        let mut file_types = IndexMap::new();
        file_types.insert("Images".to_string(), vec![".jpg".to_string(), ".png".to_string()]);
        file_types.insert("Documents".to_string(), vec![".pdf".to_string()]);
        file_types.insert("Videos".to_string(), vec![".mkv".to_string()]);

        let mut folder_paths = IndexMap::new();
        folder_paths.insert("Images".to_string(), "Pictures".to_string());
        folder_paths.insert("Documents".to_string(), "Docs".to_string());
        folder_paths.insert("Videos".to_string(), "Movies".to_string());

        EngineConfig {
            file_types,
            folder_paths,
            monitored_folders: folders
                .into_iter()
                .map(|path| MonitoredFolder {
                    path: path.to_string_lossy().into_owned(),
                    name: None,
                    enabled: true,
                    use_home_path: false,
                })
                .collect(),
            engine: EngineSettings {
                stability_wait_secs: 0.05,
                retry_delay_secs: 0.05,
                history_file: Some(self.history_path()),
                ..Default::default()
            },
        }
    }

    fn engine(&self) -> Engine {
        Engine::new(self.config()).expect("Failed to build engine")
    }

    fn history(&self) -> Vec<HistoryRecord> {
        HistoryStore::new(self.history_path())
            .load()
            .expect("Failed to load history")
    }

    /// Assert that a file exists at the given path relative to the inbox.
    fn assert_file_exists(&self, rel_path: &str) {
        let path = self.inbox().join(rel_path);
        assert!(path.is_file(), "File should exist: {}", path.display());
    }

    /// Assert that a file does NOT exist at the given path relative to the inbox.
    fn assert_file_not_exists(&self, rel_path: &str) {
        let path = self.inbox().join(rel_path);
        assert!(!path.exists(), "File should not exist: {}", path.display());
    }
}

/// Polls until `path` exists or the timeout passes.
async fn wait_for_file(path: &Path) -> bool {
    for _ in 0..200 {
        if path.is_file() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Runs the engine with `scenario` as the shutdown signal: the engine stops
/// as soon as the scenario future finishes.
async fn run_with<F>(engine: Engine, scenario: F) -> tidywatch::engine::RunSummary
where
    F: Future<Output = ()>,
{
    engine.run_until(scenario).await.expect("Engine failed")
}

// ============================================================================
// Test Suite 1: Startup Sweep
// ============================================================================

#[tokio::test]
async fn test_startup_sweep_moves_preexisting_files() {
    let fixture = TestFixture::new();
    fixture.create_file("holiday.jpg", &[0xFF; 64]);
    fixture.create_file("invoice.pdf", b"%PDF-1.4");
    fixture.create_file("notes.xyz", b"plain text");

    let summary = run_with(fixture.engine(), async {}).await;

    assert_eq!(summary.watched, 1);
    assert_eq!(summary.processed.moved, 3);
    fixture.assert_file_exists("Pictures/holiday.jpg");
    fixture.assert_file_exists("Docs/invoice.pdf");
    fixture.assert_file_exists("Others/notes.xyz");
    assert_eq!(fixture.history().len(), 3);
}

#[tokio::test]
async fn test_sweep_skips_partial_downloads() {
    let fixture = TestFixture::new();
    fixture.create_file("partial.crdownload", b"half");
    fixture.create_file("scratch.tmp", b"temp");
    fixture.create_file("photo.jpg", b"jpeg bytes");

    let report = fixture.engine().sweep_all().await.expect("Sweep failed");

    assert_eq!(report.moved, 1);
    assert_eq!(report.skipped, 2);
    fixture.assert_file_exists("partial.crdownload");
    fixture.assert_file_exists("scratch.tmp");
    fixture.assert_file_exists("Pictures/photo.jpg");

    let history = fixture.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].file, "photo.jpg");
}

#[tokio::test]
async fn test_sweep_preserves_content_and_records_history() {
    let fixture = TestFixture::new();
    let content = vec![42u8; 500];
    fixture.create_file("photo.jpg", &content);

    fixture.engine().sweep_all().await.expect("Sweep failed");

    assert_eq!(
        fs::read(fixture.inbox().join("Pictures/photo.jpg")).unwrap(),
        content
    );
    let history = fixture.history();
    assert_eq!(history[0].category, "Images");
    assert_eq!(history[0].destination, "Pictures/photo.jpg");
    assert_eq!(history[0].source_folder, fixture.inbox().to_string_lossy());
}

#[tokio::test]
async fn test_sweep_leaves_hidden_files_and_directories() {
    let fixture = TestFixture::new();
    fixture.create_file(".hidden.jpg", b"secret");
    fs::create_dir(fixture.inbox().join("Projects")).unwrap();

    let report = fixture.engine().sweep_all().await.expect("Sweep failed");

    assert_eq!(report.moved, 0);
    fixture.assert_file_exists(".hidden.jpg");
    assert!(fixture.inbox().join("Projects").is_dir());
    assert!(fixture.history().is_empty());
}

#[tokio::test]
async fn test_empty_file_does_not_block_sweep() {
    let fixture = TestFixture::new();
    fixture.create_file("0_empty.txt", b"");
    fixture.create_file("photo.jpg", b"jpeg bytes");

    let report = tokio::time::timeout(Duration::from_secs(5), fixture.engine().sweep_all())
        .await
        .expect("Sweep should not wait on an empty file")
        .expect("Sweep failed");

    assert_eq!(report.moved, 1);
    assert_eq!(report.deferred, 1);
    fixture.assert_file_exists("0_empty.txt");
    fixture.assert_file_exists("Pictures/photo.jpg");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_empty_file_does_not_block_startup_of_other_folders() {
    let fixture = TestFixture::new();
    let first = fixture.temp_dir.path().join("a");
    let second = fixture.temp_dir.path().join("b");
    fs::create_dir(&first).unwrap();
    fs::create_dir(&second).unwrap();
    fs::write(first.join("0_empty.txt"), b"").unwrap();
    fs::write(first.join("photo.jpg"), b"jpeg bytes").unwrap();
    fs::write(second.join("doc.jpg"), b"more jpeg bytes").unwrap();

    let engine = Engine::new(fixture.config_for(vec![first.clone(), second.clone()])).unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(5), run_with(engine, async {}))
        .await
        .expect("Engine should stop despite an unfinished file");

    assert_eq!(summary.watched, 2);
    assert_eq!(summary.processed.moved, 2);
    assert_eq!(summary.processed.deferred, 1);
    assert!(first.join("Pictures/photo.jpg").is_file());
    assert!(second.join("Pictures/doc.jpg").is_file());
    assert!(first.join("0_empty.txt").is_file());
}

#[tokio::test]
async fn test_missing_folder_is_skipped_not_fatal() {
    let fixture = TestFixture::new();
    fixture.create_file("photo.jpg", b"jpeg");
    let config = fixture.config_for(vec![
        fixture.temp_dir.path().join("does-not-exist"),
        fixture.inbox(),
    ]);

    let report = Engine::new(config).unwrap().sweep_all().await.unwrap();

    assert_eq!(report.moved, 1);
}

#[tokio::test]
async fn test_no_watchable_folder_is_fatal() {
    let fixture = TestFixture::new();
    let config = fixture.config_for(vec![fixture.temp_dir.path().join("does-not-exist")]);

    let result = Engine::new(config).unwrap().run_until(async {}).await;

    assert!(matches!(result, Err(EngineError::NothingWatched)));
}

// ============================================================================
// Test Suite 2: Live Watching
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_file_is_moved_by_watcher() {
    let fixture = TestFixture::new();
    let inbox = fixture.inbox();

    let moved = run_with(fixture.engine(), async {
        let mut file = File::create(inbox.join("photo.jpg")).unwrap();
        file.write_all(&[7u8; 500]).unwrap();
        drop(file);
        assert!(wait_for_file(&inbox.join("Pictures/photo.jpg")).await);
    })
    .await;

    assert_eq!(moved.watched, 1);
    fixture.assert_file_not_exists("photo.jpg");
    assert_eq!(fs::read(inbox.join("Pictures/photo.jpg")).unwrap().len(), 500);

    let history = fixture.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].category, "Images");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_partial_download_is_ignored_while_sibling_moves() {
    let fixture = TestFixture::new();
    let inbox = fixture.inbox();

    run_with(fixture.engine(), async {
        fs::write(inbox.join("partial.crdownload"), b"still downloading").unwrap();
        fs::write(inbox.join("report.pdf"), b"%PDF-1.4 done").unwrap();
        assert!(wait_for_file(&inbox.join("Docs/report.pdf")).await);
    })
    .await;

    fixture.assert_file_exists("partial.crdownload");
    let history = fixture.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].file, "report.pdf");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_rename_after_download_completes_is_processed() {
    let fixture = TestFixture::new();
    let inbox = fixture.inbox();

    run_with(fixture.engine(), async {
        let partial = inbox.join("movie.mkv.crdownload");
        fs::write(&partial, b"frames").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::rename(&partial, inbox.join("movie.mkv")).unwrap();
        assert!(wait_for_file(&inbox.join("Movies/movie.mkv")).await);
    })
    .await;

    fixture.assert_file_not_exists("movie.mkv.crdownload");
    assert_eq!(fixture.history().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unstable_file_does_not_block_siblings() {
    let fixture = TestFixture::new();
    let inbox = fixture.inbox();

    let summary = run_with(fixture.engine(), async {
        // Zero-byte files never count as stable.
        let stuck = inbox.join("stuck.jpg");
        fs::write(&stuck, b"").unwrap();
        fs::write(inbox.join("ready.pdf"), b"%PDF-1.4").unwrap();

        assert!(wait_for_file(&inbox.join("Docs/ready.pdf")).await);
        assert!(stuck.exists());
    })
    .await;

    // Shutdown ends the stuck wait and leaves the file in place.
    assert_eq!(summary.processed.deferred, 1);
    fixture.assert_file_exists("stuck.jpg");
    fixture.assert_file_not_exists("Pictures/stuck.jpg");
    assert_eq!(fixture.history().len(), 1);
}

// ============================================================================
// Test Suite 3: Collisions and De-duplication
// ============================================================================

#[tokio::test]
async fn test_same_name_in_a_later_run_gets_suffix() {
    let fixture = TestFixture::new();

    fixture.create_file("photo.jpg", b"first");
    fixture.engine().sweep_all().await.unwrap();

    fixture.create_file("photo.jpg", b"second");
    fixture.engine().sweep_all().await.unwrap();

    fixture.create_file("photo.jpg", b"third");
    fixture.engine().sweep_all().await.unwrap();

    assert_eq!(
        fs::read_to_string(fixture.inbox().join("Pictures/photo.jpg")).unwrap(),
        "first"
    );
    assert_eq!(
        fs::read_to_string(fixture.inbox().join("Pictures/photo_1.jpg")).unwrap(),
        "second"
    );
    assert_eq!(
        fs::read_to_string(fixture.inbox().join("Pictures/photo_2.jpg")).unwrap(),
        "third"
    );

    let destinations: Vec<_> = fixture
        .history()
        .into_iter()
        .map(|record| record.destination)
        .collect();
    assert_eq!(
        destinations,
        vec![
            "Pictures/photo.jpg",
            "Pictures/photo_1.jpg",
            "Pictures/photo_2.jpg"
        ]
    );
}

#[tokio::test]
async fn test_processed_path_is_not_moved_twice_in_one_run() {
    let fixture = TestFixture::new();
    let engine = fixture.engine();

    fixture.create_file("photo.jpg", b"first");
    engine.sweep_all().await.unwrap();

    fixture.create_file("photo.jpg", b"second");
    let report = engine.sweep_all().await.unwrap();

    assert_eq!(report.moved, 0);
    assert_eq!(report.skipped, 1);
    fixture.assert_file_exists("photo.jpg");
    fixture.assert_file_not_exists("Pictures/photo_1.jpg");
    assert_eq!(fixture.history().len(), 1);
}

#[tokio::test]
async fn test_existing_file_in_category_folder_is_not_overwritten() {
    let fixture = TestFixture::new();
    fs::create_dir(fixture.inbox().join("Pictures")).unwrap();
    fs::write(fixture.inbox().join("Pictures/photo.jpg"), "keep me").unwrap();
    fixture.create_file("photo.jpg", b"new arrival");

    fixture.engine().sweep_all().await.unwrap();

    assert_eq!(
        fs::read_to_string(fixture.inbox().join("Pictures/photo.jpg")).unwrap(),
        "keep me"
    );
    assert_eq!(
        fs::read_to_string(fixture.inbox().join("Pictures/photo_1.jpg")).unwrap(),
        "new arrival"
    );
}

#[tokio::test]
async fn test_corrupt_history_is_preserved() {
    let fixture = TestFixture::new();
    fs::write(fixture.history_path(), "{ definitely not a list").unwrap();
    fixture.create_file("photo.jpg", b"jpeg");

    let report = fixture.engine().sweep_all().await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(
        fs::read_to_string(fixture.history_path()).unwrap(),
        "{ definitely not a list"
    );
}

// ============================================================================
// Test Suite 4: Configuration Files
// ============================================================================

#[tokio::test]
async fn test_engine_from_json_config_file() {
    let fixture = TestFixture::new();
    let config_path = fixture.temp_dir.path().join("config.json");
    let document = serde_json::json!({
        "file_types": { "Images": [".jpg"] },
        "folder_paths": { "Images": "Pictures" },
        "monitored_folders": [
            { "path": fixture.inbox(), "name": "Inbox", "enabled": true, "use_home_path": false },
            { "path": "/nowhere", "name": "Off", "enabled": false }
        ],
        "engine": {
            "stability_wait_secs": 0.05,
            "retry_delay_secs": 0.05,
            "history_file": fixture.history_path()
        }
    });
    fs::write(&config_path, document.to_string()).unwrap();
    fixture.create_file("photo.JPG", b"jpeg");

    let config = EngineConfig::load(Some(&config_path)).unwrap();
    let report = Engine::new(config).unwrap().sweep_all().await.unwrap();

    assert_eq!(report.moved, 1);
    fixture.assert_file_exists("Pictures/photo.JPG");
}

#[tokio::test]
async fn test_ignore_patterns_from_config() {
    let fixture = TestFixture::new();
    let mut config = fixture.config();
    config.engine.ignore_patterns = vec!["~$*".to_string()];
    fixture.create_file("~$draft.pdf", b"lock file");
    fixture.create_file("draft.pdf", b"%PDF");

    let report = Engine::new(config).unwrap().sweep_all().await.unwrap();

    assert_eq!(report.moved, 1);
    fixture.assert_file_exists("~$draft.pdf");
    fixture.assert_file_exists("Docs/draft.pdf");
}
