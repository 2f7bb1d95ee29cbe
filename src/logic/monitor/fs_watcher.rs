//! Filesystem change watcher.
//!
//! Subscribes to recursive change notifications for the configured roots
//! and reacts to every created, modified or removed path. In inline mode
//! the watcher scans on its own thread and publishes straight to the
//! results channel; otherwise paths are queued for the scan worker.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::constants::FS_EVENT_POLL_MS;
use crate::logic::scanner::{ScanEngine, ScanResult};

pub(crate) fn run(
    running: Arc<AtomicBool>,
    roots: Vec<PathBuf>,
    engine: Arc<ScanEngine>,
    scan_tx: Sender<PathBuf>,
    results_tx: Sender<ScanResult>,
    inline_scan: bool,
) {
    let (event_tx, event_rx) = mpsc::channel();
    let mut watcher = match RecommendedWatcher::new(
        move |event: Result<Event, notify::Error>| {
            let _ = event_tx.send(event);
        },
        Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(e) => {
            log::error!("Filesystem watcher init failed: {}", e);
            return;
        }
    };

    for root in &roots {
        if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
            log::warn!("Cannot watch {}: {}", root.display(), e);
        }
    }
    log::info!("Filesystem watcher started ({} root(s))", roots.len());

    let poll = Duration::from_millis(FS_EVENT_POLL_MS);
    while running.load(Ordering::SeqCst) {
        match event_rx.recv_timeout(poll) {
            Ok(Ok(event)) => {
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    continue;
                }
                for path in event.paths {
                    log::debug!("Filesystem activity: {}", path.display());
                    if inline_scan {
                        let verdict = engine.scan_path(&path).label();
                        let _ = results_tx.send(ScanResult {
                            path,
                            verdict,
                            observed_at: Utc::now(),
                        });
                    } else {
                        let _ = scan_tx.send(path);
                    }
                }
            }
            Ok(Err(e)) => log::warn!("Filesystem watch error: {}", e),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!("Filesystem watcher stopped");
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::logic::response;
    use crate::logic::scanner::rules::ContentRuleSet;
    use crate::logic::scanner::signatures::SignatureStore;
    use crate::logic::scanner::trust::{SignatureStatus, TrustError, TrustVerifier};
    use crate::logic::scanner::ScanSettings;

    struct ValidVerifier;

    impl TrustVerifier for ValidVerifier {
        fn query_status(
            &self,
            _path: &std::path::Path,
        ) -> Result<SignatureStatus, TrustError> {
            Ok(SignatureStatus::Valid)
        }
    }

    fn test_engine(staging: PathBuf) -> Arc<ScanEngine> {
        let (handle, _rx) = response::channel();
        Arc::new(ScanEngine::new(
            SignatureStore::default(),
            ContentRuleSet::default(),
            Arc::new(ValidVerifier),
            handle,
            ScanSettings {
                staging_dir: staging,
                ..ScanSettings::default()
            },
        ))
    }

    #[test]
    fn test_queue_mode_forwards_changed_paths() {
        let dir = tempfile::tempdir().unwrap();
        let watched = dir.path().join("watched");
        std::fs::create_dir_all(&watched).unwrap();

        let engine = test_engine(dir.path().join("staging"));
        let running = Arc::new(AtomicBool::new(true));
        let (scan_tx, scan_rx) = mpsc::channel();
        let (results_tx, _results_rx) = mpsc::channel();

        let thread = {
            let running = running.clone();
            let roots = vec![watched.clone()];
            std::thread::spawn(move || run(running, roots, engine, scan_tx, results_tx, false))
        };

        // Give the watcher a moment to register before touching the tree.
        std::thread::sleep(Duration::from_millis(300));
        std::fs::write(watched.join("incoming.bin"), b"fresh file content").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut forwarded = None;
        while Instant::now() < deadline {
            match scan_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(path) => {
                    if path.file_name().map(|n| n == "incoming.bin").unwrap_or(false) {
                        forwarded = Some(path);
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        running.store(false, Ordering::SeqCst);
        thread.join().unwrap();
        assert!(forwarded.is_some(), "change event never forwarded");
    }

    #[test]
    fn test_inline_mode_publishes_results_directly() {
        let dir = tempfile::tempdir().unwrap();
        let watched = dir.path().join("watched");
        std::fs::create_dir_all(&watched).unwrap();

        let engine = test_engine(dir.path().join("staging"));
        let running = Arc::new(AtomicBool::new(true));
        let (scan_tx, _scan_rx) = mpsc::channel();
        let (results_tx, results_rx) = mpsc::channel();

        let thread = {
            let running = running.clone();
            let roots = vec![watched.clone()];
            std::thread::spawn(move || run(running, roots, engine, scan_tx, results_tx, true))
        };

        std::thread::sleep(Duration::from_millis(300));
        std::fs::write(watched.join("incoming.bin"), b"fresh file content").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut published = None;
        while Instant::now() < deadline {
            match results_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(result) => {
                    if result
                        .path
                        .file_name()
                        .map(|n| n == "incoming.bin")
                        .unwrap_or(false)
                        && result.verdict == "SAFE"
                    {
                        published = Some(result);
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        running.store(false, Ordering::SeqCst);
        thread.join().unwrap();
        assert!(published.is_some(), "inline scan result never published");
    }
}
