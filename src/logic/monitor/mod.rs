//! Real-time monitoring orchestrator.
//!
//! One [`RealTimeMonitor`] instance owns every watcher: the scan worker
//! draining the file queue, the filesystem watcher, the process universe
//! watcher and optionally the pointer correlation loop. All watcher
//! state lives on the instance, threads share it through handles created
//! at start. Stopping flips one flag and joins every thread.

pub mod fs_watcher;
pub mod pointer;
pub mod process_watcher;
pub mod worker;

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::RwLock;

use crate::constants::{
    system_drive_root, CHECKER_THREADS, CONFIG_DIR, NEW_PROCESS_LEDGER_FILE, POINTER_POLL_MS,
    PROCESS_POLL_INTERVAL_MS, QUEUE_POLL_TIMEOUT_MS, SCAN_CACHE_FILE,
};
use crate::logic::scanner::{ScanEngine, ScanResult};
use crate::logic::store::JsonStore;
use pointer::{NullPointerResolver, PointerResolver};

// ============================================================================
// ERRORS
// ============================================================================

/// Error raised by monitor lifecycle operations.
#[derive(Debug)]
pub struct MonitorError(pub String);

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Monitor error: {}", self.0)
    }
}

impl std::error::Error for MonitorError {}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Wiring and timing for one monitor instance.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Directory trees the filesystem watcher subscribes to.
    pub watch_roots: Vec<PathBuf>,
    /// Directory holding the scan cache and process ledger.
    pub config_dir: PathBuf,
    /// Scan filesystem events on the watcher thread instead of queueing.
    pub inline_filesystem_scan: bool,
    /// Run the pointer correlation loop.
    pub enable_pointer_correlation: bool,
    pub process_poll_interval: Duration,
    pub queue_poll_timeout: Duration,
    pub checker_threads: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            watch_roots: vec![system_drive_root()],
            config_dir: PathBuf::from(CONFIG_DIR),
            inline_filesystem_scan: true,
            enable_pointer_correlation: false,
            process_poll_interval: Duration::from_millis(PROCESS_POLL_INTERVAL_MS),
            queue_poll_timeout: Duration::from_millis(QUEUE_POLL_TIMEOUT_MS),
            checker_threads: CHECKER_THREADS,
        }
    }
}

/// Owns the watcher threads and the channels between them.
pub struct RealTimeMonitor {
    config: MonitorConfig,
    engine: Arc<ScanEngine>,
    running: Arc<AtomicBool>,
    seen_executables: Arc<RwLock<HashSet<String>>>,
    scan_tx: Sender<PathBuf>,
    scan_rx: Option<Receiver<PathBuf>>,
    results_tx: Sender<ScanResult>,
    results_rx: Option<Receiver<ScanResult>>,
    pointer_resolver: Option<Box<dyn PointerResolver>>,
    handles: Vec<JoinHandle<()>>,
}

impl RealTimeMonitor {
    pub fn new(config: MonitorConfig, engine: Arc<ScanEngine>) -> Self {
        let (scan_tx, scan_rx) = mpsc::channel();
        let (results_tx, results_rx) = mpsc::channel();
        Self {
            config,
            engine,
            running: Arc::new(AtomicBool::new(false)),
            seen_executables: Arc::new(RwLock::new(HashSet::new())),
            scan_tx,
            scan_rx: Some(scan_rx),
            results_tx,
            results_rx: Some(results_rx),
            pointer_resolver: None,
            handles: Vec::new(),
        }
    }

    /// Installs the resolver used when pointer correlation is enabled.
    /// Must be called before [`start`](Self::start).
    pub fn set_pointer_resolver(&mut self, resolver: Box<dyn PointerResolver>) {
        self.pointer_resolver = Some(resolver);
    }

    /// Takes the receiving end of the results channel. Available once.
    pub fn take_results(&mut self) -> Option<Receiver<ScanResult>> {
        self.results_rx.take()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Queues a path for the scan worker.
    pub fn submit(&self, path: PathBuf) {
        let _ = self.scan_tx.send(path);
    }

    /// Executables the process watcher has claimed so far.
    pub fn seen_executable_count(&self) -> usize {
        self.seen_executables.read().len()
    }

    /// Spawns every watcher thread. A monitor starts at most once.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.is_running() {
            return Err(MonitorError("monitor already running".to_string()));
        }
        let Some(scan_rx) = self.scan_rx.take() else {
            return Err(MonitorError(
                "monitor cannot be started a second time".to_string(),
            ));
        };
        self.running.store(true, Ordering::SeqCst);

        let cache = JsonStore::open(&self.config.config_dir, SCAN_CACHE_FILE);
        let ledger = JsonStore::open(&self.config.config_dir, NEW_PROCESS_LEDGER_FILE);

        {
            let running = self.running.clone();
            let engine = self.engine.clone();
            let results_tx = self.results_tx.clone();
            let poll_timeout = self.config.queue_poll_timeout;
            self.handles.push(std::thread::spawn(move || {
                worker::run(running, scan_rx, engine, cache, results_tx, poll_timeout)
            }));
        }

        {
            let running = self.running.clone();
            let engine = self.engine.clone();
            let roots = self.config.watch_roots.clone();
            let scan_tx = self.scan_tx.clone();
            let results_tx = self.results_tx.clone();
            let inline_scan = self.config.inline_filesystem_scan;
            self.handles.push(std::thread::spawn(move || {
                fs_watcher::run(running, roots, engine, scan_tx, results_tx, inline_scan)
            }));
        }

        {
            let running = self.running.clone();
            let scan_tx = self.scan_tx.clone();
            let seen = self.seen_executables.clone();
            let poll_interval = self.config.process_poll_interval;
            let checker_threads = self.config.checker_threads;
            self.handles.push(std::thread::spawn(move || {
                process_watcher::run(running, scan_tx, ledger, seen, poll_interval, checker_threads)
            }));
        }

        if self.config.enable_pointer_correlation {
            let resolver = self
                .pointer_resolver
                .take()
                .unwrap_or_else(|| Box::new(NullPointerResolver));
            let running = self.running.clone();
            let scan_tx = self.scan_tx.clone();
            self.handles.push(std::thread::spawn(move || {
                pointer::run(
                    running,
                    resolver,
                    scan_tx,
                    Duration::from_millis(POINTER_POLL_MS),
                )
            }));
        }

        log::info!(
            "Real-time protection started ({} watcher thread(s))",
            self.handles.len()
        );
        Ok(())
    }

    /// Signals every watcher to stop and joins them.
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        log::info!("Real-time protection stopped");
    }
}

// ============================================================================
// INTERNAL IMPLEMENTATION
// ============================================================================

/// Sleeps in short slices so watcher threads notice a stop request well
/// before a full poll interval elapses.
pub(crate) fn sleep_while_running(running: &AtomicBool, total: Duration) {
    let step = Duration::from_millis(50);
    let mut slept = Duration::ZERO;
    while running.load(Ordering::SeqCst) && slept < total {
        let chunk = step.min(total - slept);
        std::thread::sleep(chunk);
        slept += chunk;
    }
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

    fn test_config(dir: &std::path::Path) -> MonitorConfig {
        let watched = dir.join("watched");
        std::fs::create_dir_all(&watched).unwrap();
        MonitorConfig {
            watch_roots: vec![watched],
            config_dir: dir.join("config"),
            inline_filesystem_scan: true,
            enable_pointer_correlation: false,
            // Long interval keeps the process watcher quiet during tests.
            process_poll_interval: Duration::from_secs(30),
            queue_poll_timeout: Duration::from_millis(10),
            checker_threads: 1,
        }
    }

    #[test]
    fn test_lifecycle_is_single_shot() {
        let dir = tempfile::tempdir().unwrap();
        let engine = test_engine(dir.path().join("staging"));
        let mut monitor = RealTimeMonitor::new(test_config(dir.path()), engine);

        assert!(!monitor.is_running());
        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert!(monitor.start().is_err());

        monitor.stop();
        assert!(!monitor.is_running());
        monitor.stop();
        assert!(monitor.start().is_err());
    }

    #[test]
    fn test_submitted_path_is_scanned_and_published() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("candidate.bin");
        std::fs::write(&target, b"ordinary queued file").unwrap();

        let engine = test_engine(dir.path().join("staging"));
        let mut monitor = RealTimeMonitor::new(test_config(dir.path()), engine);
        let results = monitor.take_results().unwrap();
        assert!(monitor.take_results().is_none());

        monitor.start().unwrap();
        monitor.submit(target.clone());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut found = None;
        while Instant::now() < deadline {
            match results.recv_timeout(Duration::from_millis(200)) {
                Ok(result) if result.path == target => {
                    found = Some(result);
                    break;
                }
                Ok(_) => {}
                Err(_) => {}
            }
        }
        monitor.stop();

        let result = found.expect("queued scan result never published");
        assert_eq!(result.verdict, "SAFE");

        let cache = JsonStore::open(&dir.path().join("config"), SCAN_CACHE_FILE);
        assert_eq!(
            cache.get_str(&target.to_string_lossy()).as_deref(),
            Some("SAFE")
        );
    }
}
