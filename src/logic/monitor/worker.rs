//! Scan worker servicing the monitor's file queue.
//!
//! Every queued path that still names a regular file goes through the
//! cascade; the verdict lands in the scan cache and on the results
//! channel. A queued path that vanished drops its stale cache entry
//! instead, so removal events keep the cache honest. Cache growth is
//! checked on every pass, idle ones included, so a quiet queue still
//! keeps the cache bounded.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;

use crate::constants::SCAN_CACHE_MAX_BYTES;
use crate::logic::scanner::{ScanEngine, ScanResult};
use crate::logic::store::JsonStore;

pub(crate) fn run(
    running: Arc<AtomicBool>,
    scan_rx: Receiver<PathBuf>,
    engine: Arc<ScanEngine>,
    mut cache: JsonStore,
    results_tx: Sender<ScanResult>,
    poll_timeout: Duration,
) {
    log::info!("Scan worker started");
    while running.load(Ordering::SeqCst) {
        match scan_rx.recv_timeout(poll_timeout) {
            Ok(path) => {
                if path.is_file() {
                    let verdict = engine.scan_path(&path).label();
                    cache.set(path.to_string_lossy(), Value::String(verdict.clone()));
                    if let Err(e) = cache.flush() {
                        log::warn!("Could not persist scan cache: {}", e);
                    }
                    let _ = results_tx.send(ScanResult {
                        path,
                        verdict,
                        observed_at: Utc::now(),
                    });
                } else if cache.remove(&path.to_string_lossy()).is_some() {
                    log::debug!("Dropped stale cache entry for {}", path.display());
                    if let Err(e) = cache.flush() {
                        log::warn!("Could not persist scan cache: {}", e);
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if cache.size_on_disk() >= SCAN_CACHE_MAX_BYTES {
            match cache.purge() {
                Ok(()) => log::info!("Scan cache purged ({})", cache.path().display()),
                Err(e) => log::warn!("Scan cache purge failed: {}", e),
            }
        }
    }
    log::info!("Scan worker stopped");
}

// ============================================================================
// TESTS
// ============================================================================
