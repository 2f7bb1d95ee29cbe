//! Xylent detection core - service entry point.
//!
//! Without arguments the service loads signatures, starts the response
//! executor and runs real-time protection until terminated. With path
//! arguments it performs a one-shot scan of those directory trees
//! instead.

mod constants;
mod logic;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use logic::config::UserPreferences;
use logic::monitor::{MonitorConfig, RealTimeMonitor};
use logic::response::quarantine::QuarantineVault;
use logic::response::{ExecutorSettings, ResponseExecutor};
use logic::scanner::rules::ContentRuleSet;
use logic::scanner::signatures::SignatureStore;
use logic::scanner::trust::AuthenticodeVerifier;
use logic::scanner::{ScanEngine, ScanSettings};
use logic::store::JsonStore;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Starting {} core v{}", constants::APP_NAME, constants::APP_VERSION);

    let config_dir = PathBuf::from(constants::CONFIG_DIR);
    let preferences_store = JsonStore::open(&config_dir, constants::USER_PREFERENCES_FILE);
    let preferences = UserPreferences::load(&preferences_store);

    let definitions_dir = Path::new(constants::DEFINITIONS_DIR);
    if !logic::scanner::signatures::definitions_present(definitions_dir) {
        log::warn!(
            "No definition files under {}, detection limited to publisher signatures",
            definitions_dir.display()
        );
    }
    let signatures = SignatureStore::load(definitions_dir);
    let rules = ContentRuleSet::load(
        &definitions_dir.join(constants::CONTENT_RULES_FILE),
        Path::new(constants::EXCLUDED_RULES_FILE),
    );

    let executor = ResponseExecutor::spawn(
        QuarantineVault::open_default(),
        ExecutorSettings::from_preferences(&preferences),
    );
    let engine = Arc::new(ScanEngine::new(
        signatures,
        rules,
        Arc::new(AuthenticodeVerifier::new()),
        executor.handle(),
        ScanSettings::from_preferences(&preferences),
    ));

    let scan_roots: Vec<PathBuf> = std::env::args().skip(1).map(PathBuf::from).collect();
    if !scan_roots.is_empty() {
        run_one_shot_scan(&engine, &scan_roots);
        executor.shutdown();
        return;
    }

    if !preferences.real_time_protection {
        log::warn!("Real-time protection is disabled in preferences, exiting");
        executor.shutdown();
        return;
    }

    let mut monitor = RealTimeMonitor::new(MonitorConfig::default(), engine);
    let Some(results) = monitor.take_results() else {
        log::error!("Results channel unavailable");
        executor.shutdown();
        return;
    };
    if let Err(e) = monitor.start() {
        log::error!("Could not start real-time protection: {}", e);
        executor.shutdown();
        return;
    }

    // The service runs until killed; every published verdict is logged.
    for result in results.iter() {
        log::info!("{} -> {}", result.path.display(), result.verdict);
    }

    monitor.stop();
    executor.shutdown();
}

fn run_one_shot_scan(engine: &ScanEngine, roots: &[PathBuf]) {
    log::info!("One-shot scan of {} root(s)", roots.len());
    let report = engine.scan_folders(roots);
    let mut detections = 0usize;
    for (path, verdict) in &report {
        if logic::scanner::label_has_detection_tag(verdict)
            || verdict == constants::LABEL_INVALID_SIGNATURE
        {
            detections += 1;
        }
        log::info!("{} -> {}", path.display(), verdict);
    }
    log::info!(
        "Scan finished: {} file(s), {} detection(s)",
        report.len(),
        detections
    );
}
