//! Central constants for the Xylent detection core.
//!
//! Thresholds, verdict labels and on-disk locations live here so the
//! scanner, monitor and response layers stay in agreement.

use std::path::PathBuf;

/// Application name, used for data directories and notifications.
pub const APP_NAME: &str = "Xylent";

/// Application version, taken from Cargo.toml.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// DETECTION THRESHOLDS
// ============================================================================

/// Suspicion score at which a file is treated as malicious.
pub const SUSPICION_QUARANTINE_THRESHOLD: u32 = 70;

/// Score assigned when a signature or content rule hits.
pub const SIGNATURE_HIT_SCORE: u32 = 100;

/// Files of this many bytes or fewer carry no analyzable content.
pub const SMALL_FILE_CUTOFF_BYTES: u64 = 4;

/// TLSH needs a minimum amount of input before a digest is meaningful.
pub const TLSH_MIN_INPUT_BYTES: usize = 256;

/// Maximum TLSH digest distance still considered a match.
pub const TLSH_DISTANCE_CUTOFF: u32 = 30;

/// Minimum ssdeep similarity (0-100) considered a match.
pub const FUZZY_SIMILARITY_CUTOFF: u32 = 80;

// ============================================================================
// VERDICT LABELS
// ============================================================================

/// Verdict for files that passed every detection stage.
pub const LABEL_SAFE: &str = "SAFE";

/// Verdict for files the cascade did not analyze.
pub const LABEL_SKIPPED: &str = "SKIPPED";

/// Verdict for files the cascade could not read.
pub const LABEL_PERMISSION_ERROR: &str = "XYLENT_PERMISSION_ERROR";

/// Verdict for executables whose publisher signature failed verification.
pub const LABEL_INVALID_SIGNATURE: &str = "Invalid Signature";

/// Prefix marking a hash or fuzzy signature detection.
pub const SIGNATURE_TAG: &str = "[S]";

/// Prefix marking a content rule detection.
pub const RULE_TAG: &str = "[Y]";

/// Signature label for hits against the VirusShare MD5 corpus.
pub const VIRUSSHARE_LABEL: &str = " + VirusShare";

/// Signature label for ssdeep similarity hits against the MalShare corpus.
pub const MALSHARE_SSDEEP_LABEL: &str = " + MalShare (SSDEEP)";

// ============================================================================
// FILE CLASSES
// ============================================================================

/// Container extensions routed to the archive handler.
pub const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "tar"];

/// Extensions subject to publisher signature verification.
pub const EXECUTABLE_EXTENSIONS: &[&str] = &["exe", "msi"];

// ============================================================================
// ON-DISK LOCATIONS
// ============================================================================

/// Directory holding the scan cache, process ledger and preferences.
pub const CONFIG_DIR: &str = "./config";

/// Scan cache file name inside the config directory.
pub const SCAN_CACHE_FILE: &str = "xylent_scancache";

/// Process ledger file name inside the config directory.
pub const NEW_PROCESS_LEDGER_FILE: &str = "new_processes.json";

/// User preferences file name inside the config directory.
pub const USER_PREFERENCES_FILE: &str = "user_preferences.json";

/// Directory holding signature definition files.
pub const DEFINITIONS_DIR: &str = "./definitions";

/// Content rule definitions inside the definitions directory.
pub const CONTENT_RULES_FILE: &str = "content_rules.json";

/// Plain-text list of rule names excluded from detection.
pub const EXCLUDED_RULES_FILE: &str = "./excluded/excluded_rules.txt";

/// Staging directory for archive extraction.
pub const ARCHIVE_STAGING_DIR: &str = "./scanExtracts";

/// Scan cache size on disk that triggers a purge.
pub const SCAN_CACHE_MAX_BYTES: u64 = 500_000;

// ============================================================================
// MONITOR TIMING
// ============================================================================

/// Interval between process universe snapshots.
pub const PROCESS_POLL_INTERVAL_MS: u64 = 1_000;

/// Timeout for a single scan queue poll.
pub const QUEUE_POLL_TIMEOUT_MS: u64 = 10;

/// Timeout for a single filesystem event poll.
pub const FS_EVENT_POLL_MS: u64 = 200;

/// Interval between pointer correlation polls.
pub const POINTER_POLL_MS: u64 = 50;

/// Worker threads used to analyze new processes in parallel.
pub const CHECKER_THREADS: usize = 4;

/// Upper bound on ancestry walks, guards against PID cycles.
pub const ANCESTRY_MAX_HOPS: usize = 100;

/// Root of the filesystem subtree watched by default.
pub fn system_drive_root() -> PathBuf {
    if cfg!(windows) {
        std::env::var("SystemDrive")
            .map(|drive| PathBuf::from(format!("{}\\", drive)))
            .unwrap_or_else(|_| PathBuf::from("C:\\"))
    } else {
        PathBuf::from("/")
    }
}
