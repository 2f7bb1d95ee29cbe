//! Detection cascade engine.
//!
//! Every candidate file runs through a fixed stage order: admission,
//! publisher signature verification, exact hash lookups, similarity
//! lookups, then content rules. A suspicion score accumulates across
//! stages; once it crosses the quarantine threshold the remaining stages
//! are skipped and containment commands are emitted. Archives never
//! contain themselves, they hand off to the archive handler which scans
//! their extracted members.

pub mod archive;
pub mod hashes;
pub mod rules;
pub mod sample;
pub mod signatures;
pub mod trust;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::constants::{
    ARCHIVE_STAGING_DIR, FUZZY_SIMILARITY_CUTOFF, MALSHARE_SSDEEP_LABEL, SIGNATURE_HIT_SCORE,
    SMALL_FILE_CUTOFF_BYTES, SUSPICION_QUARANTINE_THRESHOLD, TLSH_DISTANCE_CUTOFF,
    VIRUSSHARE_LABEL,
};
use crate::logic::config::UserPreferences;
use crate::logic::response::ResponseHandle;

use rules::ContentRuleSet;
use sample::Sample;
use signatures::SignatureStore;
use trust::TrustVerifier;

pub use types::{label_has_detection_tag, ScanReport, ScanResult, Verdict};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Tunables for a scan engine instance.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub verify_executable_signatures: bool,
    pub deep_scan_archives: bool,
    pub staging_dir: PathBuf,
    pub tlsh_distance_cutoff: u32,
    pub fuzzy_similarity_cutoff: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            verify_executable_signatures: true,
            deep_scan_archives: true,
            staging_dir: PathBuf::from(ARCHIVE_STAGING_DIR),
            tlsh_distance_cutoff: TLSH_DISTANCE_CUTOFF,
            fuzzy_similarity_cutoff: FUZZY_SIMILARITY_CUTOFF,
        }
    }
}

impl ScanSettings {
    pub fn from_preferences(prefs: &UserPreferences) -> Self {
        Self {
            verify_executable_signatures: prefs.scan_executable_signatures,
            deep_scan_archives: prefs.archive_deep_scan,
            ..Self::default()
        }
    }
}

/// The detection cascade over loaded signatures and rules.
pub struct ScanEngine {
    signatures: SignatureStore,
    rules: ContentRuleSet,
    trust: Arc<dyn TrustVerifier>,
    responder: ResponseHandle,
    settings: ScanSettings,
}

impl ScanEngine {
    pub fn new(
        signatures: SignatureStore,
        rules: ContentRuleSet,
        trust: Arc<dyn TrustVerifier>,
        responder: ResponseHandle,
        settings: ScanSettings,
    ) -> Self {
        if let Err(e) = archive::reset_staging(&settings.staging_dir) {
            log::warn!(
                "Could not reset staging root {}: {}",
                settings.staging_dir.display(),
                e
            );
        }
        log::info!(
            "Scan engine initialized ({} signatures, {} content rules)",
            signatures.total_signatures(),
            rules.len()
        );
        Self {
            signatures,
            rules,
            trust,
            responder,
            settings,
        }
    }

    /// Runs the full cascade on one file and emits containment commands
    /// for detections. Never fails: unreadable files yield the
    /// permission-error verdict, everything else degrades to a skip.
    pub fn scan_path(&self, path: &Path) -> Verdict {
        let sample = match Sample::read(path) {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("Cannot read {}: {}", path.display(), e);
                return Verdict::PermissionError;
            }
        };
        if sample.size <= SMALL_FILE_CUTOFF_BYTES {
            log::debug!("Skipping {} ({} bytes)", path.display(), sample.size);
            return Verdict::Skipped;
        }

        let is_archive = sample.is_archive();
        let mut verdict = Verdict::Safe;
        let mut score = 0u32;

        if !is_archive && sample.is_executable() && self.settings.verify_executable_signatures {
            log::debug!("Analyzing publisher signature of {}", path.display());
            match self.trust.query_status(path) {
                Ok(status) => {
                    score += status.suspicion_score();
                    log::debug!(
                        "Signature status for {}: {} (score {})",
                        path.display(),
                        status,
                        score
                    );
                    if score >= SUSPICION_QUARANTINE_THRESHOLD {
                        verdict = Verdict::InvalidSignature;
                    }
                }
                Err(e) => {
                    log::warn!("Signature verification failed for {}: {}", path.display(), e)
                }
            }
        }

        if score < SUSPICION_QUARANTINE_THRESHOLD {
            let digest = hashes::sha256_hex(&sample.content);
            if let Some(label) = self.signatures.match_sha256(&digest) {
                verdict = Verdict::SignatureMatch(label.to_string());
                score = SIGNATURE_HIT_SCORE;
            }
        }

        if score < SUSPICION_QUARANTINE_THRESHOLD {
            let digest = hashes::md5_hex(&sample.content);
            if let Some(label) = self.signatures.match_md5(&digest) {
                verdict = Verdict::SignatureMatch(label.to_string());
                score = SIGNATURE_HIT_SCORE;
            }
        }

        if score < SUSPICION_QUARANTINE_THRESHOLD {
            if let Some(digest) = hashes::tlsh_digest(&sample.content) {
                if let Some(label) = self
                    .signatures
                    .match_tlsh(&digest, self.settings.tlsh_distance_cutoff)
                {
                    verdict = Verdict::SignatureMatch(label.to_string());
                    score = SIGNATURE_HIT_SCORE;
                    log::info!("TLSH similarity match for {}: {}", path.display(), label);
                }
            }
        }

        if score < SUSPICION_QUARANTINE_THRESHOLD {
            let digest = hashes::sha1_hex(&sample.content);
            if let Some(label) = self.signatures.match_sha1(&digest) {
                verdict = Verdict::SignatureMatch(label.to_string());
                score = SIGNATURE_HIT_SCORE;
            }
        }

        if score < SUSPICION_QUARANTINE_THRESHOLD {
            let digest = hashes::md5_hex(&sample.content);
            if self.signatures.is_known_bad_md5(&digest) {
                verdict = Verdict::SignatureMatch(VIRUSSHARE_LABEL.to_string());
                score = SIGNATURE_HIT_SCORE;
            }
        }

        if score < SUSPICION_QUARANTINE_THRESHOLD {
            if let Some(digest) = hashes::fuzzy_digest(&sample.content) {
                if let Some(similarity) = self
                    .signatures
                    .match_fuzzy(&digest, self.settings.fuzzy_similarity_cutoff)
                {
                    verdict = Verdict::SignatureMatch(MALSHARE_SSDEEP_LABEL.to_string());
                    score = SIGNATURE_HIT_SCORE;
                    log::info!(
                        "ssdeep similarity {} for {}",
                        similarity,
                        path.display()
                    );
                }
            }
        }

        if !is_archive && score < SUSPICION_QUARANTINE_THRESHOLD {
            if let Some(rule) = self.rules.match_content(&sample.content) {
                verdict = Verdict::RuleMatch(rule.to_string());
                score = SIGNATURE_HIT_SCORE;
            }
        }

        log::debug!("Verdict for {}: {}", path.display(), verdict.label());

        if !is_archive && score >= SUSPICION_QUARANTINE_THRESHOLD {
            self.responder.notify(
                "Malware Detected",
                &format!(
                    "Xylent is taking action against detected malware {}",
                    path.display()
                ),
            );
            self.responder.quarantine(path, &verdict.label());
        }

        if is_archive && self.settings.deep_scan_archives {
            self.handle_archive(path);
        }

        verdict
    }

    /// Walks directory trees and scans every regular file.
    pub fn scan_folders(&self, roots: &[PathBuf]) -> ScanReport {
        let mut report = ScanReport::new();
        for root in roots {
            for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let path = entry.path().to_path_buf();
                let verdict = self.scan_path(&path);
                report.insert(path, verdict.label());
            }
        }
        log::debug!("Folder scan finished: {} files", report.len());
        report
    }

    pub fn settings(&self) -> &ScanSettings {
        &self.settings
    }
}

// ============================================================================
// TESTS
// ============================================================================
