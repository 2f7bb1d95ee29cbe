//! Verdict and report types shared across the detection cascade.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    LABEL_INVALID_SIGNATURE, LABEL_PERMISSION_ERROR, LABEL_SAFE, LABEL_SKIPPED, RULE_TAG,
    SIGNATURE_TAG,
};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Outcome of running the detection cascade on a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every stage passed without a hit.
    Safe,
    /// The file carried no analyzable content.
    Skipped,
    /// The file could not be read.
    PermissionError,
    /// Publisher signature verification pushed the score over the threshold.
    InvalidSignature,
    /// A hash or fuzzy signature matched; the label names the family.
    SignatureMatch(String),
    /// A content rule matched; the label names the rule.
    RuleMatch(String),
}

impl Verdict {
    /// Externally visible verdict string.
    pub fn label(&self) -> String {
        match self {
            Verdict::Safe => LABEL_SAFE.to_string(),
            Verdict::Skipped => LABEL_SKIPPED.to_string(),
            Verdict::PermissionError => LABEL_PERMISSION_ERROR.to_string(),
            Verdict::InvalidSignature => LABEL_INVALID_SIGNATURE.to_string(),
            Verdict::SignatureMatch(name) => format!("{}{}", SIGNATURE_TAG, name),
            Verdict::RuleMatch(name) => format!("{}{}", RULE_TAG, name),
        }
    }

    /// True when the cascade did not analyze the file.
    pub fn is_skip(&self) -> bool {
        matches!(self, Verdict::Skipped | Verdict::PermissionError)
    }

    /// True when the verdict warrants containment.
    pub fn is_detection(&self) -> bool {
        matches!(
            self,
            Verdict::InvalidSignature | Verdict::SignatureMatch(_) | Verdict::RuleMatch(_)
        )
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// True for verdict labels produced by a signature or content rule hit.
pub fn label_has_detection_tag(label: &str) -> bool {
    label.starts_with(SIGNATURE_TAG) || label.starts_with(RULE_TAG)
}

/// Per-path verdict labels for a folder walk.
pub type ScanReport = HashMap<PathBuf, String>;

/// One published scan outcome on the results channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub path: PathBuf,
    pub verdict: String,
    pub observed_at: DateTime<Utc>,
}

// ============================================================================
// TESTS
// ============================================================================
