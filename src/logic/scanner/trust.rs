//! Publisher signature verification for executable files.
//!
//! Queries Authenticode status through PowerShell and maps each status to
//! a suspicion score contribution. Results are cached per path since
//! signature checks dominate scan latency on executables.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::process::Command;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

// ============================================================================
// CONSTANTS
// ============================================================================

const CACHE_MAX_SIZE: usize = 1000;

// ============================================================================
// STATE
// ============================================================================

static STATUS_CACHE: Lazy<RwLock<HashMap<String, SignatureStatus>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

// ============================================================================
// PUBLIC API
// ============================================================================

/// Authenticode verification status of an executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureStatus {
    Valid,
    HashMismatch,
    NotTrusted,
    NotSigned,
    UnknownError,
}

impl SignatureStatus {
    /// Maps the status token printed by Get-AuthenticodeSignature.
    /// Unrecognized tokens contribute nothing to the score.
    pub fn from_status_token(token: &str) -> Self {
        match token {
            "HashMismatch" => SignatureStatus::HashMismatch,
            "UnknownError" => SignatureStatus::UnknownError,
            "NotTrusted" => SignatureStatus::NotTrusted,
            "NotSigned" => SignatureStatus::NotSigned,
            _ => SignatureStatus::Valid,
        }
    }

    /// Suspicion contributed by this status.
    pub fn suspicion_score(&self) -> u32 {
        match self {
            SignatureStatus::HashMismatch | SignatureStatus::UnknownError => 80,
            SignatureStatus::NotTrusted => 70,
            SignatureStatus::NotSigned => 30,
            SignatureStatus::Valid => 0,
        }
    }
}

impl fmt::Display for SignatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignatureStatus::Valid => "Valid",
            SignatureStatus::HashMismatch => "HashMismatch",
            SignatureStatus::NotTrusted => "NotTrusted",
            SignatureStatus::NotSigned => "NotSigned",
            SignatureStatus::UnknownError => "UnknownError",
        };
        write!(f, "{}", name)
    }
}

/// Error raised when a signature status cannot be queried.
#[derive(Debug)]
pub struct TrustError(pub String);

impl fmt::Display for TrustError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trust verification error: {}", self.0)
    }
}

impl std::error::Error for TrustError {}

/// Source of publisher signature statuses.
pub trait TrustVerifier: Send + Sync {
    fn query_status(&self, path: &Path) -> Result<SignatureStatus, TrustError>;
}

/// Verifier backed by the platform Authenticode chain.
#[derive(Debug, Default)]
pub struct AuthenticodeVerifier;

impl AuthenticodeVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl TrustVerifier for AuthenticodeVerifier {
    fn query_status(&self, path: &Path) -> Result<SignatureStatus, TrustError> {
        let key = path.to_string_lossy().to_string();
        if let Some(cached) = STATUS_CACHE.read().get(&key) {
            return Ok(*cached);
        }

        let status = query_authenticode(path)?;
        cache_store(key, status);
        Ok(status)
    }
}

// ============================================================================
// INTERNAL IMPLEMENTATION
// ============================================================================

fn cache_store(key: String, status: SignatureStatus) {
    let mut cache = STATUS_CACHE.write();
    if cache.len() >= CACHE_MAX_SIZE {
        // Simple eviction: drop half
        let keys: Vec<String> = cache.keys().take(CACHE_MAX_SIZE / 2).cloned().collect();
        for stale in keys {
            cache.remove(&stale);
        }
    }
    cache.insert(key, status);
}

#[cfg(test)]
fn clear_status_cache() {
    STATUS_CACHE.write().clear();
}

fn query_authenticode(path: &Path) -> Result<SignatureStatus, TrustError> {
    let command = format!("(Get-AuthenticodeSignature \"{}\").Status", path.display());
    let output = Command::new("powershell")
        .args(["-NoProfile", "-Command", &command])
        .output()
        .map_err(|e| TrustError(format!("PowerShell execution failed: {}", e)))?;

    if !output.status.success() {
        return Err(TrustError(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok(SignatureStatus::from_status_token(&token))
}

// ============================================================================
// TESTS
// ============================================================================
