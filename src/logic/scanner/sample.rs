//! File admission for the detection cascade.
//!
//! A [`Sample`] is the fully buffered content of one candidate file plus
//! the classification facts the cascade branches on. Read failures of any
//! kind surface as a single error type; the engine maps them all to the
//! permission-error verdict.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{ARCHIVE_EXTENSIONS, EXECUTABLE_EXTENSIONS};

// ============================================================================
// ERRORS
// ============================================================================

/// Error raised when a candidate file cannot be read.
#[derive(Debug)]
pub struct SampleReadError(pub String);

impl fmt::Display for SampleReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sample read error: {}", self.0)
    }
}

impl std::error::Error for SampleReadError {}

// ============================================================================
// PUBLIC API
// ============================================================================

/// One candidate file, buffered and classified.
#[derive(Debug, Clone)]
pub struct Sample {
    pub path: PathBuf,
    pub size: u64,
    /// Lowercased extension without the leading dot, empty when absent.
    pub extension: String,
    pub content: Vec<u8>,
}

impl Sample {
    /// Buffers a file for analysis.
    pub fn read(path: &Path) -> Result<Self, SampleReadError> {
        let content = fs::read(path)
            .map_err(|e| SampleReadError(format!("{}: {}", path.display(), e)))?;
        let size = content.len() as u64;
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            size,
            extension,
            content,
        })
    }

    /// True for container formats routed to the archive handler.
    pub fn is_archive(&self) -> bool {
        ARCHIVE_EXTENSIONS.contains(&self.extension.as_str())
    }

    /// True for file types subject to publisher signature checks.
    pub fn is_executable(&self) -> bool {
        EXECUTABLE_EXTENSIONS.contains(&self.extension.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================
