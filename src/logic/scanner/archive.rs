//! Archive deep-scan handling.
//!
//! Each archive is extracted into its own directory under the staging
//! root, its members run through the regular cascade, and any detected
//! member triggers a repair command. The repair command owns that
//! extraction directory: the response executor rebuilds the archive from
//! it and removes it afterwards, so later scans cannot disturb a pending
//! repair. Archives already sitting inside the staging tree are left
//! alone, which bounds extraction depth for nested containers. Every
//! failure here is logged and swallowed, a broken archive must not take
//! down a scan pass.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use super::types::label_has_detection_tag;
use super::ScanEngine;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum ArchiveError {
    UnsupportedFormat(String),
    Io(String),
    Malformed(String),
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveError::UnsupportedFormat(ext) => {
                write!(f, "Unsupported archive format: {}", ext)
            }
            ArchiveError::Io(msg) => write!(f, "Archive I/O error: {}", msg),
            ArchiveError::Malformed(msg) => write!(f, "Malformed archive: {}", msg),
        }
    }
}

impl std::error::Error for ArchiveError {}

// ============================================================================
// PUBLIC API
// ============================================================================

impl ScanEngine {
    /// Extracts an archive into a fresh staging directory, scans the
    /// members and requests repair when any member is detected. The
    /// directory is handed to the repair command; clean archives discard
    /// it right away.
    pub(crate) fn handle_archive(&self, path: &Path) {
        if path_is_staged(path, &self.settings.staging_dir) {
            log::debug!("Leaving staged archive alone: {}", path.display());
            return;
        }

        log::info!("Deep-scanning archive {}", path.display());
        let staging = self
            .settings
            .staging_dir
            .join(uuid::Uuid::new_v4().to_string());
        if let Err(e) = fs::create_dir_all(&staging) {
            log::error!(
                "Cannot prepare staging directory {}: {}",
                staging.display(),
                e
            );
            return;
        }
        if let Err(e) = extract_archive(path, &staging) {
            log::warn!("Extraction failed for {}: {}", path.display(), e);
            discard_staging(&staging);
            return;
        }

        let report = self.scan_folders(std::slice::from_ref(&staging));
        let offenders: Vec<PathBuf> = report
            .iter()
            .filter(|(_, label)| label_has_detection_tag(label))
            .map(|(member, _)| member.clone())
            .collect();

        if offenders.is_empty() {
            discard_staging(&staging);
            return;
        }

        log::warn!(
            "Archive {} contains {} malicious member(s)",
            path.display(),
            offenders.len()
        );
        self.responder.notify(
            "Archive Repaired",
            "Archive with malicious content repaired. Malware removed, Safe content Preserved!",
        );
        self.responder.repair_archive(path, &staging, offenders, true);
    }
}

/// Unpacks a zip or tar archive into `dst`.
pub(crate) fn extract_archive(path: &Path, dst: &Path) -> Result<(), ArchiveError> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "zip" => {
            let file = fs::File::open(path)
                .map_err(|e| ArchiveError::Io(format!("{}: {}", path.display(), e)))?;
            let mut archive = zip::ZipArchive::new(file)
                .map_err(|e| ArchiveError::Malformed(format!("{}: {}", path.display(), e)))?;
            archive
                .extract(dst)
                .map_err(|e| ArchiveError::Malformed(format!("{}: {}", path.display(), e)))
        }
        "tar" => {
            let file = fs::File::open(path)
                .map_err(|e| ArchiveError::Io(format!("{}: {}", path.display(), e)))?;
            tar::Archive::new(file)
                .unpack(dst)
                .map_err(|e| ArchiveError::Malformed(format!("{}: {}", path.display(), e)))
        }
        other => Err(ArchiveError::UnsupportedFormat(other.to_string())),
    }
}

// ============================================================================
// INTERNAL IMPLEMENTATION
// ============================================================================

/// True when `path` has the staging directory name as one of its
/// components.
fn path_is_staged(path: &Path, staging: &Path) -> bool {
    let Some(marker) = staging.file_name() else {
        return false;
    };
    path.components().any(|c| c.as_os_str() == marker)
}

/// Clears extraction directories left over from an earlier run and
/// recreates the staging root. Called once, before any scan starts.
pub(crate) fn reset_staging(staging_root: &Path) -> Result<(), ArchiveError> {
    if staging_root.exists() {
        fs::remove_dir_all(staging_root)
            .map_err(|e| ArchiveError::Io(format!("{}: {}", staging_root.display(), e)))?;
    }
    fs::create_dir_all(staging_root)
        .map_err(|e| ArchiveError::Io(format!("{}: {}", staging_root.display(), e)))
}

/// Removes one per-archive extraction directory.
pub(crate) fn discard_staging(staging: &Path) {
    if let Err(e) = fs::remove_dir_all(staging) {
        log::warn!(
            "Could not remove staging directory {}: {}",
            staging.display(),
            e
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_path_is_staged_checks_components() {
        let staging = Path::new("./scanExtracts");
        assert!(path_is_staged(
            Path::new("./scanExtracts/inner.zip"),
            staging
        ));
        assert!(path_is_staged(
            Path::new("/work/scanExtracts/deep/inner.zip"),
            staging
        ));
        assert!(!path_is_staged(Path::new("/work/downloads/a.zip"), staging));
        assert!(!path_is_staged(
            Path::new("/work/scanExtracts_old/a.zip"),
            staging
        ));
    }

    #[test]
    fn test_reset_staging_clears_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("scanExtracts");
        std::fs::create_dir_all(staging.join("old")).unwrap();
        std::fs::write(staging.join("old/leftover.bin"), b"stale").unwrap();

        reset_staging(&staging).unwrap();
        assert!(staging.exists());
        assert!(!staging.join("old").exists());
    }

    #[test]
    fn test_extract_zip_and_tar() {
        let dir = tempfile::tempdir().unwrap();

        let zip_path = dir.path().join("sample.zip");
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("inner/member.txt", zip::write::FileOptions::default())
            .unwrap();
        writer.write_all(b"zip member content").unwrap();
        writer.finish().unwrap();

        let zip_dst = dir.path().join("zip_out");
        extract_archive(&zip_path, &zip_dst).unwrap();
        assert_eq!(
            std::fs::read(zip_dst.join("inner/member.txt")).unwrap(),
            b"zip member content"
        );

        let tar_path = dir.path().join("sample.tar");
        let source = dir.path().join("payload.txt");
        std::fs::write(&source, b"tar member content").unwrap();
        let file = std::fs::File::create(&tar_path).unwrap();
        let mut builder = tar::Builder::new(file);
        builder.append_path_with_name(&source, "payload.txt").unwrap();
        builder.finish().unwrap();

        let tar_dst = dir.path().join("tar_out");
        extract_archive(&tar_path, &tar_dst).unwrap();
        assert_eq!(
            std::fs::read(tar_dst.join("payload.txt")).unwrap(),
            b"tar member content"
        );
    }

    #[test]
    fn test_extract_rejects_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.rar");
        std::fs::write(&path, b"not really an archive").unwrap();
        assert!(matches!(
            extract_archive(&path, &dir.path().join("out")),
            Err(ArchiveError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_extract_rejects_corrupt_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.zip");
        std::fs::write(&path, b"these are not zip bytes").unwrap();
        assert!(matches!(
            extract_archive(&path, &dir.path().join("out")),
            Err(ArchiveError::Malformed(_))
        ));
    }
}
