//! Quarantine vault for detected files.
//!
//! Detected files move into an app-data vault directory under a random
//! name and are tracked in a metadata file so they can be restored or
//! destroyed later. Archives get special treatment: offending members
//! are vaulted individually and the archive is rebuilt from its benign
//! remainder.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::constants::APP_NAME;

// ============================================================================
// CONSTANTS
// ============================================================================

const QUARANTINE_FOLDER: &str = "quarantine";
const METADATA_FILE: &str = "quarantine_metadata.json";
const MAX_VAULT_SIZE_MB: u64 = 500;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub enum VaultError {
    SizeLimitReached { limit_mb: u64 },
    NotFound { id: String },
    Io(String),
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VaultError::SizeLimitReached { limit_mb } => {
                write!(f, "Quarantine vault is full ({} MB limit)", limit_mb)
            }
            VaultError::NotFound { id } => write!(f, "No quarantine entry with id {}", id),
            VaultError::Io(msg) => write!(f, "Quarantine I/O error: {}", msg),
        }
    }
}

impl std::error::Error for VaultError {}

// ============================================================================
// PUBLIC API
// ============================================================================

/// One vaulted file and where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultEntry {
    pub id: String,
    pub original_path: String,
    pub vault_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub sha256: String,
    pub quarantined_at: i64,
    pub reason: String,
    pub can_restore: bool,
}

/// On-disk vault of quarantined files plus its metadata index.
#[derive(Debug)]
pub struct QuarantineVault {
    entries: HashMap<String, VaultEntry>,
    vault_dir: PathBuf,
    total_size: u64,
}

impl QuarantineVault {
    /// Opens the vault in the platform app-data directory.
    pub fn open_default() -> Self {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME)
            .join(QUARANTINE_FOLDER);
        Self::open(dir)
    }

    /// Opens a vault rooted at `vault_dir`, creating it when absent.
    pub fn open(vault_dir: PathBuf) -> Self {
        if let Err(e) = fs::create_dir_all(&vault_dir) {
            log::error!(
                "Failed to create quarantine directory {}: {}",
                vault_dir.display(),
                e
            );
        }
        let mut vault = Self {
            entries: HashMap::new(),
            vault_dir,
            total_size: 0,
        };
        vault.load_metadata();
        vault
    }

    /// Moves a file into the vault. Returns `Ok(None)` when the file no
    /// longer exists, so repeated containment of the same path is safe.
    pub fn quarantine_file(
        &mut self,
        path: &Path,
        reason: &str,
    ) -> Result<Option<VaultEntry>, VaultError> {
        if !path.exists() {
            log::info!("Quarantine target already gone: {}", path.display());
            return Ok(None);
        }

        let metadata = fs::metadata(path)
            .map_err(|e| VaultError::Io(format!("stat {}: {}", path.display(), e)))?;
        let file_size = metadata.len();

        if self.total_size + file_size > MAX_VAULT_SIZE_MB * 1024 * 1024 {
            return Err(VaultError::SizeLimitReached {
                limit_mb: MAX_VAULT_SIZE_MB,
            });
        }

        let sha256 = file_sha256(path)?;
        let id = uuid::Uuid::new_v4().to_string();
        let vault_path = self.vault_dir.join(format!("{}.quarantine", id));

        fs::rename(path, &vault_path)
            .or_else(|_| fs::copy(path, &vault_path).and_then(|_| fs::remove_file(path)))
            .map_err(|e| VaultError::Io(format!("move {}: {}", path.display(), e)))?;

        let entry = VaultEntry {
            id: id.clone(),
            original_path: path.to_string_lossy().to_string(),
            vault_path: vault_path.to_string_lossy().to_string(),
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            file_size,
            sha256,
            quarantined_at: chrono::Utc::now().timestamp(),
            reason: reason.to_string(),
            can_restore: true,
        };

        self.entries.insert(id, entry.clone());
        self.total_size += file_size;
        self.save_metadata();

        log::warn!(
            "Quarantined {} ({}): {}",
            entry.file_name,
            entry.reason,
            entry.original_path
        );
        Ok(Some(entry))
    }

    /// Moves a vaulted file back to its original location. When that path
    /// is occupied again the restored copy gets a `_restored` suffix.
    pub fn restore(&mut self, id: &str) -> Result<PathBuf, VaultError> {
        let entry = self
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound { id: id.to_string() })?;

        let mut target = PathBuf::from(&entry.original_path);
        if target.exists() {
            let stem = target
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "restored".to_string());
            let suffix = target
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();
            target = target.with_file_name(format!("{}_restored{}", stem, suffix));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| VaultError::Io(format!("create {}: {}", parent.display(), e)))?;
        }

        let vault_path = PathBuf::from(&entry.vault_path);
        fs::rename(&vault_path, &target)
            .or_else(|_| fs::copy(&vault_path, &target).and_then(|_| fs::remove_file(&vault_path)))
            .map_err(|e| VaultError::Io(format!("restore {}: {}", entry.file_name, e)))?;

        self.entries.remove(id);
        self.total_size = self.total_size.saturating_sub(entry.file_size);
        self.save_metadata();

        log::info!("Restored {} to {}", entry.file_name, target.display());
        Ok(target)
    }

    /// Destroys a vaulted file, overwriting it before removal.
    pub fn destroy(&mut self, id: &str) -> Result<(), VaultError> {
        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| VaultError::NotFound { id: id.to_string() })?;

        let vault_path = PathBuf::from(&entry.vault_path);
        if vault_path.exists() {
            let zeros = vec![0u8; entry.file_size as usize];
            if let Err(e) = fs::write(&vault_path, zeros) {
                log::warn!("Could not overwrite {} before removal: {}", entry.file_name, e);
            }
            fs::remove_file(&vault_path)
                .map_err(|e| VaultError::Io(format!("remove {}: {}", entry.file_name, e)))?;
        }

        self.total_size = self.total_size.saturating_sub(entry.file_size);
        self.save_metadata();
        log::info!("Destroyed quarantined file {}", entry.file_name);
        Ok(())
    }

    /// Vaults the malicious members of an extracted archive and, when
    /// content is preserved, rebuilds the archive from the benign rest of
    /// the staging directory. Without preservation the whole archive is
    /// vaulted instead.
    pub fn quarantine_archive(
        &mut self,
        archive: &Path,
        staging: &Path,
        offenders: &[PathBuf],
        preserve_content: bool,
    ) -> Result<(), VaultError> {
        if !preserve_content {
            self.quarantine_file(archive, "Malicious archive")?;
            return Ok(());
        }

        let reason = format!("Archive member of {}", archive.display());
        for member in offenders {
            if let Err(e) = self.quarantine_file(member, &reason) {
                log::warn!("Could not vault archive member {}: {}", member.display(), e);
            }
        }
        rebuild_archive(archive, staging)
    }

    pub fn entry(&self, id: &str) -> Option<&VaultEntry> {
        self.entries.get(id)
    }

    pub fn list(&self) -> Vec<VaultEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    // ========================================================================
    // INTERNAL IMPLEMENTATION
    // ========================================================================

    fn metadata_path(&self) -> PathBuf {
        self.vault_dir.join(METADATA_FILE)
    }

    fn load_metadata(&mut self) {
        let Ok(text) = fs::read_to_string(self.metadata_path()) else {
            return;
        };
        let parsed: HashMap<String, VaultEntry> = match serde_json::from_str(&text) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("Discarding unreadable quarantine metadata: {}", e);
                return;
            }
        };
        // Entries whose vault file disappeared are dropped on load.
        for (id, entry) in parsed {
            if Path::new(&entry.vault_path).exists() {
                self.total_size += entry.file_size;
                self.entries.insert(id, entry);
            }
        }
    }

    fn save_metadata(&self) {
        match serde_json::to_string_pretty(&self.entries) {
            Ok(text) => {
                if let Err(e) = fs::write(self.metadata_path(), text) {
                    log::error!("Failed to save quarantine metadata: {}", e);
                }
            }
            Err(e) => log::error!("Failed to serialize quarantine metadata: {}", e),
        }
    }
}

// ============================================================================
// INTERNAL IMPLEMENTATION
// ============================================================================

fn file_sha256(path: &Path) -> Result<String, VaultError> {
    let file = fs::File::open(path)
        .map_err(|e| VaultError::Io(format!("open {}: {}", path.display(), e)))?;
    let mut reader = std::io::BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let count = reader
            .read(&mut buffer)
            .map_err(|e| VaultError::Io(format!("read {}: {}", path.display(), e)))?;
        if count == 0 {
            break;
        }
        hasher.update(&buffer[..count]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Repacks the remaining staging content into the archive's own format at
/// its original path.
fn rebuild_archive(archive: &Path, staging: &Path) -> Result<(), VaultError> {
    let survivors: Vec<(PathBuf, String)> = WalkDir::new(staging)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let relative = e
                .path()
                .strip_prefix(staging)
                .ok()?
                .to_string_lossy()
                .replace('\\', "/");
            Some((e.path().to_path_buf(), relative))
        })
        .collect();

    let extension = archive
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "zip" => {
            let file = fs::File::create(archive)
                .map_err(|e| VaultError::Io(format!("create {}: {}", archive.display(), e)))?;
            let mut writer = zip::ZipWriter::new(file);
            for (path, name) in &survivors {
                let options = zip::write::FileOptions::default();
                writer
                    .start_file(name.clone(), options)
                    .map_err(|e| VaultError::Io(format!("repack {}: {}", name, e)))?;
                let content = fs::read(path)
                    .map_err(|e| VaultError::Io(format!("read {}: {}", path.display(), e)))?;
                writer
                    .write_all(&content)
                    .map_err(|e| VaultError::Io(format!("repack {}: {}", name, e)))?;
            }
            writer
                .finish()
                .map_err(|e| VaultError::Io(format!("finish {}: {}", archive.display(), e)))?;
        }
        "tar" => {
            let file = fs::File::create(archive)
                .map_err(|e| VaultError::Io(format!("create {}: {}", archive.display(), e)))?;
            let mut builder = tar::Builder::new(file);
            for (path, name) in &survivors {
                builder
                    .append_path_with_name(path, name)
                    .map_err(|e| VaultError::Io(format!("repack {}: {}", name, e)))?;
            }
            builder
                .finish()
                .map_err(|e| VaultError::Io(format!("finish {}: {}", archive.display(), e)))?;
        }
        other => {
            return Err(VaultError::Io(format!(
                "cannot rebuild unsupported archive format: {}",
                other
            )));
        }
    }

    log::info!(
        "Rebuilt {} with {} remaining members",
        archive.display(),
        survivors.len()
    );
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
