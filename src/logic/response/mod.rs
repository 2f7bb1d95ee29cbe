//! Containment side effects, decoupled from detection.
//!
//! The scan path never touches the filesystem vault or the desktop
//! notification service directly. It emits [`ResponseCommand`]s through a
//! cloneable [`ResponseHandle`]; a dedicated executor thread owns the
//! quarantine vault and applies the commands in order.

pub mod quarantine;

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use notify_rust::{Notification, Timeout};
use parking_lot::Mutex;

use crate::logic::config::UserPreferences;
use quarantine::QuarantineVault;

// ============================================================================
// PUBLIC API
// ============================================================================

/// One containment side effect requested by the detection path.
#[derive(Debug, Clone)]
pub enum ResponseCommand {
    Notify {
        title: String,
        message: String,
    },
    Quarantine {
        path: PathBuf,
        verdict: String,
    },
    RepairArchive {
        archive: PathBuf,
        /// Extraction directory for this archive alone; the executor
        /// removes it once the command has been applied.
        staging: PathBuf,
        offenders: Vec<PathBuf>,
        preserve_content: bool,
    },
    Shutdown,
}

/// Fire-and-forget sender for response commands. Sends never block the
/// scan path; a dead executor just drops them.
#[derive(Clone)]
pub struct ResponseHandle {
    tx: Arc<Mutex<Sender<ResponseCommand>>>,
}

impl ResponseHandle {
    pub fn notify(&self, title: &str, message: &str) {
        self.send(ResponseCommand::Notify {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    pub fn quarantine(&self, path: &std::path::Path, verdict: &str) {
        self.send(ResponseCommand::Quarantine {
            path: path.to_path_buf(),
            verdict: verdict.to_string(),
        });
    }

    pub fn repair_archive(
        &self,
        archive: &std::path::Path,
        staging: &std::path::Path,
        offenders: Vec<PathBuf>,
        preserve_content: bool,
    ) {
        self.send(ResponseCommand::RepairArchive {
            archive: archive.to_path_buf(),
            staging: staging.to_path_buf(),
            offenders,
            preserve_content,
        });
    }

    pub fn shutdown(&self) {
        self.send(ResponseCommand::Shutdown);
    }

    fn send(&self, command: ResponseCommand) {
        let _ = self.tx.lock().send(command);
    }
}

/// Builds a handle plus the receiving end, without an executor thread.
pub fn channel() -> (ResponseHandle, Receiver<ResponseCommand>) {
    let (tx, rx) = mpsc::channel();
    (
        ResponseHandle {
            tx: Arc::new(Mutex::new(tx)),
        },
        rx,
    )
}

/// Delivery settings the executor applies to incoming commands.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub desktop_notifications: bool,
    pub notification_duration_secs: u64,
    pub auto_quarantine: bool,
}

impl ExecutorSettings {
    pub fn from_preferences(prefs: &UserPreferences) -> Self {
        Self {
            desktop_notifications: prefs.notifications_enabled,
            notification_duration_secs: prefs.notification_duration_secs,
            auto_quarantine: prefs.auto_quarantine,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from_preferences(&UserPreferences::default())
    }
}

/// Thread that owns the vault and applies response commands.
pub struct ResponseExecutor {
    handle: ResponseHandle,
    thread: Option<JoinHandle<()>>,
}

impl ResponseExecutor {
    pub fn spawn(vault: QuarantineVault, settings: ExecutorSettings) -> Self {
        let (handle, rx) = channel();
        let thread = std::thread::spawn(move || run_executor(rx, vault, settings));
        Self {
            handle,
            thread: Some(thread),
        }
    }

    pub fn handle(&self) -> ResponseHandle {
        self.handle.clone()
    }

    /// Stops the executor after draining already queued commands.
    pub fn shutdown(mut self) {
        self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ============================================================================
// INTERNAL IMPLEMENTATION
// ============================================================================

fn run_executor(
    rx: Receiver<ResponseCommand>,
    mut vault: QuarantineVault,
    settings: ExecutorSettings,
) {
    log::info!("Response executor started");
    while let Ok(command) = rx.recv() {
        match command {
            ResponseCommand::Notify { title, message } => {
                log::info!("Notification: {}: {}", title, message);
                if settings.desktop_notifications {
                    deliver_desktop(&title, &message, settings.notification_duration_secs);
                }
            }
            ResponseCommand::Quarantine { path, verdict } => {
                if !settings.auto_quarantine {
                    log::info!(
                        "Auto-quarantine disabled, leaving {} in place ({})",
                        path.display(),
                        verdict
                    );
                    continue;
                }
                match vault.quarantine_file(&path, &verdict) {
                    Ok(Some(entry)) => {
                        log::info!("Containment complete for {} (id {})", verdict, entry.id)
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("Quarantine failed for {}: {}", path.display(), e),
                }
            }
            ResponseCommand::RepairArchive {
                archive,
                staging,
                offenders,
                preserve_content,
            } => {
                if !settings.auto_quarantine {
                    log::info!(
                        "Auto-quarantine disabled, leaving archive {} in place",
                        archive.display()
                    );
                } else if let Err(e) =
                    vault.quarantine_archive(&archive, &staging, &offenders, preserve_content)
                {
                    log::warn!("Archive repair failed for {}: {}", archive.display(), e);
                }
                // The repair command owns its extraction directory.
                discard_staging(&staging);
            }
            ResponseCommand::Shutdown => break,
        }
    }
    log::info!("Response executor stopped");
}

fn discard_staging(staging: &Path) {
    if let Err(e) = std::fs::remove_dir_all(staging) {
        log::warn!(
            "Could not remove staging directory {}: {}",
            staging.display(),
            e
        );
    }
}

fn deliver_desktop(title: &str, message: &str, duration_secs: u64) {
    let result = Notification::new()
        .summary(title)
        .body(message)
        .timeout(Timeout::Milliseconds((duration_secs * 1000) as u32))
        .show();
    if let Err(e) = result {
        log::warn!("Failed to deliver desktop notification: {}", e);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_commands_arrive_in_order() {
        let (handle, rx) = channel();
        handle.notify("Malware Detected", "body");
        handle.quarantine(std::path::Path::new("/tmp/evil.exe"), "[S]Family");
        handle.shutdown();

        assert!(matches!(
            rx.recv().unwrap(),
            ResponseCommand::Notify { .. }
        ));
        match rx.recv().unwrap() {
            ResponseCommand::Quarantine { path, verdict } => {
                assert_eq!(path, PathBuf::from("/tmp/evil.exe"));
                assert_eq!(verdict, "[S]Family");
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(matches!(rx.recv().unwrap(), ResponseCommand::Shutdown));
    }

    #[test]
    fn test_send_after_receiver_drop_is_silent() {
        let (handle, rx) = channel();
        drop(rx);
        handle.notify("Malware Detected", "body");
        handle.shutdown();
    }

    #[test]
    fn test_executor_quarantines_through_vault() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("evil.exe");
        std::fs::write(&target, b"payload").unwrap();
        let vault_dir = dir.path().join("vault");

        let settings = ExecutorSettings {
            desktop_notifications: false,
            notification_duration_secs: 1,
            auto_quarantine: true,
        };
        let executor = ResponseExecutor::spawn(QuarantineVault::open(vault_dir.clone()), settings);
        executor.handle().quarantine(&target, "[S]Family");
        executor.shutdown();

        assert!(!target.exists());
        let reopened = QuarantineVault::open(vault_dir);
        assert_eq!(reopened.list().len(), 1);
    }

    #[test]
    fn test_executor_respects_auto_quarantine_off() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("evil.exe");
        std::fs::write(&target, b"payload").unwrap();

        let settings = ExecutorSettings {
            desktop_notifications: false,
            notification_duration_secs: 1,
            auto_quarantine: false,
        };
        let executor =
            ResponseExecutor::spawn(QuarantineVault::open(dir.path().join("vault")), settings);
        executor.handle().quarantine(&target, "[S]Family");
        executor.shutdown();

        assert!(target.exists());
    }

    #[test]
    fn test_executor_repairs_archive_and_removes_staging() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("extract");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("benign.txt"), b"fine content").unwrap();
        std::fs::write(staging.join("evil.bin"), b"bad content").unwrap();
        let archive = dir.path().join("bundle.zip");
        let vault_dir = dir.path().join("vault");

        let settings = ExecutorSettings {
            desktop_notifications: false,
            notification_duration_secs: 1,
            auto_quarantine: true,
        };
        let executor = ResponseExecutor::spawn(QuarantineVault::open(vault_dir.clone()), settings);
        executor.handle().repair_archive(
            &archive,
            &staging,
            vec![staging.join("evil.bin")],
            true,
        );
        executor.shutdown();

        assert!(!staging.exists());
        let rebuilt = std::fs::File::open(&archive).unwrap();
        let zip = zip::ZipArchive::new(rebuilt).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert_eq!(names, vec!["benign.txt"]);
        assert_eq!(QuarantineVault::open(vault_dir).list().len(), 1);
    }

    #[test]
    fn test_executor_repair_respects_auto_quarantine_off() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("extract");
        std::fs::create_dir_all(&staging).unwrap();
        std::fs::write(staging.join("benign.txt"), b"fine content").unwrap();
        std::fs::write(staging.join("evil.bin"), b"bad content").unwrap();
        let archive = dir.path().join("bundle.zip");
        std::fs::write(&archive, b"original archive bytes").unwrap();
        let vault_dir = dir.path().join("vault");

        let settings = ExecutorSettings {
            desktop_notifications: false,
            notification_duration_secs: 1,
            auto_quarantine: false,
        };
        let executor = ResponseExecutor::spawn(QuarantineVault::open(vault_dir.clone()), settings);
        executor.handle().repair_archive(
            &archive,
            &staging,
            vec![staging.join("evil.bin")],
            true,
        );
        executor.shutdown();

        // The archive keeps its original bytes and nothing is vaulted,
        // but the extraction directory is still cleaned up.
        assert_eq!(
            std::fs::read(&archive).unwrap(),
            b"original archive bytes"
        );
        assert!(QuarantineVault::open(vault_dir).list().is_empty());
        assert!(!staging.exists());
    }
}
