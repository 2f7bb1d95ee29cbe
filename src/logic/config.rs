//! User preferences controlling protection behavior.
//!
//! Preferences persist through a [`JsonStore`] in the config directory.
//! Unknown or missing fields fall back to protective defaults, so a
//! hand-edited or truncated preferences file never disables the engine
//! by accident.

use serde::{Deserialize, Serialize};

use super::store::{JsonStore, StoreError};

// ============================================================================
// PUBLIC API
// ============================================================================

/// Operator-tunable switches for the detection core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    /// Keep the real-time monitor running.
    pub real_time_protection: bool,
    /// Deliver desktop notifications for detections.
    pub notifications_enabled: bool,
    /// How long a desktop notification stays visible.
    pub notification_duration_secs: u64,
    /// Verify publisher signatures on executable files.
    pub scan_executable_signatures: bool,
    /// Extract and scan the contents of archive files.
    pub archive_deep_scan: bool,
    /// Move detected files into the quarantine vault automatically.
    pub auto_quarantine: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            real_time_protection: true,
            notifications_enabled: false,
            notification_duration_secs: 2,
            scan_executable_signatures: true,
            archive_deep_scan: true,
            auto_quarantine: true,
        }
    }
}

impl UserPreferences {
    /// Reads preferences out of a store, defaulting anything unreadable.
    pub fn load(store: &JsonStore) -> Self {
        match serde_json::from_value(store.snapshot()) {
            Ok(prefs) => prefs,
            Err(e) => {
                log::warn!("Unreadable preferences, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Writes preferences into a store and persists it.
    pub fn save(&self, store: &mut JsonStore) -> Result<(), StoreError> {
        let value = serde_json::to_value(self)
            .map_err(|e| StoreError(format!("serialize preferences: {}", e)))?;
        store.replace_with(value)
    }
}

// ============================================================================
// TESTS
// ============================================================================
