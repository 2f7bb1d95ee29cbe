//! Process universe watcher.
//!
//! Each tick snapshots the running process universe as (executable,
//! command line, parent) records and diffs it against the previous tick.
//! Fresh records fan out to a checker pool; the tick only advances once
//! every checker returned. A checker claims the executable in the shared
//! first-sighting set, analyzes lineage for genuinely new executables and
//! always queues the executable itself for scanning. First sightings
//! persist in the ledger across runs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use sysinfo::System;

use crate::constants::ANCESTRY_MAX_HOPS;
use crate::logic::store::JsonStore;

use super::sleep_while_running;

// ============================================================================
// TYPES
// ============================================================================

/// Identity of one observed process. Two processes with the same
/// executable, arguments and parent count as the same observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct ProcessRecord {
    pub exe: PathBuf,
    pub cmd: Vec<String>,
    pub parent: Option<u32>,
}

// ============================================================================
// WATCH LOOP
// ============================================================================

pub(crate) fn run(
    running: Arc<AtomicBool>,
    scan_tx: Sender<PathBuf>,
    mut ledger: JsonStore,
    seen: Arc<RwLock<HashSet<String>>>,
    poll_interval: Duration,
    checker_threads: usize,
) {
    let pool = match rayon::ThreadPoolBuilder::new()
        .num_threads(checker_threads)
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Process checker pool failed to start: {}", e);
            return;
        }
    };

    let mut sys = System::new_all();
    sys.refresh_processes();
    let mut previous = snapshot_universe(&sys);

    // Executables recorded in earlier runs never count as first sightings.
    {
        let mut claimed = seen.write();
        for key in ledger.keys() {
            claimed.insert(key);
        }
    }
    log::info!(
        "Process watcher started ({} known executables)",
        ledger.len()
    );

    while running.load(Ordering::SeqCst) {
        sys.refresh_processes();
        let current = snapshot_universe(&sys);
        let fresh = new_records(&current, &previous);

        if !fresh.is_empty() {
            log::debug!("{} new process observation(s)", fresh.len());
            let universe_index = universe_exe_index(&sys);
            let own_chain = own_ancestry(&sys);
            pool.scope(|scope| {
                for record in &fresh {
                    let scan_tx = scan_tx.clone();
                    let universe_index = &universe_index;
                    let own_chain = own_chain.as_slice();
                    let seen = seen.as_ref();
                    scope.spawn(move |_| {
                        check_new_process(record, universe_index, own_chain, seen, &scan_tx)
                    });
                }
            });
            for record in &fresh {
                let key = record.exe.to_string_lossy().to_string();
                if ledger.get(&key).is_none() {
                    ledger.set(key, Value::from(chrono::Utc::now().timestamp()));
                }
            }
        }

        if let Err(e) = ledger.flush() {
            log::warn!("Could not persist process ledger: {}", e);
        }
        previous = current;
        sleep_while_running(&running, poll_interval);
    }
    log::info!("Process watcher stopped");
}

// ============================================================================
// CHECKER
// ============================================================================

/// Runs once per fresh process observation. The first checker to claim an
/// executable analyzes its lineage; every checker submits the executable
/// itself for scanning.
pub(crate) fn check_new_process(
    record: &ProcessRecord,
    universe_index: &HashMap<u32, PathBuf>,
    own_chain: &[PathBuf],
    seen: &RwLock<HashSet<String>>,
    scan_tx: &Sender<PathBuf>,
) {
    let exe_key = record.exe.to_string_lossy().to_string();
    let first_sighting = seen.write().insert(exe_key);
    if first_sighting {
        analyze_lineage(record, universe_index, own_chain, scan_tx);
    }
    let _ = scan_tx.send(record.exe.clone());
}

fn analyze_lineage(
    record: &ProcessRecord,
    universe_index: &HashMap<u32, PathBuf>,
    own_chain: &[PathBuf],
    scan_tx: &Sender<PathBuf>,
) {
    let Some(declared_parent) = record.parent.and_then(|pid| universe_index.get(&pid)) else {
        return;
    };
    let Some(monitor_parent) = own_chain.iter().find(|link| *link == declared_parent) else {
        return;
    };
    if same_origin(&record.exe, monitor_parent) {
        return;
    }
    log::info!(
        "New process detected: {} (parent {}, {} argument(s))",
        record.exe.display(),
        monitor_parent.display(),
        record.cmd.len()
    );
    for argument in &record.cmd {
        let candidate = Path::new(argument);
        if candidate.is_absolute() && candidate.exists() {
            let _ = scan_tx.send(candidate.to_path_buf());
        }
    }
}

/// Processes launched out of their parent's own directory tree count as
/// the same origin, as does an exact path match after normalization.
pub(crate) fn same_origin(child: &Path, parent: &Path) -> bool {
    let child_str = child.to_string_lossy();
    let parent_str = parent.to_string_lossy();
    if child_str.starts_with(parent_str.as_ref()) {
        return true;
    }
    absolute_or_self(child) == absolute_or_self(parent)
}

fn absolute_or_self(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

fn snapshot_universe(sys: &System) -> HashSet<ProcessRecord> {
    let mut universe = HashSet::new();
    for (_pid, process) in sys.processes() {
        let Some(exe) = process.exe() else { continue };
        universe.insert(ProcessRecord {
            exe: exe.to_path_buf(),
            cmd: process.cmd().to_vec(),
            parent: process.parent().map(|pid| pid.as_u32()),
        });
    }
    universe
}

fn universe_exe_index(sys: &System) -> HashMap<u32, PathBuf> {
    sys.processes()
        .iter()
        .filter_map(|(pid, process)| Some((pid.as_u32(), process.exe()?.to_path_buf())))
        .collect()
}

fn own_ancestry(sys: &System) -> Vec<PathBuf> {
    let mut chain = Vec::new();
    let Ok(mut pid) = sysinfo::get_current_pid() else {
        return chain;
    };
    for _ in 0..ANCESTRY_MAX_HOPS {
        let Some(process) = sys.process(pid) else { break };
        if let Some(exe) = process.exe() {
            chain.push(exe.to_path_buf());
        }
        match process.parent() {
            Some(parent) if parent != pid => pid = parent,
            _ => break,
        }
    }
    chain
}

pub(crate) fn new_records(
    current: &HashSet<ProcessRecord>,
    previous: &HashSet<ProcessRecord>,
) -> Vec<ProcessRecord> {
    current.difference(previous).cloned().collect()
}

// ============================================================================
// TESTS
// ============================================================================
