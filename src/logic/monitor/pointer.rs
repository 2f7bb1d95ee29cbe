//! Pointer correlation hook.
//!
//! Optionally maps pointer activity to the executable of the process
//! under the cursor and queues that executable for scanning. The
//! platform-specific resolution lives behind [`PointerResolver`] so the
//! monitor can run with correlation disabled or with a test resolver.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use super::sleep_while_running;

// ============================================================================
// PUBLIC API
// ============================================================================

/// Source of executables resolved from pointer activity.
pub trait PointerResolver: Send {
    /// Executable associated with pointer activity since the last poll,
    /// if any occurred.
    fn poll_click(&mut self) -> Option<PathBuf>;
}

/// Resolver that never reports activity. Used when correlation is
/// enabled without a platform resolver installed.
#[derive(Debug, Default)]
pub struct NullPointerResolver;

impl PointerResolver for NullPointerResolver {
    fn poll_click(&mut self) -> Option<PathBuf> {
        None
    }
}

// ============================================================================
// WATCH LOOP
// ============================================================================

pub(crate) fn run(
    running: Arc<AtomicBool>,
    mut resolver: Box<dyn PointerResolver>,
    scan_tx: Sender<PathBuf>,
    poll_interval: Duration,
) {
    log::info!("Pointer correlation started");
    while running.load(Ordering::SeqCst) {
        if let Some(exe) = resolver.poll_click() {
            log::debug!("Pointer activity resolved to {}", exe.display());
            let _ = scan_tx.send(exe);
        }
        sleep_while_running(&running, poll_interval);
    }
    log::info!("Pointer correlation stopped");
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::mpsc;

    struct ScriptedResolver {
        clicks: VecDeque<PathBuf>,
    }

    impl PointerResolver for ScriptedResolver {
        fn poll_click(&mut self) -> Option<PathBuf> {
            self.clicks.pop_front()
        }
    }

    #[test]
    fn test_resolved_clicks_are_queued() {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();
        let resolver = Box::new(ScriptedResolver {
            clicks: VecDeque::from([
                PathBuf::from("/usr/bin/clicked-app"),
                PathBuf::from("/usr/bin/second-app"),
            ]),
        });

        let thread = {
            let running = running.clone();
            std::thread::spawn(move || run(running, resolver, tx, Duration::from_millis(10)))
        };

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, PathBuf::from("/usr/bin/clicked-app"));
        assert_eq!(second, PathBuf::from("/usr/bin/second-app"));

        running.store(false, Ordering::SeqCst);
        thread.join().unwrap();
    }

    #[test]
    fn test_null_resolver_reports_nothing() {
        let mut resolver = NullPointerResolver;
        assert!(resolver.poll_click().is_none());
    }
}
