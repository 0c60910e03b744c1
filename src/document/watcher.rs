//! Debounced modification-time watcher.
//!
//! Polls the primary file plus the externally supplied linked-resource set
//! on a fixed interval and reports at most one reload per tick, debounced
//! against a baseline timestamp.
//!
//! Architecture:
//! ```text
//! tokio interval → mtimes (fs) → WatchState (pure timing) → on_reload
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::LinkedResources;

/// Poll interval for modification-time checks
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Read a file's modification time (`None` if it cannot be read)
pub(crate) fn mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

// ============================================================================
// WatchState - pure timing and debounce decisions
// ============================================================================

/// Poll outcome for a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tick {
    /// Nothing newer than the baseline.
    Idle,
    /// Something changed; the baseline was advanced to "now".
    Reload,
    /// The primary became unreadable; the watcher stops for good.
    Stopped,
}

/// Pure debounce state: only timing decisions, no filesystem access.
struct WatchState {
    baseline: SystemTime,
}

impl WatchState {
    fn new(baseline: SystemTime) -> Self {
        Self { baseline }
    }

    /// Reset the baseline without reporting a change.
    fn mark_updated(&mut self, now: SystemTime) {
        self.baseline = now;
    }

    /// Evaluate one poll tick.
    ///
    /// Any mtime strictly newer than the baseline advances the baseline to
    /// `now` and yields a single `Reload`, however many files changed.
    fn tick(
        &mut self,
        primary: Option<SystemTime>,
        linked: impl IntoIterator<Item = SystemTime>,
        now: SystemTime,
    ) -> Tick {
        let Some(primary) = primary else {
            return Tick::Stopped;
        };
        let changed = primary > self.baseline || linked.into_iter().any(|t| t > self.baseline);
        if changed {
            self.baseline = now;
            Tick::Reload
        } else {
            Tick::Idle
        }
    }
}

// ============================================================================
// FileWatcher - interval-driven polling around WatchState
// ============================================================================

/// Watches one document file plus its linked resources for changes.
///
/// Dropping the watcher aborts the poll task.
pub struct FileWatcher {
    primary: PathBuf,
    state: Arc<Mutex<WatchState>>,
    handle: JoinHandle<()>,
}

impl FileWatcher {
    /// Start watching `primary`. Returns `None` if it is not an existing
    /// file with a readable modification time.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        primary: &Path,
        linked: LinkedResources,
        on_reload: impl Fn(&Path) + Send + Sync + 'static,
    ) -> Option<Self> {
        Self::spawn_with_interval(primary, linked, POLL_INTERVAL, on_reload)
    }

    pub(crate) fn spawn_with_interval(
        primary: &Path,
        linked: LinkedResources,
        every: Duration,
        on_reload: impl Fn(&Path) + Send + Sync + 'static,
    ) -> Option<Self> {
        if !primary.is_file() {
            return None;
        }
        let baseline = mtime(primary)?;
        let state = Arc::new(Mutex::new(WatchState::new(baseline)));
        let handle = tokio::spawn(run_poll(
            primary.to_path_buf(),
            linked,
            every,
            Arc::clone(&state),
            on_reload,
        ));
        crate::debug!("watch"; "watching {}", primary.display());
        Some(Self {
            primary: primary.to_path_buf(),
            state,
            handle,
        })
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    /// Reset the baseline to "now" without triggering a reload.
    ///
    /// Called after the consumer itself wrote the file, so the watcher does
    /// not react to that save.
    pub fn mark_updated(&self) {
        self.state.lock().mark_updated(SystemTime::now());
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The poll loop: one tick per interval until the primary goes away.
async fn run_poll(
    primary: PathBuf,
    linked: LinkedResources,
    every: Duration,
    state: Arc<Mutex<WatchState>>,
    on_reload: impl Fn(&Path) + Send + 'static,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of a tokio interval completes immediately; consume it
    // so the first real poll happens a full interval after spawn.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let primary_mtime = mtime(&primary);
        // Snapshot the paths first; stat calls stay outside the set's lock.
        let linked_mtimes: Vec<SystemTime> = linked
            .snapshot()
            .iter()
            .filter_map(|p| mtime(p))
            .collect();

        let tick = state
            .lock()
            .tick(primary_mtime, linked_mtimes, SystemTime::now());
        match tick {
            Tick::Idle => {}
            Tick::Reload => {
                crate::debug!("watch"; "change detected near {}", primary.display());
                on_reload(&primary);
            }
            Tick::Stopped => {
                crate::debug!("watch"; "{} is gone, watcher stopped", primary.display());
                break;
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::UNIX_EPOCH;

    fn secs(n: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(n)
    }

    // ------------------------------------------------------------------------
    // WatchState (pure)
    // ------------------------------------------------------------------------

    #[test]
    fn test_unmodified_file_stays_idle() {
        let mut state = WatchState::new(secs(100));
        for _ in 0..5 {
            assert_eq!(state.tick(Some(secs(100)), [], secs(101)), Tick::Idle);
        }
    }

    #[test]
    fn test_newer_primary_fires_once_and_resets_baseline() {
        let mut state = WatchState::new(secs(100));

        assert_eq!(state.tick(Some(secs(105)), [], secs(110)), Tick::Reload);
        assert_eq!(state.baseline, secs(110));

        // The same mtime is now older than the advanced baseline.
        assert_eq!(state.tick(Some(secs(105)), [], secs(111)), Tick::Idle);
    }

    #[test]
    fn test_equal_mtime_is_not_a_change() {
        // Strictly newer is required; equality means "already seen".
        let mut state = WatchState::new(secs(100));
        assert_eq!(state.tick(Some(secs(100)), [], secs(101)), Tick::Idle);
    }

    #[test]
    fn test_newer_linked_resource_fires() {
        let mut state = WatchState::new(secs(100));
        let tick = state.tick(Some(secs(90)), [secs(90), secs(120)], secs(130));
        assert_eq!(tick, Tick::Reload);
    }

    #[test]
    fn test_multiple_changes_yield_single_reload() {
        let mut state = WatchState::new(secs(100));
        let tick = state.tick(Some(secs(110)), [secs(111), secs(112)], secs(120));
        assert_eq!(tick, Tick::Reload);
        assert_eq!(state.tick(Some(secs(110)), [secs(111)], secs(121)), Tick::Idle);
    }

    #[test]
    fn test_unreadable_primary_stops() {
        let mut state = WatchState::new(secs(100));
        assert_eq!(state.tick(None, [secs(200)], secs(101)), Tick::Stopped);
    }

    #[test]
    fn test_mark_updated_suppresses_pending_change() {
        let mut state = WatchState::new(secs(100));
        // The file changed at 105, but the consumer wrote it itself and
        // marked at 106.
        state.mark_updated(secs(106));
        assert_eq!(state.tick(Some(secs(105)), [], secs(107)), Tick::Idle);
    }

    // ------------------------------------------------------------------------
    // FileWatcher (interval loop, paused clock)
    // ------------------------------------------------------------------------

    fn counting(counter: Arc<AtomicUsize>) -> impl Fn(&Path) + Send + Sync + 'static {
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_requires_existing_file() {
        let watcher = FileWatcher::spawn_with_interval(
            Path::new("/no/such/file.txt"),
            LinkedResources::default(),
            Duration::from_millis(10),
            |_| {},
        );
        assert!(watcher.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_untouched_file_never_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "cube").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let _watcher = FileWatcher::spawn_with_interval(
            &file,
            LinkedResources::default(),
            Duration::from_millis(10),
            counting(count.clone()),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_past_baseline_reloads_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "cube").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let watcher = FileWatcher::spawn_with_interval(
            &file,
            LinkedResources::default(),
            Duration::from_millis(10),
            counting(count.clone()),
        )
        .unwrap();

        // Age the baseline so the file's real mtime reads as a change.
        watcher.state.lock().baseline = UNIX_EPOCH;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // Baseline advanced past the mtime; no re-fire.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_linked_resource_reloads_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        let texture = dir.path().join("wood.png");
        fs::write(&file, "cube").unwrap();
        fs::write(&texture, "px").unwrap();

        let linked = LinkedResources::default();
        linked.record(texture.clone());

        let count = Arc::new(AtomicUsize::new(0));
        let watcher = FileWatcher::spawn_with_interval(
            &file,
            linked,
            Duration::from_millis(10),
            counting(count.clone()),
        )
        .unwrap();

        // Both primary and linked mtimes now beat the baseline; still one call.
        watcher.state.lock().baseline = UNIX_EPOCH;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_file_stops_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "cube").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let watcher = FileWatcher::spawn_with_interval(
            &file,
            LinkedResources::default(),
            Duration::from_millis(10),
            counting(count.clone()),
        )
        .unwrap();

        fs::remove_file(&file).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(watcher.handle.is_finished());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mark_updated_ignores_own_save() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        fs::write(&file, "cube").unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let watcher = FileWatcher::spawn_with_interval(
            &file,
            LinkedResources::default(),
            Duration::from_millis(10),
            counting(count.clone()),
        )
        .unwrap();

        // Simulate "the editor saved": write, then immediately mark.
        fs::write(&file, "sphere").unwrap();
        watcher.mark_updated();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
