//! Document orchestration: the load/evaluate/render pipeline.
//!
//! ```text
//! read() ──cancel previous──> LoadTask (dedicated thread)
//!                                parse ─> evaluate ─> build loop
//!                                  │          │           │ throttled Partial
//!                                  └──────────┴── status ─┤
//! FileWatcher ─────────────────────────────── reload ─────┤
//!                                                         ▼
//!                                        event channel ─> handle_event
//!                                                  (scene / error state)
//! ```
//!
//! All document-state mutation happens in `handle_event`, fed by a single
//! FIFO channel: one consumer, so status transitions apply in production
//! order and nothing races the view state.

pub mod task;
pub mod throttle;
pub mod watcher;

mod delegate;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::engine::{Engine, SceneBuild, Snapshot};
use crate::error::LoadError;
use crate::logger::Console;
use crate::sandbox::{BookmarkError, BookmarkStore};
use delegate::ResolveDelegate;
use task::{LoadStatus, LoadTask};
use throttle::{PUBLISH_INTERVAL, PublishThrottle};
use watcher::FileWatcher;

// ============================================================================
// LinkedResources
// ============================================================================

/// Absolute paths touched during one evaluation pass (imports, textures,
/// fonts).
///
/// Written from the background evaluation thread, read from the watcher
/// tick; the lock is load-bearing, not decorative.
#[derive(Clone, Default)]
pub struct LinkedResources {
    paths: Arc<Mutex<FxHashSet<PathBuf>>>,
}

impl LinkedResources {
    pub fn record(&self, path: PathBuf) {
        self.paths.lock().insert(path);
    }

    /// Dropped wholesale at the start of each new load.
    pub fn clear(&self) {
        self.paths.lock().clear();
    }

    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.paths.lock().iter().cloned().collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }
}

// ============================================================================
// Events
// ============================================================================

/// Everything that reaches the document's event loop.
pub enum DocEvent<S> {
    /// A status transition from some load task (possibly superseded).
    Status { task_id: u64, status: LoadStatus<S> },
    /// The watcher saw the file (or a linked resource) change.
    FileChanged(PathBuf),
}

// ============================================================================
// Document
// ============================================================================

/// One open script document and its in-flight load machinery.
pub struct Document<E: Engine> {
    engine: Arc<E>,
    store: Arc<BookmarkStore>,
    console: Arc<dyn Console>,

    events_tx: mpsc::UnboundedSender<DocEvent<Snapshot<E>>>,
    events_rx: mpsc::UnboundedReceiver<DocEvent<Snapshot<E>>>,

    url: Option<PathBuf>,
    task: Option<LoadTask<Snapshot<E>>>,
    watcher: Option<FileWatcher>,
    linked: LinkedResources,
    closed: bool,

    /// Latest render snapshot (partial or final).
    pub scene: Option<Snapshot<E>>,
    /// Human-readable failure of the most recent load, if any.
    pub error_message: Option<String>,
    /// Set when the failure was a sandbox denial; the UI offers a
    /// directory-grant flow for this URL.
    pub access_error_url: Option<PathBuf>,
}

impl<E: Engine> Document<E> {
    pub fn new(engine: Arc<E>, store: Arc<BookmarkStore>, console: Arc<dyn Console>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            store,
            console,
            events_tx,
            events_rx,
            url: None,
            task: None,
            watcher: None,
            linked: LinkedResources::default(),
            closed: false,
            scene: None,
            error_message: None,
            access_error_url: None,
        }
    }

    pub fn url(&self) -> Option<&Path> {
        self.url.as_deref()
    }

    /// Load (or reload) the document from `url`.
    ///
    /// Supersedes any in-flight load: the previous task is cancelled
    /// synchronously before the new one is created, so at most one build is
    /// ever in flight per document.
    pub fn read(&mut self, url: &Path) -> Result<(), LoadError> {
        if let Some(task) = &self.task
            && task.in_progress()
        {
            task.cancel();
        }
        self.linked.clear();

        let source = read_source(url)?;
        self.url = Some(url.to_path_buf());

        let tx = self.events_tx.clone();
        let task = LoadTask::new(move |task_id, status| {
            let _ = tx.send(DocEvent::Status { task_id, status });
        });
        crate::log!("load"; "task #{} reading {}", task.id(), url.display());
        self.dispatch_load(&task, source, url);
        self.task = Some(task);
        Ok(())
    }

    /// The background pipeline: parse, evaluate, build, publish.
    fn dispatch_load(&self, task: &LoadTask<Snapshot<E>>, source: String, url: &Path) {
        let engine = Arc::clone(&self.engine);
        let delegate = ResolveDelegate::new(
            url.parent().map(Path::to_path_buf).unwrap_or_default(),
            self.linked.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.console),
        );

        task.dispatch(move |task| {
            if task.is_cancelled() {
                return Ok(());
            }
            let program = engine.parse(&source)?;

            if task.is_cancelled() {
                return Ok(());
            }
            let cancel = task.cancel_token();
            let mut scene = engine.evaluate(program, &delegate, &cancel)?;

            if task.is_cancelled() {
                return Ok(());
            }
            // Clear stale geometry from the previous load before the first
            // partial of this one lands.
            task.set_status(LoadStatus::Partial(E::Scene::empty_snapshot()));

            let mut throttle = PublishThrottle::new(PUBLISH_INTERVAL);
            let completed = scene.build(&mut |scene| {
                if cancel.is_cancelled() {
                    return false;
                }
                if throttle.ready() {
                    task.set_status(LoadStatus::Partial(scene.materialize()));
                }
                true
            });

            if !completed || task.is_cancelled() {
                return Ok(());
            }
            task.set_status(LoadStatus::Success(scene.materialize()));
            Ok(())
        });
    }

    /// Start watching the current URL for external changes.
    ///
    /// Idempotent; returns whether a watcher is running afterwards. Must be
    /// called from within a tokio runtime.
    pub fn watch(&mut self) -> bool {
        if self.watcher.is_some() {
            return true;
        }
        let Some(url) = self.url.clone() else {
            return false;
        };
        let tx = self.events_tx.clone();
        self.watcher = FileWatcher::spawn(&url, self.linked.clone(), move |path| {
            let _ = tx.send(DocEvent::FileChanged(path.to_path_buf()));
        });
        self.watcher.is_some()
    }

    /// Apply one event to document state.
    pub fn handle_event(&mut self, event: DocEvent<Snapshot<E>>) {
        match event {
            DocEvent::Status { task_id, status } => self.apply_status(task_id, status),
            DocEvent::FileChanged(path) => {
                crate::log!("watch"; "{} changed, reloading", path.display());
                if let Err(e) = self.read(&path) {
                    self.error_message = Some(e.to_string());
                }
            }
        }
    }

    fn apply_status(&mut self, task_id: u64, status: LoadStatus<Snapshot<E>>) {
        // A superseded task's late events must not touch current state.
        let Some(current) = &self.task else {
            return;
        };
        if current.id() != task_id {
            crate::debug!("load"; "ignoring {} from superseded task #{}", status.label(), task_id);
            return;
        }

        match status {
            LoadStatus::Waiting => {
                self.console.clear();
                self.error_message = None;
                self.access_error_url = None;
            }
            LoadStatus::Partial(snapshot) => {
                self.scene = Some(snapshot);
            }
            LoadStatus::Success(snapshot) => {
                self.scene = Some(snapshot);
                crate::log!("load"; "task #{} finished", task_id);
            }
            LoadStatus::Failure(error) => {
                if let Some(url) = error.access_restricted_url() {
                    self.access_error_url = Some(url.to_path_buf());
                }
                self.error_message = Some(error.to_string());
                crate::log!("error"; "task #{} failed: {}", task_id, error);
            }
            LoadStatus::Cancelled => {
                crate::debug!("load"; "task #{} cancelled", task_id);
            }
        }
    }

    /// Drain all queued events synchronously. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Event loop for embedding applications.
    pub async fn run(&mut self) {
        while let Some(event) = self.events_rx.recv().await {
            self.handle_event(event);
            if self.closed {
                break;
            }
        }
    }

    /// Remediation after a sandbox denial: remember the granted directory,
    /// then re-run the whole pipeline.
    pub fn grant_access(&mut self, dir: &Path) -> Result<(), BookmarkError> {
        self.store.bookmark(dir)?;
        self.access_error_url = None;
        if let Some(url) = self.url.clone()
            && let Err(e) = self.read(&url)
        {
            self.error_message = Some(e.to_string());
        }
        Ok(())
    }

    /// Write the source text back to disk without triggering a reload.
    pub fn save_source(&mut self, text: &str) -> Result<(), LoadError> {
        let Some(url) = self.url.clone() else {
            return Err(LoadError::Io {
                path: PathBuf::new(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "document has no file yet",
                ),
            });
        };
        std::fs::write(&url, text).map_err(|e| LoadError::Io {
            path: url.clone(),
            source: e,
        })?;
        if let Some(watcher) = &self.watcher {
            watcher.mark_updated();
        }
        Ok(())
    }

    /// Tear the document down: cancel the in-flight load, stop watching,
    /// release every sandbox grant. Idempotent; also runs on drop.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(task) = &self.task {
            task.cancel();
        }
        self.watcher = None;
        self.store.release_all();
        crate::debug!("load"; "document closed");
    }
}

impl<E: Engine> Drop for Document<E> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Read and decode the primary source file.
fn read_source(path: &Path) -> Result<String, LoadError> {
    let bytes = std::fs::read(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    String::from_utf8(bytes).map_err(|_| LoadError::Encoding {
        path: path.to_path_buf(),
    })
}

// ============================================================================
// Tests
// ============================================================================
