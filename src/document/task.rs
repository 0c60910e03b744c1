//! Cancellable background load task.
//!
//! One [`LoadTask`] exists per load attempt. Status transitions run through
//! a small terminal-state machine: once a task is `Success`, `Failure` or
//! `Cancelled` nothing can move it again, which is also what shields the
//! document from late callbacks of superseded tasks.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{LoadError, SharedLoadError};

/// Process-global task id source, for diagnostics and supersession guards.
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// LoadStatus
// ============================================================================

/// Status of one load attempt. `S` is the engine's opaque render snapshot.
#[derive(Clone)]
pub enum LoadStatus<S> {
    /// Created, no background work observed yet.
    Waiting,
    /// An intermediate, possibly-incomplete render-ready snapshot.
    Partial(S),
    /// The final snapshot. Terminal.
    Success(S),
    /// The load failed. Terminal.
    Failure(SharedLoadError),
    /// The load was superseded or abandoned. Terminal, not a failure.
    Cancelled,
}

impl<S> LoadStatus<S> {
    /// Terminal statuses admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success(_) | Self::Failure(_) | Self::Cancelled
        )
    }

    pub fn in_progress(&self) -> bool {
        matches!(self, Self::Waiting | Self::Partial(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Partial(_) => "partial",
            Self::Success(_) => "success",
            Self::Failure(_) => "failure",
            Self::Cancelled => "cancelled",
        }
    }
}

impl<S> fmt::Debug for LoadStatus<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure(e) => write!(f, "Failure({e})"),
            other => f.write_str(other.label()),
        }
    }
}

// ============================================================================
// LoadTask
// ============================================================================

type Observer<S> = Box<dyn Fn(u64, LoadStatus<S>) + Send + Sync>;

struct TaskShared<S> {
    id: u64,
    status: Mutex<LoadStatus<S>>,
    cancelled: AtomicBool,
    observer: Observer<S>,
}

/// Handle to one load attempt. Cheap to clone; all clones share state.
pub struct LoadTask<S> {
    shared: Arc<TaskShared<S>>,
}

impl<S> Clone for LoadTask<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Clone + Send + 'static> LoadTask<S> {
    /// Create a task and publish the initial `Waiting` through the observer.
    ///
    /// Observers must only enqueue — typically onto the document event
    /// channel — so delivery stays asynchronous with respect to whichever
    /// thread produced the transition.
    pub fn new(observer: impl Fn(u64, LoadStatus<S>) + Send + Sync + 'static) -> Self {
        let id = NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed);
        let task = Self {
            shared: Arc::new(TaskShared {
                id,
                status: Mutex::new(LoadStatus::Waiting),
                cancelled: AtomicBool::new(false),
                observer: Box::new(observer),
            }),
        };
        (task.shared.observer)(id, LoadStatus::Waiting);
        task
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Current status (cloned out from under the lock).
    pub fn status(&self) -> LoadStatus<S> {
        self.shared.status.lock().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    pub fn in_progress(&self) -> bool {
        self.shared.status.lock().in_progress()
    }

    pub fn did_succeed(&self) -> bool {
        matches!(*self.shared.status.lock(), LoadStatus::Success(_))
    }

    /// Transition to `status` unless the task already terminated.
    ///
    /// Idempotent-terminal: transitions out of `Success`/`Failure`/
    /// `Cancelled` are silently dropped, so a superseded task can keep
    /// running to its next checkpoint without being observable.
    pub fn set_status(&self, status: LoadStatus<S>) {
        let cancelling = matches!(status, LoadStatus::Cancelled);
        {
            let mut current = self.shared.status.lock();
            if current.is_terminal() {
                crate::debug!(
                    "load";
                    "task #{} ignoring {} after {}",
                    self.shared.id,
                    status.label(),
                    current.label()
                );
                return;
            }
            *current = status.clone();
            // The cancel flag flips before the observer runs so background
            // work polling a CancelToken bails out as early as possible.
            if cancelling {
                self.shared.cancelled.store(true, Ordering::SeqCst);
            }
        }
        (self.shared.observer)(self.shared.id, status);
    }

    pub fn cancel(&self) {
        self.set_status(LoadStatus::Cancelled);
    }

    /// Token for cooperative cancellation polling inside the evaluator.
    pub fn cancel_token(&self) -> CancelToken {
        let shared: Arc<dyn CancelFlag> = self.shared.clone();
        CancelToken { shared }
    }

    /// Run `work` on a dedicated background thread (one per task, never a
    /// shared pool), converting an `Err` return into `Failure`.
    pub fn dispatch<F>(&self, work: F)
    where
        F: FnOnce(&LoadTask<S>) -> Result<(), LoadError> + Send + 'static,
    {
        let task = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("load-{}", self.shared.id))
            .spawn(move || {
                if let Err(e) = work(&task) {
                    task.set_status(LoadStatus::Failure(Arc::new(e)));
                }
            });
        if let Err(e) = spawned {
            self.set_status(LoadStatus::Failure(Arc::new(LoadError::Runtime(format!(
                "cannot start load thread: {e}"
            )))));
        }
    }
}

// ============================================================================
// CancelToken
// ============================================================================

/// Erases the snapshot type so the engine seam stays non-generic.
trait CancelFlag: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl<S: Send> CancelFlag for TaskShared<S> {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cheap, clonable view of one task's cancellation state.
///
/// Handed by reference into `Engine::evaluate` and polled at safe points;
/// cancellation is advisory, never preemptive.
#[derive(Clone)]
pub struct CancelToken {
    shared: Arc<dyn CancelFlag>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

// ============================================================================
// Tests
// ============================================================================
