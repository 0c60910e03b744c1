//! External language-engine seam.
//!
//! The script parser/evaluator and the scene model belong to the embedding
//! application; this crate only drives them. The seam is three traits:
//!
//! ```text
//! Engine::parse ──> Program ──> Engine::evaluate ──> Scene: SceneBuild
//!                                    │                     │
//!                             &dyn EvalDelegate       build / materialize
//!                          (resolve, import, log)
//! ```
//!
//! [`EvalDelegate`] is implemented by the document pipeline and handed into
//! `evaluate` by reference (explicit delegate object, not inheritance).

use std::path::{Path, PathBuf};

use crate::document::task::CancelToken;
use crate::error::LoadError;

/// Services the evaluator calls back into while running a script.
///
/// Object-safe: the engine receives `&dyn EvalDelegate`.
pub trait EvalDelegate: Send + Sync {
    /// Resolve an import path to an accessible absolute path.
    ///
    /// Records the path as a linked resource and grants/bookmarks sandbox
    /// access as needed. Infallible by contract: when no access can be
    /// obtained the raw path is returned and the subsequent open fails with
    /// a clear denied/not-found error.
    fn resolve_url(&self, path: &str) -> PathBuf;

    /// Open a linked resource and return its raw bytes.
    ///
    /// Decoding the bytes into geometry is the engine importer's job. A
    /// sandbox denial maps to [`LoadError::FileAccessRestricted`].
    fn import_geometry(&self, url: &Path) -> Result<Vec<u8>, LoadError>;

    /// Forward formatted script output to the console sink.
    fn debug_log(&self, message: &str);
}

/// Incremental construction of an evaluated scene.
///
/// `Snapshot` is the opaque render representation published to observers;
/// it must be cheap to clone (engines typically hand out a shared handle).
pub trait SceneBuild: Send + 'static {
    type Snapshot: Clone + Send + 'static;

    /// A snapshot with no geometry, published to clear stale output before
    /// the first partial of a new build arrives.
    fn empty_snapshot() -> Self::Snapshot;

    /// Run the incremental build loop.
    ///
    /// The callback is invoked once per internal unit of work with the
    /// scene's current state; returning `false` aborts the build early.
    /// Returns `true` when the build ran to completion.
    fn build(&mut self, on_unit: &mut dyn FnMut(&Self) -> bool) -> bool;

    /// Materialize the current state into a render representation.
    fn materialize(&self) -> Self::Snapshot;
}

/// The external parse/evaluate engine.
pub trait Engine: Send + Sync + 'static {
    type Program: Send + 'static;
    type Scene: SceneBuild;

    /// Parse source text into a program.
    fn parse(&self, source: &str) -> Result<Self::Program, LoadError>;

    /// Evaluate a parsed program into a scene.
    ///
    /// Long evaluations must poll `cancel` at safe points and bail out;
    /// cancellation is cooperative, never preemptive.
    fn evaluate(
        &self,
        program: Self::Program,
        delegate: &dyn EvalDelegate,
        cancel: &CancelToken,
    ) -> Result<Self::Scene, LoadError>;
}

/// The render snapshot type of an engine's scene.
pub type Snapshot<E> = <<E as Engine>::Scene as SceneBuild>::Snapshot;
