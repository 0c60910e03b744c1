//! Sculpt - the load/evaluate/render core of a viewer for a 3D-modeling
//! script language.
//!
//! The embedding application supplies the language engine (parser, evaluator
//! and scene model) behind the [`engine::Engine`] trait; this crate drives
//! it: cancellable background loads with throttled partial publishing,
//! debounced file watching, and persistent sandbox bookmark resolution.
//!
//! ```text
//! Document ──> LoadTask ──> Engine::parse / evaluate / Scene::build
//!    │             │              │
//!    │             └── status ────┤  (event channel, single consumer)
//!    ├── FileWatcher ── reload ───┤
//!    └── BookmarkStore <── resolve_url  (evaluation delegate)
//! ```

pub mod document;
pub mod engine;
pub mod error;
pub mod logger;
pub mod sandbox;
pub mod store;

pub use document::task::{CancelToken, LoadStatus, LoadTask};
pub use document::watcher::FileWatcher;
pub use document::{DocEvent, Document, LinkedResources};
pub use engine::{Engine, EvalDelegate, SceneBuild, Snapshot};
pub use error::LoadError;
pub use logger::{BufferConsole, Console, TerminalConsole};
pub use sandbox::{AccessScope, BookmarkError, BookmarkStore, FsScope};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};
