//! Sandbox permission bookkeeping.
//!
//! ```text
//! BookmarkStore ──> AccessScope (platform grants + opaque tokens)
//!       │
//!       └──> ScopedResources (active grants, released on close)
//! ```

mod bookmark;
mod scope;

pub use bookmark::{BOOKMARKS_KEY, BookmarkStore};
pub use scope::{AccessScope, BookmarkError, FsScope, Resolved, ScopedResources};
