//! Persistent bookmark store with ancestor-derived resolution.
//!
//! A bookmark remembers a user-granted access token for one absolute path.
//! Resolution inherits downward: a single grant on a directory covers every
//! file nested inside it, so one "Grant Access" dialog per folder suffices
//! no matter how many resources a script imports from it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::scope::{AccessScope, BookmarkError, ScopedResources};
use crate::store::KeyValueStore;

/// Fixed key the bookmark map is persisted under.
pub const BOOKMARKS_KEY: &str = "sandbox.bookmarks";

/// Persistent `path -> token` map plus the live grant tracking around it.
pub struct BookmarkStore {
    store: Arc<dyn KeyValueStore>,
    scope: Arc<dyn AccessScope>,
    bookmarks: RwLock<FxHashMap<String, Vec<u8>>>,
    scoped: ScopedResources,
}

impl BookmarkStore {
    /// Open against a key-value store, loading any persisted bookmarks.
    pub fn new(store: Arc<dyn KeyValueStore>, scope: Arc<dyn AccessScope>) -> Self {
        let bookmarks = store
            .get(BOOKMARKS_KEY)
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        Self {
            store,
            scope,
            bookmarks: RwLock::new(bookmarks),
            scoped: ScopedResources::new(),
        }
    }

    /// Create and persist a token for exactly `url`, and start access to it.
    pub fn bookmark(&self, url: &Path) -> Result<(), BookmarkError> {
        let token = self.scope.make_token(url)?;
        {
            let mut bookmarks = self.bookmarks.write();
            bookmarks.insert(key_for(url), token);
        }
        self.persist();
        if !self.scoped.start(&*self.scope, url) {
            crate::debug!("sandbox"; "bookmarked {} but access refused", url.display());
        }
        crate::debug!("sandbox"; "bookmarked {}", url.display());
        Ok(())
    }

    /// Resolve an accessible path for `url`.
    ///
    /// Order of attempts:
    /// 1. a token stored for `url` itself (refreshed in place when stale);
    /// 2. for file-looking paths, a token anywhere up the ancestor chain,
    ///    re-deriving the path downward and activating each derived level;
    /// 3. failure — the caller falls back to the raw path.
    pub fn resolve(&self, url: &Path) -> Option<PathBuf> {
        self.resolve_inner(url, false)
    }

    fn resolve_inner(&self, url: &Path, inherited: bool) -> Option<PathBuf> {
        let token = self.bookmarks.read().get(&key_for(url)).cloned();
        if let Some(token) = token {
            let resolved = match self.scope.resolve_token(&token) {
                Ok(resolved) => resolved,
                Err(e) => {
                    crate::debug!("sandbox"; "token for {} failed: {}", url.display(), e);
                    return None;
                }
            };
            if resolved.stale {
                // Refresh in place so the next session resolves directly.
                crate::debug!("sandbox"; "re-bookmarking stale token for {}", resolved.url.display());
                let _ = self.bookmark(&resolved.url);
            }
            return self
                .scoped
                .start(&*self.scope, &resolved.url)
                .then_some(resolved.url);
        }

        // Only file-looking leaves may inherit; bare folders need a grant of
        // their own. The climb itself passes through intermediate folders.
        if !inherited && !has_extension(url) {
            return None;
        }
        let parent = url.parent()?;
        let resolved_parent = self.resolve_inner(parent, true)?;
        let derived = resolved_parent.join(url.file_name()?);
        self.scoped
            .start(&*self.scope, &derived)
            .then_some(derived)
    }

    /// Stop every active grant. Called once when the owning document closes.
    pub fn release_all(&self) {
        self.scoped.release_all(&*self.scope);
    }

    /// Number of currently active access grants.
    pub fn active_scopes(&self) -> usize {
        self.scoped.len()
    }

    pub fn contains(&self, url: &Path) -> bool {
        self.bookmarks.read().contains_key(&key_for(url))
    }

    pub fn len(&self) -> usize {
        self.bookmarks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookmarks.read().is_empty()
    }

    fn persist(&self) {
        let bookmarks = self.bookmarks.read();
        match serde_json::to_string(&*bookmarks) {
            Ok(json) => self.store.set(BOOKMARKS_KEY, &json),
            Err(e) => crate::log!("error"; "cannot serialize bookmarks: {}", e),
        }
    }
}

fn key_for(url: &Path) -> String {
    url.to_string_lossy().into_owned()
}

fn has_extension(url: &Path) -> bool {
    url.extension().is_some_and(|e| !e.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
