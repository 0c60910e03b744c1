//! Access-scope abstraction and scoped-resource tracking.
//!
//! Sandboxed platforms require access to user files to be explicitly
//! started and stopped, and remembered across sessions via opaque tokens.
//! [`AccessScope`] is that platform seam; [`FsScope`] is the portable
//! implementation used where no OS grant mechanism exists (tokens are
//! canonicalized paths, activation is an existence check).

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use thiserror::Error;

/// Token-level failures inside an [`AccessScope`].
#[derive(Debug, Error)]
pub enum BookmarkError {
    #[error("cannot create bookmark for `{}`", .0.display())]
    Create(PathBuf, #[source] std::io::Error),

    #[error("bookmark token is not valid")]
    InvalidToken,

    #[error("bookmarked path `{}` is no longer reachable", .0.display())]
    Unreachable(PathBuf),
}

/// Result of resolving a stored token.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub url: PathBuf,
    /// The token resolved but should be recreated (target moved or the
    /// token format aged out).
    pub stale: bool,
}

/// Platform mechanism for token-based file access grants.
pub trait AccessScope: Send + Sync {
    /// Create an opaque token remembering access to `url`.
    fn make_token(&self, url: &Path) -> Result<Vec<u8>, BookmarkError>;

    /// Resolve a previously created token back into a path.
    fn resolve_token(&self, token: &[u8]) -> Result<Resolved, BookmarkError>;

    /// Start access to `url`. Returns `false` when the grant is refused.
    fn begin_access(&self, url: &Path) -> bool;

    /// Stop a previously started access grant.
    fn end_access(&self, url: &Path);
}

// ============================================================================
// FsScope
// ============================================================================

/// Portable stand-in scope: no OS grants, tokens are canonical paths.
///
/// A token goes stale when the path it stored no longer canonicalizes to
/// itself (the target was moved and a symlink or mount now sits in between).
#[derive(Debug, Default)]
pub struct FsScope;

impl AccessScope for FsScope {
    fn make_token(&self, url: &Path) -> Result<Vec<u8>, BookmarkError> {
        let canonical = url
            .canonicalize()
            .map_err(|e| BookmarkError::Create(url.to_path_buf(), e))?;
        Ok(canonical.to_string_lossy().into_owned().into_bytes())
    }

    fn resolve_token(&self, token: &[u8]) -> Result<Resolved, BookmarkError> {
        let path = std::str::from_utf8(token)
            .map(PathBuf::from)
            .map_err(|_| BookmarkError::InvalidToken)?;
        if !path.exists() {
            return Err(BookmarkError::Unreachable(path));
        }
        let stale = match path.canonicalize() {
            Ok(canonical) => canonical != path,
            Err(_) => false,
        };
        Ok(Resolved { url: path, stale })
    }

    fn begin_access(&self, url: &Path) -> bool {
        url.exists()
    }

    fn end_access(&self, _url: &Path) {}
}

// ============================================================================
// ScopedResources
// ============================================================================

/// Paths with an active access grant.
///
/// One-to-one with actual grants: `start` begins access at most once per
/// path, `release_all` ends every grant exactly once. Written from the
/// background evaluation thread and read at teardown, hence the lock.
#[derive(Debug, Default)]
pub struct ScopedResources {
    active: Mutex<FxHashSet<PathBuf>>,
}

impl ScopedResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start access to `url` through `scope`, tracking the grant.
    ///
    /// Idempotent: a path that is already active is a no-op success.
    pub fn start(&self, scope: &dyn AccessScope, url: &Path) -> bool {
        let mut active = self.active.lock();
        if active.contains(url) {
            return true;
        }
        if scope.begin_access(url) {
            active.insert(url.to_path_buf());
            true
        } else {
            false
        }
    }

    /// Stop every tracked grant. Called once when the owning document closes.
    pub fn release_all(&self, scope: &dyn AccessScope) {
        let drained = std::mem::take(&mut *self.active.lock());
        for url in &drained {
            scope.end_access(url);
        }
        if !drained.is_empty() {
            crate::debug!("sandbox"; "released {} scoped resources", drained.len());
        }
    }

    pub fn is_active(&self, url: &Path) -> bool {
        self.active.lock().contains(url)
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_fs_scope_token_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = dir.path().canonicalize().unwrap();
        let file = dir_path.join("model.txt");
        fs::write(&file, "cube").unwrap();

        let scope = FsScope;
        let token = scope.make_token(&file).unwrap();
        let resolved = scope.resolve_token(&token).unwrap();
        assert_eq!(resolved.url, file);
        assert!(!resolved.stale);
    }

    #[test]
    fn test_fs_scope_token_for_missing_path_fails() {
        let scope = FsScope;
        assert!(scope.make_token(Path::new("/no/such/path")).is_err());
    }

    #[test]
    fn test_fs_scope_unreachable_token() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("gone.txt");
        fs::write(&file, "x").unwrap();

        let scope = FsScope;
        let token = scope.make_token(&file).unwrap();
        fs::remove_file(&file).unwrap();
        assert!(matches!(
            scope.resolve_token(&token),
            Err(BookmarkError::Unreachable(_))
        ));
    }

    #[test]
    fn test_scoped_resources_start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let scoped = ScopedResources::new();
        let scope = FsScope;

        assert!(scoped.start(&scope, dir.path()));
        assert!(scoped.start(&scope, dir.path()));
        assert_eq!(scoped.len(), 1);
    }

    #[test]
    fn test_scoped_resources_refused_grant_is_not_tracked() {
        let scoped = ScopedResources::new();
        let scope = FsScope;

        assert!(!scoped.start(&scope, Path::new("/no/such/path")));
        assert!(scoped.is_empty());
    }

    #[test]
    fn test_release_all_empties_the_set() {
        let dir = tempfile::tempdir().unwrap();
        let scoped = ScopedResources::new();
        let scope = FsScope;

        scoped.start(&scope, dir.path());
        scoped.release_all(&scope);
        assert!(scoped.is_empty());

        // Second release is a no-op, not a double stop.
        scoped.release_all(&scope);
        assert!(scoped.is_empty());
    }
}
