//! Evaluator-facing resolution delegate.
//!
//! Implements the callbacks the engine makes while running a script:
//! import-path resolution (with linked-resource tracking and sandbox
//! bookkeeping), resource opening, and console output.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::LinkedResources;
use crate::engine::EvalDelegate;
use crate::error::LoadError;
use crate::logger::Console;
use crate::sandbox::BookmarkStore;

pub(crate) struct ResolveDelegate {
    /// Directory of the document, for relative import paths.
    base: PathBuf,
    linked: LinkedResources,
    store: Arc<BookmarkStore>,
    console: Arc<dyn Console>,
}

impl ResolveDelegate {
    pub(crate) fn new(
        base: PathBuf,
        linked: LinkedResources,
        store: Arc<BookmarkStore>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            base,
            linked,
            store,
            console,
        }
    }
}

impl EvalDelegate for ResolveDelegate {
    fn resolve_url(&self, path: &str) -> PathBuf {
        let url = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            self.base.join(path)
        };
        // Track before resolving: the watcher must see the resource even if
        // access ends up denied.
        self.linked.record(url.clone());

        if let Some(resolved) = self.store.resolve(&url) {
            return resolved;
        }
        // First-time access: take a bookmark directly.
        if self.store.bookmark(&url).is_ok() {
            return url;
        }
        crate::debug!("sandbox"; "no access for {}, passing through raw", url.display());
        // The raw path makes the subsequent open fail with the offending
        // path attached, which is the error the UI wants to show.
        url
    }

    fn import_geometry(&self, url: &Path) -> Result<Vec<u8>, LoadError> {
        std::fs::read(url).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => LoadError::FileAccessRestricted {
                url: url.to_path_buf(),
            },
            _ => LoadError::Io {
                path: url.to_path_buf(),
                source: e,
            },
        })
    }

    fn debug_log(&self, message: &str) {
        self.console.append(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::BufferConsole;
    use crate::sandbox::FsScope;
    use crate::store::MemoryStore;
    use std::fs;

    fn delegate_in(dir: &Path) -> (ResolveDelegate, LinkedResources, Arc<BookmarkStore>) {
        let linked = LinkedResources::default();
        let store = Arc::new(BookmarkStore::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FsScope),
        ));
        let delegate = ResolveDelegate::new(
            dir.to_path_buf(),
            linked.clone(),
            store.clone(),
            Arc::new(BufferConsole::new()),
        );
        (delegate, linked, store)
    }

    #[test]
    fn test_relative_paths_resolve_against_base() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        fs::write(base.join("tex.png"), "px").unwrap();

        let (delegate, linked, _) = delegate_in(&base);
        let resolved = delegate.resolve_url("tex.png");
        assert_eq!(resolved, base.join("tex.png"));
        assert!(linked.contains(&base.join("tex.png")));
    }

    #[test]
    fn test_first_access_takes_a_bookmark() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().canonicalize().unwrap();
        let file = base.join("part.obj");
        fs::write(&file, "v 0 0 0").unwrap();

        let (delegate, _, store) = delegate_in(&base);
        delegate.resolve_url("part.obj");
        assert!(store.contains(&file));
    }

    #[test]
    fn test_unresolvable_path_passes_through_raw() {
        let dir = tempfile::tempdir().unwrap();
        let (delegate, linked, _) = delegate_in(dir.path());

        let raw = delegate.resolve_url("/nowhere/missing.png");
        assert_eq!(raw, PathBuf::from("/nowhere/missing.png"));
        // Still tracked: if it appears later the watcher picks it up.
        assert!(linked.contains(Path::new("/nowhere/missing.png")));
    }

    #[test]
    fn test_import_geometry_reads_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("mesh.bin");
        fs::write(&file, [1u8, 2, 3]).unwrap();

        let (delegate, _, _) = delegate_in(dir.path());
        assert_eq!(delegate.import_geometry(&file).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_import_geometry_missing_file_is_io() {
        let dir = tempfile::tempdir().unwrap();
        let (delegate, _, _) = delegate_in(dir.path());

        let err = delegate
            .import_geometry(&dir.path().join("missing.bin"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
