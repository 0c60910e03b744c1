//! Load error taxonomy.
//!
//! Everything that can go wrong between "open this file" and "scene on
//! screen" funnels into [`LoadError`]. Cancellation is deliberately NOT an
//! error: a cancelled load terminates in the `Cancelled` status instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

/// Errors surfaced by the load/evaluate/render pipeline.
///
/// `Syntax`, `Runtime` and `FileAccessRestricted` originate in the external
/// language engine; `Encoding` and `Io` originate in the primary source read.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The source text failed to parse.
    #[error("syntax error: {message}")]
    Syntax {
        message: String,
        /// 1-based line number, when the engine reports one.
        line: Option<u32>,
    },

    /// Evaluation of a parsed program failed.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// The sandbox denied access to a linked resource.
    ///
    /// Carries the offending URL so the UI can offer a directory-grant
    /// action as remediation.
    #[error("access to `{}` is restricted", .url.display())]
    FileAccessRestricted { url: PathBuf },

    /// The source file is not valid UTF-8 text.
    #[error("`{}` is not valid UTF-8 text", .path.display())]
    Encoding { path: PathBuf },

    /// Reading the primary source file failed.
    #[error("failed to read `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// The remediation URL of a sandbox denial, if that is what this is.
    pub fn access_restricted_url(&self) -> Option<&Path> {
        match self {
            Self::FileAccessRestricted { url } => Some(url),
            _ => None,
        }
    }
}

/// Statuses carry errors behind an `Arc` so they stay cheaply cloneable.
pub type SharedLoadError = Arc<LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_path() {
        let err = LoadError::FileAccessRestricted {
            url: PathBuf::from("/models/chair.obj"),
        };
        assert!(format!("{err}").contains("/models/chair.obj"));
    }

    #[test]
    fn test_access_restricted_url() {
        let err = LoadError::FileAccessRestricted {
            url: PathBuf::from("/models/chair.obj"),
        };
        assert_eq!(
            err.access_restricted_url(),
            Some(Path::new("/models/chair.obj"))
        );

        let err = LoadError::Runtime("boom".into());
        assert!(err.access_restricted_url().is_none());
    }

    #[test]
    fn test_io_source_is_preserved() {
        use std::error::Error as _;

        let err = LoadError::Io {
            path: PathBuf::from("model.scad"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(err.source().is_some());
    }
}
