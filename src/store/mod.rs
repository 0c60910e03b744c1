//! Injectable key-value persistence.
//!
//! The bookmark map (and whatever else the embedding application wants to
//! remember) goes through this seam instead of a global preference
//! singleton: construct one store at startup and thread it through.
//!
//! [`JsonFileStore`] is the production implementation — a single JSON
//! document in the per-user configuration directory. [`MemoryStore`] backs
//! tests.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

/// Settings file name (inside the per-user config directory)
const SETTINGS_FILE: &str = "settings.json";

/// String-keyed persistence for opaque string values.
///
/// `set` is best-effort: persistence failures are logged, not propagated —
/// losing a remembered grant degrades to one extra permission prompt.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
}

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory store for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<FxHashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }
}

// ============================================================================
// JsonFileStore
// ============================================================================

/// Store backed by a JSON object on disk.
///
/// The whole document is rewritten on every `set`; the values are
/// settings-sized, not data-sized.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<FxHashMap<String, String>>,
}

impl JsonFileStore {
    /// Open a store at an explicit path, loading whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = load_values(&path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Open the default per-user store for the named application.
    ///
    /// Returns `None` when the platform has no configuration directory.
    pub fn open_default(app: &str) -> Option<Self> {
        let dir = dirs::config_dir()?.join(app);
        Some(Self::open(dir.join(SETTINGS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &FxHashMap<String, String>) {
        if let Some(parent) = self.path.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            crate::log!("error"; "cannot create {}: {}", parent.display(), e);
            return;
        }
        let json = match serde_json::to_string_pretty(values) {
            Ok(json) => json,
            Err(e) => {
                crate::log!("error"; "cannot serialize settings: {}", e);
                return;
            }
        };
        if let Err(e) = fs::write(&self.path, json) {
            crate::log!("error"; "cannot write {}: {}", self.path.display(), e);
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values);
    }
}

/// Load the settings map from disk (missing or corrupt file yields empty).
fn load_values(path: &Path) -> FxHashMap<String, String> {
    let Ok(json) = fs::read_to_string(path) else {
        return FxHashMap::default();
    };
    serde_json::from_str(&json).unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
