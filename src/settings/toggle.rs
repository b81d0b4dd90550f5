//! The monitoring on/off switch, persisted as a small JSON file.
//!
//! Reads are lock-free. Each mutation holds `write_lock` across both the
//! in-memory update and the file write, so two concurrent toggles never
//! interleave and the last writer wins on disk and in memory alike.

use crate::error::{Result, StorageError};

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// File name of the persisted toggle inside the data directory.
pub const STATE_FILE_NAME: &str = "monitor_study_state.json";

/// Key written to the state file.
const STATE_KEY: &str = "monitoring_status";

/// Alternate key accepted on read.
const ALTERNATE_STATE_KEY: &str = "monitor_status";

/// Durable monitoring switch.
pub struct PersistedToggle {
    path: PathBuf,
    enabled: AtomicBool,
    write_lock: tokio::sync::Mutex<()>,
}

impl PersistedToggle {
    /// Open the toggle at `path`, creating the file with `default` on first run.
    pub fn open(path: impl Into<PathBuf>, default: bool) -> Result<Self> {
        let path = path.into();
        let enabled = load(&path, default)?;

        tracing::info!(path = %path.display(), enabled, "monitoring toggle loaded");

        Ok(Self {
            path,
            enabled: AtomicBool::new(enabled),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Current value. Callers read once per event and keep the result.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Set the toggle and persist it.
    ///
    /// The in-memory value is updated even when the write fails, so a failed
    /// save leaves memory ahead of disk until the next successful save.
    pub async fn set(&self, enabled: bool) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.enabled.store(enabled, Ordering::SeqCst);

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || save(&path, enabled))
            .await
            .map_err(|error| anyhow::anyhow!("state writer task failed: {error}"))?
    }
}

/// Read the persisted value.
///
/// A missing file is created with `default`. A file that cannot be read or
/// decoded yields `default` with a warning and is left untouched. Only the
/// first-run write can fail.
pub fn load(path: &Path, default: bool) -> Result<bool> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), default, "no state file, creating it");
        save(path, default)?;
        return Ok(default);
    }

    match read(path) {
        Ok(Some(value)) => Ok(value),
        Ok(None) => {
            tracing::warn!(
                path = %path.display(),
                default,
                "state file has no {STATE_KEY} field, falling back to default"
            );
            Ok(default)
        }
        Err(error) => {
            tracing::warn!(%error, default, "failed to load state file, falling back to default");
            Ok(default)
        }
    }
}

/// Write `{"monitoring_status": value}` to `path`, replacing the whole file.
pub fn save(path: &Path, value: bool) -> Result<()> {
    let write_error = |error: std::io::Error| StorageError::Write {
        path: path.display().to_string(),
        source: Arc::new(error),
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(write_error)?;

    let body = serde_json::to_string_pretty(&serde_json::json!({ STATE_KEY: value }))
        .map_err(|error| anyhow::anyhow!("failed to encode state: {error}"))?;

    let mut file = tempfile::NamedTempFile::new_in(parent).map_err(write_error)?;
    file.write_all(body.as_bytes()).map_err(write_error)?;
    file.as_file().sync_all().map_err(write_error)?;
    file.persist(path).map_err(|error| write_error(error.error))?;

    Ok(())
}

fn read(path: &Path) -> std::result::Result<Option<bool>, StorageError> {
    let read_error = |message: String| StorageError::Read {
        path: path.display().to_string(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|error| read_error(error.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|error| read_error(error.to_string()))?;
    let object = value
        .as_object()
        .ok_or_else(|| read_error("expected a JSON object".into()))?;

    Ok(object
        .get(STATE_KEY)
        .or_else(|| object.get(ALTERNATE_STATE_KEY))
        .map(truthy))
}

/// Loose boolean coercion for hand-edited state files.
fn truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(a) => !a.is_empty(),
        serde_json::Value::Object(o) => !o.is_empty(),
    }
}
