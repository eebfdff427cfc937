//! Persisted theme preference.
//!
//! A single boolean stored under [`DARK_MODE_KEY`] in a small JSON file.
//! It is read once at startup and rewritten on every toggle. Other keys in
//! the file are left untouched.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::PrefsError;

/// Key holding the dark-mode flag.
pub const DARK_MODE_KEY: &str = "darkMode";

/// File-backed preference store.
#[derive(Debug)]
pub struct PreferenceStore {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl PreferenceStore {
    /// Load the store from `path`. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or is not a
    /// JSON object.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, PrefsError> {
        let path = path.into();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => map,
                _ => return Err(PrefsError::NotAnObject),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no preference file at {}, starting empty", path.display());
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored dark-mode flag, or `None` if the user never chose.
    pub async fn dark_mode(&self) -> Option<bool> {
        self.values
            .lock()
            .await
            .get(DARK_MODE_KEY)
            .and_then(Value::as_bool)
    }

    /// Store the dark-mode flag and write the file.
    ///
    /// The in-memory value only changes once the file has been replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written; the previous value
    /// is kept in that case.
    pub async fn set_dark_mode(&self, dark: bool) -> Result<(), PrefsError> {
        let mut values = self.values.lock().await;
        let mut next = values.clone();
        next.insert(DARK_MODE_KEY.to_string(), Value::Bool(dark));

        let bytes = serde_json::to_vec_pretty(&next)?;
        self.replace_file(&bytes).await?;
        *values = next;

        info!(dark_mode = dark, "theme preference saved");
        Ok(())
    }

    /// Write `bytes` next to the target and rename over it, so a reader
    /// never sees a truncated file.
    async fn replace_file(&self, bytes: &[u8]) -> Result<(), PrefsError> {
        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!("failed to remove {}: {cleanup}", tmp.display());
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
