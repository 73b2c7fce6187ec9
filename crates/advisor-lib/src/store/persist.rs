//! JSON document persistence shared by the stores
//!
//! Every write replaces the whole document: serialize, write to a sibling
//! temp file, fsync, then rename over the canonical path. A crash mid-write
//! leaves the previously committed document in place.

use crate::error::{AdvisorError, AdvisorResult};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path of the temp file used while replacing `path`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically replace `path` with the JSON encoding of `document`
pub fn write_atomic<T: Serialize>(path: &Path, document: &T) -> AdvisorResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AdvisorError::persistence(parent, e))?;
        }
    }

    let json = serde_json::to_vec_pretty(document)?;

    let tmp = temp_path(path);
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp)
        .map_err(|e| AdvisorError::persistence(&tmp, e))?;

    file.write_all(&json)
        .map_err(|e| AdvisorError::persistence(&tmp, e))?;
    file.sync_all()
        .map_err(|e| AdvisorError::persistence(&tmp, e))?;

    fs::rename(&tmp, path).map_err(|e| AdvisorError::persistence(path, e))?;

    debug!(path = %path.display(), bytes = json.len(), "Document persisted");
    Ok(())
}

/// Read a JSON document, returning `None` when the file does not exist
pub fn read_document<T: DeserializeOwned>(path: &Path) -> AdvisorResult<Option<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(AdvisorError::persistence(path, e)),
    };

    Ok(Some(serde_json::from_slice(&data)?))
}
