//! Uploads files left behind in a local scratch directory, skipping
//! anything the index already has, ported from
//! `AttachmentsDirectory.scan()` (spec.md §4.6).
//!
//! Membership is checked through the [`Index`] rather than the raw
//! [`Destination`], since an S3-backed destination has no synchronous
//! existence check of its own (spec.md §4.6: "`has(name)` answers
//! membership from the in-memory set without any network call").

use crate::index::Index;
use bytes::Bytes;
use cockpit_ci_store::StoreError;
use std::path::Path;

pub fn scan(index: &Index, root: &Path) -> Result<(), StoreError> {
    if !root.exists() {
        return Ok(());
    }
    walk(index, root, root)
}

fn walk(index: &Index, root: &Path, dir: &Path) -> Result<(), StoreError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|source| StoreError::Io { path: dir.to_path_buf(), source })?;
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io { path: dir.to_path_buf(), source })?;
        let path = entry.path();
        if path.is_dir() {
            walk(index, root, &path)?;
            continue;
        }
        let name = path
            .strip_prefix(root)
            .expect("walked path is always under root")
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");
        if !index.has(&name) {
            tracing::debug!(attachment = %name, "uploading attachment");
            let data = std::fs::read(&path).map_err(|source| StoreError::Io { path: path.clone(), source })?;
            index.write(&name, Bytes::from(data))?;
        }
    }
    Ok(())
}
