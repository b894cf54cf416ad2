//! A destination wrapper that tracks which filenames have been
//! written and renders a plain directory-listing page on demand,
//! ported from `Index` (spec.md §4.6).

use bytes::Bytes;
use cockpit_ci_store::{Destination, StoreError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

pub struct Index {
    destination: Arc<dyn Destination>,
    filename: String,
    files: Mutex<HashSet<String>>,
    dirty: Mutex<bool>,
}

impl Index {
    pub fn new(destination: Arc<dyn Destination>) -> Self {
        Self::with_filename(destination, "index.html")
    }

    pub fn with_filename(destination: Arc<dyn Destination>, filename: impl Into<String>) -> Self {
        Self {
            destination,
            filename: filename.into(),
            files: Mutex::new(HashSet::new()),
            dirty: Mutex::new(false),
        }
    }

    pub fn destination(&self) -> &Arc<dyn Destination> {
        &self.destination
    }

    pub fn has(&self, filename: &str) -> bool {
        self.files.lock().unwrap().contains(filename)
    }

    pub fn write(&self, filename: &str, data: Bytes) -> Result<(), StoreError> {
        self.destination.write(filename, data)?;
        self.files.lock().unwrap().insert(filename.to_string());
        *self.dirty.lock().unwrap() = true;
        Ok(())
    }

    /// Re-renders the listing page if anything has changed since the
    /// last sync; a no-op otherwise.
    pub fn sync(&self) -> Result<(), StoreError> {
        let mut dirty = self.dirty.lock().unwrap();
        if !*dirty {
            return Ok(());
        }
        let mut names: Vec<String> = self.files.lock().unwrap().iter().cloned().collect();
        names.sort();

        let mut html = String::from(
            "<html>\n  <body>\n    <h1>Directory listing for /</h1>\n    <hr>\n    <ul>",
        );
        for name in &names {
            html.push_str(&format!("\n      <li><a href={name}>{name}</a></li> "));
        }
        html.push_str("\n    </ul>\n  </body>\n</html>\n");

        self.destination.write(&self.filename, Bytes::from(html.into_bytes()))?;
        self.files.lock().unwrap().insert(self.filename.clone());
        *dirty = false;
        Ok(())
    }

    /// Uploads any bundled asset not already present (spec.md §4.5's
    /// "bundled static HTML/JS viewer", written once per log).
    pub fn upload_static_assets(
        &self,
        assets: &'static [(&'static str, &'static [u8])],
    ) -> Result<(), StoreError> {
        for (name, data) in assets {
            if !self.has(name) {
                self.write(name, Bytes::from_static(data))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cockpit_ci_store::FilesystemDestination;

    #[test]
    fn sync_is_a_no_op_until_something_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let dest =
            FilesystemDestination::new(dir.path().into(), "https://x".into()).unwrap();
        let index = Index::new(Arc::new(dest));
        index.sync().unwrap();
        assert!(!index.has("index.html"));
    }

    #[test]
    fn write_tracks_membership_and_marks_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let dest =
            FilesystemDestination::new(dir.path().into(), "https://x".into()).unwrap();
        let index = Index::new(Arc::new(dest));
        index.write("log", Bytes::from_static(b"hello")).unwrap();
        assert!(index.has("log"));
        index.sync().unwrap();
        assert!(index.has("index.html"));
    }

    #[test]
    fn static_assets_are_not_re_uploaded_once_present() {
        static ASSETS: &[(&str, &[u8])] = &[("viewer.js", b"console.log(1)")];
        let dir = tempfile::tempdir().unwrap();
        let dest =
            FilesystemDestination::new(dir.path().into(), "https://x".into()).unwrap();
        let index = Index::new(Arc::new(dest));
        index.upload_static_assets(ASSETS).unwrap();
        assert!(index.has("viewer.js"));
        index.upload_static_assets(ASSETS).unwrap();
    }
}
