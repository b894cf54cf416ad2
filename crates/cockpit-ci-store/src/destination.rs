//! Write destinations for logs and attachments (spec.md §4.3): a
//! filesystem tree ported from `LocalDestination`, and an S3-compatible
//! object store ported from `S3Destination`.

use crate::error::{Result, StoreError};
use crate::queue::{HttpRequest, UploadQueue};
use crate::signing::Signer;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Method, Url};
use std::path::PathBuf;
use std::sync::Arc;

/// Where a job's logs and attachments are written. `write`/`delete` are
/// fire-and-forget: the filesystem implementation performs them
/// synchronously, the S3 implementation enqueues them on its upload
/// queue and reports success immediately (spec.md §4.3, §4.4).
#[async_trait]
pub trait Destination: Send + Sync {
    fn write(&self, filename: &str, data: Bytes) -> Result<()>;
    fn delete(&self, filenames: &[String]) -> Result<()>;
    /// Whether `filename` is known to exist. Not every destination can
    /// answer this synchronously; see [`S3Destination::has`].
    fn has(&self, filename: &str) -> bool;
    /// The externally-reachable URL a reader would use for `filename`.
    fn url(&self, filename: &str) -> String;
    /// Drains any in-flight uploads before the destination is dropped.
    /// A no-op for the filesystem destination, which writes
    /// synchronously; the S3 destination drains its upload queue
    /// (spec.md §4.4, "drain on shutdown").
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct FilesystemDestination {
    dir: PathBuf,
    link: String,
}

impl FilesystemDestination {
    pub fn new(dir: PathBuf, link: String) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .map_err(|source| StoreError::Io { path: dir.clone(), source })?;
        Ok(Self { dir, link })
    }
}

#[async_trait]
impl Destination for FilesystemDestination {
    fn write(&self, filename: &str, data: Bytes) -> Result<()> {
        let path = self.dir.join(filename);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        std::fs::write(&path, &data).map_err(|source| StoreError::Io { path, source })
    }

    fn delete(&self, filenames: &[String]) -> Result<()> {
        for filename in filenames {
            let path = self.dir.join(filename);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(_) if !path.exists() => {}
                Err(source) => return Err(StoreError::Io { path, source }),
            }
        }
        Ok(())
    }

    fn has(&self, filename: &str) -> bool {
        self.dir.join(filename).exists()
    }

    fn url(&self, filename: &str) -> String {
        format!("{}/{}", self.link.trim_end_matches('/'), filename)
    }
}

fn guess_content_type(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first()
        .map(|mime| mime.to_string())
        .unwrap_or_else(|| "text/plain; charset=utf-8".to_string())
}

pub struct S3Destination {
    queue: Arc<UploadQueue>,
    location: Url,
    proxy_location: Url,
    acl: Option<String>,
}

impl S3Destination {
    pub fn new(
        http: reqwest::Client,
        signer: Arc<dyn Signer>,
        location: Url,
        proxy_location: Url,
        acl: Option<String>,
    ) -> Self {
        Self { queue: UploadQueue::spawn(http, signer), location, proxy_location, acl }
    }

    fn object_url(&self, filename: &str) -> Result<Url> {
        self.location
            .join(filename)
            .map_err(|e| StoreError::Url(format!("{filename}: {e}")))
    }
}

#[async_trait]
impl Destination for S3Destination {
    fn write(&self, filename: &str, data: Bytes) -> Result<()> {
        let url = self.object_url(filename)?;
        let mut headers = vec![("Content-Type".to_string(), guess_content_type(filename))];
        if let Some(acl) = &self.acl {
            headers.push(("x-amz-acl".to_string(), acl.clone()));
        }
        self.queue.enqueue(HttpRequest { method: Method::PUT, url, headers, body: data });
        Ok(())
    }

    fn delete(&self, filenames: &[String]) -> Result<()> {
        for filename in filenames {
            let url = self.object_url(filename)?;
            self.queue.enqueue(HttpRequest {
                method: Method::DELETE,
                url,
                headers: vec![],
                body: Bytes::new(),
            });
        }
        Ok(())
    }

    fn has(&self, _filename: &str) -> bool {
        unimplemented!(
            "S3Destination has no synchronous existence check; callers track membership via an index"
        )
    }

    fn url(&self, filename: &str) -> String {
        self.proxy_location
            .join(filename)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", self.proxy_location, filename))
    }

    async fn close(&self) -> Result<()> {
        self.queue.close().await
    }
}

/// Escapes a slug for use as an S3 key prefix: `//` and `:` are not
/// safe to leave unescaped in object keys derived from repo slugs.
pub fn escape_s3_slug(slug: &str) -> String {
    slug.replace("//", "--").replace(':', "-")
}

/// Factory that opens a fresh [`Destination`] scoped to one job's slug,
/// ported from `LogDriver.get_destination()` (`lib/aio/local.py`,
/// `lib/aio/s3.py`). The job supervisor opens exactly one destination
/// per job and holds it for the job's lifetime.
pub trait LogDestinations: Send + Sync {
    fn open(&self, slug: &str) -> Result<Arc<dyn Destination>>;
}

pub struct FilesystemLogDestinations {
    dir: PathBuf,
    link: Url,
}

impl FilesystemLogDestinations {
    pub fn new(dir: PathBuf, link: Url) -> Self {
        Self { dir, link }
    }
}

impl LogDestinations for FilesystemLogDestinations {
    fn open(&self, slug: &str) -> Result<Arc<dyn Destination>> {
        let link = self.link.join(&format!("{}/", slug.trim_end_matches('/'))).map_err(|e| StoreError::Url(e.to_string()))?;
        let dest = FilesystemDestination::new(self.dir.join(slug), link.to_string())?;
        Ok(Arc::new(dest))
    }
}

pub struct S3LogDestinations {
    http: reqwest::Client,
    signer: Arc<dyn Signer>,
    url: Url,
    proxy_url: Url,
    acl: Option<String>,
}

impl S3LogDestinations {
    pub fn new(http: reqwest::Client, signer: Arc<dyn Signer>, url: Url, proxy_url: Url, acl: Option<String>) -> Self {
        Self { http, signer, url, proxy_url, acl }
    }
}

impl LogDestinations for S3LogDestinations {
    fn open(&self, slug: &str) -> Result<Arc<dyn Destination>> {
        let quoted = format!("{}/", escape_s3_slug(slug));
        let location = self.url.join(&quoted).map_err(|e| StoreError::Url(e.to_string()))?;
        let proxy_location = self.proxy_url.join(&quoted).map_err(|e| StoreError::Url(e.to_string()))?;
        Ok(Arc::new(S3Destination::new(
            self.http.clone(),
            self.signer.clone(),
            location,
            proxy_location,
            self.acl.clone(),
        )))
    }
}
