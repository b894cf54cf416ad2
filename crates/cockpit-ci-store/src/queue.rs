//! A per-destination upload queue: one background task drains requests
//! in order, retrying transient failures, ported from `HttpQueue`
//! (spec.md §4.4, §9 "upload queue final-attempt propagation").

use crate::error::{Result, StoreError};
use crate::signing::Signer;
use bytes::Bytes;
use reqwest::{Method, Url};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

const RETRY_DELAYS_SECS: [u64; 5] = [1, 4, 16, 64, 256];

async fn send_once(
    http: &reqwest::Client,
    signer: &dyn Signer,
    req: &HttpRequest,
    checksum: &str,
) -> Result<()> {
    let signed = signer.sign(req.method.as_str(), &req.url, &req.headers, checksum);
    let mut builder = http.request(req.method.clone(), req.url.clone());
    for (key, value) in &signed {
        builder = builder.header(key.as_str(), value.as_str());
    }
    let response = builder
        .body(req.body.clone())
        .send()
        .await
        .map_err(|source| StoreError::Transport { url: req.url.to_string(), source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::Status { url: req.url.to_string(), status });
    }
    Ok(())
}

async fn send_with_retry(http: &reqwest::Client, signer: &dyn Signer, req: &HttpRequest) -> Result<()> {
    let checksum = hex::encode(Sha256::digest(&req.body));
    for delay_secs in RETRY_DELAYS_SECS {
        match send_once(http, signer, req, &checksum).await {
            Ok(()) => return Ok(()),
            Err(err) if err.is_retryable() => {
                tracing::warn!(
                    url = %req.url,
                    delay_secs,
                    error = %err,
                    "upload attempt failed, retrying"
                );
                tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            }
            Err(err) => return Err(err),
        }
    }
    // Final attempt: its error, if any, propagates and ends the worker
    // (spec.md §9 resolves the "silently drop the last failure?" open
    // question in favor of propagation).
    send_once(http, signer, req, &checksum).await
}

pub struct UploadQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<HttpRequest>>>,
    worker: Mutex<Option<JoinHandle<Result<()>>>>,
    pending: Arc<AtomicUsize>,
}

impl UploadQueue {
    pub fn spawn(http: reqwest::Client, signer: Arc<dyn Signer>) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<HttpRequest>();
        let pending = Arc::new(AtomicUsize::new(0));
        let pending_for_worker = pending.clone();
        let worker = tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                send_with_retry(&http, signer.as_ref(), &req).await?;
                pending_for_worker.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(())
        });
        Arc::new(Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            pending,
        })
    }

    /// Enqueues without blocking; delivery order matches enqueue order
    /// since exactly one task ever drains the channel.
    pub fn enqueue(&self, req: HttpRequest) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.tx.lock().unwrap().as_ref() {
            let _ = tx.send(req);
        }
    }

    /// Marks end-of-queue and waits for the worker to drain it. If the
    /// worker's final attempt at some request failed, that error is
    /// returned here (spec.md §4.4).
    pub async fn close(&self) -> Result<()> {
        let remaining = self.pending.load(Ordering::SeqCst);
        if remaining > 0 {
            tracing::info!(remaining, "waiting for queued uploads to complete");
        }
        self.tx.lock().unwrap().take();
        let handle = self.worker.lock().unwrap().take();
        match handle {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    tracing::error!(error = %join_err, "upload worker task panicked");
                    Ok(())
                }
            },
            None => Ok(()),
        }
    }
}
