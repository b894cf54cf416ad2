//! Chunked log streaming with the "2048-merge" flush algorithm, ported
//! literally from `LogStreamer.send_pending()` (spec.md §4.5).
//!
//! Chunks merge pairwise once two adjacent chunks hold the same
//! number of blocks, so the chunk list stays logarithmic in length
//! while only ever rewriting the newest chunk. On close, everything
//! written so far is reassembled and stored once under the plain name
//! `log`, and the numbered chunk files are deleted so that viewers
//! polling `log.<range>` see a 404 as their signal that streaming has
//! ended.

use crate::index::Index;
use bytes::{Bytes, BytesMut};
use cockpit_ci_store::StoreError;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const SIZE_LIMIT: usize = 1_000_000;
const TIME_LIMIT: Duration = Duration::from_secs(30);

static VIEWER_ASSETS: &[(&str, &[u8])] = &[
    ("log.html", include_bytes!("../assets/s3-html/log.html")),
    ("viewer.js", include_bytes!("../assets/s3-html/viewer.js")),
];

struct State {
    chunks: Vec<Vec<Bytes>>,
    pending: BytesMut,
    suffixes: HashSet<String>,
    timer: Option<JoinHandle<()>>,
}

pub struct LogStreamer {
    index: Arc<Index>,
    state: Mutex<State>,
}

impl LogStreamer {
    pub fn new(index: Arc<Index>) -> Arc<Self> {
        Arc::new(Self {
            index,
            state: Mutex::new(State {
                chunks: Vec::new(),
                pending: BytesMut::new(),
                suffixes: HashSet::from(["chunks".to_string()]),
                timer: None,
            }),
        })
    }

    /// The externally-reachable URL for the live viewer page.
    pub fn url(&self) -> String {
        self.index.destination().url("log.html")
    }

    fn clear_timer(state: &mut State) {
        if let Some(handle) = state.timer.take() {
            handle.abort();
        }
    }

    fn send_pending_locked(&self, state: &mut State) -> Result<(), StoreError> {
        let pending = std::mem::take(&mut state.pending).freeze();
        state.chunks.push(vec![pending]);
        Self::clear_timer(state);

        // 2048 algorithm: merge the last two chunks whenever they hold
        // the same number of blocks. Only ever touches the tail.
        while state.chunks.len() > 1 {
            let n = state.chunks.len();
            if state.chunks[n - 1].len() != state.chunks[n - 2].len() {
                break;
            }
            let last = state.chunks.pop().unwrap();
            let mut second_last = state.chunks.pop().unwrap();
            second_last.extend(last);
            state.chunks.push(second_last);
        }

        let chunk_sizes: Vec<usize> =
            state.chunks.iter().map(|chunk| chunk.iter().map(Bytes::len).sum()).collect();

        if let Some(&last_size) = chunk_sizes.last() {
            let start: usize = chunk_sizes[..chunk_sizes.len() - 1].iter().sum();
            let end = start + last_size;
            let suffix = format!("{start}-{end}");
            let mut bytes = Vec::with_capacity(last_size);
            for block in state.chunks.last().unwrap() {
                bytes.extend_from_slice(block);
            }
            self.index.destination().write(&format!("log.{suffix}"), Bytes::from(bytes))?;
            state.suffixes.insert(suffix);
        }

        let sizes_json = serde_json::to_vec(&chunk_sizes).expect("Vec<usize> always serializes");
        self.index.destination().write("log.chunks", Bytes::from(sizes_json))?;
        Ok(())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        self.send_pending_locked(&mut state)
    }

    /// Writes the initial chunk immediately so viewers see `log.chunks`
    /// right away, then bundles the static viewer alongside it.
    pub fn start(self: &Arc<Self>, data: &str) -> Result<(), StoreError> {
        {
            let mut state = self.state.lock().unwrap();
            state.pending = BytesMut::from(data.as_bytes());
        }
        self.flush()?;
        self.index.upload_static_assets(VIEWER_ASSETS)
    }

    pub fn write(self: &Arc<Self>, data: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.pending.extend_from_slice(data.as_bytes());

        if state.pending.len() > SIZE_LIMIT {
            drop(state);
            return self.flush();
        }

        if !state.pending.is_empty() && state.timer.is_none() {
            let this = Arc::clone(self);
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(TIME_LIMIT).await;
                if let Err(error) = this.flush() {
                    tracing::error!(%error, "failed to flush pending log data on timer");
                }
            }));
        }
        Ok(())
    }

    /// Collapses every chunk plus anything still pending into the
    /// final `log` object, then deletes the numbered chunk files so a
    /// polling viewer's next request 404s.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        Self::clear_timer(&mut state);

        let mut everything = Vec::new();
        for chunk in &state.chunks {
            for block in chunk {
                everything.extend_from_slice(block);
            }
        }
        everything.extend_from_slice(&state.pending);
        self.index.write("log", Bytes::from(everything))?;

        let suffixes: Vec<String> =
            state.suffixes.iter().map(|suffix| format!("log.{suffix}")).collect();
        self.index.destination().delete(&suffixes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cockpit_ci_store::FilesystemDestination;

    fn streamer() -> (Arc<LogStreamer>, Arc<Index>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let dest = FilesystemDestination::new(dir.path().into(), "https://logs.example".into()).unwrap();
        let index = Arc::new(Index::new(Arc::new(dest)));
        (LogStreamer::new(index.clone()), index, dir)
    }

    fn chunk_sizes(dir: &tempfile::TempDir) -> Vec<usize> {
        let raw = std::fs::read(dir.path().join("log.chunks")).unwrap();
        serde_json::from_slice(&raw).unwrap()
    }

    #[test]
    fn start_writes_the_first_chunk_and_the_bundled_viewer() {
        let (streamer, _index, dir) = streamer();
        streamer.start("hello\n").unwrap();
        assert_eq!(chunk_sizes(&dir), vec![6]);
        assert!(dir.path().join("log.0-6").exists());
        assert!(dir.path().join("log.html").exists());
        assert!(dir.path().join("viewer.js").exists());
        // The viewer's own page is distinct from the attachments
        // directory listing (§4.6), which `start()` does not write.
        assert!(!dir.path().join("index.html").exists());
    }

    #[tokio::test]
    async fn merges_chunks_of_equal_block_count() {
        let (streamer, _index, dir) = streamer();
        streamer.start("a").unwrap();
        streamer.write("b").unwrap();
        streamer.flush().unwrap();
        // Two single-block chunks of equal block-count (1 == 1) merge
        // into one two-block chunk.
        assert_eq!(chunk_sizes(&dir), vec![2]);

        streamer.write("c").unwrap();
        streamer.flush().unwrap();
        // [2-block, 1-block]: block counts differ, no merge yet.
        assert_eq!(chunk_sizes(&dir), vec![2, 1]);
    }

    #[tokio::test]
    async fn close_collapses_everything_into_log_and_deletes_chunks() {
        let (streamer, index, dir) = streamer();
        streamer.start("a").unwrap();
        streamer.write("b").unwrap();
        streamer.close().unwrap();

        assert!(!dir.path().join("log.chunks").exists());
        let final_log = std::fs::read_to_string(dir.path().join("log")).unwrap();
        assert_eq!(final_log, "ab");
        assert!(index.has("log"));
    }

    #[test]
    fn url_prefers_the_destination_address() {
        let (streamer, _index, _dir) = streamer();
        assert_eq!(streamer.url(), "https://logs.example/log.html");
    }

    #[test]
    fn write_past_size_limit_flushes_immediately() {
        let (streamer, _index, dir) = streamer();
        streamer.start("x").unwrap();
        let big = "y".repeat(SIZE_LIMIT + 1);
        streamer.write(&big).unwrap();
        let sizes = chunk_sizes(&dir);
        let total: usize = sizes.iter().sum();
        assert_eq!(total, 1 + big.len());
    }
}
