//! In-memory wire fetch for tests and demos.

use super::{TransportError, WireFetch};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Serves chunks from a map keyed by the chunk id embedded in the URL path,
/// counting every fetch call. Chunks are stored pre-decoded, so the codec
/// flags are accepted but not interpreted.
#[derive(Default)]
pub struct MemWireFetch {
    chunks: Mutex<HashMap<String, Bytes>>,
    fetch_calls: AtomicUsize,
}

impl MemWireFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, chunk_id: &str, data: impl Into<Bytes>) {
        self.chunks
            .lock()
            .unwrap()
            .insert(chunk_id.to_string(), data.into());
    }

    /// Number of `fetch_chunk` calls observed so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn chunk_id_of(url: &str) -> &str {
        url.rsplit('/').next().unwrap_or(url)
    }
}

#[async_trait]
impl WireFetch for MemWireFetch {
    async fn fetch_chunk(
        &self,
        urls: &[String],
        _cipher_key: Option<&Bytes>,
        _is_compressed: bool,
    ) -> Result<Bytes, TransportError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        for url in urls {
            let id = Self::chunk_id_of(url);
            if let Some(data) = self.chunks.lock().unwrap().get(id) {
                return Ok(data.clone());
            }
        }
        Err(TransportError::NotFound)
    }
}
