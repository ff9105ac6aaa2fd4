//! Whole-chunk content cache seam and the moka-backed default.

use super::view::ChunkId;
use async_trait::async_trait;
use bytes::Bytes;

/// Whole-chunk content cache keyed by chunk id.
///
/// Best-effort: a miss is `None`, stores may be dropped, eviction is the
/// implementation's business. Reads never fail because of the cache.
#[async_trait]
pub trait ChunkCache: Send + Sync {
    /// `size_hint` is the full chunk size from the view, for implementations
    /// that size buffers or admission by it.
    async fn get(&self, chunk_id: &ChunkId, size_hint: u64) -> Option<Bytes>;

    async fn set(&self, chunk_id: ChunkId, data: Bytes);
}

/// In-memory cache bounded by total resident bytes.
pub struct MokaChunkCache {
    inner: moka::future::Cache<ChunkId, Bytes>,
}

impl MokaChunkCache {
    pub fn new(max_bytes: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(max_bytes)
            .weigher(|_key: &ChunkId, value: &Bytes| {
                value.len().try_into().unwrap_or(u32::MAX)
            })
            .build();
        Self { inner }
    }
}

#[async_trait]
impl ChunkCache for MokaChunkCache {
    async fn get(&self, chunk_id: &ChunkId, _size_hint: u64) -> Option<Bytes> {
        self.inner.get(chunk_id).await
    }

    async fn set(&self, chunk_id: ChunkId, data: Bytes) {
        self.inner.insert(chunk_id, data).await;
    }
}
