//! Whole-chunk fetching: location resolution plus the wire call, fronted by
//! a cache-first, single-flight coordinator with one-chunk read-ahead.

use super::cache::ChunkCache;
use super::view::{ChunkId, ChunkView};
use crate::lookup::LocationResolver;
use crate::transport::WireFetch;
use bytes::Bytes;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, trace};

/// Cloneable so every single-flight waiter can observe the representative
/// call's failure.
#[derive(Clone, Debug, Error)]
pub enum FetchError {
    #[error("locations unresolvable for chunk {chunk}: {reason}")]
    Unresolvable { chunk: ChunkId, reason: String },
    #[error("fetching chunk {chunk} failed: {reason}")]
    Fetch { chunk: ChunkId, reason: String },
}

/// Resolves a chunk's candidate URLs and performs the wire fetch, forwarding
/// the view's cipher/compression flags. Retry lives below this layer: the
/// resolver's lookup policy and the transport's candidate walk.
pub struct ChunkFetcher {
    resolver: Arc<LocationResolver>,
    transport: Arc<dyn WireFetch>,
}

impl ChunkFetcher {
    pub fn new(resolver: Arc<LocationResolver>, transport: Arc<dyn WireFetch>) -> Self {
        Self { resolver, transport }
    }

    pub async fn fetch(&self, view: &ChunkView) -> Result<Bytes, FetchError> {
        let urls = self
            .resolver
            .resolve(&view.chunk_id)
            .await
            .map_err(|e| FetchError::Unresolvable {
                chunk: view.chunk_id.clone(),
                reason: e.to_string(),
            })?;
        trace!(chunk = %view.chunk_id, candidates = urls.len(), "fetching whole chunk");
        self.transport
            .fetch_chunk(&urls, view.cipher_key.as_ref(), view.is_compressed)
            .await
            .map_err(|e| FetchError::Fetch {
                chunk: view.chunk_id.clone(),
                reason: e.to_string(),
            })
    }
}

type InflightFetch = Shared<BoxFuture<'static, Result<Bytes, FetchError>>>;

/// Cache-first, deduplicated access to whole chunks.
///
/// Concurrent callers for the same chunk id, from any reader, collapse onto
/// one in-flight fetch and all observe its result. A successful miss-fetch
/// is stored into the content cache before waiters resume; a failure is not
/// remembered, so the next caller re-attempts.
pub struct FetchCoordinator {
    fetcher: Arc<ChunkFetcher>,
    cache: Option<Arc<dyn ChunkCache>>,
    inflight: Mutex<HashMap<ChunkId, InflightFetch>>,
}

impl FetchCoordinator {
    pub fn new(fetcher: ChunkFetcher, cache: Option<Arc<dyn ChunkCache>>) -> Arc<Self> {
        Arc::new(Self {
            fetcher: Arc::new(fetcher),
            cache,
            inflight: Mutex::new(HashMap::new()),
        })
    }

    /// Whole-chunk bytes for `view`, from the content cache or a (possibly
    /// shared) fetch.
    pub async fn whole_chunk(&self, view: &ChunkView) -> Result<Bytes, FetchError> {
        let fut = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(&view.chunk_id) {
                Some(existing) => existing.clone(),
                None => {
                    let fut = self.chunk_future(view);
                    inflight.insert(view.chunk_id.clone(), fut.clone());
                    fut
                }
            }
        };
        let result = fut.clone().await;
        // Drop the registry entry once resolved, unless a newer fetch for
        // the same chunk already replaced it.
        let mut inflight = self.inflight.lock().unwrap();
        if let Some(current) = inflight.get(&view.chunk_id)
            && Shared::ptr_eq(current, &fut)
        {
            inflight.remove(&view.chunk_id);
        }
        result
    }

    /// Fire-and-forget warm-up of `view`'s chunk through the same
    /// single-flight path. No-op without a content cache; the result is
    /// dropped and errors are logged, never surfaced.
    pub fn prefetch(self: &Arc<Self>, view: ChunkView) {
        if self.cache.is_none() {
            return;
        }
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = coordinator.whole_chunk(&view).await {
                debug!(chunk = %view.chunk_id, error = %e, "read-ahead fetch failed");
            }
        });
    }

    fn chunk_future(&self, view: &ChunkView) -> InflightFetch {
        let fetcher = Arc::clone(&self.fetcher);
        let cache = self.cache.clone();
        let view = view.clone();
        async move {
            if let Some(cache) = &cache
                && let Some(data) = cache.get(&view.chunk_id, view.chunk_size).await
            {
                trace!(chunk = %view.chunk_id, "content cache hit");
                return Ok(data);
            }
            let data = fetcher.fetch(&view).await?;
            if let Some(cache) = &cache {
                // Best effort: the read succeeds whether or not the store
                // is retained.
                cache.set(view.chunk_id.clone(), data.clone()).await;
            }
            Ok(data)
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::cache::MokaChunkCache;
    use crate::lookup::{FixedVolumeLookup, VolumeLocation};
    use crate::transport::mem::MemWireFetch;
    use crate::util::retry::RetryPolicy;
    use std::time::Duration;

    struct Rig {
        transport: Arc<MemWireFetch>,
        cache: Arc<MokaChunkCache>,
        coordinator: Arc<FetchCoordinator>,
    }

    fn rig() -> Rig {
        let transport = Arc::new(MemWireFetch::new());
        let lookup = Arc::new(FixedVolumeLookup::for_all(vec![VolumeLocation {
            url: "node1:8080".to_string(),
            public_url: "node1:8080".to_string(),
        }]));
        let resolver = Arc::new(LocationResolver::new(
            lookup,
            RetryPolicy {
                max_attempts: 1,
                initial_delay: Duration::from_millis(1),
            },
        ));
        let cache = Arc::new(MokaChunkCache::new(64 << 20));
        let fetcher = ChunkFetcher::new(resolver, transport.clone());
        let coordinator =
            FetchCoordinator::new(fetcher, Some(cache.clone() as Arc<dyn ChunkCache>));
        Rig {
            transport,
            cache,
            coordinator,
        }
    }

    fn view(chunk_id: &str, size: u64) -> ChunkView {
        ChunkView {
            chunk_id: ChunkId::from(chunk_id),
            offset_in_chunk: 0,
            logical_offset: 0,
            size,
            chunk_size: size,
            cipher_key: None,
            is_compressed: false,
        }
    }

    #[tokio::test]
    async fn cache_hit_skips_the_transport() {
        let r = rig();
        let v = view("1,ab", 4);
        r.cache
            .set(v.chunk_id.clone(), Bytes::from_static(b"warm"))
            .await;

        let data = r.coordinator.whole_chunk(&v).await.unwrap();
        assert_eq!(data.as_ref(), b"warm");
        assert_eq!(r.transport.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn miss_fetch_populates_the_cache() {
        let r = rig();
        r.transport.insert("1,ab", vec![3u8; 128]);
        let v = view("1,ab", 128);

        let data = r.coordinator.whole_chunk(&v).await.unwrap();
        assert_eq!(data.len(), 128);
        assert_eq!(r.transport.fetch_calls(), 1);
        assert!(r.cache.get(&v.chunk_id, 128).await.is_some());

        r.coordinator.whole_chunk(&v).await.unwrap();
        assert_eq!(r.transport.fetch_calls(), 1, "second call must be a cache hit");
    }

    #[tokio::test]
    async fn errors_are_not_remembered() {
        let r = rig();
        let v = view("1,late", 8);

        let err = r.coordinator.whole_chunk(&v).await.unwrap_err();
        assert!(matches!(err, FetchError::Fetch { .. }));

        r.transport.insert("1,late", vec![9u8; 8]);
        let data = r.coordinator.whole_chunk(&v).await.unwrap();
        assert_eq!(data.as_ref(), &[9u8; 8][..]);
        assert_eq!(r.transport.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn prefetch_warms_the_cache_off_the_critical_path() {
        let r = rig();
        r.transport.insert("1,next", vec![5u8; 32]);
        let v = view("1,next", 32);

        r.coordinator.prefetch(v.clone());
        let mut warmed = false;
        for _ in 0..200 {
            if r.cache.get(&v.chunk_id, 32).await.is_some() {
                warmed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(warmed, "prefetch should land in the cache");
        assert_eq!(r.transport.fetch_calls(), 1);

        r.coordinator.whole_chunk(&v).await.unwrap();
        assert_eq!(r.transport.fetch_calls(), 1);
    }

    #[tokio::test]
    async fn prefetch_failure_is_swallowed() {
        let r = rig();
        r.coordinator.prefetch(view("1,absent", 8));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(r.transport.fetch_calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_fetch() {
        let r = rig();
        r.transport.insert("1,shared", vec![11u8; 1024]);
        let v = view("1,shared", 1024);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coordinator = r.coordinator.clone();
            let v = v.clone();
            handles.push(tokio::spawn(
                async move { coordinator.whole_chunk(&v).await },
            ));
        }
        for handle in handles {
            let data = handle.await.unwrap().unwrap();
            assert_eq!(data.as_ref(), &[11u8; 1024][..]);
        }
        assert_eq!(r.transport.fetch_calls(), 1);
    }
}
