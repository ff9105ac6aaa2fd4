//! Storage-node location resolution with a process-wide, lazily populated
//! volume cache.

use crate::chunk::view::ChunkId;
use crate::util::retry::RetryPolicy;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

/// One storage node holding replicas of a volume.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeLocation {
    /// Address as seen from inside the cluster.
    pub url: String,
    /// Address reachable by external clients.
    pub public_url: String,
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no locations found for volume {volume}")]
    NoLocations { volume: String },
    #[error("volume lookup rpc failed for {volume}: {reason}")]
    Rpc { volume: String, reason: String },
}

/// Lookup-by-volume RPC collaborator.
///
/// Returns the node locations for each requested volume id; volumes the
/// service does not know are simply absent from the map.
#[async_trait]
pub trait VolumeLookup: Send + Sync {
    async fn lookup_volumes(
        &self,
        volume_ids: &[String],
    ) -> Result<HashMap<String, Vec<VolumeLocation>>, LookupError>;
}

/// Rewrites a node location into the address the client should dial.
pub type AddressRewrite = Box<dyn Fn(&VolumeLocation) -> String + Send + Sync>;

/// Maps chunk ids to candidate chunk URLs, one per replica node.
///
/// Created once per process and shared by every reader. Volume locations
/// are cached on first resolution and never expired or refreshed; a volume
/// migration stays invisible until the process restarts.
pub struct LocationResolver {
    lookup: Arc<dyn VolumeLookup>,
    cache: RwLock<HashMap<String, Vec<VolumeLocation>>>,
    retry: RetryPolicy,
    rewrite: AddressRewrite,
}

impl LocationResolver {
    /// Resolver dialing each node's in-cluster `url` directly.
    pub fn new(lookup: Arc<dyn VolumeLookup>, retry: RetryPolicy) -> Self {
        Self::with_rewrite(lookup, retry, Box::new(|loc: &VolumeLocation| loc.url.clone()))
    }

    /// Resolver with a custom location-to-address rewrite, for clients that
    /// must reach nodes through a different address than the cluster one.
    pub fn with_rewrite(
        lookup: Arc<dyn VolumeLookup>,
        retry: RetryPolicy,
        rewrite: AddressRewrite,
    ) -> Self {
        Self {
            lookup,
            cache: RwLock::new(HashMap::new()),
            retry,
            rewrite,
        }
    }

    /// Candidate URLs for `chunk_id`, in uniform random order so repeated
    /// calls spread load across replicas. Ordering is not stable across
    /// calls.
    pub async fn resolve(&self, chunk_id: &ChunkId) -> Result<Vec<String>, LookupError> {
        let volume = chunk_id.volume_id().to_string();

        let cached = {
            let cache = self.cache.read().unwrap();
            cache.get(&volume).cloned()
        };

        let locations = match cached {
            Some(locations) => locations,
            None => {
                debug!(%volume, chunk = %chunk_id, "volume not cached, looking up");
                let locations = self
                    .retry
                    .run("lookup volume", || async {
                        let mut found = self
                            .lookup
                            .lookup_volumes(std::slice::from_ref(&volume))
                            .await?;
                        match found.remove(&volume) {
                            Some(locations) if !locations.is_empty() => Ok(locations),
                            _ => Err(LookupError::NoLocations {
                                volume: volume.clone(),
                            }),
                        }
                    })
                    .await?;
                self.cache
                    .write()
                    .unwrap()
                    .insert(volume.clone(), locations.clone());
                locations
            }
        };

        let mut urls: Vec<String> = locations
            .iter()
            .map(|loc| format!("http://{}/{}", (self.rewrite)(loc), chunk_id))
            .collect();
        urls.shuffle(&mut rand::rng());
        Ok(urls)
    }
}

/// Serves a fixed volume table, counting RPC calls. Backs static deployments
/// and tests.
#[derive(Default)]
pub struct FixedVolumeLookup {
    table: HashMap<String, Vec<VolumeLocation>>,
    fallback: Option<Vec<VolumeLocation>>,
    calls: AtomicUsize,
}

impl FixedVolumeLookup {
    pub fn new(table: HashMap<String, Vec<VolumeLocation>>) -> Self {
        Self {
            table,
            fallback: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every volume with the same location list.
    pub fn for_all(locations: Vec<VolumeLocation>) -> Self {
        Self {
            table: HashMap::new(),
            fallback: Some(locations),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolumeLookup for FixedVolumeLookup {
    async fn lookup_volumes(
        &self,
        volume_ids: &[String],
    ) -> Result<HashMap<String, Vec<VolumeLocation>>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = HashMap::new();
        for id in volume_ids {
            if let Some(locations) = self.table.get(id).or(self.fallback.as_ref()) {
                out.insert(id.clone(), locations.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn node(addr: &str) -> VolumeLocation {
        VolumeLocation {
            url: addr.to_string(),
            public_url: format!("public.{addr}"),
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn resolves_through_cache_after_first_lookup() {
        let mut table = HashMap::new();
        table.insert("3".to_string(), vec![node("node1:8080")]);
        let lookup = Arc::new(FixedVolumeLookup::new(table));
        let resolver = LocationResolver::new(lookup.clone(), fast_retry());

        let chunk = ChunkId::from("3,0144b2b3deab");
        let urls = resolver.resolve(&chunk).await.unwrap();
        assert_eq!(urls, vec!["http://node1:8080/3,0144b2b3deab".to_string()]);

        resolver.resolve(&chunk).await.unwrap();
        resolver.resolve(&ChunkId::from("3,ffab01")).await.unwrap();
        assert_eq!(lookup.calls(), 1, "same volume must hit the cache");
    }

    #[tokio::test]
    async fn unknown_volume_fails_after_retries() {
        let lookup = Arc::new(FixedVolumeLookup::new(HashMap::new()));
        let resolver = LocationResolver::new(lookup.clone(), fast_retry());

        let err = resolver.resolve(&ChunkId::from("9,dead")).await.unwrap_err();
        assert!(matches!(err, LookupError::NoLocations { ref volume } if volume == "9"));
        assert_eq!(lookup.calls(), 2, "lookup must be retried before failing");
    }

    #[tokio::test]
    async fn candidates_cover_all_replicas_in_random_order() {
        let mut table = HashMap::new();
        table.insert("1".to_string(), vec![node("a:8080"), node("b:8080")]);
        let lookup = Arc::new(FixedVolumeLookup::new(table));
        let resolver = LocationResolver::new(lookup, fast_retry());
        let chunk = ChunkId::from("1,c0ffee");

        let mut seen_first = std::collections::HashSet::new();
        for _ in 0..200 {
            let urls = resolver.resolve(&chunk).await.unwrap();
            let mut sorted = urls.clone();
            sorted.sort();
            assert_eq!(
                sorted,
                vec![
                    "http://a:8080/1,c0ffee".to_string(),
                    "http://b:8080/1,c0ffee".to_string(),
                ]
            );
            seen_first.insert(urls[0].clone());
            if seen_first.len() == 2 {
                break;
            }
        }
        assert_eq!(seen_first.len(), 2, "both replicas should come first sometimes");
    }

    #[tokio::test]
    async fn rewrite_hook_controls_dialed_address() {
        let mut table = HashMap::new();
        table.insert("1".to_string(), vec![node("a:8080")]);
        let lookup = Arc::new(FixedVolumeLookup::new(table));
        let resolver = LocationResolver::with_rewrite(
            lookup,
            fast_retry(),
            Box::new(|loc| loc.public_url.clone()),
        );

        let urls = resolver.resolve(&ChunkId::from("1,aa")).await.unwrap();
        assert_eq!(urls, vec!["http://public.a:8080/1,aa".to_string()]);
    }
}
