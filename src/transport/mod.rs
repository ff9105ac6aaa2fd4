//! Wire-fetch collaborator: turns candidate URLs plus codec flags into raw
//! chunk bytes.
//!
//! Submodules:
//! - `http`: reqwest-based fetch trying candidates in order
//! - `mem`: in-memory chunk map for tests and demos

pub mod http;
pub mod mem;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("all {attempts} candidate urls failed, last error: {last}")]
    AllCandidatesFailed { attempts: usize, last: String },
    #[error("chunk is encrypted and no cipher is configured")]
    CipherUnsupported,
    #[error("failed to decompress chunk body: {0}")]
    Decompress(String),
    #[error("chunk not found on any candidate node")]
    NotFound,
}

/// Fetches one whole chunk from any of the candidate URLs.
///
/// The implementation owns decryption (when `cipher_key` is present) and
/// decompression (when `is_compressed`); callers only forward the flags
/// recorded on the chunk view. Each candidate URL is independently
/// retriable.
#[async_trait]
pub trait WireFetch: Send + Sync {
    async fn fetch_chunk(
        &self,
        urls: &[String],
        cipher_key: Option<&Bytes>,
        is_compressed: bool,
    ) -> Result<Bytes, TransportError>;
}
