//! Chunk identifiers and the mapping of chunk bytes into a logical file.

use bytes::Bytes;
use std::fmt;

/// Opaque identifier of an immutable remote chunk, e.g. `3,0144b2b3deab`.
///
/// The volume prefix (everything before the first `,`) decides which
/// storage nodes hold the chunk's replicas.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Volume identifier this chunk belongs to. Ids without a comma are
    /// their own volume.
    pub fn volume_id(&self) -> &str {
        match self.0.find(',') {
            Some(i) => &self.0[..i],
            None => &self.0,
        }
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One chunk's visibility window inside a logical file.
///
/// A file's view list is sorted ascending by `logical_offset` and views are
/// pairwise non-overlapping; overwrite resolution happened upstream. Any gap
/// between consecutive views is a sparse hole that reads back as zeros.
#[derive(Clone, Debug)]
pub struct ChunkView {
    pub chunk_id: ChunkId,
    /// Start offset inside the chunk's own byte space.
    pub offset_in_chunk: u64,
    /// Position in the reconstructed file where this view begins.
    pub logical_offset: u64,
    /// Visible byte count.
    pub size: u64,
    /// Full chunk size; used as a cache sizing hint.
    pub chunk_size: u64,
    /// Present iff the chunk is stored encrypted.
    pub cipher_key: Option<Bytes>,
    pub is_compressed: bool,
}

impl ChunkView {
    /// First logical offset past this view.
    pub fn logical_end(&self) -> u64 {
        self.logical_offset + self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_id_is_prefix_before_comma() {
        assert_eq!(ChunkId::from("3,0144b2b3deab").volume_id(), "3");
        assert_eq!(ChunkId::from("12,ab,cd").volume_id(), "12");
    }

    #[test]
    fn volume_id_without_comma_is_whole_id() {
        assert_eq!(ChunkId::from("standalone").volume_id(), "standalone");
    }

    #[test]
    fn logical_end_is_offset_plus_size() {
        let view = ChunkView {
            chunk_id: ChunkId::from("1,a"),
            offset_in_chunk: 8,
            logical_offset: 100,
            size: 50,
            chunk_size: 64,
            cipher_key: None,
            is_compressed: false,
        };
        assert_eq!(view.logical_end(), 150);
    }
}
