//! Chunk management: views, whole-chunk fetching, and the random-access
//! reader.
//!
//! Submodules:
//! - `view`: chunk identifiers and how a chunk's bytes map into a file
//! - `cache`: whole-chunk content cache seam and the moka-backed default
//! - `fetch`: location resolution + wire fetch, fronted by a single-flight
//!   coordinator with one-chunk read-ahead
//! - `reader`: window reconstruction over an ordered, sparse view list

pub mod cache;
pub mod fetch;
pub mod reader;
pub mod view;

pub use cache::{ChunkCache, MokaChunkCache};
pub use fetch::{ChunkFetcher, FetchCoordinator, FetchError};
pub use reader::{ChunkReader, ReadError, ReadStatus};
pub use view::{ChunkId, ChunkView};
