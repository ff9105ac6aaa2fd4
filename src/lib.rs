//! Client-side random-access read path for a chunked distributed filesystem.
//!
//! A logical file is an ordered list of immutable remote chunks, possibly
//! sparse (holes read back as zeros), possibly encrypted or compressed.
//! [`chunk::ChunkReader`] satisfies arbitrary byte-range reads over such a
//! file: it maps the requested window onto the overlapping chunk views,
//! resolves storage-node locations through [`lookup::LocationResolver`],
//! and fetches whole chunks through [`chunk::FetchCoordinator`], which
//! deduplicates concurrent fetches of the same chunk and warms the content
//! cache with the next chunk ahead of the read cursor.

pub mod chunk;
pub mod lookup;
pub mod transport;
pub mod util;
