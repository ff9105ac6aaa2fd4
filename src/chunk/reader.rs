//! Random-access reads over an ordered, possibly sparse chunk-view list.

use super::fetch::{FetchCoordinator, FetchError};
use super::view::{ChunkId, ChunkView};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, trace};

/// Whether a completed read consumed the end of the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStatus {
    /// More file content remains past the requested window.
    More,
    /// The window reached (or started at) the end of the file. The same
    /// call may still have written bytes.
    Eof,
}

/// A failed read. Bytes copied before the failing chunk remain valid in the
/// caller's buffer; `written` says how many.
#[derive(Debug, Error)]
#[error("read aborted after {written} bytes: {source}")]
pub struct ReadError {
    pub written: usize,
    #[source]
    pub source: FetchError,
}

/// Last whole chunk this reader fetched. One slot, overwritten on every
/// chunk change; consecutive reads inside one chunk skip the coordinator.
#[derive(Default)]
struct LastChunk {
    chunk_id: Option<ChunkId>,
    data: Bytes,
}

/// Random-access reader over one logical file assembled from remote chunks.
///
/// Built from an ordered, non-overlapping view list and the file's total
/// size, both immutable for the reader's lifetime. Gaps between views read
/// back as zeros up to `file_size`. Calls to [`ChunkReader::read_at`] are
/// serialized per instance; read-ahead triggered on chunk transitions runs
/// outside that lock.
pub struct ChunkReader {
    chunk_views: Vec<ChunkView>,
    file_size: u64,
    coordinator: Arc<FetchCoordinator>,
    last: Mutex<LastChunk>,
}

impl ChunkReader {
    pub fn new(
        chunk_views: Vec<ChunkView>,
        file_size: u64,
        coordinator: Arc<FetchCoordinator>,
    ) -> Self {
        Self {
            chunk_views,
            file_size,
            coordinator,
            last: Mutex::new(LastChunk::default()),
        }
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Fill `buf` with file content starting at `offset`.
    ///
    /// Returns the byte count written and whether the window reached end of
    /// file; a short read that exhausts the file reports both at once. On a
    /// fetch failure the walk stops and the bytes already written are
    /// reported through [`ReadError::written`].
    pub async fn read_at(
        &self,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<(usize, ReadStatus), ReadError> {
        let mut last = self.last.lock().await;
        trace!(
            offset,
            len = buf.len(),
            file_size = self.file_size,
            views = self.chunk_views.len(),
            "read_at"
        );

        let mut written = 0usize;
        let mut position = offset;
        let mut remaining = buf.len() as u64;

        for (i, view) in self.chunk_views.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            // Hole before this view.
            if position < view.logical_offset {
                let gap = (view.logical_offset - position).min(remaining);
                trace!(from = position, len = gap, "zero-fill gap");
                buf[written..written + gap as usize].fill(0);
                written += gap as usize;
                position += gap;
                remaining -= gap;
                if remaining == 0 {
                    break;
                }
            }
            let copy_start = position.max(view.logical_offset);
            let copy_end = (position + remaining).min(view.logical_end());
            if copy_start >= copy_end {
                continue;
            }
            let chunk = match self.whole_chunk(&mut last, i).await {
                Ok(data) => data,
                Err(e) => {
                    error!(chunk = %view.chunk_id, error = %e, "chunk fetch failed");
                    return Err(ReadError { written, source: e });
                }
            };
            let len = (copy_end - copy_start) as usize;
            // Position of the visible range inside the whole-chunk bytes.
            let from = (copy_start - view.logical_offset + view.offset_in_chunk) as usize;
            buf[written..written + len].copy_from_slice(&chunk[from..from + len]);
            written += len;
            position += len as u64;
            remaining -= len as u64;
        }

        // Sparse hole at or after the last view, bounded by file size.
        if remaining > 0 && position < self.file_size {
            let fill = remaining.min(self.file_size - position) as usize;
            trace!(from = position, len = fill, "zero-fill trailing hole");
            buf[written..written + fill].fill(0);
            written += fill;
        }

        let status = if offset + buf.len() as u64 >= self.file_size {
            ReadStatus::Eof
        } else {
            ReadStatus::More
        };
        Ok((written, status))
    }

    /// Whole-chunk bytes for view `i`, via the recency slot or the fetch
    /// coordinator. A coordinator fetch also schedules read-ahead of the
    /// next view's chunk.
    async fn whole_chunk(&self, last: &mut LastChunk, i: usize) -> Result<Bytes, FetchError> {
        let view = &self.chunk_views[i];
        if last.chunk_id.as_ref() == Some(&view.chunk_id) {
            return Ok(last.data.clone());
        }
        let data = self.coordinator.whole_chunk(view).await?;
        last.chunk_id = Some(view.chunk_id.clone());
        last.data = data.clone();
        if let Some(next) = self.chunk_views.get(i + 1) {
            self.coordinator.prefetch(next.clone());
        }
        Ok(data)
    }
}
