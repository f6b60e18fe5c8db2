//! Resumable upload transport abstraction.
//!
//! A transport moves one file to blob storage in contiguous chunks. Every
//! chunk reply carries the committed offset: the number of leading bytes the
//! remote side has durably stored. After a failure the caller asks for the
//! committed offset and resumes from there.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageResult;

/// What is being uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTarget {
    pub file_name: String,
    pub content_type: String,
    pub total_bytes: u64,
}

/// A completed multipart part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartReceipt {
    pub part_number: i32,
    pub etag: String,
    pub size: u64,
}

/// Remote side of an open upload session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSession {
    /// Session identifier assigned by storage
    pub upload_id: String,

    /// Where chunks are sent (upload URL or object key)
    pub location: String,

    /// Declared size of the object
    pub total_bytes: u64,

    /// Parts acknowledged so far (multipart transports only)
    #[serde(default)]
    pub parts: Vec<PartReceipt>,
}

impl RemoteSession {
    pub fn new(
        upload_id: impl Into<String>,
        location: impl Into<String>,
        total_bytes: u64,
    ) -> Self {
        Self {
            upload_id: upload_id.into(),
            location: location.into(),
            total_bytes,
            parts: Vec::new(),
        }
    }
}

/// A contiguous byte range of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    /// Zero-based chunk index
    pub index: u32,
    /// Offset of the first byte
    pub offset: u64,
    /// Number of bytes
    pub len: u64,
}

impl ChunkRange {
    /// Offset one past the last byte.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// The chunk starting at `offset`, or `None` once `total` is reached.
    pub fn next(offset: u64, total: u64, chunk_size: u64) -> Option<ChunkRange> {
        if offset >= total {
            return None;
        }
        let chunk_size = chunk_size.max(1);
        Some(ChunkRange {
            index: (offset / chunk_size) as u32,
            offset,
            len: chunk_size.min(total - offset),
        })
    }

    /// Chunk layout for a file of `total` bytes starting at `offset`.
    pub fn plan(offset: u64, total: u64, chunk_size: u64) -> Vec<ChunkRange> {
        let mut ranges = Vec::new();
        let mut start = offset;
        while let Some(range) = ChunkRange::next(start, total, chunk_size) {
            start = range.end();
            ranges.push(range);
        }
        ranges
    }
}

/// Reply to a chunk upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkAck {
    /// Leading bytes durably stored by the remote side
    pub committed_offset: u64,
}

/// A finalized object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Stable identifier the delivery URLs are derived from
    pub external_id: String,
}

/// Chunked, resumable transfer to blob storage.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Open a remote upload session.
    async fn create_session(&self, target: &UploadTarget) -> StorageResult<RemoteSession>;

    /// Send one chunk. Chunks are sent in offset order.
    async fn upload_chunk(
        &self,
        session: &mut RemoteSession,
        range: ChunkRange,
        data: Vec<u8>,
    ) -> StorageResult<ChunkAck>;

    /// Ask the remote side how many leading bytes it has stored.
    async fn committed_offset(&self, session: &mut RemoteSession) -> StorageResult<u64>;

    /// Finalize the object once every byte is acknowledged.
    async fn finish(&self, session: &RemoteSession) -> StorageResult<StoredObject>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_plan() {
        let ranges = ChunkRange::plan(0, 10, 4);
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[2], ChunkRange { index: 2, offset: 8, len: 2 });
        assert_eq!(ranges[2].end(), 10);
    }

    #[test]
    fn test_chunk_plan_resumes_mid_file() {
        let ranges = ChunkRange::plan(6, 10, 4);
        assert_eq!(ranges[0], ChunkRange { index: 1, offset: 6, len: 4 });
        assert_eq!(ranges.len(), 1);
        assert!(ChunkRange::plan(10, 10, 4).is_empty());
    }
}
