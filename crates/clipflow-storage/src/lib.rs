//! Blob storage side of the upload pipeline.
//!
//! This crate provides:
//! - The `UploadTransport` trait for resumable, chunked transfers
//! - An HTTP resumable-upload transport (Content-Range protocol)
//! - A Cloudflare R2 multipart transport
//! - Playback/thumbnail URL conventions derived from a stored asset ID

pub mod delivery;
pub mod error;
pub mod http;
pub mod r2;
pub mod transport;

pub use delivery::{time_fragment, DeliveryConfig, THUMBNAIL_TIME_PLACEHOLDER};
pub use error::{StorageError, StorageResult};
pub use http::{HttpResumableTransport, HttpUploadConfig};
pub use r2::{R2Config, R2MultipartTransport};
pub use transport::{
    ChunkAck, ChunkRange, PartReceipt, RemoteSession, StoredObject, UploadTarget, UploadTransport,
};
