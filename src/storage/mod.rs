//! Object storage: Cloudflare R2 over the S3 API.

mod error;
mod naming;
mod r2;
mod store;
mod upload;

pub use error::StorageError;
pub use naming::{clean_key, is_same_size, resolve_key, KeyChoice};
pub use r2::R2Client;
pub use store::{CompletedPart, ObjectMetadata, ObjectStore, OBJECT_TTL_MS};
pub use upload::{
    ProgressFn, UploadResult, Uploader, MULTIPART_THRESHOLD, PART_CONCURRENCY, PART_SIZE,
};
