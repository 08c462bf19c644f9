//! Persistence adapters: the Result Store (SQLite) and the Blob Store
//! (enhanced-image artifacts).

mod blob_store;
mod result_store;

pub use blob_store::{default_blob_root, BlobStore, CloudBlobStore, FallbackBlobStore, LocalBlobStore};
pub use result_store::{default_db_path, ResultStore, SqliteResultStore, StoreStats};
