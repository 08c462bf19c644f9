//! Core data model: Job, OCR Result, Text Region, Blob Reference.

mod blob;
mod job;
mod region;
mod result;

pub use blob::{blob_key, BlobRef};
pub use job::{Job, JobFailure, JobStatus, JobType, PipelineOverrides, Priority, Stage};
pub use region::{detect_script, thai_fraction, Polygon, Script, SourcePass, TextRegion};
pub use result::{FieldValue, LineItem, OcrMetadata, OcrResult, Quality};
