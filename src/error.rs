//! Crate-wide error taxonomy.
//!
//! Mirrors the error kinds named in the job orchestration spec: each
//! variant records where it originates and whether the orchestrator should
//! retry the owning job or fail it outright.

use thiserror::Error;

/// The abstract error kinds surfaced to the job orchestrator and, from
/// there, to the `job.failed` webhook.
#[derive(Error, Debug)]
pub enum JobError {
    /// Bad URL, unsupported format, oversize download. Fail fast, non-retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Document classifier rejected the image. Non-retryable.
    #[error("non-document image: {0}")]
    NonDocument(String),

    /// Recognizer model/init failed. Job fails, queue retries.
    #[error("recognizer unavailable: {0}")]
    RecognizerUnavailable(String),

    /// Network blip, blob-store 5xx, DB hiccup. Retried in place by
    /// adapters; if persistent, surfaces here and the job fails.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retry counter hit `max_retries`.
    #[error("retries exhausted")]
    Exhausted,

    /// Uncaught failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Stable, lowercase kind name used in webhook payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::InvalidInput(_) => "InvalidInput",
            JobError::NonDocument(_) => "NonDocument",
            JobError::RecognizerUnavailable(_) => "RecognizerUnavailable",
            JobError::Transient(_) => "Transient",
            JobError::Exhausted => "Exhausted",
            JobError::Internal(_) => "Internal",
        }
    }

    /// Whether the queue should re-deliver the job that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::RecognizerUnavailable(_) | JobError::Transient(_)
        )
    }
}

/// Errors from the queue substrate.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue backend unavailable: {0}")]
    Unavailable(String),
    #[error("job {0} already enqueued")]
    Duplicate(String),
    #[error("lease not found or expired")]
    LeaseExpired,
}

/// Errors from the result store adapter.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("duplicate job_id: {0}")]
    Duplicate(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Errors from the blob store adapter.
#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),
    #[error("blob backend error: {0}")]
    Backend(String),
}

/// Errors from recognizer backends.
#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("recognition failed: {0}")]
    Failed(String),
}

/// Errors from the webhook dispatcher.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("non-retryable response: status {0}")]
    Rejected(u16),
    #[error("all delivery attempts exhausted")]
    AttemptsExhausted,
}
