//! Queue Substrate — a durable FIFO with visibility timeout, metadata, and
//! a retry counter.
//!
//! Exposes three operations: `enqueue`, `dequeue`, `complete`. Guarantees:
//! FIFO within a single queue; at most one worker holds a lease on a given
//! payload at any moment; a payload not completed before its visibility
//! timeout expires becomes re-dequeuable with its retry counter
//! incremented, and is discarded after `max_retries` re-deliveries.

mod memory;

#[cfg(feature = "redis-backend")]
mod redis_backend;
#[cfg(feature = "amqp-broker")]
mod amqp_backend;

pub use memory::InMemoryQueue;

#[cfg(feature = "redis-backend")]
pub use redis_backend::RedisQueue;
#[cfg(feature = "amqp-broker")]
pub use amqp_backend::AmqpQueue;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::Priority;

/// An exclusive, time-bounded claim on a dequeued payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub lease_id: Uuid,
    pub job_id: String,
    pub retry_count: u32,
}

/// Outcome reported back via `complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Processing succeeded; drop the payload.
    Success,
    /// Processing failed but should be retried subject to `max_retries`.
    Retry,
    /// Drop the payload unconditionally (e.g. non-retryable error).
    Discard,
}

/// A durable, at-most-one-leased-at-a-time FIFO queue.
#[async_trait]
pub trait Queue: Send + Sync {
    /// Enqueue `payload` under the fingerprint `job_id`. Re-enqueuing an
    /// existing `job_id` is a no-op that succeeds (exclusivity is enforced
    /// at the fingerprint, not by erroring). `priority` buckets the job for
    /// dequeue ordering; FIFO is preserved within a single priority level.
    async fn enqueue(
        &self,
        job_id: &str,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<(), QueueError>;

    /// Claim the next payload, if any, for up to `visibility_timeout`.
    async fn dequeue(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<(Lease, Vec<u8>)>, QueueError>;

    /// Report the outcome of processing a leased payload. Calling this
    /// after the lease has expired returns `QueueError::LeaseExpired`.
    async fn complete(&self, lease: &Lease, outcome: Outcome) -> Result<(), QueueError>;

    /// Maximum re-deliveries before a payload is discarded as `Exhausted`.
    fn max_retries(&self) -> u32;
}
