//! In-process FIFO queue with visibility timeout and retry tracking.
//!
//! Grounded on the teacher's `CrawlRepository` retry bookkeeping
//! (`retry_count`, `next_retry_at` columns on `crawl_urls`), generalized
//! from a SQLite table to an in-memory map guarded by a single mutex —
//! sufficient at the scale a single-process worker pool needs, and
//! swappable behind the `Queue` trait for `RedisQueue`/`AmqpQueue` the way
//! the teacher swaps `RateLimitBackend` implementations.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Lease, Outcome, Queue};
use crate::error::QueueError;
use crate::model::Priority;

struct Entry {
    payload: Vec<u8>,
    retry_count: u32,
    priority: Priority,
}

struct LeaseState {
    job_id: String,
    deadline: Instant,
}

struct Inner {
    /// Ready job ids bucketed by priority; FIFO within a bucket, highest
    /// priority bucket drained first.
    ready: BTreeMap<Priority, VecDeque<String>>,
    entries: HashMap<String, Entry>,
    leases: HashMap<Uuid, LeaseState>,
}

impl Inner {
    fn push_ready(&mut self, priority: Priority, job_id: String) {
        self.ready.entry(priority).or_default().push_back(job_id);
    }

    /// Pop the oldest job id from the highest non-empty priority bucket.
    fn pop_ready(&mut self) -> Option<String> {
        for queue in self.ready.values_mut().rev() {
            if let Some(job_id) = queue.pop_front() {
                return Some(job_id);
            }
        }
        None
    }
}

/// Default `Queue` implementation: a `VecDeque`-backed FIFO behind a
/// `tokio::sync::Mutex`, with opportunistic lease reaping on every
/// `dequeue` call.
pub struct InMemoryQueue {
    inner: Mutex<Inner>,
    max_retries: u32,
}

impl InMemoryQueue {
    pub fn new(max_retries: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: BTreeMap::new(),
                entries: HashMap::new(),
                leases: HashMap::new(),
            }),
            max_retries,
        }
    }

    /// Move any leases whose visibility timeout has elapsed back onto the
    /// ready queue, incrementing their retry counter, or drop them if
    /// `max_retries` has been exceeded. Returns the job ids discarded as
    /// `Exhausted`.
    pub async fn reap_expired(&self) -> Vec<String> {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        let expired: Vec<Uuid> = guard
            .leases
            .iter()
            .filter(|(_, l)| l.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        let mut exhausted = Vec::new();
        for lease_id in expired {
            let lease = guard.leases.remove(&lease_id).unwrap();
            if let Some(entry) = guard.entries.get_mut(&lease.job_id) {
                entry.retry_count += 1;
                if entry.retry_count > self.max_retries {
                    guard.entries.remove(&lease.job_id);
                    exhausted.push(lease.job_id);
                } else {
                    let priority = entry.priority;
                    guard.push_ready(priority, lease.job_id);
                }
            }
        }
        exhausted
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn enqueue(
        &self,
        job_id: &str,
        payload: Vec<u8>,
        priority: Priority,
    ) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().await;
        if guard.entries.contains_key(job_id) {
            // Fingerprint already enqueued: exclusivity means this is a
            // no-op, not an error.
            return Ok(());
        }
        guard.entries.insert(
            job_id.to_string(),
            Entry {
                payload,
                retry_count: 0,
                priority,
            },
        );
        guard.push_ready(priority, job_id.to_string());
        Ok(())
    }

    async fn dequeue(
        &self,
        visibility_timeout: Duration,
    ) -> Result<Option<(Lease, Vec<u8>)>, QueueError> {
        drop(self.reap_expired().await);

        let mut guard = self.inner.lock().await;
        let job_id = match guard.pop_ready() {
            Some(id) => id,
            None => return Ok(None),
        };
        let retry_count = match guard.entries.get(&job_id) {
            Some(entry) => entry.retry_count,
            None => return Ok(None),
        };
        let payload = guard.entries.get(&job_id).unwrap().payload.clone();

        let lease_id = Uuid::new_v4();
        guard.leases.insert(
            lease_id,
            LeaseState {
                job_id: job_id.clone(),
                deadline: Instant::now() + visibility_timeout,
            },
        );

        Ok(Some((
            Lease {
                lease_id,
                job_id,
                retry_count,
            },
            payload,
        )))
    }

    async fn complete(&self, lease: &Lease, outcome: Outcome) -> Result<(), QueueError> {
        let mut guard = self.inner.lock().await;
        if guard.leases.remove(&lease.lease_id).is_none() {
            return Err(QueueError::LeaseExpired);
        }
        match outcome {
            Outcome::Success | Outcome::Discard => {
                guard.entries.remove(&lease.job_id);
            }
            Outcome::Retry => {
                if let Some(entry) = guard.entries.get_mut(&lease.job_id) {
                    entry.retry_count += 1;
                    if entry.retry_count > self.max_retries {
                        guard.entries.remove(&lease.job_id);
                    } else {
                        let priority = entry.priority;
                        guard.push_ready(priority, lease.job_id.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::test_support::assert_fifo_and_retry_contract;

    #[tokio::test]
    async fn satisfies_fifo_and_retry_contract() {
        let queue = InMemoryQueue::new(3);
        assert_fifo_and_retry_contract(&queue).await;
    }

    #[tokio::test]
    async fn reenqueue_of_same_fingerprint_is_noop() {
        let queue = InMemoryQueue::new(3);
        queue
            .enqueue("dup", b"a".to_vec(), Priority::Normal)
            .await
            .unwrap();
        queue
            .enqueue("dup", b"b".to_vec(), Priority::Normal)
            .await
            .unwrap();

        let (lease, payload) = queue
            .dequeue(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, b"a");
        queue.complete(&lease, Outcome::Success).await.unwrap();
        assert!(queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expired_lease_is_redelivered_with_incremented_retry() {
        let queue = InMemoryQueue::new(3);
        queue
            .enqueue("job", b"x".to_vec(), Priority::Normal)
            .await
            .unwrap();

        let (lease, _) = queue
            .dequeue(Duration::from_millis(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease.retry_count, 0);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let (lease2, _) = queue
            .dequeue(Duration::from_secs(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease2.retry_count, 1);
    }

    #[tokio::test]
    async fn discarded_after_max_retries_exceeded() {
        let queue = InMemoryQueue::new(1);
        queue
            .enqueue("job", b"x".to_vec(), Priority::Normal)
            .await
            .unwrap();

        for _ in 0..2 {
            let (lease, _) = queue
                .dequeue(Duration::from_millis(1))
                .await
                .unwrap()
                .unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(lease);
        }
        let exhausted = queue.reap_expired().await;
        assert_eq!(exhausted, vec!["job".to_string()]);
        assert!(queue
            .dequeue(Duration::from_millis(10))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn higher_priority_jobs_dequeue_before_lower_and_fifo_within_a_tier() {
        let queue = InMemoryQueue::new(3);
        queue
            .enqueue("low", b"low".to_vec(), Priority::Low)
            .await
            .unwrap();
        queue
            .enqueue("normal-1", b"normal-1".to_vec(), Priority::Normal)
            .await
            .unwrap();
        queue
            .enqueue("urgent", b"urgent".to_vec(), Priority::Urgent)
            .await
            .unwrap();
        queue
            .enqueue("normal-2", b"normal-2".to_vec(), Priority::Normal)
            .await
            .unwrap();

        let mut order = Vec::new();
        while let Some((_, payload)) = queue.dequeue(Duration::from_secs(5)).await.unwrap() {
            order.push(String::from_utf8(payload).unwrap());
        }
        assert_eq!(order, vec!["urgent", "normal-1", "normal-2", "low"]);
    }
}
