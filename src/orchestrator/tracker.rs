//! In-memory job metadata tracker.
//!
//! Readable by status queries without contending for the queue lease;
//! writable only by the worker holding that job's lease (§4.7, §4.1). A
//! `tokio::sync::RwLock<HashMap<...>>` is sufficient at the scale a
//! single-process worker pool needs, the same sizing call the teacher
//! makes for `AppState::stats_cache` (`src/server/cache.rs`).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::Job;

#[derive(Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<String, Job>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `job` under its `job_id` unless a record already exists, in
    /// which case the existing record is returned unchanged. This backs
    /// the submission endpoint's fingerprint exclusivity (§4.7): resubmitting
    /// the same `job_id` is a no-op that returns the prior job.
    pub async fn insert_if_absent(&self, job: Job) -> Job {
        let mut guard = self.jobs.write().await;
        guard.entry(job.job_id.clone()).or_insert(job).clone()
    }

    pub async fn get(&self, job_id: &str) -> Option<Job> {
        self.jobs.read().await.get(job_id).cloned()
    }

    /// Apply `f` to the job record if one exists. No-op for unknown ids.
    pub async fn mutate<F>(&self, job_id: &str, f: F)
    where
        F: FnOnce(&mut Job),
    {
        if let Some(job) = self.jobs.write().await.get_mut(job_id) {
            f(job);
        }
    }
}
