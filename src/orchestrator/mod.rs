//! Job Orchestrator — the entry point for submission and status queries,
//! and the home of the stage-driving worker loop (§4.7).
//!
//! The `Orchestrator` struct is grounded on the teacher's `AppState`
//! (`src/server/state.rs`: one struct bundling every `Arc<dyn Trait>`
//! adapter a service handler needs), generalized from a read-mostly web
//! state to one also consumed by the worker loop.

mod payload;
mod tracker;
mod worker;

pub use tracker::JobTracker;
pub use worker::{process_next, run_worker_loop};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::QueueError;
use crate::model::{Job, JobFailure, JobStatus, OcrResult, PipelineOverrides, Priority, Stage};
use crate::queue::Queue;
use crate::recognizer::Recognizer;
use crate::store::{BlobStore, ResultStore};
use crate::webhook::WebhookDispatcher;

/// Inbound submission, already validated by the HTTP layer.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionRequest {
    pub image_url: String,
    pub user_id: String,
    pub message_id: String,
    pub webhook_url: String,
    #[serde(default)]
    pub pipeline_overrides: PipelineOverrides,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

fn default_queue_name() -> String {
    "invoices".to_string()
}

/// Status-query projection of a `Job`, shaped for the API response. Carries
/// the full result (not just its id) so a client whose webhook delivery
/// failed can still retrieve it by polling this endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub stage: Stage,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<OcrResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

/// Bundles every adapter the submission API and worker loop need. One
/// instance is shared (behind `Arc`) between the HTTP server and however
/// many worker tasks are spawned.
pub struct Orchestrator {
    pub queue: Arc<dyn Queue>,
    pub jobs: JobTracker,
    pub result_store: Arc<dyn ResultStore>,
    pub blob_store: Arc<dyn BlobStore>,
    pub recognizer_primary: Arc<dyn Recognizer>,
    pub recognizer_secondary: Option<Arc<dyn Recognizer>>,
    pub webhook: Arc<WebhookDispatcher>,
    pub http_client: reqwest::Client,
    pub pipeline_config: PipelineConfig,
    pub confidence_threshold: f64,
    pub job_timeout: Duration,
    pub visibility_timeout: Duration,
    pub model_descriptor: String,
}

impl Orchestrator {
    /// Accept a submission: record it, enqueue it, and return its tracked
    /// view. Generates a fresh `job_id` per call, since the public
    /// submission contract carries no caller-supplied fingerprint.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<Job, QueueError> {
        let job_id = Uuid::new_v4().to_string();
        self.submit_with_job_id(job_id, request).await
    }

    /// Like `submit`, but with an explicit `job_id` — the hook the
    /// exclusivity invariant (resubmitting the same fingerprint is a
    /// no-op) is exercised through, since a fresh `Uuid` is generated on
    /// every call to the public HTTP-facing `submit`.
    pub async fn submit_with_job_id(&self, job_id: String, request: SubmissionRequest) -> Result<Job, QueueError> {
        let job = Job::new(
            job_id.clone(),
            request.image_url,
            request.user_id,
            request.message_id,
            request.webhook_url,
            request.pipeline_overrides,
            request.priority,
            request.queue_name,
        );
        let tracked = self.jobs.insert_if_absent(job).await;
        self.queue
            .enqueue(&job_id, job_id.clone().into_bytes(), tracked.priority)
            .await?;
        Ok(tracked)
    }

    pub async fn status(&self, job_id: &str) -> Option<JobStatusView> {
        let job = self.jobs.get(job_id).await?;
        let result = match &job.result_id {
            Some(result_id) => self.result_store.get(result_id).await.ok().flatten(),
            None => None,
        };
        Some(JobStatusView {
            job_id: job.job_id,
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            result,
            error: job.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use crate::queue::InMemoryQueue;
    use crate::recognizer::NullRecognizer;
    use crate::store::{LocalBlobStore, SqliteResultStore};

    fn test_orchestrator() -> Orchestrator {
        Orchestrator {
            queue: Arc::new(InMemoryQueue::new(3)),
            jobs: JobTracker::new(),
            result_store: Arc::new(SqliteResultStore::open_in_memory().unwrap()),
            blob_store: Arc::new(LocalBlobStore::new("/tmp/orch-test-blobs", "http://localhost/blobs")),
            recognizer_primary: Arc::new(NullRecognizer),
            recognizer_secondary: None,
            webhook: Arc::new(WebhookDispatcher::new(&WebhookConfig {
                secret: "s".to_string(),
                max_attempts: 1,
                transport_timeout: Duration::from_secs(1),
            })),
            http_client: reqwest::Client::new(),
            pipeline_config: PipelineConfig {
                max_width: 512,
                max_height: 512,
                debug_dir: None,
                disabled_stages: Vec::new(),
            },
            confidence_threshold: 0.3,
            job_timeout: Duration::from_secs(10),
            visibility_timeout: Duration::from_secs(30),
            model_descriptor: "test".to_string(),
        }
    }

    fn sample_request() -> SubmissionRequest {
        SubmissionRequest {
            image_url: "http://example.invalid/a.jpg".to_string(),
            user_id: "u1".to_string(),
            message_id: "m1".to_string(),
            webhook_url: "http://example.invalid/cb".to_string(),
            pipeline_overrides: PipelineOverrides::default(),
            priority: Priority::Normal,
            queue_name: "invoices".to_string(),
        }
    }

    #[tokio::test]
    async fn submit_enqueues_and_tracks_a_new_job() {
        let orchestrator = test_orchestrator();
        let job = orchestrator.submit(sample_request()).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let status = orchestrator.status(&job.job_id).await.unwrap();
        assert_eq!(status.job_id, job.job_id);
        assert_eq!(status.progress, 0);
    }

    #[tokio::test]
    async fn status_of_unknown_job_is_none() {
        let orchestrator = test_orchestrator();
        assert!(orchestrator.status("nope").await.is_none());
    }

    #[tokio::test]
    async fn resubmitting_the_same_job_id_returns_the_tracked_original() {
        let orchestrator = test_orchestrator();
        let first = orchestrator
            .submit_with_job_id("fixed".to_string(), sample_request())
            .await
            .unwrap();
        let mut second_request = sample_request();
        second_request.user_id = "different-user".to_string();
        let second = orchestrator
            .submit_with_job_id("fixed".to_string(), second_request)
            .await
            .unwrap();
        assert_eq!(first.submitter_id, second.submitter_id);
        assert_eq!(second.submitter_id, "u1");
    }
}
