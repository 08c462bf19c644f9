//! Worker loop: dequeue one job at a time and drive it through every
//! declared stage (§4.7), degrading per-pipeline-stage but never the job
//! itself except at the documented pipeline-fatal and exhaustion points.
//!
//! Grounded on the teacher's `DownloadService`/`OcrService` worker shape
//! (`src/services/download.rs`, `src/services/ocr.rs`: `Arc<repo>` held by
//! a service struct, async method processes one unit of work at a time),
//! generalized from a one-shot batch call to a long-running dequeue loop
//! the way `consolidated_invoice_worker.py` polls `rq`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use image::ImageFormat;

use crate::error::{JobError, QueueError};
use crate::extractor;
use crate::model::{blob_key, BlobRef, Job, JobFailure, JobStatus, OcrMetadata, OcrResult, Stage};
use crate::pipeline::{self, PipelineError};
use crate::queue::Outcome;
use crate::recognizer;

use super::payload;
use super::Orchestrator;

/// A stage failure carries the abstract error kind plus any diagnostic
/// payload (e.g. document-classification component scores) the `job.failed`
/// webhook should surface alongside it.
struct StageFailure {
    error: JobError,
    diagnostics: Option<serde_json::Value>,
}

impl From<JobError> for StageFailure {
    fn from(error: JobError) -> Self {
        Self {
            error,
            diagnostics: None,
        }
    }
}

/// Run the dequeue loop until the process exits. Each iteration claims at
/// most one job; an empty queue backs off briefly rather than busy-polling.
pub async fn run_worker_loop(orchestrator: Arc<Orchestrator>, worker_id: String) {
    loop {
        match process_next(&orchestrator, &worker_id).await {
            Ok(true) => {}
            Ok(false) => tokio::time::sleep(Duration::from_millis(250)).await,
            Err(e) => {
                tracing::error!(error = %e, "queue dequeue failed; backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Dequeue and fully process at most one job. Returns `Ok(true)` if a job
/// was claimed (regardless of whether it ultimately succeeded or failed),
/// `Ok(false)` if the queue had nothing ready.
pub async fn process_next(orchestrator: &Orchestrator, worker_id: &str) -> Result<bool, QueueError> {
    let Some((lease, raw_payload)) = orchestrator
        .queue
        .dequeue(orchestrator.visibility_timeout)
        .await?
    else {
        return Ok(false);
    };

    let job_id = String::from_utf8_lossy(&raw_payload).to_string();
    let span = tracing::info_span!("process_job", job_id = %job_id, retry_count = lease.retry_count);
    let _enter = span.enter();

    // If this attempt fails too, the queue will drop the payload outright
    // rather than redeliver it again — treat that case as `Exhausted` up
    // front so the webhook and failure record reflect it accurately.
    let will_exhaust = lease.retry_count + 1 > orchestrator.queue.max_retries();

    let outcome = match tokio::time::timeout(
        orchestrator.job_timeout,
        process_job(orchestrator, &job_id, worker_id),
    )
    .await
    {
        Ok(Ok(())) => Outcome::Success,
        Ok(Err(failure)) => {
            let non_retryable = !failure.error.is_retryable();
            finalize_failure(orchestrator, &job_id, failure, will_exhaust).await;
            if non_retryable || will_exhaust {
                Outcome::Discard
            } else {
                Outcome::Retry
            }
        }
        Err(_elapsed) => {
            let failure = StageFailure::from(JobError::Transient("job exceeded its timeout".to_string()));
            finalize_failure(orchestrator, &job_id, failure, will_exhaust).await;
            if will_exhaust {
                Outcome::Discard
            } else {
                Outcome::Retry
            }
        }
    };

    orchestrator.jobs.mutate(&job_id, |j| j.worker_id = None).await;
    drop(_enter);
    orchestrator.queue.complete(&lease, outcome).await?;
    Ok(true)
}

/// Drive `job_id` through every declared stage (§4.7). Per the cancellation
/// model, a re-delivered job always restarts from stage 0 — there is no
/// mid-stage resume.
async fn process_job(orchestrator: &Orchestrator, job_id: &str, worker_id: &str) -> Result<(), StageFailure> {
    let Some(job) = orchestrator.jobs.get(job_id).await else {
        return Err(StageFailure::from(JobError::Internal(format!(
            "job {job_id} has no tracked record"
        ))));
    };

    let start = Instant::now();
    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.status = JobStatus::Running;
            j.started_at = Some(Utc::now());
            j.worker_id = Some(worker_id.to_string());
            j.advance(Stage::Downloading);
        })
        .await;

    let bytes = download_image(orchestrator, &job.source_image_url).await?;

    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.advance(Stage::Preprocessing);
        })
        .await;

    let mut pipeline_config = orchestrator.pipeline_config.clone();
    if let Some(w) = job.pipeline_overrides.max_width {
        pipeline_config.max_width = w;
    }
    if let Some(h) = job.pipeline_overrides.max_height {
        pipeline_config.max_height = h;
    }
    if let Some(disabled) = &job.pipeline_overrides.disabled_stages {
        pipeline_config.disabled_stages = disabled.clone();
    }

    // CPU-bound image work runs off the async executor.
    let owned_job_id = job_id.to_string();
    let pipeline_output = tokio::task::spawn_blocking(move || pipeline::run(&bytes, &pipeline_config, &owned_job_id))
        .await
        .map_err(|e| StageFailure::from(JobError::Internal(format!("pipeline task panicked: {e}"))))?
        .map_err(|e| match e {
            PipelineError::Decode(msg) => StageFailure::from(JobError::InvalidInput(msg)),
            PipelineError::NonDocument(scores) => StageFailure {
                error: JobError::NonDocument("image rejected by document classifier".to_string()),
                diagnostics: Some(serde_json::json!({
                    "text_density": scores.text_density,
                    "edge_structure": scores.edge_structure,
                    "rectangularity": scores.rectangularity,
                    "brightness_uniformity": scores.brightness_uniformity,
                    "aspect_ratio": scores.aspect_ratio,
                    "total": scores.total,
                })),
            },
        })?;

    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.advance(Stage::OcrExtraction);
        })
        .await;

    let (regions, dual_pass_ran) = recognizer::run(
        orchestrator.recognizer_primary.as_ref(),
        orchestrator.recognizer_secondary.as_deref(),
        &pipeline_output.image,
        orchestrator.confidence_threshold,
    )
    .await
    .map_err(|e| StageFailure::from(JobError::RecognizerUnavailable(e.to_string())))?;

    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.advance(Stage::FieldExtraction);
        })
        .await;

    let fields = extractor::extract_fields(&regions);

    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.advance(Stage::PreparingResults);
        })
        .await;

    let overall_confidence = OcrResult::compute_overall_confidence(&regions);
    let mut result = OcrResult {
        job_id: job_id.to_string(),
        submitter_id: job.submitter_id.clone(),
        created_at: job.created_at,
        vendor: fields.vendor,
        invoice_number: fields.invoice_number,
        date: fields.date,
        total_amount: fields.total_amount,
        line_items: fields.line_items,
        raw_regions: regions,
        overall_confidence,
        metadata: OcrMetadata {
            stages_run: pipeline_output.operations_applied.clone(),
            operations_failed: pipeline_output.operations_failed.clone(),
            preprocessing_applied: pipeline_output.operations_applied.clone(),
            processing_quality: pipeline_output.processing_quality,
            quality_before: pipeline_output.quality_before,
            quality_after: pipeline_output.quality_after,
            model_descriptor: orchestrator.model_descriptor.clone(),
            dual_pass: dual_pass_ran,
            timings_ms: HashMap::new(),
        },
    };
    result.clamp_lists();

    let enhanced_blob = encode_and_store_enhanced_image(orchestrator, job_id, &pipeline_output.image).await;

    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.advance(Stage::StoringResults);
        })
        .await;

    let result_id = orchestrator
        .result_store
        .store(job_id, &result)
        .await
        .map_err(|e| StageFailure::from(JobError::Transient(e.to_string())))?;

    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.result_id = Some(result_id.clone());
            j.advance(Stage::SendingWebhook);
        })
        .await;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    let completed = payload::completed_payload(&job, &result, processing_time_ms, enhanced_blob.as_ref());
    if let Err(e) = orchestrator.webhook.deliver(&job.callback_url, &completed).await {
        // Webhook failures never escalate to job failure (§7): the result
        // is already durably persisted.
        tracing::warn!(error = %e, "job.completed webhook delivery failed; result already persisted");
    }

    orchestrator
        .jobs
        .mutate(job_id, |j| {
            j.processing_time_ms = processing_time_ms;
            j.advance(Stage::Completed);
        })
        .await;

    Ok(())
}

async fn download_image(orchestrator: &Orchestrator, source_url: &str) -> Result<Vec<u8>, StageFailure> {
    let parsed = url::Url::parse(source_url)
        .map_err(|e| StageFailure::from(JobError::InvalidInput(format!("bad image url: {e}"))))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(StageFailure::from(JobError::InvalidInput(format!(
            "unsupported url scheme: {}",
            parsed.scheme()
        ))));
    }

    let response = orchestrator
        .http_client
        .get(source_url)
        .send()
        .await
        .map_err(|e| StageFailure::from(JobError::Transient(e.to_string())))?;

    if !response.status().is_success() {
        return Err(StageFailure::from(JobError::InvalidInput(format!(
            "source image fetch returned {}",
            response.status()
        ))));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| StageFailure::from(JobError::Transient(e.to_string())))?;
    Ok(bytes.to_vec())
}

/// Encode the enhanced image and store it under the blob key convention
/// (§4.6); a store failure is logged and the job proceeds without an
/// enhanced-image reference rather than failing outright, matching the
/// Blob Store's own primary/fallback posture.
async fn encode_and_store_enhanced_image(
    orchestrator: &Orchestrator,
    job_id: &str,
    image: &image::GrayImage,
) -> Option<BlobRef> {
    let mut jpeg_bytes = Vec::new();
    if image
        .write_to(&mut std::io::Cursor::new(&mut jpeg_bytes), ImageFormat::Jpeg)
        .is_err()
    {
        tracing::warn!("failed to encode enhanced image; skipping blob store");
        return None;
    }

    let key = blob_key(job_id, "enhanced", "jpg");
    match orchestrator.blob_store.put(&key, jpeg_bytes, "image/jpeg").await {
        Ok(blob_ref) => Some(blob_ref),
        Err(e) => {
            tracing::warn!(error = %e, "blob store put failed; continuing without enhanced-image reference");
            None
        }
    }
}

async fn finalize_failure(orchestrator: &Orchestrator, job_id: &str, failure: StageFailure, will_exhaust: bool) {
    let is_non_document = matches!(failure.error, JobError::NonDocument(_));
    let current_stage = orchestrator
        .jobs
        .get(job_id)
        .await
        .map(|j| j.stage)
        .unwrap_or(Stage::Initializing);

    let final_error = if will_exhaust && failure.error.is_retryable() {
        JobError::Exhausted
    } else {
        failure.error
    };

    let stage_label = if is_non_document {
        "document_classification".to_string()
    } else if matches!(final_error, JobError::Exhausted) {
        "queue".to_string()
    } else {
        current_stage.as_str().to_string()
    };

    let job_failure = JobFailure {
        kind: final_error.kind().to_string(),
        stage: stage_label,
        message: final_error.to_string(),
        diagnostics: failure.diagnostics,
    };

    orchestrator
        .jobs
        .mutate(job_id, |j: &mut Job| j.mark_failed(job_failure.clone()))
        .await;

    if let Some(job) = orchestrator.jobs.get(job_id).await {
        let failed = payload::failed_payload(&job, &job_failure);
        if let Err(e) = orchestrator.webhook.deliver(&job.callback_url, &failed).await {
            tracing::warn!(error = %e, "job.failed webhook delivery failed; logged and swallowed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PipelineConfig, WebhookConfig};
    use crate::model::{FieldValue, Polygon, Script, SourcePass, TextRegion};
    use crate::orchestrator::SubmissionRequest;
    use crate::queue::InMemoryQueue;
    use crate::recognizer::{FixtureRecognizer, NullRecognizer};
    use crate::store::{LocalBlobStore, SqliteResultStore};
    use crate::webhook::WebhookDispatcher;
    use image::{ImageBuffer, Luma};
    use std::time::Duration as StdDuration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn document_like_jpeg(w: u32, h: u32) -> Vec<u8> {
        let img: image::GrayImage = ImageBuffer::from_fn(w, h, |x, y| {
            if x > w / 10 && x < w * 9 / 10 && y > h / 10 && y < h * 9 / 10 {
                Luma([235])
            } else {
                Luma([15])
            }
        });
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    fn flat_gray_jpeg(w: u32, h: u32) -> Vec<u8> {
        let img: image::GrayImage = ImageBuffer::from_pixel(w, h, Luma([128]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    fn region(text: &str, confidence: f64) -> TextRegion {
        TextRegion {
            polygon: Polygon::from_bbox(10, 10, 40, 10),
            text: text.to_string(),
            confidence,
            script: Script::Unknown,
            source_pass: SourcePass::Primary,
            above_threshold: true,
            dual_pass_improved: false,
        }
    }

    async fn test_orchestrator(
        recognizer_regions: Vec<TextRegion>,
        max_retries: u32,
    ) -> (Arc<Orchestrator>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let queue: Arc<dyn crate::queue::Queue> = Arc::new(InMemoryQueue::new(max_retries));
        let result_store: Arc<dyn crate::store::ResultStore> =
            Arc::new(SqliteResultStore::open_in_memory().unwrap());
        let blob_store: Arc<dyn crate::store::BlobStore> = Arc::new(LocalBlobStore::new(
            dir.path().join("blobs"),
            "http://localhost/blobs",
        ));
        let recognizer: Arc<dyn crate::recognizer::Recognizer> = if recognizer_regions.is_empty() {
            Arc::new(NullRecognizer)
        } else {
            Arc::new(FixtureRecognizer::new(recognizer_regions))
        };
        let webhook = Arc::new(WebhookDispatcher::new(&WebhookConfig {
            secret: "test-secret".to_string(),
            max_attempts: 2,
            transport_timeout: StdDuration::from_secs(5),
        }));

        let orchestrator = Arc::new(Orchestrator {
            queue,
            jobs: crate::orchestrator::JobTracker::new(),
            result_store,
            blob_store,
            recognizer_primary: recognizer,
            recognizer_secondary: None,
            webhook,
            http_client: reqwest::Client::new(),
            pipeline_config: PipelineConfig {
                max_width: 512,
                max_height: 512,
                debug_dir: None,
                disabled_stages: Vec::new(),
            },
            confidence_threshold: 0.3,
            job_timeout: StdDuration::from_secs(10),
            visibility_timeout: StdDuration::from_secs(30),
            model_descriptor: "fixture".to_string(),
        });
        (orchestrator, dir)
    }

    #[tokio::test]
    async fn happy_path_completes_and_delivers_webhook() {
        let image_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/receipt.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(document_like_jpeg(300, 200)))
            .mount(&image_server)
            .await;

        let callback_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&callback_server)
            .await;

        let regions = vec![
            region("ร้านอาหารดีใจ", 0.9),
            region("รวมทั้งสิ้น 245.50 บาท", 0.9),
        ];
        let (orchestrator, _dir) = test_orchestrator(regions, 3).await;

        let job = orchestrator
            .submit(SubmissionRequest {
                image_url: format!("{}/receipt.jpg", image_server.uri()),
                user_id: "U1".to_string(),
                message_id: "M1".to_string(),
                webhook_url: format!("{}/webhook", callback_server.uri()),
                pipeline_overrides: Default::default(),
                priority: crate::model::Priority::Normal,
                queue_name: "invoices".to_string(),
            })
            .await
            .unwrap();

        let claimed = process_next(&orchestrator, "worker-1").await.unwrap();
        assert!(claimed);

        let status = orchestrator.status(&job.job_id).await.unwrap();
        assert_eq!(status.status, JobStatus::Completed);
        assert_eq!(status.progress, 100);
        assert!(status.result.is_some());

        let received: Vec<Request> = callback_server.received_requests().await.unwrap();
        assert_eq!(received.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["event"], "job.completed");
        assert_eq!(body["result"]["vendor"], "ร้านอาหารดีใจ");
        assert_eq!(body["result"]["amount"], 245.50);
    }

    #[tokio::test]
    async fn non_document_image_fails_with_classification_details() {
        let image_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(flat_gray_jpeg(64, 64)))
            .mount(&image_server)
            .await;

        let callback_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&callback_server)
            .await;

        let (orchestrator, _dir) = test_orchestrator(vec![], 3).await;

        let job = orchestrator
            .submit(SubmissionRequest {
                image_url: format!("{}/cat.jpg", image_server.uri()),
                user_id: "U2".to_string(),
                message_id: "M2".to_string(),
                webhook_url: format!("{}/webhook", callback_server.uri()),
                pipeline_overrides: Default::default(),
                priority: crate::model::Priority::Normal,
                queue_name: "invoices".to_string(),
            })
            .await
            .unwrap();

        process_next(&orchestrator, "worker-1").await.unwrap();

        let status = orchestrator.status(&job.job_id).await.unwrap();
        assert_eq!(status.status, JobStatus::Failed);
        let error = status.error.unwrap();
        assert_eq!(error.kind, "NonDocument");
        assert_eq!(error.stage, "document_classification");

        let received: Vec<Request> = callback_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(body["event"], "job.failed");
        assert!(body["classification_details"].is_object());
    }

    #[tokio::test]
    async fn immediate_failure_with_zero_retries_is_reported_as_exhausted() {
        struct AlwaysFailsRecognizer;
        #[async_trait::async_trait]
        impl crate::recognizer::Recognizer for AlwaysFailsRecognizer {
            async fn extract(
                &self,
                _image: &image::GrayImage,
                _confidence_threshold: f64,
            ) -> Result<Vec<TextRegion>, crate::error::RecognizerError> {
                Err(crate::error::RecognizerError::BackendUnavailable(
                    "model not loaded".to_string(),
                ))
            }
        }

        let image_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/receipt.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(document_like_jpeg(300, 200)))
            .mount(&image_server)
            .await;

        let callback_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&callback_server)
            .await;

        let (orchestrator, _dir) = test_orchestrator(vec![], 0).await;
        let mut orchestrator = Arc::try_unwrap(orchestrator).ok().unwrap();
        orchestrator.recognizer_primary = Arc::new(AlwaysFailsRecognizer);
        let orchestrator = Arc::new(orchestrator);

        let job = orchestrator
            .submit(SubmissionRequest {
                image_url: format!("{}/receipt.jpg", image_server.uri()),
                user_id: "U3".to_string(),
                message_id: "M3".to_string(),
                webhook_url: format!("{}/webhook", callback_server.uri()),
                pipeline_overrides: Default::default(),
                priority: crate::model::Priority::Normal,
                queue_name: "invoices".to_string(),
            })
            .await
            .unwrap();

        process_next(&orchestrator, "worker-1").await.unwrap();

        let status = orchestrator.status(&job.job_id).await.unwrap();
        assert_eq!(status.status, JobStatus::Failed);
        let error = status.error.unwrap();
        assert_eq!(error.kind, "Exhausted");
        assert_eq!(error.stage, "queue");
    }

    #[tokio::test]
    async fn resubmitting_the_same_fingerprint_returns_the_existing_job() {
        let (orchestrator, _dir) = test_orchestrator(vec![], 3).await;
        let req = SubmissionRequest {
            image_url: "http://example.invalid/a.jpg".to_string(),
            user_id: "U4".to_string(),
            message_id: "M4".to_string(),
            webhook_url: "http://example.invalid/cb".to_string(),
            pipeline_overrides: Default::default(),
            priority: crate::model::Priority::Normal,
            queue_name: "invoices".to_string(),
        };
        let first = orchestrator
            .submit_with_job_id("fixed-id".to_string(), req.clone())
            .await
            .unwrap();
        let second = orchestrator.submit_with_job_id("fixed-id".to_string(), req).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
    }
}
