//! Job record — the orchestrator's unit of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stage, in the order the orchestrator advances through them.
/// `stage` may only move forward through this sequence until it reaches a
/// terminal state (`Completed`, or the job transitions to `JobStatus::Failed`
/// from any stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initializing,
    Downloading,
    Preprocessing,
    OcrExtraction,
    FieldExtraction,
    PreparingResults,
    StoringResults,
    SendingWebhook,
    Completed,
}

impl Stage {
    /// The full declared sequence, in order.
    pub const SEQUENCE: [Stage; 9] = [
        Stage::Initializing,
        Stage::Downloading,
        Stage::Preprocessing,
        Stage::OcrExtraction,
        Stage::FieldExtraction,
        Stage::PreparingResults,
        Stage::StoringResults,
        Stage::SendingWebhook,
        Stage::Completed,
    ];

    /// Status-polling progress target for this stage, per spec.
    pub fn progress_target(&self) -> u8 {
        match self {
            Stage::Initializing => 10,
            Stage::Downloading => 30,
            Stage::Preprocessing => 40,
            Stage::OcrExtraction => 60,
            Stage::FieldExtraction => 80,
            Stage::PreparingResults => 90,
            Stage::StoringResults => 95,
            Stage::SendingWebhook => 100,
            Stage::Completed => 100,
        }
    }

    /// The machine-readable stage name used in webhook payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initializing => "initializing",
            Stage::Downloading => "downloading",
            Stage::Preprocessing => "preprocessing",
            Stage::OcrExtraction => "ocr_extraction",
            Stage::FieldExtraction => "field_extraction",
            Stage::PreparingResults => "preparing_results",
            Stage::StoringResults => "storing_results",
            Stage::SendingWebhook => "sending_webhook",
            Stage::Completed => "completed",
        }
    }

    /// Whether `self` may advance to `next`. Only forward moves within the
    /// declared sequence are legal.
    pub fn can_advance_to(&self, next: Stage) -> bool {
        let from = Stage::SEQUENCE.iter().position(|s| s == self);
        let to = Stage::SEQUENCE.iter().position(|s| s == &next);
        matches!((from, to), (Some(f), Some(t)) if t > f)
    }
}

/// Job lifecycle status. `Completed` and `Failed` are sticky terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Record of a failure, attached to a job that transitioned to `Failed`.
///
/// `stage` is a free-form label rather than `Stage`: most failures name a
/// declared orchestrator stage (`Stage::as_str()`), but some name a pipeline
/// sub-stage the `Stage` enum doesn't track individually (e.g.
/// `"document_classification"`) or the queue substrate itself (`"queue"`,
/// on `Exhausted`), per §7's error-kind table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: String,
    pub stage: String,
    pub message: String,
    /// Extra diagnostic fields carried into the `job.failed` webhook, e.g.
    /// document-classification component scores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<serde_json::Value>,
}

/// Kind of work a job performs. The original service distinguished
/// `preprocessing`, `ocr_extraction`, and `full_pipeline` job types; this
/// implementation only ever runs the full pipeline, but the type is kept
/// on the wire for forward compatibility with those other modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    FullPipeline,
}

impl Default for JobType {
    fn default() -> Self {
        JobType::FullPipeline
    }
}

/// Submission priority. Ordered `Low < Normal < High < Urgent` so a queue
/// can dequeue the highest-priority bucket first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Optional per-job overrides for the image pipeline (which stages run).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_stages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
}

/// A single submission, tracked end to end by the orchestrator.
///
/// Invariants: `stage` only advances through `Stage::SEQUENCE`; `progress`
/// is non-decreasing; terminal `status` values are sticky; `completed_at >=
/// started_at >= created_at` once both are set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub source_image_url: String,
    pub submitter_id: String,
    pub message_id: String,
    pub callback_url: String,
    #[serde(default)]
    pub pipeline_overrides: PipelineOverrides,

    #[serde(default)]
    pub job_type: JobType,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub queue_name: String,

    pub status: JobStatus,
    pub stage: Stage,
    pub progress: u8,

    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub processing_time_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub retry_count: u32,
}

impl Job {
    pub fn new(
        job_id: String,
        source_image_url: String,
        submitter_id: String,
        message_id: String,
        callback_url: String,
        pipeline_overrides: PipelineOverrides,
        priority: Priority,
        queue_name: String,
    ) -> Self {
        Self {
            job_id,
            source_image_url,
            submitter_id,
            message_id,
            callback_url,
            pipeline_overrides,
            job_type: JobType::FullPipeline,
            priority,
            worker_id: None,
            queue_name,
            status: JobStatus::Queued,
            stage: Stage::Initializing,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_time_ms: 0,
            result_id: None,
            error: None,
            retry_count: 0,
        }
    }

    /// Advance to `stage`, bumping progress to its target. Returns `false`
    /// (and leaves the job untouched) if the move is not a legal forward
    /// transition — callers should treat that as a programming error.
    pub fn advance(&mut self, stage: Stage) -> bool {
        if !self.stage.can_advance_to(stage) {
            return false;
        }
        self.stage = stage;
        self.progress = self.progress.max(stage.progress_target());
        if stage == Stage::Completed {
            self.status = JobStatus::Completed;
            self.completed_at = Some(Utc::now());
        }
        true
    }

    pub fn mark_failed(&mut self, failure: JobFailure) {
        self.status = JobStatus::Failed;
        self.error = Some(failure);
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_sequence_is_strictly_forward() {
        assert!(Stage::Initializing.can_advance_to(Stage::Downloading));
        assert!(Stage::Initializing.can_advance_to(Stage::Completed));
        assert!(!Stage::Downloading.can_advance_to(Stage::Initializing));
        assert!(!Stage::Preprocessing.can_advance_to(Stage::Preprocessing));
    }

    #[test]
    fn progress_is_non_decreasing_across_advances() {
        let mut job = Job::new(
            "j1".into(),
            "http://x/img.jpg".into(),
            "u1".into(),
            "m1".into(),
            "http://cb".into(),
            PipelineOverrides::default(),
            Priority::Normal,
            "invoices".into(),
        );
        let mut last = job.progress;
        for stage in Stage::SEQUENCE.iter().skip(1) {
            assert!(job.advance(*stage));
            assert!(job.progress >= last);
            last = job.progress;
        }
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[test]
    fn cannot_skip_backwards_after_reaching_terminal() {
        let mut job = Job::new(
            "j2".into(),
            "http://x/img.jpg".into(),
            "u1".into(),
            "m1".into(),
            "http://cb".into(),
            PipelineOverrides::default(),
            Priority::Normal,
            "invoices".into(),
        );
        assert!(job.advance(Stage::Completed));
        assert!(!job.advance(Stage::Downloading));
    }
}
