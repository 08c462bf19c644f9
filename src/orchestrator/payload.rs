//! Webhook payload construction — the exact `job.completed` / `job.failed`
//! JSON shapes from §6, assembled from the crate's typed records.

use chrono::Utc;
use serde_json::json;

use crate::model::{BlobRef, Job, JobFailure, OcrResult};

pub fn completed_payload(
    job: &Job,
    result: &OcrResult,
    processing_time_ms: u64,
    enhanced_image: Option<&BlobRef>,
) -> serde_json::Value {
    let vendor_label = result.vendor.value.clone().unwrap_or_default();
    let amount_label = result.total_amount.value.unwrap_or(0.0);

    json!({
        "event": "job.completed",
        "job_id": job.job_id,
        "user_id": job.submitter_id,
        "message_id": job.message_id,
        "timestamp": Utc::now().to_rfc3339(),
        "processing_time": processing_time_ms as f64 / 1000.0,
        "result": {
            "vendor": result.vendor.value,
            "amount": result.total_amount.value,
            "date": result.date.value,
            "invoice_number": result.invoice_number.value,
            "confidence_score": result.overall_confidence,
            "invoice_summary": format!("{vendor_label} - {amount_label}\u{0e3f}"),
            "line_items": result.line_items,
            "ocr_metadata": {
                "stages_run": result.metadata.stages_run,
                "operations_failed": result.metadata.operations_failed,
                "preprocessing_applied": result.metadata.preprocessing_applied,
                "processing_quality": result.metadata.processing_quality,
                "quality_before": result.metadata.quality_before,
                "quality_after": result.metadata.quality_after,
                "model_descriptor": result.metadata.model_descriptor,
                "dual_pass": result.metadata.dual_pass,
                "enhanced_image_url": enhanced_image.map(|b| b.public_url.clone()),
            },
        },
    })
}

pub fn failed_payload(job: &Job, failure: &JobFailure) -> serde_json::Value {
    let mut value = json!({
        "event": "job.failed",
        "job_id": job.job_id,
        "user_id": job.submitter_id,
        "message_id": job.message_id,
        "timestamp": Utc::now().to_rfc3339(),
        "error": failure.message,
        "stage": failure.stage,
    });

    if let Some(diagnostics) = &failure.diagnostics {
        if let (Some(obj), Some(diag_obj)) = (value.as_object_mut(), diagnostics.as_object()) {
            obj.insert(
                "classification_details".to_string(),
                serde_json::Value::Object(diag_obj.clone()),
            );
        }
    }

    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, OcrMetadata, PipelineOverrides, Priority, Quality};
    use std::collections::HashMap;

    fn sample_job() -> Job {
        Job::new(
            "job-1".to_string(),
            "http://x/img.jpg".to_string(),
            "user-1".to_string(),
            "msg-1".to_string(),
            "http://cb/w".to_string(),
            PipelineOverrides::default(),
            Priority::Normal,
            "invoices".to_string(),
        )
    }

    fn sample_result() -> OcrResult {
        OcrResult {
            job_id: "job-1".to_string(),
            submitter_id: "user-1".to_string(),
            created_at: Utc::now(),
            vendor: FieldValue::present("ร้านอาหารดีใจ".to_string(), 0.9),
            invoice_number: FieldValue::absent(),
            date: FieldValue::absent(),
            total_amount: FieldValue::present(245.50, 0.8),
            line_items: vec![],
            raw_regions: vec![],
            overall_confidence: 0.85,
            metadata: OcrMetadata {
                stages_run: vec!["resize".into()],
                operations_failed: vec![],
                preprocessing_applied: vec!["resize".into()],
                processing_quality: Quality::Good,
                quality_before: 0.4,
                quality_after: 0.8,
                model_descriptor: "tesseract".into(),
                dual_pass: false,
                timings_ms: HashMap::new(),
            },
        }
    }

    #[test]
    fn completed_payload_matches_the_documented_shape() {
        let payload = completed_payload(&sample_job(), &sample_result(), 1500, None);
        assert_eq!(payload["event"], "job.completed");
        assert_eq!(payload["result"]["vendor"], "ร้านอาหารดีใจ");
        assert_eq!(payload["result"]["amount"], 245.50);
        assert_eq!(payload["processing_time"], 1.5);
        assert!(payload["result"]["invoice_summary"]
            .as_str()
            .unwrap()
            .contains("ร้านอาหารดีใจ"));
    }

    #[test]
    fn failed_payload_carries_classification_details_when_present() {
        let failure = JobFailure {
            kind: "NonDocument".to_string(),
            stage: "document_classification".to_string(),
            message: "Non-document image rejected".to_string(),
            diagnostics: Some(serde_json::json!({"total": 0.1, "text_density": 0.0})),
        };
        let payload = failed_payload(&sample_job(), &failure);
        assert_eq!(payload["event"], "job.failed");
        assert_eq!(payload["stage"], "document_classification");
        assert!(payload["error"].as_str().unwrap().contains("Non-document"));
        assert_eq!(payload["classification_details"]["total"], 0.1);
    }
}
