//! Signed, at-least-once webhook delivery with exponential backoff.
//!
//! Delay schedule and retry/non-retry classification are grounded on the
//! teacher's `RedisRateLimitBackend` escalating-delay pattern
//! (`src/rate_limit/redis.rs`), generalized from rate-limit backoff to
//! delivery backoff.

use std::time::Duration;

use reqwest::StatusCode;

use super::signature::{canonical_bytes, sign};
use crate::config::WebhookConfig;
use crate::error::WebhookError;

/// Fixed delay schedule: 1 initial attempt + 3 retries at {0, 1, 2, 4}s.
const DELAYS_SECS: [u64; 4] = [0, 1, 2, 4];

/// Outcome of a single delivery attempt, returned for observability/tests.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub attempts: u32,
    pub succeeded: bool,
}

pub struct WebhookDispatcher {
    client: reqwest::Client,
    secret: String,
    max_attempts: u32,
}

impl WebhookDispatcher {
    pub fn new(config: &WebhookConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.transport_timeout)
            .build()
            .expect("reqwest client");
        Self {
            client,
            secret: config.secret.clone(),
            max_attempts: config.max_attempts,
        }
    }

    /// Deliver `payload` to `url`. `payload` is canonicalized once and the
    /// exact same bytes (and signature) are re-sent on every retry —
    /// Testable Property 5.
    pub async fn deliver(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<DeliveryReport, WebhookError> {
        let body = canonical_bytes(payload);
        let signature = sign(&self.secret, &body);

        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            let delay = DELAYS_SECS
                .get(attempt as usize)
                .copied()
                .unwrap_or(*DELAYS_SECS.last().unwrap());
            if delay > 0 {
                tokio::time::sleep(Duration::from_secs(delay)).await;
            }

            let result = self
                .client
                .post(url)
                .header("Content-Type", "application/json")
                .header("User-Agent", "OCR-Service/1.0")
                .header("X-Webhook-Signature", &signature)
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(DeliveryReport {
                            attempts: attempt + 1,
                            succeeded: true,
                        });
                    }
                    if is_retryable_status(status) {
                        last_err = Some(WebhookError::Transport(format!(
                            "server returned {status}"
                        )));
                        continue;
                    }
                    return Err(WebhookError::Rejected(status.as_u16()));
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = Some(WebhookError::Transport(e.to_string()));
                    continue;
                }
                Err(e) => {
                    return Err(WebhookError::Transport(e.to_string()));
                }
            }
        }

        let _ = last_err;
        Err(WebhookError::AttemptsExhausted)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(secret: &str) -> WebhookConfig {
        WebhookConfig {
            secret: secret.to_string(),
            max_attempts: 4,
            transport_timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt_with_correct_signature() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(&test_config("secret"));
        let payload = json!({"event": "job.completed", "job_id": "j1"});
        let report = dispatcher
            .deliver(&format!("{}/webhook", server.uri()), &payload)
            .await
            .unwrap();
        assert!(report.succeeded);
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test]
    async fn retries_on_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(&test_config("secret"));
        let payload = json!({"event": "job.completed"});
        let report = dispatcher
            .deliver(&format!("{}/webhook", server.uri()), &payload)
            .await
            .unwrap();
        assert!(report.succeeded);
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts_on_persistent_503() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(&test_config("secret"));
        let payload = json!({"event": "job.failed"});
        let err = dispatcher
            .deliver(&format!("{}/webhook", server.uri()), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::AttemptsExhausted));
    }

    #[tokio::test]
    async fn non_retryable_4xx_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let dispatcher = WebhookDispatcher::new(&test_config("secret"));
        let payload = json!({"event": "job.completed"});
        let err = dispatcher
            .deliver(&format!("{}/webhook", server.uri()), &payload)
            .await
            .unwrap_err();
        assert!(matches!(err, WebhookError::Rejected(401)));
    }
}
