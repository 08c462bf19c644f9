//! Configuration management.
//!
//! Everything is optional at the environment level; every field here has a
//! documented default so the service runs out of the box in dev mode.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level service configuration, assembled once at startup from the
/// process environment (and an optional `.env` file, loaded by `main`).
#[derive(Debug, Clone)]
pub struct Config {
    pub queue: QueueConfig,
    pub store: StoreConfig,
    pub blob: BlobConfig,
    pub recognizer: RecognizerConfig,
    pub pipeline: PipelineConfig,
    pub webhook: WebhookConfig,
    pub api_key: Option<String>,
    pub job_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            queue: QueueConfig::from_env(),
            store: StoreConfig::from_env(),
            blob: BlobConfig::from_env(),
            recognizer: RecognizerConfig::from_env(),
            pipeline: PipelineConfig::from_env(),
            webhook: WebhookConfig::from_env(),
            api_key: env_opt("API_KEY"),
            job_timeout: Duration::from_secs(env_u64("JOB_TIMEOUT_SECS", 300)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// `memory`, `redis`, or `amqp`.
    pub backend: String,
    pub backend_url: Option<String>,
    pub visibility_timeout: Duration,
    pub max_retries: u32,
}

impl QueueConfig {
    fn from_env() -> Self {
        Self {
            backend: std::env::var("QUEUE_BACKEND").unwrap_or_else(|_| "memory".to_string()),
            backend_url: env_opt("QUEUE_URL"),
            visibility_timeout: Duration::from_secs(env_u64("QUEUE_VISIBILITY_TIMEOUT_SECS", 120)),
            max_retries: env_u64("QUEUE_MAX_RETRIES", 3) as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: Option<String>,
    pub database_name: String,
}

impl StoreConfig {
    fn from_env() -> Self {
        Self {
            database_url: env_opt("RESULT_STORE_URL"),
            database_name: std::env::var("RESULT_STORE_DB")
                .unwrap_or_else(|_| "invoice_results".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// `local` or `cloud`.
    pub provider: String,
    pub local_dir: PathBuf,
    pub cloud_bucket: Option<String>,
    pub cloud_endpoint: Option<String>,
    pub cloud_region: Option<String>,
    pub cloud_access_key: Option<String>,
    pub cloud_secret_key: Option<String>,
    pub public_base_url: String,
}

impl BlobConfig {
    fn from_env() -> Self {
        Self {
            provider: std::env::var("BLOB_PROVIDER").unwrap_or_else(|_| "local".to_string()),
            local_dir: std::env::var("BLOB_LOCAL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./blob-store")),
            cloud_bucket: env_opt("BLOB_CLOUD_BUCKET"),
            cloud_endpoint: env_opt("BLOB_CLOUD_ENDPOINT"),
            cloud_region: env_opt("BLOB_CLOUD_REGION"),
            cloud_access_key: env_opt("BLOB_CLOUD_ACCESS_KEY"),
            cloud_secret_key: env_opt("BLOB_CLOUD_SECRET_KEY"),
            public_base_url: std::env::var("BLOB_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/blobs".to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecognizerConfig {
    /// `th`, `en`, or `th+en`.
    pub language: String,
    pub dual_pass: bool,
    pub confidence_threshold: f64,
}

impl RecognizerConfig {
    fn from_env() -> Self {
        Self {
            language: std::env::var("RECOGNIZER_LANGUAGE").unwrap_or_else(|_| "th+en".to_string()),
            dual_pass: env_bool("RECOGNIZER_DUAL_PASS", true),
            confidence_threshold: env_f64("CONFIDENCE_THRESHOLD", 0.3),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub debug_dir: Option<PathBuf>,
    /// Stage names skipped outright (recorded as a skip, not an attempt).
    /// Per-job `pipeline_overrides.disabled_stages` are merged on top of
    /// this at submission time.
    pub disabled_stages: Vec<String>,
}

impl PipelineConfig {
    fn from_env() -> Self {
        Self {
            max_width: env_u64("MAX_IMAGE_WIDTH", 2048) as u32,
            max_height: env_u64("MAX_IMAGE_HEIGHT", 2048) as u32,
            debug_dir: env_opt("PIPELINE_DEBUG_DIR").map(PathBuf::from),
            disabled_stages: env_opt("PIPELINE_DISABLED_STAGES")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub secret: String,
    pub max_attempts: u32,
    pub transport_timeout: Duration,
}

impl WebhookConfig {
    fn from_env() -> Self {
        Self {
            secret: std::env::var("WEBHOOK_SECRET").unwrap_or_default(),
            max_attempts: env_u64("WEBHOOK_MAX_ATTEMPTS", 4) as u32,
            transport_timeout: Duration::from_secs(env_u64("WEBHOOK_TRANSPORT_TIMEOUT_SECS", 30)),
        }
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_config_defaults() {
        let cfg = QueueConfig {
            backend: "memory".to_string(),
            backend_url: None,
            visibility_timeout: Duration::from_secs(120),
            max_retries: 3,
        };
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.visibility_timeout, Duration::from_secs(120));
    }

    #[test]
    fn env_bool_parses_common_truthy_values() {
        std::env::set_var("TEST_BOOL_FLAG_XYZ", "yes");
        assert!(env_bool("TEST_BOOL_FLAG_XYZ", false));
        std::env::remove_var("TEST_BOOL_FLAG_XYZ");
    }
}
