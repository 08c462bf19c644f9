//! Process entry point: load configuration, wire adapters, spawn worker
//! tasks, and serve the submission/status HTTP API.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use invoice_ocr_pipeline::config::Config;
use invoice_ocr_pipeline::orchestrator::{run_worker_loop, JobTracker, Orchestrator};
use invoice_ocr_pipeline::queue::InMemoryQueue;
use invoice_ocr_pipeline::recognizer::{Recognizer, TesseractBackend};
use invoice_ocr_pipeline::server::{self, AppState};
use invoice_ocr_pipeline::store::{CloudBlobStore, FallbackBlobStore, LocalBlobStore, SqliteResultStore};
use invoice_ocr_pipeline::webhook::WebhookDispatcher;

#[derive(Parser)]
#[command(name = "invoice-ocr-server")]
#[command(about = "Durable job orchestration and image-to-fields pipeline for invoice OCR")]
#[command(version)]
struct Cli {
    /// Bind host for the HTTP API
    #[arg(long, env = "HTTP_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Bind port for the HTTP API
    #[arg(long, env = "HTTP_PORT", default_value = "8080")]
    port: u16,

    /// Number of concurrent worker tasks draining the queue
    #[arg(long, env = "WORKER_COUNT", default_value = "4")]
    workers: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "invoice_ocr_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    // Init order: config -> queue -> result-store -> blob-store -> recognizer.
    let queue: Arc<dyn invoice_ocr_pipeline::queue::Queue> = match config.queue.backend.as_str() {
        "redis" => {
            #[cfg(feature = "redis-backend")]
            {
                let url = config
                    .queue
                    .backend_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("QUEUE_URL is required when QUEUE_BACKEND=redis"))?;
                Arc::new(invoice_ocr_pipeline::queue::RedisQueue::connect(url, config.queue.max_retries).await?)
            }
            #[cfg(not(feature = "redis-backend"))]
            {
                anyhow::bail!("QUEUE_BACKEND=redis requires the redis-backend feature");
            }
        }
        "amqp" => {
            #[cfg(feature = "amqp-broker")]
            {
                let url = config
                    .queue
                    .backend_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("QUEUE_URL is required when QUEUE_BACKEND=amqp"))?;
                Arc::new(invoice_ocr_pipeline::queue::AmqpQueue::connect(url, config.queue.max_retries).await?)
            }
            #[cfg(not(feature = "amqp-broker"))]
            {
                anyhow::bail!("QUEUE_BACKEND=amqp requires the amqp-broker feature");
            }
        }
        _ => Arc::new(InMemoryQueue::new(config.queue.max_retries)),
    };

    let db_path = config
        .store
        .database_url
        .map(std::path::PathBuf::from)
        .unwrap_or_else(invoice_ocr_pipeline::store::default_db_path);
    let result_store: Arc<dyn invoice_ocr_pipeline::store::ResultStore> =
        Arc::new(SqliteResultStore::open(&db_path)?);

    let local_blob_store = || LocalBlobStore::new(config.blob.local_dir.clone(), config.blob.public_base_url.clone());
    let blob_store: Arc<dyn invoice_ocr_pipeline::store::BlobStore> = match config.blob.provider.as_str() {
        "cloud" => {
            let bucket = config
                .blob
                .cloud_bucket
                .clone()
                .ok_or_else(|| anyhow::anyhow!("BLOB_CLOUD_BUCKET is required when BLOB_PROVIDER=cloud"))?;
            let endpoint = config
                .blob
                .cloud_endpoint
                .clone()
                .ok_or_else(|| anyhow::anyhow!("BLOB_CLOUD_ENDPOINT is required when BLOB_PROVIDER=cloud"))?;
            let region = config.blob.cloud_region.clone().unwrap_or_else(|| "us-east-1".to_string());
            let access_key = config
                .blob
                .cloud_access_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("BLOB_CLOUD_ACCESS_KEY is required when BLOB_PROVIDER=cloud"))?;
            let secret_key = config
                .blob
                .cloud_secret_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("BLOB_CLOUD_SECRET_KEY is required when BLOB_PROVIDER=cloud"))?;
            let cloud = CloudBlobStore::new(
                endpoint,
                bucket,
                region,
                access_key,
                secret_key,
                config.blob.public_base_url.clone(),
            );
            Arc::new(FallbackBlobStore::new(cloud, local_blob_store()))
        }
        _ => Arc::new(local_blob_store()),
    };

    let recognizer_primary: Arc<dyn Recognizer> = Arc::new(TesseractBackend::new(config.recognizer.language.clone()));
    let recognizer_secondary: Option<Arc<dyn Recognizer>> = if config.recognizer.dual_pass {
        Some(Arc::new(TesseractBackend::new(config.recognizer.language.clone())))
    } else {
        None
    };

    let webhook = Arc::new(WebhookDispatcher::new(&config.webhook));

    let orchestrator = Arc::new(Orchestrator {
        queue,
        jobs: JobTracker::new(),
        result_store,
        blob_store,
        recognizer_primary,
        recognizer_secondary,
        webhook,
        http_client: reqwest::Client::new(),
        pipeline_config: config.pipeline.clone(),
        confidence_threshold: config.recognizer.confidence_threshold,
        job_timeout: config.job_timeout,
        visibility_timeout: config.queue.visibility_timeout,
        model_descriptor: format!("tesseract:{}", config.recognizer.language),
    });

    for i in 0..cli.workers {
        let orchestrator = orchestrator.clone();
        let worker_id = format!("worker-{i}");
        tokio::spawn(async move {
            tracing::info!(worker = i, "starting worker");
            run_worker_loop(orchestrator, worker_id).await;
        });
    }

    let state = AppState {
        orchestrator,
        api_key: config.api_key.map(Arc::new),
    };

    server::serve(state, &cli.host, cli.port).await
}
