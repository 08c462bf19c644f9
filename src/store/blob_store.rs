//! Blob Store Adapter — enhanced-image persistence.
//!
//! Grounded on `src/storage.rs`'s local-filesystem artifact store
//! (content-addressed path construction, `fs::create_dir_all` plus atomic
//! write). Cloud object-storage backends are dual-write-with-local-fallback
//! per the orchestration spec's non-goal framing ("cloud integration is
//! pluggable, not mandatory"): a `put` that fails against the primary
//! backend falls back to local disk rather than failing the job.

use std::path::PathBuf;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::BlobError;
use crate::model::BlobRef;

type HmacSha256 = Hmac<Sha256>;

/// Blob Store Adapter contract. Puts are idempotent per key: writing the
/// same key twice with the same bytes succeeds both times.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef, BlobError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;
}

/// Local-filesystem blob store. Default backend; always available.
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<BlobRef, BlobError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::Backend(e.to_string()))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| BlobError::Backend(e.to_string()))?;
        Ok(BlobRef {
            provider: "local".to_string(),
            key: key.to_string(),
            public_url: format!("{}/{}", self.public_base_url.trim_end_matches('/'), key),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.path_for(key);
        tokio::fs::read(&path)
            .await
            .map_err(|_| BlobError::NotFound(key.to_string()))
    }
}

/// S3-compatible object storage (DigitalOcean Spaces, and anything else
/// speaking the same API), signed with AWS SigV4 the way the original
/// service's `boto3` client does under the hood.
pub struct CloudBlobStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    region: String,
    access_key: String,
    secret_key: String,
    public_base_url: String,
}

impl CloudBlobStore {
    pub fn new(
        endpoint: impl Into<String>,
        bucket: impl Into<String>,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            bucket: bucket.into(),
            region: region.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            public_base_url: public_base_url.into(),
        }
    }

    fn host(&self) -> String {
        self.endpoint
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string()
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), self.bucket, key)
    }

    /// Build the `Authorization` header for a SigV4-signed request against
    /// this object's path, per the `s3` service signing spec.
    fn sign(&self, method: &str, key: &str, payload: &[u8], amz_date: &str) -> String {
        let date = &amz_date[..8];
        let host = self.host();
        let payload_hash = hex::encode(Sha256::digest(payload));

        let canonical_request = format!(
            "{method}\n/{bucket}/{key}\n\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\nhost;x-amz-content-sha256;x-amz-date\n{payload_hash}",
            bucket = self.bucket,
        );
        let credential_scope = format!("{date}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{credential_scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let k_date = hmac_sha256(format!("AWS4{}", self.secret_key).as_bytes(), date.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{credential_scope}, SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature={signature}",
            self.access_key,
        )
    }
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts a key of any length");
    mac.update(msg);
    mac.finalize().into_bytes().to_vec()
}

#[async_trait]
impl BlobStore for CloudBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef, BlobError> {
        let amz_date = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex::encode(Sha256::digest(&bytes));
        let authorization = self.sign("PUT", key, &bytes, &amz_date);

        let response = self
            .client
            .put(self.object_url(key))
            .header("host", self.host())
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("content-type", content_type)
            .header("authorization", authorization)
            .body(bytes)
            .send()
            .await
            .map_err(|e| BlobError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BlobError::Backend(format!(
                "cloud blob store returned {}",
                response.status()
            )));
        }

        Ok(BlobRef {
            provider: "cloud".to_string(),
            key: key.to_string(),
            public_url: format!("{}/{}", self.public_base_url.trim_end_matches('/'), key),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let amz_date = chrono::Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let authorization = self.sign("GET", key, b"", &amz_date);

        let response = self
            .client
            .get(self.object_url(key))
            .header("host", self.host())
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", hex::encode(Sha256::digest(b"")))
            .header("authorization", authorization)
            .send()
            .await
            .map_err(|e| BlobError::Backend(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BlobError::NotFound(key.to_string()));
        }
        if !response.status().is_success() {
            return Err(BlobError::Backend(format!(
                "cloud blob store returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| BlobError::Backend(e.to_string()))
    }
}

/// Wraps a primary backend (e.g. an object-storage client) with a local
/// fallback. A `put` failure against the primary is logged and retried
/// against `fallback`; the job never fails solely because the cloud
/// backend is unreachable.
pub struct FallbackBlobStore<P: BlobStore> {
    primary: P,
    fallback: LocalBlobStore,
}

impl<P: BlobStore> FallbackBlobStore<P> {
    pub fn new(primary: P, fallback: LocalBlobStore) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl<P: BlobStore + Send + Sync> BlobStore for FallbackBlobStore<P> {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<BlobRef, BlobError> {
        match self.primary.put(key, bytes.clone(), content_type).await {
            Ok(blob_ref) => Ok(blob_ref),
            Err(e) => {
                tracing::warn!(error = %e, key, "primary blob backend failed, falling back to local disk");
                self.fallback.put(key, bytes, content_type).await
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        match self.primary.get(key).await {
            Ok(bytes) => Ok(bytes),
            Err(_) => self.fallback.get(key).await,
        }
    }
}

/// Default local blob root: `./data/blobs`.
pub fn default_blob_root() -> PathBuf {
    PathBuf::from("./data/blobs")
}
