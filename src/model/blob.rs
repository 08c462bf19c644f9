//! Blob reference — a pointer to a stored object.

use serde::{Deserialize, Serialize};

/// `{provider, key, public_url}`. The public URL is durable as long as the
/// blob exists; deletion invalidates the reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobRef {
    pub provider: String,
    pub key: String,
    pub public_url: String,
}

/// Build the storage key `enhanced-images/{job_id}_{type}_{random}.{ext}`.
pub fn blob_key(job_id: &str, kind: &str, ext: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    let random_suffix = &random[..8];
    format!("enhanced-images/{job_id}_{kind}_{random_suffix}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_key_has_expected_shape() {
        let key = blob_key("job-1", "enhanced", "jpg");
        assert!(key.starts_with("enhanced-images/job-1_enhanced_"));
        assert!(key.ends_with(".jpg"));
    }
}
