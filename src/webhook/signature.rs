//! Canonical JSON serialization and HMAC-SHA256 webhook signing.
//!
//! Grounded on the original service's `utils/signatures.py`
//! (`generate_webhook_signature`: `json.dumps(payload, sort_keys=True,
//! separators=(",", ":"))` then `hmac.new(secret, body, sha256).hexdigest()`
//! with an `sha256=` prefix) and on `hmac`/`sha2` usage in
//! `estuary-flow/.graveyard/control/src/services/signatures.rs`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Serialize `payload` to canonical bytes: compact separators, and object
/// keys in sorted order at every nesting level. `serde_json::Map` is
/// `BTreeMap`-backed by default (the `preserve_order` feature is not
/// enabled for this crate), so `serde_json::to_vec` already yields sorted
/// keys recursively.
pub fn canonical_bytes(payload: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(payload).expect("Value serialization cannot fail")
}

/// Compute `"sha256=" + hex(HMAC_SHA256(secret, bytes))`.
pub fn sign(secret: &str, bytes: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(bytes);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time verification, for symmetry with what receivers must do.
pub fn verify(secret: &str, bytes: &[u8], signature_header: &str) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts a key of any length");
    mac.update(bytes);
    mac.verify_slice(&expected).is_ok()
}
