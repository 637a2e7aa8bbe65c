//! Webhook payload signing

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the payload signature
pub const SIGNATURE_HEADER: &str = "x-llmwatch-signature";

/// Sign a webhook body with HMAC-SHA256.
///
/// Returns the header value `sha256=<hex digest>`. Signing happens over the
/// exact bytes posted, so the caller must serialize the payload once and use
/// the same buffer for both signing and sending.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    let digest = mac.finalize().into_bytes();

    format!("sha256={}", hex::encode(digest))
}
