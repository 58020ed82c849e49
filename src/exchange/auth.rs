//! Request signing for the exchange's HMAC scheme.
//!
//! Signature = hex(HMAC_SHA256(secret, method + path + expires + body)), where
//! `path` carries the API version prefix and `body` is compact JSON or empty.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

/// Version prefix every signed path starts with.
pub const API_PREFIX: &str = "/v2";

/// Seconds a signature stays valid after issuance.
pub const SIGNATURE_TTL_SECS: i64 = 60;

pub const HEADER_API_KEY: &str = "api-key";
pub const HEADER_SIGNATURE: &str = "api-signature";
pub const HEADER_EXPIRES: &str = "api-expires";

/// Compact JSON for a request body, or the empty string if there is none.
pub fn canonical_body(body: Option<&Value>) -> Result<String, serde_json::Error> {
    match body {
        Some(value) => serde_json::to_string(value),
        None => Ok(String::new()),
    }
}

/// Expiry timestamp for a request issued at `now_unix` (seconds).
pub fn expires_at(now_unix: i64) -> i64 {
    now_unix + SIGNATURE_TTL_SECS
}

/// Sign one request. `path` must already include [`API_PREFIX`] and any query.
pub fn sign(secret: &str, method: &str, path: &str, expires: i64, body: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(method.as_bytes());
    mac.update(path.as_bytes());
    mac.update(expires.to_string().as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
