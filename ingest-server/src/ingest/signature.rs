//! Webhook signature verification.
//!
//! The sender signs every request with HMAC-SHA256 over the exact raw body
//! using the shared secret, and sends the lowercase hex digest in the
//! `X-Signature` header.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded body signature.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Compute the hex-encoded HMAC-SHA256 of `body` under `secret`.
///
/// Returns `None` if the key is rejected by the MAC.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!("webhook_signature_invalid_key");
            return None;
        }
    };

    mac.update(body);

    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a webhook body signature.
///
/// # Arguments
///
/// * `secret` - The shared webhook secret
/// * `body` - The raw request body, exactly as received
/// * `signature` - The `X-Signature` header value, if the request had one
///
/// # Returns
///
/// `true` if the signature matches. A missing header, an empty secret and a
/// wrong signature all return `false`; callers cannot tell them apart.
pub fn verify_signature(secret: &str, body: &[u8], signature: Option<&str>) -> bool {
    let signature = match signature {
        Some(s) if !s.is_empty() => s,
        _ => {
            warn!(result = "invalid_signature", reason = "missing", "webhook_signature_rejected");
            return false;
        }
    };

    if secret.is_empty() {
        warn!(result = "invalid_signature", reason = "secret_not_configured", "webhook_signature_rejected");
        return false;
    }

    let expected_signature = match sign_body(secret, body) {
        Some(s) => s,
        None => return false,
    };

    // Constant-time comparison to prevent timing attacks
    let valid = constant_time_compare(&expected_signature, signature);

    if !valid {
        warn!(
            result = "invalid_signature",
            reason = "mismatch",
            expected_length = expected_signature.len(),
            actual_length = signature.len(),
            "webhook_signature_rejected"
        );
    }

    valid
}

/// Constant-time string comparison to prevent timing attacks.
///
/// Only the length (which is public, 64 hex chars) short-circuits.
fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &[u8] = br#"{"message_id":"m1","from":"+919876543210","to":"+14155550100","ts":"2025-01-15T10:00:00Z","text":"Hello"}"#;

    #[test]
    fn test_sign_body_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign_body("Jefe", b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_signature_valid() {
        let signature = sign_body("testsecret", BODY).unwrap();
        assert!(verify_signature("testsecret", BODY, Some(signature.as_str())));
    }

    #[test]
    fn test_verify_signature_missing() {
        assert!(!verify_signature("testsecret", BODY, None));
        assert!(!verify_signature("testsecret", BODY, Some("")));
    }

    #[test]
    fn test_verify_signature_wrong_secret() {
        let signature = sign_body("wrong_secret", BODY).unwrap();
        assert!(!verify_signature("testsecret", BODY, Some(signature.as_str())));
    }

    #[test]
    fn test_verify_signature_modified_body() {
        let signature = sign_body("testsecret", BODY).unwrap();
        let mut tampered = BODY.to_vec();
        tampered.push(b' ');
        assert!(!verify_signature("testsecret", &tampered, Some(signature.as_str())));
    }

    #[test]
    fn test_verify_signature_empty_secret() {
        let signature = sign_body("", BODY).unwrap();
        assert!(!verify_signature("", BODY, Some(signature.as_str())));
    }

    #[test]
    fn test_sign_body_accepts_any_key_length() {
        assert!(sign_body("", BODY).is_some());
        assert!(sign_body(&"k".repeat(1024), BODY).is_some());
    }

    #[test]
    fn test_verify_signature_whitespace_secret() {
        let signature = sign_body("   ", BODY).unwrap();
        assert!(verify_signature("   ", BODY, Some(signature.as_str())));
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
    }
}
