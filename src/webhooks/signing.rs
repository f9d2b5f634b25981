//! HMAC-with-timestamp webhook signing (C14).
//!
//! Wire format: header value `t=<unix_seconds>,v1=<hex hmac-sha256>` computed
//! over the string `"{timestamp}.{body}"`, mirroring the widely-used
//! timestamp-bound webhook signature scheme. Verification recomputes the MAC
//! over the same signed string and rejects signatures outside a tolerance
//! window to bound replay of captured payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("signature does not match payload")]
    Mismatch,
    #[error("timestamp outside tolerance window")]
    StaleTimestamp,
}

fn signed_string(timestamp: u64, body: &str) -> String {
    format!("{timestamp}.{body}")
}

pub fn sign(secret: &[u8], timestamp: u64, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(signed_string(timestamp, body).as_bytes());
    let digest = hex::encode(mac.finalize().into_bytes());
    format!("t={timestamp},v1={digest}")
}

/// Verifies `header` against `body` and `secret`, rejecting timestamps more
/// than `tolerance_seconds` away from `now`.
pub fn verify(secret: &[u8], header: &str, body: &str, now: u64, tolerance_seconds: u64) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signature = None;
    for part in header.split(',') {
        let mut kv = part.splitn(2, '=');
        match (kv.next(), kv.next()) {
            (Some("t"), Some(v)) => timestamp = v.parse::<u64>().ok(),
            (Some("v1"), Some(v)) => signature = Some(v),
            _ => {}
        }
    }
    let (timestamp, signature) = match (timestamp, signature) {
        (Some(t), Some(s)) => (t, s),
        _ => return Err(SignatureError::Malformed),
    };

    if now.saturating_sub(timestamp) > tolerance_seconds && timestamp.saturating_sub(now) > tolerance_seconds {
        return Err(SignatureError::StaleTimestamp);
    }

    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any length");
    mac.update(signed_string(timestamp, body).as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if expected.as_bytes().ct_eq(signature.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_signature_verifies_against_its_own_payload() {
        let secret = b"top-secret";
        let header = sign(secret, 1_000, "{\"hello\":true}");
        assert!(verify(secret, &header, "{\"hello\":true}", 1_000, 300).is_ok());
    }

    #[test]
    fn tampered_body_fails_verification() {
        let secret = b"top-secret";
        let header = sign(secret, 1_000, "{\"hello\":true}");
        let err = verify(secret, &header, "{\"hello\":false}", 1_000, 300).unwrap_err();
        assert!(matches!(err, SignatureError::Mismatch));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let secret = b"top-secret";
        let header = sign(secret, 1_000, "body");
        let err = verify(secret, &header, "body", 2_000, 300).unwrap_err();
        assert!(matches!(err, SignatureError::StaleTimestamp));
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = verify(b"secret", "garbage", "body", 1_000, 300).unwrap_err();
        assert!(matches!(err, SignatureError::Malformed));
    }
}
