//! Webhook payload signing and verification.
//!
//! Every delivery carries an `X-Paylane-Signature` header of the form:
//!
//! ```text
//! t=<unix_ms>,v1=<hex hmac-sha256(secret, "<timestamp>.<payload>")>
//! ```
//!
//! We only ever emit a single `v1` signature, but the verifier accepts any
//! number of `v<N>` candidates and succeeds if one matches, so receivers
//! holding two secrets during a rotation window can still verify.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age (and future skew) of a signature timestamp before it is
/// rejected, in milliseconds. 5 minutes.
pub const DEFAULT_TOLERANCE_MS: i64 = 300_000;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    StaleSignature,

    #[error("no signature candidate matched")]
    SignatureMismatch,
}

/// Sign a payload with a webhook secret at the given timestamp.
///
/// The canonical signed string is `"<timestamp>.<payload>"`; the payload
/// bytes are signed exactly as they will be sent on the wire.
pub fn sign(payload: &[u8], secret: &str, timestamp_ms: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    format!("t={},v1={}", timestamp_ms, hex::encode(mac.finalize().into_bytes()))
}

/// Sign a payload with the current wall-clock timestamp.
pub fn sign_now(payload: &[u8], secret: &str) -> String {
    sign(payload, secret, chrono::Utc::now().timestamp_millis())
}

/// Verify a signature header against a payload and secret.
///
/// Rejects headers whose timestamp is more than `tolerance_ms` away from
/// `now` in either direction, then compares every `v<N>` candidate against
/// the expected signature in constant time.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_ms: i64,
) -> Result<(), SignatureError> {
    verify_at(payload, header, secret, tolerance_ms, chrono::Utc::now().timestamp_millis())
}

/// Verification against an explicit "now", for deterministic tests.
pub fn verify_at(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_ms: i64,
    now_ms: i64,
) -> Result<(), SignatureError> {
    let (timestamp, candidates) = parse_header(header)?;

    if (now_ms - timestamp).abs() > tolerance_ms {
        return Err(SignatureError::StaleSignature);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = mac.finalize().into_bytes();

    for candidate in candidates {
        let Ok(bytes) = hex::decode(candidate) else {
            continue;
        };
        if bytes.len() == expected.len() && bytes.ct_eq(&expected).into() {
            return Ok(());
        }
    }

    Err(SignatureError::SignatureMismatch)
}

/// Parse a header into its timestamp and signature candidates.
///
/// `v<N>` keys are accepted for any N; unknown keys are ignored so the
/// format can grow without breaking old verifiers.
fn parse_header(header: &str) -> Result<(i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.split_once('=') else {
            return Err(SignatureError::MalformedHeader);
        };
        if key == "t" {
            timestamp = Some(
                value
                    .parse::<i64>()
                    .map_err(|_| SignatureError::MalformedHeader)?,
            );
        } else if key.starts_with('v') && key[1..].chars().all(|c| c.is_ascii_digit()) {
            candidates.push(value);
        }
    }

    match (timestamp, candidates.is_empty()) {
        (Some(t), false) => Ok((t, candidates)),
        _ => Err(SignatureError::MalformedHeader),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    #[test]
    fn test_sign_verify_round_trip() {
        let payload = br#"{"id":"evt_1","type":"payment.succeeded"}"#;
        let header = sign(payload, SECRET, 1_700_000_000_000);

        assert!(header.starts_with("t=1700000000000,v1="));
        verify_at(payload, &header, SECRET, DEFAULT_TOLERANCE_MS, 1_700_000_000_000)
            .expect("round trip should verify");
    }

    #[test]
    fn test_resigning_same_payload_verifies() {
        let payload = br#"{"id":"evt_2"}"#;
        let first = sign(payload, SECRET, 42_000);
        let second = sign(payload, SECRET, 42_000);
        assert_eq!(first, second);
        verify_at(payload, &second, SECRET, DEFAULT_TOLERANCE_MS, 42_000).unwrap();
    }

    #[test]
    fn test_stale_signature() {
        let payload = b"{}";
        let header = sign(payload, SECRET, 1_000_000);

        // now = t + 400_000 with tolerance 300_000 -> stale
        let err = verify_at(payload, &header, SECRET, 300_000, 1_400_000).unwrap_err();
        assert_eq!(err, SignatureError::StaleSignature);

        // Future timestamps beyond tolerance are equally stale.
        let err = verify_at(payload, &header, SECRET, 300_000, 600_000).unwrap_err();
        assert_eq!(err, SignatureError::StaleSignature);
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let header = sign(b"original", SECRET, 5_000);
        let err = verify_at(b"tampered", &header, SECRET, 300_000, 5_000).unwrap_err();
        assert_eq!(err, SignatureError::SignatureMismatch);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"payload";
        let header = sign(payload, SECRET, 5_000);
        let err = verify_at(payload, &header, "whsec_other", 300_000, 5_000).unwrap_err();
        assert_eq!(err, SignatureError::SignatureMismatch);
    }

    #[test]
    fn test_multiple_candidates_any_match() {
        let payload = b"payload";
        let good = sign(payload, SECRET, 5_000);
        let good_sig = good.strip_prefix("t=5000,v1=").unwrap();

        // Old secret's signature first, current secret's second.
        let header = format!("t=5000,v1={},v2={}", "ab".repeat(32), good_sig);
        verify_at(payload, &header, SECRET, 300_000, 5_000)
            .expect("should accept when any candidate matches");
    }

    #[test]
    fn test_malformed_headers() {
        for header in [
            "",
            "garbage",
            "t=notanumber,v1=abcd",
            "v1=abcd",       // no timestamp
            "t=5000",        // no signature
            "t=5000,x=abcd", // no v<N> key
        ] {
            let err = verify_at(b"p", header, SECRET, 300_000, 5_000).unwrap_err();
            assert_eq!(err, SignatureError::MalformedHeader, "header: {:?}", header);
        }
    }

    #[test]
    fn test_non_hex_candidate_skipped() {
        let payload = b"payload";
        let good = sign(payload, SECRET, 5_000);
        let good_sig = good.strip_prefix("t=5000,v1=").unwrap();

        let header = format!("t=5000,v1=nothex,v2={}", good_sig);
        verify_at(payload, &header, SECRET, 300_000, 5_000).unwrap();
    }
}
