//! # Wallet Callback Verification
//!
//! The wallet provider posts the final payment outcome to our callback
//! endpoint. The request carries an HMAC signature header of the form
//! `t=<unix_ts>,v1=<hex_sig>`; the signed payload is `"{ts}.{body}"`.
//! Verification fails closed: an unverifiable callback is never
//! reconciled.

use checkout_core::{CallbackOutcome, CheckoutError, CheckoutResult};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, warn};

/// Maximum clock skew accepted between the signature timestamp and now
const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

/// Verified, parsed wallet callback
#[derive(Debug, Clone)]
pub struct CallbackEvent {
    /// Provider payment reference, matched against `Transaction.external_id`
    pub external_id: String,
    pub outcome: CallbackOutcome,
}

/// Verify the callback signature and parse the event payload.
///
/// `signature` is the raw signature header value; `payload` the raw
/// request body.
pub fn verify_callback(
    secret: &str,
    payload: &[u8],
    signature: &str,
) -> CheckoutResult<CallbackEvent> {
    let sig_parts = parse_signature_header(signature)?;

    let now = Utc::now().timestamp();
    if (now - sig_parts.timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        warn!("Callback timestamp outside tolerance");
        return Err(CheckoutError::CallbackVerificationFailed(
            "Timestamp outside tolerance".to_string(),
        ));
    }

    let signed_payload = format!("{}.{}", sig_parts.timestamp, String::from_utf8_lossy(payload));
    let expected_sig = compute_hmac_sha256(secret, &signed_payload);

    let valid = sig_parts
        .signatures
        .iter()
        .any(|sig| constant_time_compare(sig, &expected_sig));

    if !valid {
        warn!("Callback signature mismatch");
        return Err(CheckoutError::CallbackVerificationFailed(
            "Signature mismatch".to_string(),
        ));
    }

    let raw: RawCallback = serde_json::from_slice(payload)
        .map_err(|e| CheckoutError::Serialization(format!("Failed to parse callback: {e}")))?;

    debug!(
        "Verified wallet callback: payment_id={}, status={}",
        raw.payment_id, raw.status
    );

    let outcome = match raw.status.as_str() {
        "approved" => CallbackOutcome::Approved,
        "declined" | "cancelled" => CallbackOutcome::Declined {
            reason: raw
                .reason
                .unwrap_or_else(|| format!("Payment {}", raw.status)),
        },
        other => {
            return Err(CheckoutError::Serialization(format!(
                "Unknown callback status: {other}"
            )))
        }
    };

    Ok(CallbackEvent {
        external_id: raw.payment_id,
        outcome,
    })
}

/// Produce a signature header for a payload. Used by tests and by local
/// tooling that replays callbacks.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let sig = compute_hmac_sha256(secret, &signed_payload);
    format!("t={timestamp},v1={sig}")
}

#[derive(Debug, Deserialize)]
struct RawCallback {
    payment_id: String,
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

struct SignatureHeader {
    timestamp: i64,
    signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> CheckoutResult<SignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let kv: Vec<&str> = part.split('=').collect();
        if kv.len() != 2 {
            continue;
        }
        match kv[0] {
            "t" => {
                timestamp = kv[1].parse().ok();
            }
            "v1" => {
                signatures.push(kv[1].to_string());
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        CheckoutError::CallbackVerificationFailed("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(CheckoutError::CallbackVerificationFailed(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(SignatureHeader {
        timestamp,
        signatures,
    })
}

fn compute_hmac_sha256(secret: &str, message: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
