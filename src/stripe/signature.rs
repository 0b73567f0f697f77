//! `stripe-signature` verification.
//!
//! Header format: `t=<unix_timestamp>,v1=<hex>[,v1=<hex>...]`.
//! Signed payload: `<timestamp>.<raw_body>` under HMAC-SHA256 with the
//! endpoint secret. Any `v1` entry may match (Stripe sends several while a
//! secret is being rolled).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use time::OffsetDateTime;
use tracing::warn;

use crate::config::StripeConfig;
use crate::error::{AppError, AppResult};
use crate::stripe::events::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

struct SignatureHeader<'a> {
    timestamp: &'a str,
    signatures: Vec<&'a str>,
}

fn parse_header(header: &str) -> Option<SignatureHeader<'_>> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(ts) = part.strip_prefix("t=") {
            timestamp = Some(ts);
        } else if let Some(sig) = part.strip_prefix("v1=") {
            signatures.push(sig);
        }
    }
    match timestamp {
        Some(timestamp) if !signatures.is_empty() => Some(SignatureHeader {
            timestamp,
            signatures,
        }),
        _ => None,
    }
}

impl WebhookVerifier {
    pub fn new(cfg: &StripeConfig) -> Self {
        Self {
            secret: cfg.webhook_secret.clone(),
            tolerance_secs: cfg.tolerance_secs,
        }
    }

    pub fn verify(&self, raw_body: &[u8], header: Option<&str>) -> AppResult<WebhookEvent> {
        self.verify_at(raw_body, header, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// The body is only read after the header parses and the HMAC matches.
    pub(crate) fn verify_at(
        &self,
        raw_body: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> AppResult<WebhookEvent> {
        let header = match header {
            Some(h) if !h.trim().is_empty() => h,
            _ => return Err(AppError::MissingSignature),
        };

        let parsed = parse_header(header).ok_or_else(|| {
            warn!("malformed stripe-signature header");
            AppError::SignatureInvalid
        })?;

        let ts: i64 = parsed
            .timestamp
            .parse()
            .map_err(|_| AppError::SignatureInvalid)?;
        if now.saturating_sub(ts) > self.tolerance_secs {
            warn!(ts, now, "stale webhook timestamp");
            return Err(AppError::SignatureInvalid);
        }

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC key error".into()))?;
        mac.update(parsed.timestamp.as_bytes());
        mac.update(b".");
        mac.update(raw_body);

        // verify_slice compares in constant time.
        let matched = parsed.signatures.iter().any(|sig| match hex::decode(sig) {
            Ok(bytes) => mac.clone().verify_slice(&bytes).is_ok(),
            Err(_) => false,
        });
        if !matched {
            warn!("webhook signature mismatch");
            return Err(AppError::SignatureInvalid);
        }

        WebhookEvent::from_verified_bytes(raw_body)
    }
}

#[cfg(test)]
pub(crate) const TEST_SECRET: &str = "whsec_test_secret";

#[cfg(test)]
pub(crate) fn test_verifier() -> WebhookVerifier {
    WebhookVerifier::new(&StripeConfig {
        webhook_secret: TEST_SECRET.into(),
        tolerance_secs: 300,
    })
}

/// Builds a valid header the way Stripe does.
#[cfg(test)]
pub(crate) fn sign(secret: &str, ts: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{ts}.").as_bytes());
    mac.update(body);
    format!("t={ts},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stripe::events::EventKind;

    const BODY: &[u8] = br#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1","amount":500,"currency":"usd"}}}"#;
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn accepts_valid_signature() {
        let header = sign(TEST_SECRET, NOW, BODY);
        let event = test_verifier().verify_at(BODY, Some(&header), NOW).unwrap();
        assert_eq!(event.event_id, "evt_1");
        assert_eq!(event.kind, EventKind::PaymentIntentSucceeded);
    }

    #[test]
    fn missing_header_fails_before_body_is_read() {
        // Not JSON at all: a body read would give InvalidPayload instead.
        let err = test_verifier().verify_at(b"\xff\x00", None, NOW).unwrap_err();
        assert!(matches!(err, AppError::MissingSignature));
        let err = test_verifier().verify_at(b"\xff\x00", Some("  "), NOW).unwrap_err();
        assert!(matches!(err, AppError::MissingSignature));
    }

    #[test]
    fn tampered_byte_is_rejected() {
        let header = sign(TEST_SECRET, NOW, BODY);
        let mut tampered = BODY.to_vec();
        let pos = tampered.iter().position(|b| *b == b'5').unwrap();
        tampered[pos] = b'9';
        let err = test_verifier().verify_at(&tampered, Some(&header), NOW).unwrap_err();
        assert!(matches!(err, AppError::SignatureInvalid));
    }

    #[test]
    fn reserialized_body_is_rejected() {
        let header = sign(TEST_SECRET, NOW, BODY);
        let value: serde_json::Value = serde_json::from_slice(BODY).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        assert!(matches!(
            test_verifier().verify_at(&pretty, Some(&header), NOW),
            Err(AppError::SignatureInvalid)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = sign("whsec_other", NOW, BODY);
        assert!(matches!(
            test_verifier().verify_at(BODY, Some(&header), NOW),
            Err(AppError::SignatureInvalid)
        ));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign(TEST_SECRET, NOW - 301, BODY);
        assert!(matches!(
            test_verifier().verify_at(BODY, Some(&header), NOW),
            Err(AppError::SignatureInvalid)
        ));
    }

    #[test]
    fn any_matching_v1_is_accepted() {
        let good = sign(TEST_SECRET, NOW, BODY);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v0=abc,v1={good_sig}");
        assert!(test_verifier().verify_at(BODY, Some(&header), NOW).is_ok());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        let only_ts = format!("t={NOW}");
        for header in ["garbage", "t=abc,v1=00", "v1=00", only_ts.as_str()] {
            assert!(matches!(
                test_verifier().verify_at(BODY, Some(header), NOW),
                Err(AppError::SignatureInvalid)
            ));
        }
    }

    #[test]
    fn error_message_does_not_leak_expected_signature() {
        let header = format!("t={NOW},v1=00");
        let err = test_verifier().verify_at(BODY, Some(&header), NOW).unwrap_err();
        let expected = sign(TEST_SECRET, NOW, BODY);
        let expected_sig = expected.split("v1=").nth(1).unwrap();
        assert!(!err.to_string().contains(expected_sig));
        assert!(!err.to_string().contains(TEST_SECRET));
    }
}
