//! HMAC signing helpers
//!
//! Three signature schemes live here: outbound webhook signatures
//! (`t={ts},v1={hex}` over `"{ts}.{body}"`), raw-body verification for the
//! inbound click webhook, and self-contained unsubscribe tokens.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::types::{AccountId, EmailId};

type HmacSha256 = Hmac<Sha256>;

fn mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key of any length is valid")
}

/// Compute the hex HMAC-SHA256 of `{timestamp}.{body}`
pub fn sign_webhook_payload(secret: &str, timestamp: i64, body: &str) -> String {
    let mut m = mac(secret);
    m.update(format!("{}.{}", timestamp, body).as_bytes());
    hex::encode(m.finalize().into_bytes())
}

/// Build the signature header value: `t={ts},v1={hex}`
pub fn webhook_signature_header(secret: &str, timestamp: i64, body: &str) -> String {
    format!(
        "t={},v1={}",
        timestamp,
        sign_webhook_payload(secret, timestamp, body)
    )
}

/// Verify a `t={ts},v1={hex}` header against a body
pub fn verify_webhook_header(secret: &str, header: &str, body: &str) -> bool {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        match part.split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signature = Some(v.to_string()),
            _ => {}
        }
    }

    let (Some(ts), Some(sig)) = (timestamp, signature) else {
        return false;
    };

    let Ok(sig_bytes) = hex::decode(&sig) else {
        return false;
    };

    let mut m = mac(secret);
    m.update(format!("{}.{}", ts, body).as_bytes());
    m.verify_slice(&sig_bytes).is_ok()
}

/// Verify a hex HMAC-SHA256 signature over a raw request body.
///
/// Used for the click-tracking webhook, which signs the exact bytes it sends.
pub fn verify_raw_signature(secret: &str, signature_hex: &str, body: &[u8]) -> bool {
    let Ok(sig_bytes) = hex::decode(signature_hex.trim_start_matches("sha256=")) else {
        return false;
    };

    let mut m = mac(secret);
    m.update(body);
    m.verify_slice(&sig_bytes).is_ok()
}

/// Claims carried by a signed unsubscribe token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeClaims {
    pub email_id: EmailId,
    pub recipient: String,
    pub account_id: AccountId,
}

impl UnsubscribeClaims {
    pub fn new(email_id: Uuid, recipient: impl Into<String>, account_id: Uuid) -> Self {
        Self {
            email_id,
            recipient: recipient.into(),
            account_id,
        }
    }
}

/// Encode a signed unsubscribe token: `base64url(claims).hex(hmac)`.
///
/// The token is self-contained and verified without a database round-trip.
pub fn encode_unsubscribe_token(secret: &str, claims: &UnsubscribeClaims) -> String {
    let payload = serde_json::to_vec(claims).expect("claims serialize to JSON");
    let encoded = URL_SAFE_NO_PAD.encode(&payload);

    let mut m = mac(secret);
    m.update(encoded.as_bytes());
    let sig = hex::encode(m.finalize().into_bytes());

    format!("{}.{}", encoded, sig)
}

/// Verify and decode an unsubscribe token
pub fn decode_unsubscribe_token(secret: &str, token: &str) -> Option<UnsubscribeClaims> {
    let (encoded, sig) = token.rsplit_once('.')?;
    let sig_bytes = hex::decode(sig).ok()?;

    let mut m = mac(secret);
    m.update(encoded.as_bytes());
    m.verify_slice(&sig_bytes).ok()?;

    let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    serde_json::from_slice(&payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_webhook_signature_roundtrip() {
        let secret = "whsec_test";
        let body = r#"{"event":"email.completed","email_id":"abc"}"#;
        let header = webhook_signature_header(secret, 1700000000, body);

        assert!(header.starts_with("t=1700000000,v1="));
        assert!(verify_webhook_header(secret, &header, body));
    }

    #[test]
    fn test_webhook_signature_tamper_detection() {
        let secret = "whsec_test";
        let body = r#"{"event":"email.completed"}"#;
        let header = webhook_signature_header(secret, 1700000000, body);

        // Any altered byte of the body must fail verification
        let tampered = r#"{"event":"email.complained"}"#;
        assert!(!verify_webhook_header(secret, &header, tampered));
        assert!(!verify_webhook_header("other_secret", &header, body));
        assert!(!verify_webhook_header(secret, "garbage", body));
    }

    #[test]
    fn test_raw_signature() {
        let secret = "click_secret";
        let body = br#"{"event":"link.clicked"}"#;

        let mut m = mac(secret);
        m.update(body);
        let sig = hex::encode(m.finalize().into_bytes());

        assert!(verify_raw_signature(secret, &sig, body));
        assert!(verify_raw_signature(secret, &format!("sha256={}", sig), body));
        assert!(!verify_raw_signature(secret, &sig, b"other body"));
        assert!(!verify_raw_signature(secret, "not-hex", body));
    }

    #[test]
    fn test_unsubscribe_token_roundtrip() {
        let secret = "unsub_secret";
        let claims = UnsubscribeClaims::new(Uuid::new_v4(), "user@example.com", Uuid::new_v4());

        let token = encode_unsubscribe_token(secret, &claims);
        let decoded = decode_unsubscribe_token(secret, &token).unwrap();

        assert_eq!(decoded, claims);
    }

    #[test]
    fn test_unsubscribe_token_rejects_tampering() {
        let secret = "unsub_secret";
        let claims = UnsubscribeClaims::new(Uuid::new_v4(), "user@example.com", Uuid::new_v4());
        let token = encode_unsubscribe_token(secret, &claims);

        assert!(decode_unsubscribe_token("wrong_secret", &token).is_none());

        let mut broken = token.clone();
        broken.replace_range(0..1, if token.starts_with('A') { "B" } else { "A" });
        assert!(decode_unsubscribe_token(secret, &broken).is_none());

        assert!(decode_unsubscribe_token(secret, "no-dot-here").is_none());
    }
}
