//! Webhook signature validation
//!
//! The provider signs each callback with HMAC-SHA1 over the full request URL
//! followed by the form parameters sorted by key, base64-encoded into a
//! signature header. Validation is optional and enforced only when an auth
//! token is configured.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::BTreeMap;

use crate::error::{AdapterError, Result};

type HmacSha1 = Hmac<Sha1>;

/// Compute the expected signature for a webhook request.
pub fn compute_signature(auth_token: &str, url: &str, params: &BTreeMap<String, String>) -> String {
    let mut data = url.to_string();
    for (key, value) in params {
        data.push_str(key);
        data.push_str(value);
    }

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(data.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Validate a provider signature header against the request it claims to
/// sign. Mismatches are permanent failures.
pub fn validate_signature(
    auth_token: &str,
    url: &str,
    params: &BTreeMap<String, String>,
    signature: &str,
) -> Result<()> {
    let expected = compute_signature(auth_token, url, params);

    // Constant-time comparison; signatures are short enough that a simple
    // fold is fine.
    let matches = expected.len() == signature.len()
        && expected
            .bytes()
            .zip(signature.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;

    if matches {
        Ok(())
    } else {
        Err(AdapterError::permanent("invalid webhook signature"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("CallSid".to_string(), "CA123".to_string());
        params.insert("CallStatus".to_string(), "completed".to_string());
        params
    }

    #[test]
    fn accepts_matching_signature() {
        let url = "https://host/webhooks/status";
        let signature = compute_signature("token", url, &params());
        validate_signature("token", url, &params(), &signature).unwrap();
    }

    #[test]
    fn rejects_wrong_token() {
        let url = "https://host/webhooks/status";
        let signature = compute_signature("token", url, &params());
        assert!(validate_signature("other", url, &params(), &signature).is_err());
    }

    #[test]
    fn rejects_tampered_params() {
        let url = "https://host/webhooks/status";
        let signature = compute_signature("token", url, &params());

        let mut tampered = params();
        tampered.insert("CallStatus".to_string(), "failed".to_string());
        assert!(validate_signature("token", url, &tampered, &signature).is_err());
    }

    #[test]
    fn param_order_is_canonical() {
        // BTreeMap sorts keys, so insertion order cannot change the result.
        let url = "https://host/webhooks/answer";
        let mut a = BTreeMap::new();
        a.insert("B".to_string(), "2".to_string());
        a.insert("A".to_string(), "1".to_string());

        let mut b = BTreeMap::new();
        b.insert("A".to_string(), "1".to_string());
        b.insert("B".to_string(), "2".to_string());

        assert_eq!(
            compute_signature("token", url, &a),
            compute_signature("token", url, &b)
        );
    }
}
