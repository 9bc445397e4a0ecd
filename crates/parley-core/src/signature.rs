//! Webhook signature verification
//!
//! The call platform signs each delivery with HMAC-SHA256 over the raw body,
//! keyed with the shared API secret, and sends the lowercase hex digest in
//! `x-signature`. Verification must run on the exact received bytes, before
//! any JSON parsing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Hex HMAC-SHA256 of `body` keyed with `secret`
pub fn sign(body: &str, secret: &str) -> String {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// True only for the exact hex digest of `body`
pub fn verify_signature(body: &str, signature: &str, secret: &str) -> bool {
    let expected = sign(body, secret);
    !expected.is_empty() && constant_time_compare(signature, &expected)
}

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

    const SECRET: &str = "webhook-secret";
    const BODY: &str = r#"{"type":"call.session_ended","call":{"custom":{"meetingId":"m1"}}}"#;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            sign("what do ya want for nothing?", "Jefe"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_accepts_exact_signature() {
        let signature = sign(BODY, SECRET);
        assert!(verify_signature(BODY, &signature, SECRET));
    }

    #[test]
    fn test_rejects_any_single_byte_mutation() {
        let signature = sign(BODY, SECRET);
        let bytes = BODY.as_bytes();

        for i in 0..bytes.len() {
            let mut mutated = bytes.to_vec();
            // stays ASCII, so the body is still valid UTF-8
            mutated[i] ^= 0x01;
            let mutated = String::from_utf8(mutated).unwrap();
            assert!(
                !verify_signature(&mutated, &signature, SECRET),
                "mutation at byte {} was accepted",
                i
            );
        }
    }

    #[test]
    fn test_rejects_wrong_secret_and_garbage() {
        let signature = sign(BODY, SECRET);
        assert!(!verify_signature(BODY, &signature, "other-secret"));
        assert!(!verify_signature(BODY, "", SECRET));
        assert!(!verify_signature(BODY, "not-hex", SECRET));
        assert!(!verify_signature(BODY, &signature.to_uppercase(), SECRET));
    }
}
