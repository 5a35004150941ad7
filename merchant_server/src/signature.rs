//! Webhook signature verification.
//!
//! The gateway signs every webhook delivery with HMAC-SHA256 over the raw request body, using the shared webhook
//! secret as the key, and sends the lowercase hex digest in the `X-Signature` header. Verification decodes the
//! presented header and compares in constant time; a missing secret fails closed.

use hmac::{Hmac, Mac};
use mps_common::Secret;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const EVENT_HEADER: &str = "X-Webhook-Event";

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Secret<String>,
}

impl SignatureVerifier {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    /// The hex HMAC-SHA256 digest of `payload` under the shared secret.
    pub fn sign(&self, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.reveal().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Check the presented hex signature against `payload`. Comparison of the digests is constant-time; hex
    /// decoding failures and an unconfigured secret are both rejections, never panics.
    pub fn verify(&self, payload: &[u8], presented: &str) -> bool {
        if self.secret.reveal().is_empty() {
            return false;
        }
        let Ok(presented) = hex::decode(presented) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.secret.reveal().as_bytes()) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&presented).is_ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn verifier(secret: &str) -> SignatureVerifier {
        SignatureVerifier::new(Secret::new(secret.to_string()))
    }

    #[test]
    fn known_hmac_vector() {
        // RFC 4231, test case 2.
        let v = verifier("Jefe");
        let sig = v.sign(b"what do ya want for nothing?");
        assert_eq!(sig, "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843");
        assert!(v.verify(b"what do ya want for nothing?", &sig));
    }

    #[test]
    fn valid_signature_verifies() {
        let v = verifier("s3cret");
        let body = br#"{"event":"payment.paid","invoice_id":"INV-1"}"#;
        let sig = v.sign(body);
        assert!(v.verify(body, &sig));
        // Hex decoding is case-insensitive.
        assert!(v.verify(body, &sig.to_uppercase()));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = b"payload";
        let sig = verifier("secret-a").sign(body);
        assert!(!verifier("secret-b").verify(body, &sig));
    }

    #[test]
    fn mutated_body_is_rejected() {
        let v = verifier("s3cret");
        let sig = v.sign(br#"{"amount":100}"#);
        assert!(!v.verify(br#"{"amount":999}"#, &sig));
    }

    #[test]
    fn malformed_signatures_are_rejected() {
        let v = verifier("s3cret");
        let body = b"payload";
        let sig = v.sign(body);
        assert!(!v.verify(body, &sig[..sig.len() - 2]));
        assert!(!v.verify(body, &sig[..sig.len() - 1]));
        assert!(!v.verify(body, "not-hex-at-all"));
        assert!(!v.verify(body, ""));
    }

    #[test]
    fn missing_secret_fails_closed() {
        let v = verifier("");
        let body = b"payload";
        let sig = v.sign(body);
        assert!(!v.verify(body, &sig));
    }
}
