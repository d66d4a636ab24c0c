//! Signed state codec for the authorization redirect
//!
//! No server-side session is guaranteed to survive the round trip through
//! the provider (it may span minutes and different instances), so the
//! `state` parameter carries everything: the claims payload plus an
//! HMAC-SHA256 signature over it. The codec is the sole gatekeeper against
//! cross-site request forgery and state tampering.
//!
//! External form is four dot-separated URL-safe sections:
//! `base64url(claims_json).issued_at_unix.nonce.base64url(signature)`

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use ring::rand::{SecureRandom, SystemRandom};
use tb_types::{AppError, AppResult};
use thiserror::Error;

use crate::types::StateClaims;

/// Default maximum age of a state envelope (10 minutes)
pub const DEFAULT_STATE_MAX_AGE_SECS: i64 = 600;

/// Bytes of entropy in a nonce before encoding
const NONCE_LEN: usize = 24;

/// Why a state envelope was rejected
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// Input could not be parsed back into an envelope, or the signed
    /// claims payload is not valid
    #[error("malformed state envelope")]
    Malformed,

    /// Signature does not match; forged or corrupted in transit
    #[error("state signature mismatch")]
    InvalidSignature,

    /// Envelope is older than the allowed maximum age
    #[error("state envelope expired")]
    Expired,
}

/// The value transmitted through the provider redirect
///
/// Opaque to the provider and the browser; must round-trip byte-for-byte
/// or be rejected. Consumed exactly once by the callback orchestrator.
#[derive(Debug, Clone)]
pub struct SignedStateEnvelope {
    /// Serialized [`StateClaims`] JSON
    payload: Vec<u8>,

    /// Claims issue time as unix seconds, duplicated for fast rejection
    issued_at: i64,

    /// Claims nonce, duplicated at the envelope level
    nonce: String,

    /// HMAC-SHA256 over `payload || issued_at || nonce`
    signature: Vec<u8>,
}

/// Generate a cryptographically random nonce (base64url, 24 bytes)
pub fn generate_nonce() -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; NONCE_LEN];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::Internal("Failed to generate random bytes".to_string()))?;

    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Serialize and sign claims into a transit envelope
pub fn encode(claims: &StateClaims, secret: &[u8]) -> Result<SignedStateEnvelope, StateError> {
    let payload = serde_json::to_vec(claims).map_err(|_| StateError::Malformed)?;
    let issued_at = claims.issued_at.timestamp();
    let signature = sign(secret, &payload, issued_at, &claims.nonce);

    Ok(SignedStateEnvelope {
        payload,
        issued_at,
        nonce: claims.nonce.clone(),
        signature,
    })
}

impl SignedStateEnvelope {
    /// External URL-safe representation, suitable for a query parameter
    pub fn to_raw(&self) -> String {
        format!(
            "{}.{}.{}.{}",
            URL_SAFE_NO_PAD.encode(&self.payload),
            self.issued_at,
            self.nonce,
            URL_SAFE_NO_PAD.encode(&self.signature),
        )
    }

    /// Reverse [`to_raw`](Self::to_raw)
    ///
    /// Never panics on untrusted input; any deviation from the expected
    /// shape is [`StateError::Malformed`].
    pub fn decode(raw: &str) -> Result<Self, StateError> {
        let mut sections = raw.split('.');
        let payload_b64 = sections.next().ok_or(StateError::Malformed)?;
        let issued_at_str = sections.next().ok_or(StateError::Malformed)?;
        let nonce = sections.next().ok_or(StateError::Malformed)?;
        let signature_b64 = sections.next().ok_or(StateError::Malformed)?;
        if sections.next().is_some() {
            return Err(StateError::Malformed);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| StateError::Malformed)?;
        let issued_at: i64 = issued_at_str.parse().map_err(|_| StateError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| StateError::Malformed)?;

        Ok(Self {
            payload,
            issued_at,
            nonce: nonce.to_string(),
            signature,
        })
    }

    /// Verify signature and freshness, returning the original claims
    ///
    /// The MAC check runs first and uses `ring`'s constant-time
    /// verification. Expiry is exclusive: an envelope exactly `max_age`
    /// old is still accepted, one second older is not.
    pub fn verify(&self, secret: &[u8], max_age: Duration) -> Result<StateClaims, StateError> {
        self.verify_at(secret, max_age, Utc::now())
    }

    fn verify_at(
        &self,
        secret: &[u8],
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<StateClaims, StateError> {
        let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
        let message = mac_input(&self.payload, self.issued_at, &self.nonce);
        hmac::verify(&key, &message, &self.signature)
            .map_err(|_| StateError::InvalidSignature)?;

        let age_secs = now.timestamp() - self.issued_at;
        if age_secs > max_age.num_seconds() {
            return Err(StateError::Expired);
        }

        let claims: StateClaims =
            serde_json::from_slice(&self.payload).map_err(|_| StateError::Malformed)?;

        // The envelope-level duplicates are covered by the signature, but
        // they must still agree with the signed claims.
        if claims.nonce != self.nonce || claims.issued_at.timestamp() != self.issued_at {
            return Err(StateError::Malformed);
        }

        Ok(claims)
    }
}

fn mac_input(payload: &[u8], issued_at: i64, nonce: &str) -> Vec<u8> {
    let mut message = Vec::with_capacity(payload.len() + 8 + nonce.len());
    message.extend_from_slice(payload);
    message.extend_from_slice(&issued_at.to_be_bytes());
    message.extend_from_slice(nonce.as_bytes());
    message
}

fn sign(secret: &[u8], payload: &[u8], issued_at: i64, nonce: &str) -> Vec<u8> {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let message = mac_input(payload, issued_at, nonce);
    hmac::sign(&key, &message).as_ref().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    fn test_claims() -> StateClaims {
        StateClaims::new("u1", "o1", 42).unwrap()
    }

    fn max_age() -> Duration {
        Duration::seconds(DEFAULT_STATE_MAX_AGE_SECS)
    }

    #[test]
    fn test_round_trip() {
        let claims = test_claims();
        let raw = encode(&claims, SECRET).unwrap().to_raw();

        let envelope = SignedStateEnvelope::decode(&raw).unwrap();
        let verified = envelope.verify(SECRET, max_age()).unwrap();

        assert_eq!(verified, claims);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = test_claims();
        let envelope = encode(&claims, SECRET).unwrap();

        let result = envelope.verify(b"another-secret-entirely-here....", max_age());
        assert_eq!(result.unwrap_err(), StateError::InvalidSignature);
    }

    #[test]
    fn test_flipped_signature_byte_rejected() {
        let claims = test_claims();
        let mut envelope = encode(&claims, SECRET).unwrap();
        envelope.signature[0] ^= 0x01;

        let result = envelope.verify(SECRET, max_age());
        assert_eq!(result.unwrap_err(), StateError::InvalidSignature);
    }

    #[test]
    fn test_flipped_payload_byte_rejected() {
        let claims = test_claims();
        let mut envelope = encode(&claims, SECRET).unwrap();
        envelope.payload[0] ^= 0x01;

        let result = envelope.verify(SECRET, max_age());
        assert_eq!(result.unwrap_err(), StateError::InvalidSignature);
    }

    #[test]
    fn test_tampered_raw_never_verifies() {
        let claims = test_claims();
        let raw = encode(&claims, SECRET).unwrap().to_raw();

        // Flip every position in turn; each corruption must fail at decode
        // or at verify, never succeed.
        for i in 0..raw.len() {
            let mut bytes = raw.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let Ok(tampered) = String::from_utf8(bytes) else {
                continue;
            };
            if tampered == raw {
                continue;
            }

            let result = SignedStateEnvelope::decode(&tampered)
                .and_then(|e| e.verify(SECRET, max_age()));
            assert!(result.is_err(), "tampering at index {} was accepted", i);
        }
    }

    #[test]
    fn test_nonce_swap_rejected() {
        // Re-signing with a different envelope-level nonce produces a valid
        // MAC, but the duplicate no longer agrees with the signed claims.
        let claims = test_claims();
        let mut envelope = encode(&claims, SECRET).unwrap();
        envelope.nonce = generate_nonce().unwrap();
        envelope.signature = sign(SECRET, &envelope.payload, envelope.issued_at, &envelope.nonce);

        let result = envelope.verify(SECRET, max_age());
        assert_eq!(result.unwrap_err(), StateError::Malformed);
    }

    #[test]
    fn test_decode_garbage() {
        for raw in ["", "garbage-state", "a.b.c", "a.b.c.d.e", "!!!.1.n.!!!"] {
            assert_eq!(
                SignedStateEnvelope::decode(raw).unwrap_err(),
                StateError::Malformed,
                "input {:?} should be malformed",
                raw
            );
        }
    }

    #[test]
    fn test_expiry_boundary() {
        let claims = test_claims();
        let envelope = encode(&claims, SECRET).unwrap();
        let issued = claims.issued_at;

        // Exactly max_age old: still accepted (exclusive rejection).
        let at_boundary = issued + max_age();
        assert!(envelope.verify_at(SECRET, max_age(), at_boundary).is_ok());

        // One second past: rejected.
        let past_boundary = at_boundary + Duration::seconds(1);
        assert_eq!(
            envelope
                .verify_at(SECRET, max_age(), past_boundary)
                .unwrap_err(),
            StateError::Expired
        );
    }

    #[test]
    fn test_old_claims_expired_via_public_verify() {
        let mut claims = test_claims();
        claims.issued_at = Utc::now() - Duration::seconds(DEFAULT_STATE_MAX_AGE_SECS + 60);
        let envelope = encode(&claims, SECRET).unwrap();

        assert_eq!(
            envelope.verify(SECRET, max_age()).unwrap_err(),
            StateError::Expired
        );
    }

    #[test]
    fn test_generate_nonce_properties() {
        let nonce = generate_nonce().unwrap();
        // 24 bytes -> 32 base64url characters, no padding
        assert_eq!(nonce.len(), 32);
        assert!(nonce
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generate_nonce_uniqueness() {
        let mut nonces = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(nonces.insert(generate_nonce().unwrap()), "duplicate nonce");
        }
        assert_eq!(nonces.len(), 100);
    }

    #[test]
    fn test_raw_form_is_url_safe() {
        let claims = test_claims();
        let raw = encode(&claims, SECRET).unwrap().to_raw();
        assert!(raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')));
    }
}
