//! Signature verification over a domain/nonce/purpose-bound payload.

use ed25519_dalek::{Signature as Ed25519Signature, Verifier as Ed25519Verifier, VerifyingKey};
use p256::ecdsa::signature::Verifier as P256Verifier;
use p256::ecdsa::{Signature as P256Signature, VerifyingKey as P256VerifyingKey};
use sha2::{Digest, Sha256};

use super::SignatureAlgorithm;
use crate::error::{PlatformError, Result};

/// The exact byte sequence that gets signed: `H(domain) | H(nonce) | H(purpose) | payload`.
pub struct SignedPayload<'a> {
    pub domain: &'a str,
    pub nonce: &'a str,
    pub purpose: &'a str,
    pub mandate_payload: &'a [u8],
}

impl SignedPayload<'_> {
    pub fn to_signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(96 + self.mandate_payload.len());
        buf.extend_from_slice(&Sha256::digest(self.domain.as_bytes()));
        buf.extend_from_slice(&Sha256::digest(self.nonce.as_bytes()));
        buf.extend_from_slice(&Sha256::digest(self.purpose.as_bytes()));
        buf.extend_from_slice(self.mandate_payload);
        buf
    }
}

/// Verifies `signature` over `payload` against `public_key` using `algorithm`.
///
/// Callers are expected to have already checked the mandate's `domain` against
/// the `AgentIdentity.domain` before calling this — that check is a hard reject
/// regardless of key validity and lives in the key-rotation lookup (C5), since
/// it must happen before any key is even attempted.
pub fn verify_signature(
    algorithm: SignatureAlgorithm,
    public_key: &[u8],
    payload: &SignedPayload,
    signature: &[u8],
) -> Result<()> {
    let message = payload.to_signable_bytes();
    match algorithm {
        SignatureAlgorithm::Ed25519 => {
            let key_bytes: [u8; 32] = public_key
                .try_into()
                .map_err(|_| PlatformError::Validation("invalid ed25519 public key".into()))?;
            let verifying_key = VerifyingKey::from_bytes(&key_bytes)
                .map_err(|e| PlatformError::Validation(format!("invalid ed25519 key: {e}")))?;
            let sig_bytes: [u8; 64] = signature
                .try_into()
                .map_err(|_| PlatformError::Validation("invalid ed25519 signature length".into()))?;
            let signature = Ed25519Signature::from_bytes(&sig_bytes);
            verifying_key
                .verify(&message, &signature)
                .map_err(|_| PlatformError::Validation("signature verification failed".into()))
        }
        SignatureAlgorithm::EcdsaP256 => {
            let verifying_key = P256VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|e| PlatformError::Validation(format!("invalid p256 key: {e}")))?;
            let signature = P256Signature::from_der(signature)
                .or_else(|_| P256Signature::from_slice(signature))
                .map_err(|e| PlatformError::Validation(format!("invalid p256 signature: {e}")))?;
            verifying_key
                .verify(&message, &signature)
                .map_err(|_| PlatformError::Validation("signature verification failed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn ed25519_round_trips() {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let payload = SignedPayload {
            domain: "sardis.dev",
            nonce: "n-1",
            purpose: "payment",
            mandate_payload: b"{\"amount\":100}",
        };
        let message = payload.to_signable_bytes();
        let signature = signing_key.sign(&message);
        let result = verify_signature(
            SignatureAlgorithm::Ed25519,
            signing_key.verifying_key().as_bytes(),
            &payload,
            &signature.to_bytes(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let payload = SignedPayload {
            domain: "sardis.dev",
            nonce: "n-1",
            purpose: "payment",
            mandate_payload: b"{\"amount\":100}",
        };
        let message = payload.to_signable_bytes();
        let signature = signing_key.sign(&message);

        let tampered = SignedPayload {
            mandate_payload: b"{\"amount\":999}",
            ..payload
        };
        let result = verify_signature(
            SignatureAlgorithm::Ed25519,
            signing_key.verifying_key().as_bytes(),
            &tampered,
            &signature.to_bytes(),
        );
        assert!(result.is_err());
    }
}
