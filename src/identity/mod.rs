//! Agent identity & signature verification (C4).
//!
//! The signed payload is `H(domain) | H(nonce) | H(purpose) | serialized_mandate_payload`,
//! verified against whichever key in the agent's [`crate::identity::keys`] registry is
//! active or still within its rotation grace period. Domain mismatch is a hard
//! reject before any key is even tried.

pub mod keys;
pub mod verifier;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureAlgorithm {
    Ed25519,
    EcdsaP256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub public_key: Vec<u8>,
    pub algorithm: SignatureAlgorithm,
    pub domain: String,
    #[serde(default)]
    pub kya_level: crate::approval::KyaLevel,
    pub created_at: crate::timestamp::UnixTimestamp,
}

pub use verifier::{SignedPayload, verify_signature};
