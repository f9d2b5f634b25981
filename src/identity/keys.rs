//! Key rotation registry (C5).
//!
//! Holds per-agent `{active_key, rotating_keys_in_grace_period, revoked}`.
//! `verify` tries every non-revoked key that is active or still within its
//! grace period; the first match wins and is returned to the caller so callers
//! can audit which key authorized a given mandate.

use dashmap::DashMap;

use super::verifier::{SignedPayload, verify_signature};
use super::{AgentIdentity, SignatureAlgorithm};
use crate::error::{PlatformError, Result};
use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyState {
    Active,
    /// Still valid until `grace_until`.
    Rotating { grace_until: UnixTimestamp },
    Revoked,
}

#[derive(Debug, Clone)]
pub struct RegisteredKey {
    pub public_key: Vec<u8>,
    pub algorithm: SignatureAlgorithm,
    pub state: KeyState,
}

#[derive(Debug, Clone, Default)]
struct AgentKeys {
    domain: String,
    keys: Vec<RegisteredKey>,
}

/// Per-agent active + grace-period keys, consulted by the signature verifier.
#[derive(Debug, Default)]
pub struct KeyRotationRegistry {
    agents: DashMap<String, AgentKeys>,
}

impl KeyRotationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the first key for an agent. The key becomes `Active`.
    pub fn register(&self, identity: &AgentIdentity) {
        self.agents.insert(
            identity.agent_id.clone(),
            AgentKeys {
                domain: identity.domain.clone(),
                keys: vec![RegisteredKey {
                    public_key: identity.public_key.clone(),
                    algorithm: identity.algorithm,
                    state: KeyState::Active,
                }],
            },
        );
    }

    /// Rotates in a new active key. The previous active key moves to
    /// `Rotating` with a grace window; the new key becomes `Active`.
    pub fn rotate(
        &self,
        agent_id: &str,
        new_public_key: Vec<u8>,
        algorithm: SignatureAlgorithm,
        now: UnixTimestamp,
        grace_hours: u64,
    ) -> Result<()> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| PlatformError::NotFound(format!("agent {agent_id}")))?;
        for key in entry.keys.iter_mut() {
            if key.state == KeyState::Active {
                key.state = KeyState::Rotating {
                    grace_until: now + grace_hours * 3600,
                };
            }
        }
        entry.keys.push(RegisteredKey {
            public_key: new_public_key,
            algorithm,
            state: KeyState::Active,
        });
        Ok(())
    }

    /// Immediately revokes the current active key without a grace period.
    pub fn emergency_revoke(&self, agent_id: &str) -> Result<()> {
        let mut entry = self
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| PlatformError::NotFound(format!("agent {agent_id}")))?;
        for key in entry.keys.iter_mut() {
            if key.state == KeyState::Active || matches!(key.state, KeyState::Rotating { .. }) {
                key.state = KeyState::Revoked;
            }
        }
        Ok(())
    }

    /// Moves expired `Rotating` keys to `Revoked`. Call periodically.
    pub fn sweep_expired_grace_periods(&self, now: UnixTimestamp) {
        for mut entry in self.agents.iter_mut() {
            for key in entry.keys.iter_mut() {
                if let KeyState::Rotating { grace_until } = key.state {
                    if now >= grace_until {
                        key.state = KeyState::Revoked;
                    }
                }
            }
        }
    }

    /// Verifies `signature` over `payload` against any non-revoked key for
    /// `agent_id`, after first checking `mandate_domain` against the agent's
    /// registered domain (a hard reject regardless of key validity).
    pub fn verify(
        &self,
        agent_id: &str,
        mandate_domain: &str,
        payload: &SignedPayload,
        signature: &[u8],
        now: UnixTimestamp,
    ) -> Result<usize> {
        let entry = self
            .agents
            .get(agent_id)
            .ok_or_else(|| PlatformError::NotFound(format!("agent {agent_id}")))?;

        if entry.domain != mandate_domain {
            return Err(PlatformError::Validation(
                "mandate domain does not match agent identity domain".into(),
            ));
        }

        for (idx, key) in entry.keys.iter().enumerate() {
            let usable = match key.state {
                KeyState::Active => true,
                KeyState::Rotating { grace_until } => now < grace_until,
                KeyState::Revoked => false,
            };
            if !usable {
                continue;
            }
            if verify_signature(key.algorithm, &key.public_key, payload, signature).is_ok() {
                return Ok(idx);
            }
        }
        Err(PlatformError::Validation(
            "signature did not verify against any valid key".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use rand::rngs::OsRng;

    fn identity(agent_id: &str, signing_key: &SigningKey) -> AgentIdentity {
        AgentIdentity {
            agent_id: agent_id.to_string(),
            public_key: signing_key.verifying_key().as_bytes().to_vec(),
            algorithm: SignatureAlgorithm::Ed25519,
            domain: "sardis.dev".into(),
            kya_level: crate::approval::KyaLevel::None,
            created_at: UnixTimestamp(0),
        }
    }

    #[test]
    fn domain_mismatch_is_a_hard_reject() {
        let registry = KeyRotationRegistry::new();
        let signing_key = SigningKey::generate(&mut OsRng);
        registry.register(&identity("a1", &signing_key));

        let payload = SignedPayload {
            domain: "sardis.dev",
            nonce: "n",
            purpose: "payment",
            mandate_payload: b"x",
        };
        let sig = signing_key.sign(&payload.to_signable_bytes());
        let err = registry
            .verify("a1", "evil.example", &payload, &sig.to_bytes(), UnixTimestamp(1))
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn rotated_out_key_still_works_during_grace_then_fails_after() {
        let registry = KeyRotationRegistry::new();
        let old_key = SigningKey::generate(&mut OsRng);
        registry.register(&identity("a1", &old_key));

        let new_key = SigningKey::generate(&mut OsRng);
        registry
            .rotate("a1", new_key.verifying_key().as_bytes().to_vec(), SignatureAlgorithm::Ed25519, UnixTimestamp(1000), 24)
            .unwrap();

        let payload = SignedPayload {
            domain: "sardis.dev",
            nonce: "n",
            purpose: "payment",
            mandate_payload: b"x",
        };
        let sig = old_key.sign(&payload.to_signable_bytes());

        // still within grace window
        assert!(
            registry
                .verify("a1", "sardis.dev", &payload, &sig.to_bytes(), UnixTimestamp(1000 + 3600))
                .is_ok()
        );

        // past grace window
        registry.sweep_expired_grace_periods(UnixTimestamp(1000 + 24 * 3600 + 1));
        assert!(
            registry
                .verify("a1", "sardis.dev", &payload, &sig.to_bytes(), UnixTimestamp(1000 + 24 * 3600 + 2))
                .is_err()
        );
    }

    #[test]
    fn emergency_revoke_is_immediate() {
        let registry = KeyRotationRegistry::new();
        let key = SigningKey::generate(&mut OsRng);
        registry.register(&identity("a1", &key));
        registry.emergency_revoke("a1").unwrap();

        let payload = SignedPayload {
            domain: "sardis.dev",
            nonce: "n",
            purpose: "payment",
            mandate_payload: b"x",
        };
        let sig = key.sign(&payload.to_signable_bytes());
        assert!(
            registry
                .verify("a1", "sardis.dev", &payload, &sig.to_bytes(), UnixTimestamp(1))
                .is_err()
        );
    }
}
