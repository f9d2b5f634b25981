//! Policy attestation (C7).
//!
//! Produces a content hash and Merkle root over a policy's canonical snapshot
//! so that agents and auditors can verify a specific policy version governed
//! a transaction without trusting the store to report it honestly.

use sha2::{Digest, Sha256};

use super::SpendingPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyAttestation {
    pub policy_id: String,
    pub content_hash: String,
    pub merkle_root: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Hashes the policy's canonical (counter-excluded) snapshot.
pub fn content_hash(policy: &SpendingPolicy) -> String {
    let canonical = policy.canonical_snapshot();
    let serialized = serde_json::to_vec(&canonical).expect("canonical snapshot is always serializable");
    sha256_hex(&serialized)
}

/// Builds a pairwise-sorted Merkle root over a set of leaf hashes.
///
/// Sorting each pair before concatenation makes the root order-independent,
/// so two attestors hashing the same leaf set in different orders agree.
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return sha256_hex(b"");
    }
    let mut level: Vec<String> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let combined = if pair.len() == 2 {
                let (a, b) = if pair[0] <= pair[1] {
                    (&pair[0], &pair[1])
                } else {
                    (&pair[1], &pair[0])
                };
                format!("{a}{b}")
            } else {
                pair[0].clone()
            };
            next.push(sha256_hex(combined.as_bytes()));
        }
        level = next;
    }
    level.into_iter().next().expect("non-empty level has one element")
}

/// Attests a single policy: its own content hash doubles as its Merkle root
/// when attested alone, or contributes one leaf when attested alongside
/// sibling policies via [`merkle_root`].
pub fn attest(policy: &SpendingPolicy) -> PolicyAttestation {
    let hash = content_hash(policy);
    PolicyAttestation {
        policy_id: policy.policy_id.clone(),
        content_hash: hash.clone(),
        merkle_root: merkle_root(&[hash]),
    }
}
