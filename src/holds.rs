//! Holds / pre-authorization manager (C8).
//!
//! A hold reserves spend against a policy/wallet before the underlying
//! payment is dispatched. Its lifecycle is strictly one-way: once a hold
//! leaves `Active` it never returns, and `capture` is idempotent on
//! `capture_tx_id` so a retried capture request never double-spends.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};
use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Captured,
    Voided,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    pub hold_id: String,
    pub agent_id: String,
    pub wallet_id: String,
    pub amount_minor: u64,
    pub currency: String,
    pub status: HoldStatus,
    pub merchant_id: Option<String>,
    pub purpose: Option<String>,
    pub capture_tx_id: Option<String>,
    pub captured_amount: Option<u64>,
    pub captured_at: Option<UnixTimestamp>,
    pub voided_at: Option<UnixTimestamp>,
    pub expires_at: UnixTimestamp,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

impl Hold {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hold_id: String,
        agent_id: String,
        wallet_id: String,
        amount_minor: u64,
        currency: String,
        merchant_id: Option<String>,
        purpose: Option<String>,
        max_hold_hours: u32,
        now: UnixTimestamp,
    ) -> Result<Self> {
        if amount_minor == 0 {
            return Err(PlatformError::Validation("hold amount_minor must be greater than zero".into()));
        }
        Ok(Hold {
            hold_id,
            agent_id,
            wallet_id,
            amount_minor,
            currency,
            status: HoldStatus::Active,
            merchant_id,
            purpose,
            capture_tx_id: None,
            captured_amount: None,
            captured_at: None,
            voided_at: None,
            expires_at: now + (max_hold_hours as u64 * 3600),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_expired(&self, now: UnixTimestamp) -> bool {
        now >= self.expires_at
    }
}

/// In-memory hold store. A persistent `HoldRepository` (C16) wraps the same
/// transition logic against a real database; this is the reference
/// implementation used by tests and dev deployments.
#[derive(Debug, Default)]
pub struct HoldManager {
    holds: DashMap<String, Hold>,
}

impl HoldManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, hold: Hold) {
        self.holds.insert(hold.hold_id.clone(), hold);
    }

    pub fn get(&self, hold_id: &str) -> Option<Hold> {
        self.holds.get(hold_id).map(|h| h.clone())
    }

    /// Captures all or part of an active hold. Idempotent: a second call with
    /// the same `capture_tx_id` against an already-captured hold succeeds
    /// without re-applying the transition; a different `capture_tx_id` is a
    /// conflict. `capture_amount` must not exceed the hold's reserved amount.
    pub fn capture(&self, hold_id: &str, capture_tx_id: &str, capture_amount: u64, now: UnixTimestamp) -> Result<Hold> {
        let mut entry = self
            .holds
            .get_mut(hold_id)
            .ok_or_else(|| PlatformError::NotFound(format!("hold {hold_id}")))?;

        match entry.status {
            HoldStatus::Captured => {
                if entry.capture_tx_id.as_deref() == Some(capture_tx_id) {
                    Ok(entry.clone())
                } else {
                    Err(PlatformError::Conflict(format!(
                        "hold {hold_id} already captured under a different tx"
                    )))
                }
            }
            HoldStatus::Voided => Err(PlatformError::Conflict(format!("hold {hold_id} is voided"))),
            HoldStatus::Expired => Err(PlatformError::Conflict(format!("hold {hold_id} has expired"))),
            HoldStatus::Active => {
                if entry.is_expired(now) {
                    entry.status = HoldStatus::Expired;
                    entry.updated_at = now;
                    return Err(PlatformError::Conflict(format!("hold {hold_id} has expired")));
                }
                if capture_amount == 0 || capture_amount > entry.amount_minor {
                    return Err(PlatformError::Validation(format!(
                        "capture_amount must be > 0 and <= hold {hold_id}'s reserved amount"
                    )));
                }
                entry.status = HoldStatus::Captured;
                entry.capture_tx_id = Some(capture_tx_id.to_string());
                entry.captured_amount = Some(capture_amount);
                entry.captured_at = Some(now);
                entry.updated_at = now;
                Ok(entry.clone())
            }
        }
    }

    pub fn void(&self, hold_id: &str, now: UnixTimestamp) -> Result<Hold> {
        let mut entry = self
            .holds
            .get_mut(hold_id)
            .ok_or_else(|| PlatformError::NotFound(format!("hold {hold_id}")))?;
        if entry.status != HoldStatus::Active {
            return Err(PlatformError::Conflict(format!(
                "hold {hold_id} is not active, cannot void"
            )));
        }
        entry.status = HoldStatus::Voided;
        entry.voided_at = Some(now);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    /// All holds reserved against `wallet_id`, newest first.
    pub fn list_for_wallet(&self, wallet_id: &str) -> Vec<Hold> {
        let mut holds: Vec<Hold> = self
            .holds
            .iter()
            .filter(|h| h.wallet_id == wallet_id)
            .map(|h| h.clone())
            .collect();
        holds.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        holds
    }

    /// Sweeps all active-but-expired holds to `Expired`. Returns the swept ids.
    pub fn sweep_expired(&self, now: UnixTimestamp) -> Vec<String> {
        let mut swept = Vec::new();
        for mut entry in self.holds.iter_mut() {
            if entry.status == HoldStatus::Active && entry.is_expired(now) {
                entry.status = HoldStatus::Expired;
                entry.updated_at = now;
                swept.push(entry.hold_id.clone());
            }
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_hold(now: UnixTimestamp) -> (HoldManager, String) {
        let manager = HoldManager::new();
        let hold = Hold::new(
            "hold_1".into(),
            "agent_1".into(),
            "wallet_1".into(),
            1_000,
            "USDC".into(),
            Some("merchant_1".into()),
            Some("checkout".into()),
            24,
            now,
        )
        .unwrap();
        manager.create(hold);
        (manager, "hold_1".into())
    }

    #[test]
    fn capture_is_idempotent_on_the_same_tx_id() {
        let now = UnixTimestamp(1_000);
        let (manager, hold_id) = manager_with_hold(now);
        let first = manager.capture(&hold_id, "tx_1", 1_000, now).unwrap();
        let second = manager.capture(&hold_id, "tx_1", 1_000, now).unwrap();
        assert_eq!(first.status, HoldStatus::Captured);
        assert_eq!(second.capture_tx_id, first.capture_tx_id);
    }

    #[test]
    fn capture_with_a_different_tx_id_conflicts() {
        let now = UnixTimestamp(1_000);
        let (manager, hold_id) = manager_with_hold(now);
        manager.capture(&hold_id, "tx_1", 1_000, now).unwrap();
        let err = manager.capture(&hold_id, "tx_2", 1_000, now).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn partial_capture_records_the_captured_amount() {
        let now = UnixTimestamp(1_000);
        let (manager, hold_id) = manager_with_hold(now);
        let captured = manager.capture(&hold_id, "tx_1", 400, now).unwrap();
        assert_eq!(captured.captured_amount, Some(400));
        assert_eq!(captured.captured_at, Some(now));
    }

    #[test]
    fn capture_amount_exceeding_the_hold_is_rejected() {
        let now = UnixTimestamp(1_000);
        let (manager, hold_id) = manager_with_hold(now);
        let err = manager.capture(&hold_id, "tx_1", 1_001, now).unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn hold_creation_rejects_a_zero_amount() {
        let now = UnixTimestamp(1_000);
        let err = Hold::new(
            "hold_2".into(),
            "agent_1".into(),
            "wallet_1".into(),
            0,
            "USDC".into(),
            None,
            None,
            24,
            now,
        )
        .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn voided_hold_cannot_be_captured() {
        let now = UnixTimestamp(1_000);
        let (manager, hold_id) = manager_with_hold(now);
        manager.void(&hold_id, now).unwrap();
        let err = manager.capture(&hold_id, "tx_1", 1_000, now).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn expired_hold_cannot_be_captured() {
        let now = UnixTimestamp(0);
        let (manager, hold_id) = manager_with_hold(now);
        let later = now + (25 * 3600);
        let err = manager.capture(&hold_id, "tx_1", 1_000, later).unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert_eq!(manager.get(&hold_id).unwrap().status, HoldStatus::Expired);
    }

    #[test]
    fn list_for_wallet_returns_only_matching_holds() {
        let now = UnixTimestamp(1_000);
        let (manager, _) = manager_with_hold(now);
        let other = Hold::new(
            "hold_2".into(),
            "agent_1".into(),
            "wallet_2".into(),
            500,
            "USDC".into(),
            None,
            None,
            24,
            now,
        )
        .unwrap();
        manager.create(other);
        let holds = manager.list_for_wallet("wallet_1");
        assert_eq!(holds.len(), 1);
        assert_eq!(holds[0].wallet_id, "wallet_1");
    }

    #[test]
    fn sweep_expired_transitions_only_active_expired_holds() {
        let now = UnixTimestamp(0);
        let (manager, hold_id) = manager_with_hold(now);
        let swept = manager.sweep_expired(now + (25 * 3600));
        assert_eq!(swept, vec![hold_id]);
    }
}
