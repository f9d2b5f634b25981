//! A2A escrow state machine (C11).
//!
//! Agent-to-agent payments that need a delivery confirmation step before
//! funds move sit in escrow. The state machine is fail-closed: any
//! transition not explicitly listed in `allowed_transitions` is rejected as
//! `InvalidTransition`, surfaced here as a `Conflict`.

pub mod settlement;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};
use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowState {
    Created,
    Funded,
    Delivered,
    Released,
    Refunded,
    Disputed,
    Expired,
}

impl EscrowState {
    fn allowed_next(self) -> &'static [EscrowState] {
        use EscrowState::*;
        match self {
            Created => &[Funded, Expired],
            Funded => &[Delivered, Refunded, Disputed, Expired],
            Delivered => &[Released, Disputed],
            Disputed => &[Released, Refunded],
            Expired => &[Refunded],
            Released | Refunded => &[],
        }
    }

    fn is_terminal(self) -> bool {
        matches!(self, EscrowState::Released | EscrowState::Refunded)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escrow {
    pub escrow_id: String,
    pub payer_agent_id: String,
    pub payee_agent_id: String,
    pub amount_minor: u64,
    pub token: String,
    pub chain: String,
    pub state: EscrowState,
    pub created_at: UnixTimestamp,
    pub expires_at: UnixTimestamp,
    pub funded_at: Option<UnixTimestamp>,
    pub funding_tx_hash: Option<String>,
    pub delivery_proof: Option<String>,
    pub delivered_at: Option<UnixTimestamp>,
    pub released_at: Option<UnixTimestamp>,
    pub release_tx_hash: Option<String>,
    pub refunded_at: Option<UnixTimestamp>,
    pub refund_tx_hash: Option<String>,
    pub refund_reason: Option<String>,
    pub disputed_at: Option<UnixTimestamp>,
    pub dispute_reason: Option<String>,
}

impl Escrow {
    fn transition(&mut self, next: EscrowState) -> Result<()> {
        if !self.state.allowed_next().contains(&next) {
            return Err(PlatformError::Conflict(format!(
                "invalid escrow transition {:?} -> {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct EscrowManager {
    escrows: DashMap<String, Escrow>,
}

impl EscrowManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_escrow(
        &self,
        escrow_id: String,
        payer_agent_id: String,
        payee_agent_id: String,
        amount_minor: u64,
        token: String,
        chain: String,
        timeout_seconds: u64,
        now: UnixTimestamp,
    ) -> Result<Escrow> {
        if amount_minor == 0 {
            return Err(PlatformError::Validation("escrow amount must be positive".into()));
        }
        if payer_agent_id == payee_agent_id {
            return Err(PlatformError::Validation("escrow payer and payee must differ".into()));
        }
        let escrow = Escrow {
            escrow_id: escrow_id.clone(),
            payer_agent_id,
            payee_agent_id,
            amount_minor,
            token,
            chain,
            state: EscrowState::Created,
            created_at: now,
            expires_at: now + timeout_seconds,
            funded_at: None,
            funding_tx_hash: None,
            delivery_proof: None,
            delivered_at: None,
            released_at: None,
            release_tx_hash: None,
            refunded_at: None,
            refund_tx_hash: None,
            refund_reason: None,
            disputed_at: None,
            dispute_reason: None,
        };
        self.escrows.insert(escrow_id, escrow.clone());
        Ok(escrow)
    }

    pub fn get(&self, escrow_id: &str) -> Option<Escrow> {
        self.escrows.get(escrow_id).map(|e| e.clone())
    }

    fn with_escrow<F>(&self, escrow_id: &str, f: F) -> Result<Escrow>
    where
        F: FnOnce(&mut Escrow) -> Result<()>,
    {
        let mut entry = self
            .escrows
            .get_mut(escrow_id)
            .ok_or_else(|| PlatformError::NotFound(format!("escrow {escrow_id}")))?;
        f(&mut entry)?;
        Ok(entry.clone())
    }

    pub fn fund_escrow(&self, escrow_id: &str, tx_hash: &str, now: UnixTimestamp) -> Result<Escrow> {
        self.with_escrow(escrow_id, |escrow| {
            escrow.transition(EscrowState::Funded)?;
            escrow.funded_at = Some(now);
            escrow.funding_tx_hash = Some(tx_hash.to_string());
            Ok(())
        })
    }

    pub fn confirm_delivery(&self, escrow_id: &str, proof: &str, now: UnixTimestamp) -> Result<Escrow> {
        self.with_escrow(escrow_id, |escrow| {
            escrow.transition(EscrowState::Delivered)?;
            escrow.delivery_proof = Some(proof.to_string());
            escrow.delivered_at = Some(now);
            Ok(())
        })
    }

    pub fn release_escrow(&self, escrow_id: &str, now: UnixTimestamp) -> Result<Escrow> {
        self.with_escrow(escrow_id, |escrow| {
            escrow.transition(EscrowState::Released)?;
            escrow.released_at = Some(now);
            Ok(())
        })
    }

    pub fn dispute_escrow(&self, escrow_id: &str, reason: &str, now: UnixTimestamp) -> Result<Escrow> {
        self.with_escrow(escrow_id, |escrow| {
            escrow.transition(EscrowState::Disputed)?;
            escrow.disputed_at = Some(now);
            escrow.dispute_reason = Some(reason.to_string());
            Ok(())
        })
    }

    pub fn refund_escrow(&self, escrow_id: &str, reason: &str, now: UnixTimestamp) -> Result<Escrow> {
        self.with_escrow(escrow_id, |escrow| {
            escrow.transition(EscrowState::Refunded)?;
            escrow.refunded_at = Some(now);
            escrow.refund_reason = Some(reason.to_string());
            Ok(())
        })
    }

    /// Atomically moves every `CREATED`/`FUNDED` escrow past `expires_at` to
    /// `EXPIRED`. Returns the swept ids.
    pub fn check_expired_escrows(&self, now: UnixTimestamp) -> Vec<String> {
        let mut swept = Vec::new();
        for mut entry in self.escrows.iter_mut() {
            if matches!(entry.state, EscrowState::Created | EscrowState::Funded) && now >= entry.expires_at {
                entry.state = EscrowState::Expired;
                swept.push(entry.escrow_id.clone());
            }
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (EscrowManager, UnixTimestamp) {
        let manager = EscrowManager::new();
        let now = UnixTimestamp(1_000);
        manager
            .create_escrow(
                "escrow_1".into(),
                "agent_1".into(),
                "agent_2".into(),
                10_000,
                "USDC".into(),
                "base".into(),
                3600,
                now,
            )
            .unwrap();
        (manager, now)
    }

    #[test]
    fn full_lifecycle_reaches_released() {
        let (manager, now) = manager();
        manager.fund_escrow("escrow_1", "0x1", now).unwrap();
        manager.confirm_delivery("escrow_1", "hash", now).unwrap();
        let released = manager.release_escrow("escrow_1", now).unwrap();
        assert_eq!(released.state, EscrowState::Released);
    }

    #[test]
    fn release_from_created_is_rejected() {
        let (manager, now) = manager();
        let err = manager.release_escrow("escrow_1", now).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn expired_escrow_can_only_be_refunded() {
        let (manager, now) = manager();
        let later = now + 3601;
        let swept = manager.check_expired_escrows(later);
        assert_eq!(swept, vec!["escrow_1".to_string()]);
        let err = manager.release_escrow("escrow_1", later).unwrap_err();
        assert_eq!(err.code(), "conflict");
        let refunded = manager.refund_escrow("escrow_1", "timed out", later).unwrap();
        assert_eq!(refunded.state, EscrowState::Refunded);
    }

    #[test]
    fn released_and_refunded_are_terminal() {
        assert!(EscrowState::Released.is_terminal());
        assert!(EscrowState::Refunded.is_terminal());
        assert!(EscrowState::Released.allowed_next().is_empty());
    }

    #[test]
    fn rejects_zero_amount_and_self_dealing() {
        let manager = EscrowManager::new();
        let now = UnixTimestamp(0);
        assert!(manager
            .create_escrow("e1".into(), "a1".into(), "a2".into(), 0, "USDC".into(), "base".into(), 60, now)
            .is_err());
        assert!(manager
            .create_escrow("e2".into(), "a1".into(), "a1".into(), 100, "USDC".into(), "base".into(), 60, now)
            .is_err());
    }

    #[test]
    fn disputed_can_release_or_refund() {
        let (manager, now) = manager();
        manager.fund_escrow("escrow_1", "0x1", now).unwrap();
        manager.dispute_escrow("escrow_1", "quality issue", now).unwrap();
        let released = manager.release_escrow("escrow_1", now).unwrap();
        assert_eq!(released.state, EscrowState::Released);
    }
}
