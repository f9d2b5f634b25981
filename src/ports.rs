//! Port traits for external collaborators (§9 "Duck-typed ports").
//!
//! The core never talks to a signer, chain RPC, compliance service, or policy
//! store directly — only through these traits. Production adapters for the
//! real MPC signer, chain RPC clients, and compliance vendor live outside this
//! crate; the `Simulated*` implementations here exist so the orchestrator,
//! policy engine, and settlement engine are fully exercised in tests without
//! real infrastructure, mirroring the source's "simulated execution path"
//! that spec.md §9 asks to keep as a concrete implementation of the same
//! interface.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::mandate::PaymentMandate;

#[derive(Debug, Clone)]
pub struct ChainReceipt {
    pub tx_hash: String,
    pub block: Option<u64>,
    pub confirmed: bool,
}

/// Dispatches a verified payment mandate on-chain (or to the virtual-card rail).
#[async_trait]
pub trait ChainExecutorPort: Send + Sync {
    async fn dispatch_payment(&self, payment: &PaymentMandate) -> Result<ChainReceipt>;
}

/// Balance and basic RPC reads, consumed by the policy engine's step 7.
#[async_trait]
pub trait RpcPort: Send + Sync {
    async fn get_balance(&self, wallet_id: &str, chain: &str, token: &str) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct ComplianceVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub provider: Option<String>,
    pub rule_id: Option<String>,
}

/// KYC/sanctions preflight, consumed only for a pass/fail verdict.
#[async_trait]
pub trait CompliancePort: Send + Sync {
    async fn preflight(&self, payment: &PaymentMandate) -> Result<ComplianceVerdict>;
}

/// DB-authoritative spend counters, consumed by the policy engine when
/// provided (step 6 falls back to in-memory counters otherwise).
#[async_trait]
pub trait PolicyStatePort: Send + Sync {
    async fn spent_total(&self, agent_id: &str) -> Result<u64>;
    async fn window_spent(&self, agent_id: &str, window: &str) -> Result<u64>;
    /// Returns `(within_limits, reason)` for velocity (rapid-fire count/window).
    async fn check_velocity(&self, agent_id: &str) -> Result<(bool, Option<String>)>;
    async fn record_spend(&self, agent_id: &str, amount: u64) -> Result<()>;
}

/// Turns a verified mandate into a chain signature. Out of scope per spec.md
/// §1; only the interface is specified.
#[async_trait]
pub trait MpcSignerPort: Send + Sync {
    async fn sign_and_submit(&self, payment: &PaymentMandate) -> Result<ChainReceipt>;
}

// ---------------------------------------------------------------------------
// Simulated implementations
// ---------------------------------------------------------------------------

/// Deterministic tx hashes derived from the mandate id, matching the source's
/// "simulated execution path" contract: same interface, no real chain I/O.
#[derive(Debug, Default)]
pub struct SimulatedChainExecutor;

#[async_trait]
impl ChainExecutorPort for SimulatedChainExecutor {
    async fn dispatch_payment(&self, payment: &PaymentMandate) -> Result<ChainReceipt> {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(payment.core.mandate_id.as_bytes());
        Ok(ChainReceipt {
            tx_hash: format!("0x{}", hex::encode(digest)),
            block: Some(1),
            confirmed: true,
        })
    }
}

#[async_trait]
impl MpcSignerPort for SimulatedChainExecutor {
    async fn sign_and_submit(&self, payment: &PaymentMandate) -> Result<ChainReceipt> {
        self.dispatch_payment(payment).await
    }
}

/// In-memory balance table for tests and local development.
#[derive(Debug, Default)]
pub struct SimulatedRpc {
    balances: DashMap<(String, String, String), u64>,
}

impl SimulatedRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, wallet_id: &str, chain: &str, token: &str, minor: u64) {
        self.balances.insert(
            (wallet_id.to_string(), chain.to_string(), token.to_string()),
            minor,
        );
    }
}

#[async_trait]
impl RpcPort for SimulatedRpc {
    async fn get_balance(&self, wallet_id: &str, chain: &str, token: &str) -> Result<u64> {
        Ok(self
            .balances
            .get(&(wallet_id.to_string(), chain.to_string(), token.to_string()))
            .map(|v| *v)
            .unwrap_or(0))
    }
}

/// Always-pass compliance stub for dev/sandbox environments.
#[derive(Debug, Default)]
pub struct PassthroughCompliance;

#[async_trait]
impl CompliancePort for PassthroughCompliance {
    async fn preflight(&self, _payment: &PaymentMandate) -> Result<ComplianceVerdict> {
        Ok(ComplianceVerdict {
            allowed: true,
            reason: None,
            provider: Some("passthrough".into()),
            rule_id: None,
        })
    }
}

/// In-memory policy state: spend counters and a naive sliding-window velocity
/// check, used by the policy engine's tests and by dev deployments that have
/// no DB-backed policy store.
#[derive(Debug, Default)]
pub struct InMemoryPolicyState {
    spent_total: DashMap<String, u64>,
    window_spent: DashMap<(String, String), u64>,
    recent_tx_timestamps: DashMap<String, Vec<u64>>,
    velocity_max_count: u32,
    velocity_window_seconds: u64,
}

impl InMemoryPolicyState {
    pub fn new(velocity_max_count: u32, velocity_window_seconds: u64) -> Self {
        Self {
            velocity_max_count,
            velocity_window_seconds,
            ..Default::default()
        }
    }

    pub fn record_tx_timestamp(&self, agent_id: &str, now: u64) {
        let mut entry = self.recent_tx_timestamps.entry(agent_id.to_string()).or_default();
        entry.retain(|ts| now.saturating_sub(*ts) <= self.velocity_window_seconds);
        entry.push(now);
    }
}

#[async_trait]
impl PolicyStatePort for InMemoryPolicyState {
    async fn spent_total(&self, agent_id: &str) -> Result<u64> {
        Ok(self.spent_total.get(agent_id).map(|v| *v).unwrap_or(0))
    }

    async fn window_spent(&self, agent_id: &str, window: &str) -> Result<u64> {
        Ok(self
            .window_spent
            .get(&(agent_id.to_string(), window.to_string()))
            .map(|v| *v)
            .unwrap_or(0))
    }

    async fn check_velocity(&self, agent_id: &str) -> Result<(bool, Option<String>)> {
        let count = self
            .recent_tx_timestamps
            .get(agent_id)
            .map(|v| v.len() as u32)
            .unwrap_or(0);
        if self.velocity_max_count > 0 && count >= self.velocity_max_count {
            Ok((false, Some("velocity_exceeded".into())))
        } else {
            Ok((true, None))
        }
    }

    async fn record_spend(&self, agent_id: &str, amount: u64) -> Result<()> {
        *self.spent_total.entry(agent_id.to_string()).or_insert(0) += amount;
        for window in ["daily", "weekly", "monthly"] {
            *self
                .window_spent
                .entry((agent_id.to_string(), window.to_string()))
                .or_insert(0) += amount;
        }
        Ok(())
    }
}

/// Double-entry ledger port, consumed by the orchestrator and settlement
/// engine so both can share one append path (C10 is the only implementation
/// today, but the orchestrator depends on the trait, not the struct).
#[async_trait]
pub trait LedgerPort: Send + Sync {
    async fn append(
        &self,
        debit_account: &str,
        credit_account: &str,
        amount_minor: u64,
        currency: &str,
        chain: Option<&str>,
        chain_tx_hash: Option<&str>,
    ) -> Result<String>;
}
