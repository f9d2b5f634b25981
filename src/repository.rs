//! Repository contracts (C16).
//!
//! Every persisted aggregate gets a narrow trait (`get`/`upsert`/`list_for_agent`
//! as applicable) so the rest of the crate depends on an interface rather than
//! a concrete store. The in-memory adapters here back tests and dev
//! deployments; a Postgres-backed adapter outside this crate implements the
//! same traits against `database_url`.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::{PlatformError, Result};
use crate::escrow::Escrow;
use crate::escrow::settlement::Settlement;
use crate::holds::Hold;
use crate::identity::AgentIdentity;
use crate::ledger::LedgerEntry;
use crate::policy::SpendingPolicy;
use crate::wallet::Wallet;
use crate::webhooks::WebhookSubscription;

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn get(&self, agent_id: &str) -> Result<AgentIdentity>;
    async fn upsert(&self, agent: AgentIdentity) -> Result<()>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn get(&self, wallet_id: &str) -> Result<Wallet>;
    async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<Wallet>>;
    async fn upsert(&self, wallet: Wallet) -> Result<()>;
}

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    async fn get(&self, policy_id: &str) -> Result<SpendingPolicy>;
    async fn get_for_agent(&self, agent_id: &str) -> Result<SpendingPolicy>;
    async fn upsert(&self, policy: SpendingPolicy) -> Result<()>;
}

#[async_trait]
pub trait HoldRepository: Send + Sync {
    async fn get(&self, hold_id: &str) -> Result<Hold>;
    async fn list_for_wallet(&self, wallet_id: &str) -> Result<Vec<Hold>>;
    async fn upsert(&self, hold: Hold) -> Result<()>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    async fn get(&self, subscription_id: &str) -> Result<WebhookSubscription>;
    async fn list_matching(&self, topic: &str) -> Result<Vec<WebhookSubscription>>;
    async fn upsert(&self, subscription: WebhookSubscription) -> Result<()>;
}

#[async_trait]
pub trait EscrowRepository: Send + Sync {
    async fn get(&self, escrow_id: &str) -> Result<Escrow>;
    async fn upsert(&self, escrow: Escrow) -> Result<()>;
}

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    async fn get(&self, settlement_id: &str) -> Result<Settlement>;
    async fn list_for_escrow(&self, escrow_id: &str) -> Result<Vec<Settlement>>;
    async fn upsert(&self, settlement: Settlement) -> Result<()>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn entries_for_tx(&self, tx_id: &str) -> Result<Vec<LedgerEntry>>;
    async fn append(&self, entries: Vec<LedgerEntry>) -> Result<()>;
}

macro_rules! in_memory_repo {
    ($name:ident, $value:ty, $id_field:ident: $id_ty:ty) => {
        #[derive(Debug, Default)]
        pub struct $name {
            rows: DashMap<$id_ty, $value>,
        }

        impl $name {
            pub fn new() -> Self {
                Self::default()
            }
        }
    };
}

in_memory_repo!(InMemoryAgentRepository, AgentIdentity, agent_id: String);

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn get(&self, agent_id: &str) -> Result<AgentIdentity> {
        self.rows
            .get(agent_id)
            .map(|a| a.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("agent {agent_id}")))
    }

    async fn upsert(&self, agent: AgentIdentity) -> Result<()> {
        self.rows.insert(agent.agent_id.clone(), agent);
        Ok(())
    }
}

in_memory_repo!(InMemoryWalletRepository, Wallet, wallet_id: String);

#[async_trait]
impl WalletRepository for InMemoryWalletRepository {
    async fn get(&self, wallet_id: &str) -> Result<Wallet> {
        self.rows
            .get(wallet_id)
            .map(|w| w.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("wallet {wallet_id}")))
    }

    async fn list_for_agent(&self, agent_id: &str) -> Result<Vec<Wallet>> {
        Ok(self
            .rows
            .iter()
            .filter(|w| w.agent_id == agent_id)
            .map(|w| w.clone())
            .collect())
    }

    async fn upsert(&self, wallet: Wallet) -> Result<()> {
        self.rows.insert(wallet.wallet_id.clone(), wallet);
        Ok(())
    }
}

in_memory_repo!(InMemoryPolicyRepository, SpendingPolicy, policy_id: String);

#[async_trait]
impl PolicyRepository for InMemoryPolicyRepository {
    async fn get(&self, policy_id: &str) -> Result<SpendingPolicy> {
        self.rows
            .get(policy_id)
            .map(|p| p.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("policy {policy_id}")))
    }

    async fn get_for_agent(&self, agent_id: &str) -> Result<SpendingPolicy> {
        self.rows
            .iter()
            .find(|p| p.agent_id == agent_id)
            .map(|p| p.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("policy for agent {agent_id}")))
    }

    async fn upsert(&self, policy: SpendingPolicy) -> Result<()> {
        self.rows.insert(policy.policy_id.clone(), policy);
        Ok(())
    }
}

in_memory_repo!(InMemoryHoldRepository, Hold, hold_id: String);

#[async_trait]
impl HoldRepository for InMemoryHoldRepository {
    async fn get(&self, hold_id: &str) -> Result<Hold> {
        self.rows
            .get(hold_id)
            .map(|h| h.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("hold {hold_id}")))
    }

    async fn list_for_wallet(&self, wallet_id: &str) -> Result<Vec<Hold>> {
        Ok(self
            .rows
            .iter()
            .filter(|h| h.wallet_id == wallet_id)
            .map(|h| h.clone())
            .collect())
    }

    async fn upsert(&self, hold: Hold) -> Result<()> {
        self.rows.insert(hold.hold_id.clone(), hold);
        Ok(())
    }
}

in_memory_repo!(InMemoryWebhookRepository, WebhookSubscription, subscription_id: String);

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn get(&self, subscription_id: &str) -> Result<WebhookSubscription> {
        self.rows
            .get(subscription_id)
            .map(|s| s.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("webhook subscription {subscription_id}")))
    }

    async fn list_matching(&self, topic: &str) -> Result<Vec<WebhookSubscription>> {
        Ok(self
            .rows
            .iter()
            .filter(|s| s.is_active && crate::events::topic_matches(&s.topic_pattern, topic))
            .map(|s| s.clone())
            .collect())
    }

    async fn upsert(&self, subscription: WebhookSubscription) -> Result<()> {
        self.rows.insert(subscription.subscription_id.clone(), subscription);
        Ok(())
    }
}

in_memory_repo!(InMemoryEscrowRepository, Escrow, escrow_id: String);

#[async_trait]
impl EscrowRepository for InMemoryEscrowRepository {
    async fn get(&self, escrow_id: &str) -> Result<Escrow> {
        self.rows
            .get(escrow_id)
            .map(|e| e.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("escrow {escrow_id}")))
    }

    async fn upsert(&self, escrow: Escrow) -> Result<()> {
        self.rows.insert(escrow.escrow_id.clone(), escrow);
        Ok(())
    }
}

in_memory_repo!(InMemorySettlementRepository, Settlement, settlement_id: String);

#[async_trait]
impl SettlementRepository for InMemorySettlementRepository {
    async fn get(&self, settlement_id: &str) -> Result<Settlement> {
        self.rows
            .get(settlement_id)
            .map(|s| s.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("settlement {settlement_id}")))
    }

    async fn list_for_escrow(&self, escrow_id: &str) -> Result<Vec<Settlement>> {
        Ok(self
            .rows
            .iter()
            .filter(|s| s.escrow_id == escrow_id)
            .map(|s| s.clone())
            .collect())
    }

    async fn upsert(&self, settlement: Settlement) -> Result<()> {
        self.rows.insert(settlement.settlement_id.clone(), settlement);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLedgerRepository {
    rows: DashMap<String, Vec<LedgerEntry>>,
}

impl InMemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn entries_for_tx(&self, tx_id: &str) -> Result<Vec<LedgerEntry>> {
        Ok(self.rows.get(tx_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn append(&self, entries: Vec<LedgerEntry>) -> Result<()> {
        for entry in entries {
            self.rows.entry(entry.tx_id.clone()).or_default().push(entry);
        }
        Ok(())
    }
}
