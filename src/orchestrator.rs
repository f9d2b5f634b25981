//! Payment orchestrator (C9).
//!
//! The single code path that turns a verified mandate into persisted state.
//! `execute_chain` is the only place the sequence
//! "policy -> compliance -> dispatch -> ledger" is allowed to run.

use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};
use crate::mandate::PaymentMandate;
use crate::policy::attestation::attest;
use crate::policy::{EvaluateRequest, MccRegistry, PolicyDecision, SpendingPolicy};
use crate::ports::{ChainExecutorPort, CompliancePort, LedgerPort, PolicyStatePort, RpcPort};
use crate::timestamp::UnixTimestamp;
use crate::wallet::Wallet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub mandate_id: String,
    pub ledger_tx_id: String,
    pub chain_tx_hash: String,
    pub chain: String,
    pub audit_anchor: String,
    pub compliance_provider: Option<String>,
    pub compliance_rule: Option<String>,
    pub status: String,
}

pub struct Orchestrator<'a> {
    pub compliance: &'a dyn CompliancePort,
    pub chain_executor: &'a dyn ChainExecutorPort,
    pub ledger: &'a dyn LedgerPort,
    pub rpc: Option<&'a dyn RpcPort>,
    pub policy_state: Option<&'a dyn PolicyStatePort>,
    pub mcc_registry: &'a MccRegistry,
}

impl<'a> Orchestrator<'a> {
    /// Step 1: policy. Step 2: compliance. Step 3: dispatch. Step 4: ledger.
    /// Step 5: assemble the result. Any step's failure short-circuits the rest.
    pub async fn execute_chain(
        &self,
        payment: &PaymentMandate,
        policy: &SpendingPolicy,
        wallet: &Wallet,
        policy_request: &EvaluateRequest<'_>,
        now: UnixTimestamp,
    ) -> Result<OrchestrationResult> {
        let decision: PolicyDecision = crate::policy::evaluate(
            policy,
            wallet,
            policy_request,
            self.mcc_registry,
            self.rpc,
            self.policy_state,
            now,
        )
        .await;
        if !decision.allowed {
            return Err(PlatformError::PolicyDenied(decision.reason));
        }

        let verdict = self.compliance.preflight(payment).await?;
        if !verdict.allowed {
            return Err(PlatformError::ComplianceDenied {
                reason: verdict.reason.unwrap_or_else(|| "compliance check failed".into()),
                provider: verdict.provider,
                rule_id: verdict.rule_id,
            });
        }

        let receipt = self
            .chain_executor
            .dispatch_payment(payment)
            .await
            .map_err(|e| PlatformError::TransactionFailed {
                chain: payment.chain.clone(),
                reason: e.to_string(),
            })?;

        let ledger_tx_id = self
            .ledger
            .append(
                &format!("agent:{}", payment.core.subject),
                &format!("merchant:{}", payment.destination),
                payment.amount_minor,
                &payment.token,
                Some(&payment.chain),
                Some(&receipt.tx_hash),
            )
            .await?;

        let policy_attestation = attest(policy);

        Ok(OrchestrationResult {
            mandate_id: payment.core.mandate_id.clone(),
            ledger_tx_id,
            chain_tx_hash: receipt.tx_hash,
            chain: payment.chain.clone(),
            audit_anchor: format!("merkle::{}", policy_attestation.merkle_root),
            compliance_provider: verdict.provider,
            compliance_rule: verdict.rule_id,
            status: "submitted".into(),
        })
    }
}
