//! A2A settlement engine (C12).
//!
//! Operates only on `RELEASED` escrows. The on-chain path synthesizes a
//! `PaymentMandate` from the escrow and dispatches it through the same
//! `ChainExecutorPort` the orchestrator uses; the off-chain path skips chain
//! dispatch entirely. Both paths converge on one ledger call.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PlatformError, Result};
use crate::ids::settlement_id;
use crate::mandate::{MandateCore, PaymentMandate, TransactionModality};
use crate::ports::{ChainExecutorPort, LedgerPort};
use crate::timestamp::UnixTimestamp;
use crate::wallet::Wallet;

use super::Escrow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementType {
    OnChain,
    OffChain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub settlement_id: String,
    pub escrow_id: String,
    pub settlement_type: SettlementType,
    pub ledger_tx_id: String,
    pub chain_tx_hash: Option<String>,
    pub settled_at: UnixTimestamp,
}

fn settlement_nonce(escrow_id: &str) -> String {
    hex::encode(Sha256::digest(format!("a2a:settle:{escrow_id}").as_bytes()))
}

fn settlement_audit_hash(escrow: &Escrow) -> String {
    let essential = format!(
        "{}|{}|{}|{}|{}|{}",
        escrow.escrow_id, escrow.payer_agent_id, escrow.payee_agent_id, escrow.amount_minor, escrow.token, escrow.chain
    );
    hex::encode(Sha256::digest(essential.as_bytes()))
}

fn synthesize_payment_mandate(escrow: &Escrow, destination: &str, now: UnixTimestamp) -> PaymentMandate {
    PaymentMandate {
        core: MandateCore {
            mandate_id: crate::ids::mandate_id(),
            issuer: "sardis-core".into(),
            subject: escrow.payer_agent_id.clone(),
            expires_at: now + 300,
            nonce: settlement_nonce(&escrow.escrow_id),
            proof: vec![],
            domain: "a2a-settlement".into(),
            purpose: "a2a:settle".into(),
        },
        chain: escrow.chain.clone(),
        token: escrow.token.clone(),
        amount_minor: escrow.amount_minor,
        destination: destination.to_string(),
        audit_hash: settlement_audit_hash(escrow),
        ai_agent_presence: true,
        transaction_modality: TransactionModality::HumanNotPresent,
        wallet_id: None,
    }
}

/// Settles a `RELEASED` escrow on-chain via `executor`, recording the matched
/// ledger movement afterward.
pub async fn settle_on_chain(
    escrow: &Escrow,
    payer_wallet: &Wallet,
    payee_wallet: &Wallet,
    executor: &dyn ChainExecutorPort,
    ledger: &dyn LedgerPort,
    now: UnixTimestamp,
) -> Result<Settlement> {
    require_released(escrow)?;

    let destination = payee_wallet
        .address_for(&escrow.chain)
        .ok_or_else(|| PlatformError::Validation(format!("payee wallet has no address on {}", escrow.chain)))?;

    if !payer_wallet.is_usable() {
        return Err(PlatformError::Conflict("payer wallet is frozen or inactive".into()));
    }
    if !payee_wallet.is_active {
        return Err(PlatformError::Conflict("payee wallet is inactive".into()));
    }

    let payment = synthesize_payment_mandate(escrow, destination, now);

    let receipt = executor
        .dispatch_payment(&payment)
        .await
        .map_err(|e| PlatformError::TransactionFailed {
            chain: escrow.chain.clone(),
            reason: e.to_string(),
        })?;

    let ledger_tx_id = ledger
        .append(
            &format!("escrow:{}", escrow.escrow_id),
            &format!("agent:{}", escrow.payee_agent_id),
            escrow.amount_minor,
            &escrow.token,
            Some(&escrow.chain),
            Some(&receipt.tx_hash),
        )
        .await?;

    Ok(Settlement {
        settlement_id: settlement_id(),
        escrow_id: escrow.escrow_id.clone(),
        settlement_type: SettlementType::OnChain,
        ledger_tx_id,
        chain_tx_hash: Some(receipt.tx_hash),
        settled_at: now,
    })
}

/// Settles a `RELEASED` escrow off-chain: ledger-only transfer, no chain dispatch.
pub async fn settle_off_chain(escrow: &Escrow, ledger: &dyn LedgerPort, now: UnixTimestamp) -> Result<Settlement> {
    require_released(escrow)?;

    let ledger_tx_id = ledger
        .append(
            &format!("escrow:{}", escrow.escrow_id),
            &format!("agent:{}", escrow.payee_agent_id),
            escrow.amount_minor,
            &escrow.token,
            None,
            None,
        )
        .await?;

    Ok(Settlement {
        settlement_id: settlement_id(),
        escrow_id: escrow.escrow_id.clone(),
        settlement_type: SettlementType::OffChain,
        ledger_tx_id,
        chain_tx_hash: None,
        settled_at: now,
    })
}

fn require_released(escrow: &Escrow) -> Result<()> {
    if escrow.state != super::EscrowState::Released {
        return Err(PlatformError::Conflict(format!(
            "escrow {} is not released, cannot settle",
            escrow.escrow_id
        )));
    }
    Ok(())
}
