//! End-to-end scenarios from spec.md §8, exercised against the public crate
//! API rather than any one module's internals.

use sardis_core::escrow::EscrowManager;
use sardis_core::escrow::settlement::{settle_off_chain, settle_on_chain};
use sardis_core::ledger::Ledger;
use sardis_core::mandate::{MandateCore, PaymentMandate, TransactionModality};
use sardis_core::orchestrator::Orchestrator;
use sardis_core::policy::{EvaluateRequest, MccRegistry, SpendingPolicy, SpendingScope, TrustLevel, VelocityMode};
use sardis_core::ports::{ChainExecutorPort, CompliancePort, ComplianceVerdict, SimulatedChainExecutor, SimulatedRpc};
use sardis_core::replay::{ClaimOutcome, ReplayCache};
use sardis_core::timestamp::UnixTimestamp;
use sardis_core::wallet::{AccountType, Wallet};

struct AlwaysAllow;

#[async_trait::async_trait]
impl CompliancePort for AlwaysAllow {
    async fn preflight(&self, _payment: &PaymentMandate) -> sardis_core::error::Result<ComplianceVerdict> {
        Ok(ComplianceVerdict {
            allowed: true,
            reason: None,
            provider: Some("test".into()),
            rule_id: None,
        })
    }
}

fn test_policy(limit_per_tx: u64, limit_total: u64, spent_total: u64) -> SpendingPolicy {
    SpendingPolicy {
        policy_id: "policy_1".into(),
        agent_id: "agent_1".into(),
        trust_level: TrustLevel::Medium,
        limit_per_tx,
        limit_total,
        spent_total,
        daily_limit: None,
        weekly_limit: None,
        monthly_limit: None,
        merchant_rules: vec![],
        allowed_scopes: vec![SpendingScope::All],
        blocked_merchant_categories: vec![],
        allowed_destinations: vec![],
        blocked_destinations: vec![],
        require_preauth: false,
        approval_threshold: None,
        max_drift_score: None,
        max_hold_hours: 168,
        velocity_mode: VelocityMode::Hard,
        created_at: UnixTimestamp(0),
        updated_at: UnixTimestamp(0),
    }
}

fn test_payment(amount_minor: u64, fee_hint: &str) -> PaymentMandate {
    PaymentMandate {
        core: MandateCore {
            mandate_id: format!("mandate_{fee_hint}"),
            issuer: "sardis".into(),
            subject: "agent_1".into(),
            expires_at: UnixTimestamp(10_000),
            nonce: "nonce_1".into(),
            proof: vec![],
            domain: "sardis.dev".into(),
            purpose: "payment".into(),
        },
        chain: "base".into(),
        token: "USDC".into(),
        amount_minor,
        destination: "0xabc".into(),
        audit_hash: "h".into(),
        ai_agent_presence: true,
        transaction_modality: TransactionModality::HumanNotPresent,
        wallet_id: Some("wallet_1".into()),
    }
}

/// S1 — happy path: policy allows, dispatch succeeds, ledger appends one tx.
#[tokio::test]
async fn s1_happy_path_settles_and_appends_one_ledger_tx() {
    let wallet = Wallet::new(
        "wallet_1".into(),
        "agent_1".into(),
        AccountType::MpcV1,
        500,
        1000,
        UnixTimestamp(0),
    );
    let policy = test_policy(500, 1000, 0);
    let payment = test_payment(300, "s1");

    let rpc = SimulatedRpc::new();
    rpc.set_balance("wallet_1", "base", "USDC", 10_000);
    let ledger = Ledger::new();
    let mcc_registry = MccRegistry::default();
    let executor = SimulatedChainExecutor;
    let compliance = AlwaysAllow;

    let orchestrator = Orchestrator {
        compliance: &compliance,
        chain_executor: &executor,
        ledger: &ledger,
        rpc: Some(&rpc),
        policy_state: None,
        mcc_registry: &mcc_registry,
    };

    let request = EvaluateRequest {
        amount_minor: payment.amount_minor,
        fee_minor: 1,
        chain: &payment.chain,
        token: &payment.token,
        merchant_id: Some(&payment.destination),
        merchant_category: None,
        mcc_code: None,
        scope: None,
        drift_score: None,
    };

    let result = orchestrator
        .execute_chain(&payment, &policy, &wallet, &request, UnixTimestamp(0))
        .await
        .expect("happy path must settle");

    let entries = ledger.entries_for_tx(&result.ledger_tx_id);
    assert_eq!(entries.len(), 2);
    assert!(!result.chain_tx_hash.is_empty());
}

/// S2 — fee pushes the total over the per-tx limit; nothing is recorded.
#[tokio::test]
async fn s2_fee_over_per_tx_limit_denies_before_any_ledger_write() {
    let wallet = Wallet::new(
        "wallet_1".into(),
        "agent_1".into(),
        AccountType::MpcV1,
        300,
        1000,
        UnixTimestamp(0),
    );
    let policy = test_policy(300, 1000, 0);
    let payment = test_payment(300, "s2");

    let rpc = SimulatedRpc::new();
    rpc.set_balance("wallet_1", "base", "USDC", 10_000);
    let ledger = Ledger::new();
    let mcc_registry = MccRegistry::default();
    let executor = SimulatedChainExecutor;
    let compliance = AlwaysAllow;

    let orchestrator = Orchestrator {
        compliance: &compliance,
        chain_executor: &executor,
        ledger: &ledger,
        rpc: Some(&rpc),
        policy_state: None,
        mcc_registry: &mcc_registry,
    };

    let request = EvaluateRequest {
        amount_minor: payment.amount_minor,
        fee_minor: 1,
        chain: &payment.chain,
        token: &payment.token,
        merchant_id: Some(&payment.destination),
        merchant_category: None,
        mcc_code: None,
        scope: None,
        drift_score: None,
    };

    let err = orchestrator
        .execute_chain(&payment, &policy, &wallet, &request, UnixTimestamp(0))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "policy_denied");
    assert!(ledger.entries_for_tx("nonexistent").is_empty());
    assert_eq!(ledger.balance("escrow:none"), 0);
}

/// S3 — the same mandate is claimed twice; exactly one claim succeeds.
#[test]
fn s3_replay_cache_grants_exactly_one_claim() {
    let cache = ReplayCache::new();
    let now = UnixTimestamp(0);
    let first = cache.claim("mandate_dup", 600, now);
    let second = cache.claim("mandate_dup", 600, now);
    assert_eq!(first, ClaimOutcome::Claimed);
    assert_eq!(second, ClaimOutcome::AlreadySeen);
}

/// Invariant 3, concurrent form: spawning many claimers against the same
/// mandate id yields exactly one `Claimed`.
#[tokio::test]
async fn replay_claim_is_single_winner_under_concurrency() {
    use std::sync::Arc;

    let cache = Arc::new(ReplayCache::new());
    let now = UnixTimestamp(0);
    let mut handles = Vec::new();
    for _ in 0..32 {
        let cache = cache.clone();
        handles.push(tokio::spawn(async move { cache.claim("mandate_concurrent", 600, now) }));
    }
    let mut claimed_count = 0;
    for handle in handles {
        if handle.await.unwrap() == ClaimOutcome::Claimed {
            claimed_count += 1;
        }
    }
    assert_eq!(claimed_count, 1);
}

/// S4 — escrow full lifecycle ends released, settled on-chain, ledger matched.
#[tokio::test]
async fn s4_escrow_full_lifecycle_settles_on_chain() {
    let manager = EscrowManager::new();
    let now = UnixTimestamp(0);
    let escrow = manager
        .create_escrow(
            "escrow_1".into(),
            "a1".into(),
            "a2".into(),
            100,
            "USDC".into(),
            "base".into(),
            3600,
            now,
        )
        .unwrap();
    manager.fund_escrow(&escrow.escrow_id, "0x1", now).unwrap();
    manager.confirm_delivery(&escrow.escrow_id, "hash", now).unwrap();
    let released = manager.release_escrow(&escrow.escrow_id, now).unwrap();

    let mut payer_wallet = Wallet::new("wallet_a1".into(), "a1".into(), AccountType::MpcV1, 1000, 1000, now);
    payer_wallet.addresses.insert("base".into(), "0xpayer".into());
    let mut payee_wallet = Wallet::new("wallet_a2".into(), "a2".into(), AccountType::MpcV1, 1000, 1000, now);
    payee_wallet.addresses.insert("base".into(), "0xpayee".into());

    let executor = SimulatedChainExecutor;
    let ledger = Ledger::new();

    let settlement = settle_on_chain(&released, &payer_wallet, &payee_wallet, &executor, &ledger, now)
        .await
        .unwrap();

    assert_eq!(
        settlement.settlement_type,
        sardis_core::escrow::settlement::SettlementType::OnChain
    );
    assert!(settlement.chain_tx_hash.is_some());

    let entries = ledger.entries_for_tx(&settlement.ledger_tx_id);
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().any(|e| e.account == "escrow:escrow_1"));
    assert!(entries.iter().any(|e| e.account == "agent:a2"));
    assert!(entries.iter().all(|e| e.amount_minor == 100));
}

/// S5 — an escrow that times out before funding/delivery is swept to expired;
/// release is rejected afterward, refund is still allowed.
#[tokio::test]
async fn s5_expired_escrow_rejects_release_but_allows_refund() {
    let manager = EscrowManager::new();
    let created_at = UnixTimestamp(0);
    let escrow = manager
        .create_escrow(
            "escrow_2".into(),
            "a1".into(),
            "a2".into(),
            50,
            "USDC".into(),
            "base".into(),
            0,
            created_at,
        )
        .unwrap();

    let later = UnixTimestamp(1);
    let swept = manager.check_expired_escrows(later);
    assert_eq!(swept, vec![escrow.escrow_id.clone()]);

    let release_err = manager.release_escrow(&escrow.escrow_id, later).unwrap_err();
    assert_eq!(release_err.code(), "conflict");

    let refunded = manager.refund_escrow(&escrow.escrow_id, "expired", later).unwrap();
    assert_eq!(refunded.state, sardis_core::escrow::EscrowState::Refunded);

    let ledger = Ledger::new();
    let off_chain = settle_off_chain(&refunded, &ledger, later).await;
    // Off-chain settlement still requires `RELEASED`; a refunded escrow must reject it.
    assert!(off_chain.is_err());
}

/// S6 — a signed webhook delivery accepts within tolerance, rejects once
/// stale, and rejects a mutated body even well within tolerance.
#[test]
fn s6_webhook_signature_tolerance_and_tamper_rejection() {
    use sardis_core::webhooks::signing::{sign, verify};

    let secret = b"whsec_test_secret";
    let body = "{\"event\":\"payment.completed\"}";
    let t0 = 1_700_000_000u64;
    let header = sign(secret, t0, body);

    assert!(verify(secret, &header, body, t0, 300).is_ok());
    assert!(verify(secret, &header, body, t0 + 301, 300).is_err());

    let mutated_body = "{\"event\":\"payment.failed\"}";
    assert!(verify(secret, &header, mutated_body, t0 + 10, 300).is_err());
}
