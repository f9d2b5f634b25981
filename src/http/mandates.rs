//! `POST /api/v2/mandates/execute`.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::approval::{ConfidenceRouter, RoutingTier, TransactionContext};
use crate::error::{PlatformError, Result};
use crate::orchestrator::Orchestrator;
use crate::policy::EvaluateRequest;
use crate::repository::{AgentRepository, PolicyRepository, WalletRepository};
use crate::timestamp::UnixTimestamp;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ExecuteMandateRequest {
    pub mandate: crate::mandate::PaymentMandate,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecuteMandateResponse {
    Completed {
        ledger_tx_id: String,
        chain_tx_hash: String,
        chain: String,
        confidence_score: f64,
    },
    PendingApproval {
        approval_request_id: String,
        confidence_score: f64,
        routing_tier: RoutingTier,
        required_approvers: Vec<String>,
    },
}

#[instrument(skip_all, fields(mandate_id = %request.mandate.core.mandate_id))]
pub async fn execute_mandate(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecuteMandateRequest>,
) -> Result<impl IntoResponse> {
    let payment = request.mandate;
    let now = UnixTimestamp::try_now().map_err(|e| PlatformError::Internal(Box::new(e)))?;

    if matches!(
        state.replay.claim(&payment.core.mandate_id, 600, now),
        crate::replay::ClaimOutcome::AlreadySeen
    ) {
        return Err(PlatformError::ReplayDetected(payment.core.mandate_id));
    }

    let wallet_id = payment
        .wallet_id
        .clone()
        .ok_or_else(|| PlatformError::Validation("mandate is missing a wallet_id".into()))?;
    let wallet = state.wallets.get(&wallet_id).await?;
    let mut policy = state.policies.get_for_agent(&payment.core.subject).await?;
    let kya_level = state
        .agents
        .get(&payment.core.subject)
        .await
        .map(|agent| agent.kya_level)
        .unwrap_or_default();

    let router = ConfidenceRouter;
    let transaction = TransactionContext {
        amount_minor: payment.amount_minor,
        merchant_id: Some(payment.destination.clone()),
        timestamp: now,
    };
    // No persisted transaction-history store or compliance-violation counter
    // exists yet; the router degrades gracefully to its no-history/no-violation
    // buckets, same as the source with `history=None, violation_count=0`.
    let confidence = router.calculate_confidence(&payment.core.subject, &transaction, &policy, &[], kya_level, 0);
    let routing = router.route_transaction(&confidence);

    if routing.quorum > 0 {
        let request = state.approvals.create_request(
            payment.core.mandate_id.clone(),
            routing.required_approvers.clone(),
            routing.quorum,
            routing.timeout_seconds,
            now,
        );
        state.events.publish(
            "payment.approval_required",
            serde_json::json!({ "mandate_id": payment.core.mandate_id, "approval_request_id": request.request_id }),
            now,
        );
        return Ok(Json(ExecuteMandateResponse::PendingApproval {
            approval_request_id: request.request_id,
            confidence_score: confidence.score,
            routing_tier: routing.approval_type,
            required_approvers: routing.required_approvers,
        }));
    }

    let orchestrator = Orchestrator {
        compliance: state.compliance.as_ref(),
        chain_executor: state.chain_executor.as_ref(),
        ledger: &state.ledger,
        rpc: Some(state.rpc.as_ref()),
        policy_state: None,
        mcc_registry: &state.mcc_registry,
    };

    let policy_request = EvaluateRequest {
        amount_minor: payment.amount_minor,
        fee_minor: 0,
        chain: &payment.chain,
        token: &payment.token,
        merchant_id: Some(&payment.destination),
        merchant_category: None,
        mcc_code: None,
        scope: None,
        drift_score: None,
    };

    let result = orchestrator
        .execute_chain(&payment, &policy, &wallet, &policy_request, now)
        .await?;

    policy.record_spend(payment.amount_minor, now);
    state.policies.upsert(policy).await?;

    state.events.publish(
        "payment.completed",
        serde_json::json!({ "mandate_id": result.mandate_id, "ledger_tx_id": result.ledger_tx_id }),
        now,
    );

    Ok(Json(ExecuteMandateResponse::Completed {
        ledger_tx_id: result.ledger_tx_id,
        chain_tx_hash: result.chain_tx_hash,
        chain: result.chain,
        confidence_score: confidence.score,
    }))
}
