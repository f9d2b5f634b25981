//! `POST /api/v2/policies/apply`, `POST /api/v2/policies/check`, `GET /api/v2/policies/{agent_id}`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::Result;
use crate::policy::{EvaluateRequest, PolicyDecision, SpendingPolicy};
use crate::repository::{PolicyRepository, WalletRepository};
use crate::timestamp::UnixTimestamp;

use super::AppState;

#[instrument(skip_all)]
pub async fn apply_policy(State(state): State<Arc<AppState>>, Json(policy): Json<SpendingPolicy>) -> Result<impl IntoResponse> {
    state.policies.upsert(policy.clone()).await?;
    Ok(Json(policy))
}

#[instrument(skip_all)]
pub async fn get_policy(State(state): State<Arc<AppState>>, Path(agent_id): Path<String>) -> Result<impl IntoResponse> {
    let policy = state.policies.get_for_agent(&agent_id).await?;
    Ok(Json(policy))
}

#[derive(Debug, Deserialize)]
pub struct CheckPolicyRequest {
    pub agent_id: String,
    pub wallet_id: String,
    pub amount_minor: u64,
    pub fee_minor: u64,
    pub chain: String,
    pub token: String,
    pub merchant_id: Option<String>,
    pub merchant_category: Option<String>,
    pub mcc_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckPolicyResponse {
    pub allowed: bool,
    pub reason: String,
}

#[instrument(skip_all)]
pub async fn check_policy(State(state): State<Arc<AppState>>, Json(request): Json<CheckPolicyRequest>) -> Result<impl IntoResponse> {
    let now = UnixTimestamp::try_now().map_err(|e| crate::error::PlatformError::Internal(Box::new(e)))?;
    let policy = state.policies.get_for_agent(&request.agent_id).await?;
    let wallet = state.wallets.get(&request.wallet_id).await?;

    let evaluate_request = EvaluateRequest {
        amount_minor: request.amount_minor,
        fee_minor: request.fee_minor,
        chain: &request.chain,
        token: &request.token,
        merchant_id: request.merchant_id.as_deref(),
        merchant_category: request.merchant_category.as_deref(),
        mcc_code: request.mcc_code.as_deref(),
        scope: None,
        drift_score: None,
    };

    let decision: PolicyDecision = crate::policy::evaluate(
        &policy,
        &wallet,
        &evaluate_request,
        &state.mcc_registry,
        Some(state.rpc.as_ref()),
        None,
        now,
    )
    .await;

    Ok(Json(CheckPolicyResponse {
        allowed: decision.allowed,
        reason: decision.reason,
    }))
}
