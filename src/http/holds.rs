//! `POST /api/v2/holds`, `.../capture`, `.../void`, `GET /api/v2/holds[/{id}|/wallet/{wid}]`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::holds::Hold;
use crate::ids::hold_id;
use crate::repository::HoldRepository;
use crate::timestamp::UnixTimestamp;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateHoldRequest {
    pub agent_id: String,
    pub wallet_id: String,
    pub amount_minor: u64,
    pub currency: String,
    pub merchant_id: Option<String>,
    pub purpose: Option<String>,
    pub max_hold_hours: Option<u32>,
}

#[instrument(skip_all)]
pub async fn create_hold(State(state): State<Arc<AppState>>, Json(request): Json<CreateHoldRequest>) -> Result<impl IntoResponse> {
    let now = UnixTimestamp::try_now().map_err(|e| crate::error::PlatformError::Internal(Box::new(e)))?;
    let hold = Hold::new(
        hold_id(),
        request.agent_id,
        request.wallet_id,
        request.amount_minor,
        request.currency,
        request.merchant_id,
        request.purpose,
        request.max_hold_hours.unwrap_or(24),
        now,
    )?;
    state.holds.create(hold.clone());
    state.hold_repository.upsert(hold.clone()).await?;
    Ok(Json(hold))
}

#[instrument(skip_all)]
pub async fn get_hold(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    state
        .holds
        .get(&id)
        .map(Json)
        .ok_or_else(|| crate::error::PlatformError::NotFound(format!("hold {id}")))
}

#[derive(Debug, Deserialize)]
pub struct CaptureHoldRequest {
    pub capture_tx_id: String,
    pub capture_amount: Option<u64>,
}

#[instrument(skip_all)]
pub async fn capture_hold(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<CaptureHoldRequest>,
) -> Result<impl IntoResponse> {
    let now = UnixTimestamp::try_now().map_err(|e| crate::error::PlatformError::Internal(Box::new(e)))?;
    let existing = state.holds.get(&id).ok_or_else(|| crate::error::PlatformError::NotFound(format!("hold {id}")))?;
    let capture_amount = request.capture_amount.unwrap_or(existing.amount_minor);
    let hold = state.holds.capture(&id, &request.capture_tx_id, capture_amount, now)?;
    state.hold_repository.upsert(hold.clone()).await?;
    Ok(Json(hold))
}

#[instrument(skip_all)]
pub async fn void_hold(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let now = UnixTimestamp::try_now().map_err(|e| crate::error::PlatformError::Internal(Box::new(e)))?;
    let hold = state.holds.void(&id, now)?;
    state.hold_repository.upsert(hold.clone()).await?;
    Ok(Json(hold))
}

#[instrument(skip_all)]
pub async fn list_holds_for_wallet(
    State(state): State<Arc<AppState>>,
    Path(wallet_id): Path<String>,
) -> Result<impl IntoResponse> {
    let holds = state.hold_repository.list_for_wallet(&wallet_id).await?;
    Ok(Json(holds))
}
