//! `POST /api/v2/wallets`, `GET /api/v2/wallets`, `GET /api/v2/wallets/{id}`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;
use crate::ids::wallet_id;
use crate::repository::WalletRepository;
use crate::timestamp::UnixTimestamp;
use crate::wallet::{AccountType, Wallet};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub agent_id: String,
    pub account_type: AccountType,
    pub limit_per_tx: u64,
    pub limit_total: u64,
}

#[instrument(skip_all)]
pub async fn create_wallet(State(state): State<Arc<AppState>>, Json(request): Json<CreateWalletRequest>) -> Result<impl IntoResponse> {
    let now = UnixTimestamp::try_now().map_err(|e| crate::error::PlatformError::Internal(Box::new(e)))?;
    let wallet = Wallet::new(
        wallet_id(),
        request.agent_id,
        request.account_type,
        request.limit_per_tx,
        request.limit_total,
        now,
    );
    state.wallets.upsert(wallet.clone()).await?;
    Ok(Json(wallet))
}

#[instrument(skip_all)]
pub async fn get_wallet(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let wallet = state.wallets.get(&id).await?;
    Ok(Json(wallet))
}

#[derive(Debug, Deserialize)]
pub struct ListWalletsQuery {
    pub agent_id: String,
}

#[instrument(skip_all)]
pub async fn list_wallets(
    State(state): State<Arc<AppState>>,
    axum::extract::Query(query): axum::extract::Query<ListWalletsQuery>,
) -> Result<impl IntoResponse> {
    let wallets = state.wallets.list_for_agent(&query.agent_id).await?;
    Ok(Json(wallets))
}
