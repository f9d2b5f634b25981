//! `GET /api/v2/ledger/recent?limit=N`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::instrument;

use crate::error::Result;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[instrument(skip_all)]
pub async fn recent(State(state): State<Arc<AppState>>, Query(query): Query<RecentQuery>) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    Ok(Json(state.ledger.recent(limit)))
}
