//! `GET /api/v2/health`, `GET /api/v2/auth/me`.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::instrument;

use crate::error::{PlatformError, Result};
use crate::repository::AgentRepository;

use super::AppState;

#[instrument(skip_all)]
pub async fn get_health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Resolves the caller's identity from a bearer token carrying an agent id.
/// A real deployment exchanges an API key for the agent id via `api_keys`;
/// this crate takes the id directly, leaving key exchange to the HTTP edge.
#[instrument(skip_all)]
pub async fn get_me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<impl IntoResponse> {
    let agent_id = bearer_agent_id(&headers)?;
    let agent = state.agents.get(&agent_id).await?;
    Ok(Json(json!({ "agent_id": agent.agent_id, "domain": agent.domain })))
}

pub fn bearer_agent_id(headers: &HeaderMap) -> Result<String> {
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PlatformError::Validation("missing Authorization header".into()))?;
    auth.strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or_else(|| PlatformError::Validation("Authorization header must be a Bearer token".into()))
}
