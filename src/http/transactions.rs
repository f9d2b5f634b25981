//! `/api/v2/transactions/*`: supported chains/tokens, gas estimation, routing, and status lookup.
//!
//! Mirrors the teacher's `get_supported` "lists what this deployment can do"
//! shape, generalized from x402 schemes/networks to this platform's chains
//! and tokens.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::{PlatformError, Result};
use crate::money;

use super::AppState;

const KNOWN_CHAINS: &[&str] = &["base", "base-sepolia", "ethereum"];
const KNOWN_TOKENS: &[&str] = &["USDC", "USDT", "PYUSD"];

#[instrument(skip_all)]
pub async fn list_chains(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(KNOWN_CHAINS)
}

#[instrument(skip_all)]
pub async fn list_tokens(State(_state): State<Arc<AppState>>, Path(chain): Path<String>) -> Result<impl IntoResponse> {
    let tokens: Vec<&str> = KNOWN_TOKENS
        .iter()
        .copied()
        .filter(|token| money::contract_address(token, &chain).is_ok())
        .collect();
    Ok(Json(tokens))
}

#[derive(Debug, Deserialize)]
pub struct EstimateGasRequest {
    pub chain: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct EstimateGasResponse {
    pub chain: String,
    pub gas_units: u64,
    pub fee_minor: u64,
}

fn gas_units_for_chain(chain: &str) -> Result<u64> {
    match chain {
        "base" | "base-sepolia" => Ok(65_000),
        "ethereum" => Ok(120_000),
        other => Err(PlatformError::Validation(format!("unsupported chain: {other}"))),
    }
}

/// A fixed per-chain gas unit estimate. Real gas pricing is out of scope;
/// this gives callers a stable number to budget fee-inclusive limits against.
#[instrument(skip_all)]
pub async fn estimate_gas(State(_state): State<Arc<AppState>>, Json(request): Json<EstimateGasRequest>) -> Result<impl IntoResponse> {
    money::get(&request.token)?;
    let gas_units = gas_units_for_chain(&request.chain)?;
    Ok(Json(EstimateGasResponse {
        chain: request.chain,
        gas_units,
        fee_minor: gas_units / 1000,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub token: String,
    pub preferred_chain: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RouteResponse {
    pub chain: String,
    pub token: String,
}

fn pick_route(token: &str, preferred_chain: Option<&str>) -> Result<String> {
    let meta = money::get(token)?;
    if let Some(preferred) = preferred_chain {
        if meta.contract_address(preferred).is_ok() {
            return Ok(preferred.to_string());
        }
    }
    let (chain, _) = meta
        .contracts
        .first()
        .ok_or_else(|| PlatformError::Validation(format!("token {token} has no deployments")))?;
    Ok((*chain).to_string())
}

/// Picks the first chain on which `token` has a known contract, preferring
/// `preferred_chain` when the token is actually deployed there.
#[instrument(skip_all)]
pub async fn route(State(_state): State<Arc<AppState>>, Json(request): Json<RouteRequest>) -> Result<impl IntoResponse> {
    let chain = pick_route(&request.token, request.preferred_chain.as_deref())?;
    Ok(Json(RouteResponse {
        chain,
        token: request.token,
    }))
}

#[derive(Debug, Serialize)]
pub struct TransactionStatusResponse {
    pub tx_id: String,
    pub entries: Vec<crate::ledger::LedgerEntry>,
}

#[instrument(skip_all)]
pub async fn get_status(State(state): State<Arc<AppState>>, Path(tx_id): Path<String>) -> Result<impl IntoResponse> {
    let entries = state.ledger.entries_for_tx(&tx_id);
    if entries.is_empty() {
        return Err(PlatformError::NotFound(format!("transaction {tx_id}")));
    }
    Ok(Json(TransactionStatusResponse { tx_id, entries }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_units_rejects_unknown_chain() {
        assert!(gas_units_for_chain("solana").is_err());
    }

    #[test]
    fn gas_units_known_chains() {
        assert_eq!(gas_units_for_chain("base").unwrap(), 65_000);
        assert_eq!(gas_units_for_chain("ethereum").unwrap(), 120_000);
    }

    #[test]
    fn route_prefers_requested_chain_when_available() {
        let chain = pick_route("USDC", Some("ethereum")).unwrap();
        assert_eq!(chain, "ethereum");
    }

    #[test]
    fn route_falls_back_to_first_deployment_when_preferred_chain_lacks_token() {
        let chain = pick_route("USDT", Some("base")).unwrap();
        assert_eq!(chain, "ethereum");
    }

    #[test]
    fn route_rejects_unknown_token() {
        assert!(pick_route("DOGE", None).is_err());
    }
}
