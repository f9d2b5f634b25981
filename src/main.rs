//! Payment platform HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server exposing the platform's
//! mandate execution, wallet, policy, hold, transaction, and ledger API.
//!
//! Endpoints: see [`sardis_core::http::routes`].
//!
//! This server includes:
//! - Structured `tracing` logging
//! - CORS, scoped to `allowed_origins` from configuration
//! - In-memory repositories and a simulated chain executor for dev/sandbox use
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT`, and friends configurable via CLI flag or config file (see [`sardis_core::config`])

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use dotenvy::dotenv;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use sardis_core::approval::ApprovalWorkflow;
use sardis_core::cache::Cache;
use sardis_core::config::{ChainMode, Config};
use sardis_core::events::EventBus;
use sardis_core::holds::HoldManager;
use sardis_core::http::{self, AppState};
use sardis_core::identity::keys::KeyRotationRegistry;
use sardis_core::ledger::Ledger;
use sardis_core::policy::MccRegistry;
use sardis_core::ports::{PassthroughCompliance, SimulatedChainExecutor, SimulatedRpc};
use sardis_core::replay::ReplayCache;
use sardis_core::repository::{
    InMemoryAgentRepository, InMemoryHoldRepository, InMemoryPolicyRepository, InMemoryWalletRepository,
};
use sardis_core::sig_down::SigDown;
use sardis_core::webhooks::SubscriptionStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    sardis_core::telemetry::init();

    let config = Config::load()?;

    let chain_executor: Box<dyn sardis_core::ports::ChainExecutorPort> = match config.chain_mode() {
        ChainMode::Simulated => Box::new(SimulatedChainExecutor),
        ChainMode::Live => {
            tracing::warn!("live chain mode has no production executor wired in this binary yet; falling back to simulated");
            Box::new(SimulatedChainExecutor)
        }
    };

    let state = Arc::new(AppState {
        agents: InMemoryAgentRepository::default(),
        wallets: InMemoryWalletRepository::default(),
        policies: InMemoryPolicyRepository::default(),
        holds: HoldManager::default(),
        hold_repository: InMemoryHoldRepository::default(),
        escrows: sardis_core::escrow::EscrowManager::default(),
        ledger: Ledger::new(),
        replay: ReplayCache::default(),
        events: EventBus::new(),
        webhooks: SubscriptionStore::default(),
        approvals: ApprovalWorkflow::default(),
        keys: KeyRotationRegistry::default(),
        mcc_registry: MccRegistry::default(),
        balance_cache: Cache::new(),
        chain_executor,
        compliance: Box::new(PassthroughCompliance),
        rpc: Box::new(SimulatedRpc::new()),
    });

    let mut cors_layer = cors::CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(cors::Any);
    cors_layer = if config.allowed_origins().is_empty() {
        cors_layer.allow_origin(cors::Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins()
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        cors_layer.allow_origin(origins)
    };

    let http_endpoints = http::routes(state).layer(TraceLayer::new_for_http()).layer(cors_layer);

    let addr = SocketAddr::new(config.host(), config.port());
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap_or_else(|e| {
        tracing::error!("Failed to bind to {}: {}", addr, e);
        std::process::exit(1);
    });

    let sig_down = SigDown::try_new()?;
    let axum_cancellation_token = sig_down.cancellation_token();
    let axum_graceful_shutdown = async move { axum_cancellation_token.cancelled().await };
    axum::serve(listener, http_endpoints)
        .with_graceful_shutdown(axum_graceful_shutdown)
        .await?;

    Ok(())
}
