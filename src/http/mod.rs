//! HTTP API surface (§6).
//!
//! Each resource gets its own handler module; `routes()` assembles them onto
//! one `Router<Arc<AppState>>`, mirroring the teacher's `handlers::routes<A>()`
//! generic-over-state pattern (here monomorphized, since this crate owns the
//! one concrete state type rather than abstracting over facilitator impls).

pub mod auth;
pub mod holds;
pub mod ledger;
pub mod mandates;
pub mod policies;
pub mod transactions;
pub mod wallets;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::approval::ApprovalWorkflow;
use crate::cache::Cache;
use crate::escrow::EscrowManager;
use crate::events::EventBus;
use crate::holds::HoldManager;
use crate::identity::keys::KeyRotationRegistry;
use crate::ledger::Ledger;
use crate::policy::MccRegistry;
use crate::ports::{ChainExecutorPort, CompliancePort, RpcPort};
use crate::replay::ReplayCache;
use crate::repository::{
    InMemoryAgentRepository, InMemoryHoldRepository, InMemoryPolicyRepository, InMemoryWalletRepository,
};
use crate::webhooks::SubscriptionStore;

/// Shared application state, built once at startup and handed to every
/// handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub agents: InMemoryAgentRepository,
    pub wallets: InMemoryWalletRepository,
    pub policies: InMemoryPolicyRepository,
    pub holds: HoldManager,
    pub hold_repository: InMemoryHoldRepository,
    pub escrows: EscrowManager,
    pub ledger: Ledger,
    pub replay: ReplayCache,
    pub events: EventBus,
    pub webhooks: SubscriptionStore,
    pub approvals: ApprovalWorkflow,
    pub keys: KeyRotationRegistry,
    pub mcc_registry: MccRegistry,
    pub balance_cache: Cache<String, u64>,
    pub chain_executor: Box<dyn ChainExecutorPort>,
    pub compliance: Box<dyn CompliancePort>,
    pub rpc: Box<dyn RpcPort>,
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v2/health", get(auth::get_health))
        .route("/api/v2/auth/me", get(auth::get_me))
        .route("/api/v2/mandates/execute", post(mandates::execute_mandate))
        .route("/api/v2/holds", post(holds::create_hold))
        .route("/api/v2/holds/{id}", get(holds::get_hold))
        .route("/api/v2/holds/{id}/capture", post(holds::capture_hold))
        .route("/api/v2/holds/{id}/void", post(holds::void_hold))
        .route("/api/v2/holds/wallet/{wallet_id}", get(holds::list_holds_for_wallet))
        .route("/api/v2/wallets", post(wallets::create_wallet).get(wallets::list_wallets))
        .route("/api/v2/wallets/{id}", get(wallets::get_wallet))
        .route("/api/v2/policies/apply", post(policies::apply_policy))
        .route("/api/v2/policies/check", post(policies::check_policy))
        .route("/api/v2/policies/{agent_id}", get(policies::get_policy))
        .route("/api/v2/transactions/estimate-gas", post(transactions::estimate_gas))
        .route("/api/v2/transactions/tokens/{chain}", get(transactions::list_tokens))
        .route("/api/v2/transactions/chains", get(transactions::list_chains))
        .route("/api/v2/transactions/route", post(transactions::route))
        .route("/api/v2/transactions/status/{tx_id}", get(transactions::get_status))
        .route("/api/v2/ledger/recent", get(ledger::recent))
        .with_state(state)
}
