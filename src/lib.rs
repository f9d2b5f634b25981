//! Core Rust implementation of an autonomous-agent payment platform.
//!
//! This crate provides the foundational data structures, policy engine, and
//! a reference HTTP server for agents that hold wallets, spend under a
//! spending policy, and settle payments with each other or with merchants.
//!
//! # Overview
//!
//! An agent identity presents a mandate (intent, cart, or payment) signed by
//! a key it controls. The platform validates the mandate chain, checks it
//! against the agent's spending policy, holds or moves funds through a
//! double-entry ledger, and optionally settles value on-chain. Agent-to-agent
//! payments additionally go through an escrow state machine so that neither
//! side can unilaterally take funds without the other's confirmation.
//!
//! # Modules
//!
//! - [`money`] — Token registry and minor-unit/decimal conversions.
//! - [`identity`] — Agent identity, domain-bound signature verification, and key rotation.
//! - [`mandate`] — Intent/cart/payment mandate model and chain validation.
//! - [`replay`] — Nonce-based replay protection.
//! - [`wallet`] — Agent wallet accounts and per-chain addresses.
//! - [`policy`] — Spending policy engine and evaluation pipeline.
//! - [`holds`] — Pre-authorization holds.
//! - [`ledger`] — Append-only double-entry ledger.
//! - [`escrow`] — Agent-to-agent escrow state machine and settlement.
//! - [`orchestrator`] — Payment execution pipeline tying policy, compliance, and the ledger together.
//! - [`ports`] — Trait boundaries to external collaborators (chain RPC, compliance, signer).
//! - [`events`] — In-process pub/sub event bus.
//! - [`webhooks`] — Signed webhook delivery with retry.
//! - [`approval`] — Confidence-based routing and multi-signer approval workflow.
//! - [`repository`] — Persistence contracts and in-memory adapters.
//! - [`cache`] — Generic TTL-aware keyed cache.
//! - [`error`] — Unified error taxonomy.
//! - [`retry`] — Backoff primitives shared by webhook delivery and chain I/O.
//! - [`config`] — Server configuration.
//! - [`http`] — HTTP API surface.

pub mod approval;
pub mod cache;
pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod holds;
pub mod http;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod mandate;
pub mod money;
pub mod orchestrator;
pub mod policy;
pub mod ports;
pub mod replay;
pub mod repository;
pub mod retry;
pub mod sig_down;
pub mod telemetry;
pub mod timestamp;
pub mod wallet;
pub mod webhooks;
