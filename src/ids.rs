//! Prefixed identifier generation.
//!
//! Every externally-visible id in this system carries a human-legible prefix
//! (`wallet_`, `hold_`, `escrow_`, ...) followed by a UUIDv7 rendered without
//! hyphens. UUIDv7 keeps ids roughly sortable by creation time, which is useful
//! for the append-only ledger and event log.

use uuid::Uuid;

fn new_suffix() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Builds a prefixed id, e.g. `prefixed("wallet")` -> `wallet_018f...`.
pub fn prefixed(prefix: &str) -> String {
    format!("{prefix}_{}", new_suffix())
}

macro_rules! id_fns {
    ($($fn_name:ident => $prefix:literal),* $(,)?) => {
        $(
            pub fn $fn_name() -> String {
                prefixed($prefix)
            }
        )*
    };
}

id_fns! {
    wallet_id => "wallet",
    hold_id => "hold",
    escrow_id => "escrow",
    settlement_id => "settlement",
    event_id => "evt",
    webhook_subscription_id => "whsub",
    delivery_attempt_id => "whdlv",
    mandate_id => "mandate",
    ledger_entry_id => "ledger",
    ledger_tx_id => "tx",
    decision_id => "pdec",
    approval_request_id => "appr",
    policy_id => "policy",
}
