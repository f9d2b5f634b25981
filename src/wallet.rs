//! Non-custodial wallet record.
//!
//! The wallet never holds balances — those are queried on-chain through the
//! `RpcPort`/`ChainExecutorPort`. This module only owns the record and its
//! freeze/activity state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    MpcV1,
    Erc4337V2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub wallet_id: String,
    pub agent_id: String,
    pub account_type: AccountType,
    pub addresses: HashMap<String, String>,
    pub limit_per_tx: u64,
    pub limit_total: u64,
    pub is_active: bool,
    pub is_frozen: bool,
    pub frozen_at: Option<UnixTimestamp>,
    pub frozen_by: Option<String>,
    pub frozen_reason: Option<String>,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

impl Wallet {
    pub fn new(
        wallet_id: String,
        agent_id: String,
        account_type: AccountType,
        limit_per_tx: u64,
        limit_total: u64,
        now: UnixTimestamp,
    ) -> Self {
        Wallet {
            wallet_id,
            agent_id,
            account_type,
            addresses: HashMap::new(),
            limit_per_tx,
            limit_total,
            is_active: true,
            is_frozen: false,
            frozen_at: None,
            frozen_by: None,
            frozen_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn address_for(&self, chain: &str) -> Option<&str> {
        self.addresses.get(chain).map(String::as_str)
    }

    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_frozen
    }

    pub fn freeze(&mut self, by: String, reason: String, now: UnixTimestamp) {
        self.is_frozen = true;
        self.frozen_at = Some(now);
        self.frozen_by = Some(by);
        self.frozen_reason = Some(reason);
        self.updated_at = now;
    }
}
