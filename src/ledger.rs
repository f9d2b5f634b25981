//! Double-entry ledger (C10).
//!
//! Every recorded movement is a matched debit/credit pair sharing one
//! `tx_id`. The ledger is append-only: there is no update or delete path,
//! only new entries (including reversals, which are new entries with the
//! accounts swapped).

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::ledger_entry_id;
use crate::ports::LedgerPort;
use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySide {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub tx_id: String,
    pub account: String,
    pub side: EntrySide,
    pub amount_minor: u64,
    pub currency: String,
    pub chain: Option<String>,
    pub chain_tx_hash: Option<String>,
    pub created_at: UnixTimestamp,
}

/// In-memory ledger store, keyed by `tx_id` so a transaction's matched pair
/// is always fetched together.
#[derive(Debug, Default)]
pub struct Ledger {
    entries_by_tx: DashMap<String, Vec<LedgerEntry>>,
    entries_by_account: DashMap<String, Vec<String>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a matched debit/credit pair under a freshly minted `tx_id`.
    pub fn record(
        &self,
        debit_account: &str,
        credit_account: &str,
        amount_minor: u64,
        currency: &str,
        chain: Option<&str>,
        chain_tx_hash: Option<&str>,
        now: UnixTimestamp,
    ) -> String {
        let tx_id = crate::ids::ledger_tx_id();
        let debit = LedgerEntry {
            entry_id: ledger_entry_id(),
            tx_id: tx_id.clone(),
            account: debit_account.to_string(),
            side: EntrySide::Debit,
            amount_minor,
            currency: currency.to_string(),
            chain: chain.map(String::from),
            chain_tx_hash: chain_tx_hash.map(String::from),
            created_at: now,
        };
        let credit = LedgerEntry {
            entry_id: ledger_entry_id(),
            tx_id: tx_id.clone(),
            account: credit_account.to_string(),
            side: EntrySide::Credit,
            amount_minor,
            currency: currency.to_string(),
            chain: chain.map(String::from),
            chain_tx_hash: chain_tx_hash.map(String::from),
            created_at: now,
        };

        self.entries_by_account
            .entry(debit_account.to_string())
            .or_default()
            .push(debit.entry_id.clone());
        self.entries_by_account
            .entry(credit_account.to_string())
            .or_default()
            .push(credit.entry_id.clone());
        self.entries_by_tx.insert(tx_id.clone(), vec![debit, credit]);
        tx_id
    }

    pub fn entries_for_tx(&self, tx_id: &str) -> Vec<LedgerEntry> {
        self.entries_by_tx.get(tx_id).map(|v| v.clone()).unwrap_or_default()
    }

    /// The `limit` most recently created entries across all transactions,
    /// newest first.
    pub fn recent(&self, limit: usize) -> Vec<LedgerEntry> {
        let mut all: Vec<LedgerEntry> = self
            .entries_by_tx
            .iter()
            .flat_map(|tx_entries| tx_entries.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all.truncate(limit);
        all
    }

    /// Net balance for `account`: sum of credits minus sum of debits.
    pub fn balance(&self, account: &str) -> i128 {
        let Some(entry_ids) = self.entries_by_account.get(account) else {
            return 0;
        };
        let mut balance: i128 = 0;
        for tx_entries in self.entries_by_tx.iter() {
            for entry in tx_entries.value() {
                if !entry_ids.contains(&entry.entry_id) {
                    continue;
                }
                match entry.side {
                    EntrySide::Credit => balance += entry.amount_minor as i128,
                    EntrySide::Debit => balance -= entry.amount_minor as i128,
                }
            }
        }
        balance
    }
}

#[async_trait]
impl LedgerPort for Ledger {
    async fn append(
        &self,
        debit_account: &str,
        credit_account: &str,
        amount_minor: u64,
        currency: &str,
        chain: Option<&str>,
        chain_tx_hash: Option<&str>,
    ) -> Result<String> {
        let now = UnixTimestamp::try_now().map_err(|e| crate::error::PlatformError::Internal(Box::new(e)))?;
        Ok(self.record(
            debit_account,
            credit_account,
            amount_minor,
            currency,
            chain,
            chain_tx_hash,
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_creates_a_matched_debit_credit_pair() {
        let ledger = Ledger::new();
        let now = UnixTimestamp(1_000);
        let tx_id = ledger.record("wallet:agent_1", "escrow:esc_1", 500, "USDC", Some("base"), None, now);
        let entries = ledger.entries_for_tx(&tx_id);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.side == EntrySide::Debit && e.account == "wallet:agent_1"));
        assert!(entries.iter().any(|e| e.side == EntrySide::Credit && e.account == "escrow:esc_1"));
        assert_eq!(entries[0].amount_minor, entries[1].amount_minor);
    }

    #[test]
    fn balances_reflect_recorded_movements() {
        let ledger = Ledger::new();
        let now = UnixTimestamp(1_000);
        ledger.record("wallet:a", "wallet:b", 300, "USDC", None, None, now);
        assert_eq!(ledger.balance("wallet:a"), -300);
        assert_eq!(ledger.balance("wallet:b"), 300);
    }

    #[test]
    fn recent_returns_newest_first_and_respects_limit() {
        let ledger = Ledger::new();
        ledger.record("wallet:a", "wallet:b", 1, "USDC", None, None, UnixTimestamp(100));
        ledger.record("wallet:a", "wallet:b", 2, "USDC", None, None, UnixTimestamp(200));
        ledger.record("wallet:a", "wallet:b", 3, "USDC", None, None, UnixTimestamp(300));
        let recent = ledger.recent(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].created_at >= recent[1].created_at);
        assert_eq!(recent[0].created_at, UnixTimestamp(300));
    }

    #[tokio::test]
    async fn ledger_port_append_produces_a_fetchable_tx() {
        let ledger = Ledger::new();
        let tx_id = LedgerPort::append(&ledger, "wallet:a", "wallet:b", 10, "USDC", None, None)
            .await
            .unwrap();
        assert_eq!(ledger.entries_for_tx(&tx_id).len(), 2);
    }
}
