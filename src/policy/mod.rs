//! Spending policy engine (C6).
//!
//! `evaluate` runs the ordered, short-circuiting check list from spec.md §4.5.
//! Identical inputs always produce identical `(allowed, reason)` — the reason
//! codes are part of the external contract, so every rejection path returns a
//! stable string rather than a formatted one (merchant category names excepted,
//! which the source itself interpolates into the reason).

pub mod attestation;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ports::{PolicyStatePort, RpcPort};
use crate::timestamp::UnixTimestamp;
use crate::wallet::Wallet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustLevel {
    Low,
    Medium,
    High,
    Unlimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SpendingScope {
    All,
    Retail,
    Digital,
    Services,
    Compute,
    Data,
    AgentToAgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Daily,
    Weekly,
    Monthly,
}

impl WindowType {
    fn duration_seconds(self) -> u64 {
        match self {
            WindowType::Daily => 24 * 3600,
            WindowType::Weekly => 7 * 24 * 3600,
            WindowType::Monthly => 30 * 24 * 3600,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WindowType::Daily => "daily",
            WindowType::Weekly => "weekly",
            WindowType::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindowLimit {
    pub window_type: WindowType,
    pub limit_amount: u64,
    pub current_spent: u64,
    pub window_start: UnixTimestamp,
}

impl TimeWindowLimit {
    pub fn new(window_type: WindowType, limit_amount: u64, now: UnixTimestamp) -> Self {
        TimeWindowLimit {
            window_type,
            limit_amount,
            current_spent: 0,
            window_start: now,
        }
    }

    /// Resets the window if its duration has elapsed. Returns whether a reset occurred.
    pub fn reset_if_expired(&mut self, now: UnixTimestamp) -> bool {
        if now.seconds_since_epoch()
            >= self.window_start.seconds_since_epoch() + self.window_type.duration_seconds()
        {
            self.current_spent = 0;
            self.window_start = now;
            true
        } else {
            false
        }
    }

    pub fn can_spend(&mut self, amount: u64, now: UnixTimestamp) -> Result<(), &'static str> {
        self.reset_if_expired(now);
        if self.current_spent.saturating_add(amount) > self.limit_amount {
            return Err(match self.window_type {
                WindowType::Daily => "daily_limit_exceeded",
                WindowType::Weekly => "weekly_limit_exceeded",
                WindowType::Monthly => "monthly_limit_exceeded",
            });
        }
        Ok(())
    }

    pub fn record_spend(&mut self, amount: u64, now: UnixTimestamp) {
        self.reset_if_expired(now);
        self.current_spent = self.current_spent.saturating_add(amount);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MerchantRuleType {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantRule {
    pub rule_type: MerchantRuleType,
    pub merchant_id: Option<String>,
    pub category: Option<String>,
    pub max_per_tx: Option<u64>,
    pub daily_limit: Option<u64>,
    pub reason: Option<String>,
    pub expires_at: Option<UnixTimestamp>,
}

impl MerchantRule {
    pub fn is_active(&self, now: UnixTimestamp) -> bool {
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => true,
        }
    }

    /// Case-insensitive match, per the source: "prevents bypass via casing tricks".
    pub fn matches(&self, merchant_id: &str, merchant_category: Option<&str>, now: UnixTimestamp) -> bool {
        if !self.is_active(now) {
            return false;
        }
        if let Some(rule_merchant) = &self.merchant_id {
            if rule_merchant.eq_ignore_ascii_case(merchant_id) {
                return true;
            }
        }
        if let (Some(rule_category), Some(category)) = (&self.category, merchant_category) {
            if rule_category.eq_ignore_ascii_case(category) {
                return true;
            }
        }
        false
    }
}

/// Velocity enforcement mode. Spec.md's Open Question resolution (§D.1 of
/// SPEC_FULL.md): hard cap by default, exposed as a config toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VelocityMode {
    #[default]
    Hard,
    Signal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendingPolicy {
    pub policy_id: String,
    pub agent_id: String,
    pub trust_level: TrustLevel,
    pub limit_per_tx: u64,
    pub limit_total: u64,
    pub spent_total: u64,
    pub daily_limit: Option<TimeWindowLimit>,
    pub weekly_limit: Option<TimeWindowLimit>,
    pub monthly_limit: Option<TimeWindowLimit>,
    pub merchant_rules: Vec<MerchantRule>,
    pub allowed_scopes: Vec<SpendingScope>,
    pub blocked_merchant_categories: Vec<String>,
    pub allowed_destinations: Vec<String>,
    pub blocked_destinations: Vec<String>,
    pub require_preauth: bool,
    pub approval_threshold: Option<u64>,
    pub max_drift_score: Option<f64>,
    pub max_hold_hours: u32,
    pub velocity_mode: VelocityMode,
    pub created_at: UnixTimestamp,
    pub updated_at: UnixTimestamp,
}

impl SpendingPolicy {
    /// Canonicalization for attestation excludes mutable counters: `spent_total`,
    /// window `current_spent`/`window_start`, and rule timestamps.
    pub fn canonical_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "policy_id": self.policy_id,
            "agent_id": self.agent_id,
            "trust_level": self.trust_level,
            "limit_per_tx": self.limit_per_tx,
            "limit_total": self.limit_total,
            "daily_limit": self.daily_limit.as_ref().map(|w| w.limit_amount),
            "weekly_limit": self.weekly_limit.as_ref().map(|w| w.limit_amount),
            "monthly_limit": self.monthly_limit.as_ref().map(|w| w.limit_amount),
            "merchant_rules": self.merchant_rules.iter().map(|r| serde_json::json!({
                "rule_type": r.rule_type,
                "merchant_id": r.merchant_id,
                "category": r.category,
                "max_per_tx": r.max_per_tx,
                "daily_limit": r.daily_limit,
            })).collect::<Vec<_>>(),
            "allowed_scopes": self.allowed_scopes,
            "blocked_merchant_categories": self.blocked_merchant_categories,
            "allowed_destinations": self.allowed_destinations,
            "blocked_destinations": self.blocked_destinations,
            "require_preauth": self.require_preauth,
            "approval_threshold": self.approval_threshold,
            "max_drift_score": self.max_drift_score,
        })
    }

    /// Budget left before `limit_total` is hit. Feeds the confidence
    /// router's budget-headroom factor.
    pub fn remaining_total(&self) -> u64 {
        self.limit_total.saturating_sub(self.spent_total)
    }

    pub fn record_spend(&mut self, amount: u64, now: UnixTimestamp) {
        self.spent_total = self.spent_total.saturating_add(amount);
        for window in [
            self.daily_limit.as_mut(),
            self.weekly_limit.as_mut(),
            self.monthly_limit.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            window.record_spend(amount, now);
        }
        self.updated_at = now;
    }

    fn check_mcc(&self, mcc_registry: &MccRegistry, mcc_code: Option<&str>) -> Result<(), String> {
        let Some(mcc_code) = mcc_code else {
            return Ok(());
        };
        let info = mcc_registry.get(mcc_code);
        if let Some(info) = info {
            if self
                .blocked_merchant_categories
                .iter()
                .any(|c| c.eq_ignore_ascii_case(info.category))
            {
                return Err(format!("merchant_category_blocked:{}", info.category));
            }
            if info.default_blocked {
                return Err(format!("high_risk_merchant:{}", info.description));
            }
        }
        Ok(())
    }

    fn check_merchant_rules(
        &self,
        merchant_id: &str,
        merchant_category: Option<&str>,
        amount: u64,
        now: UnixTimestamp,
    ) -> Result<(), &'static str> {
        if self
            .merchant_rules
            .iter()
            .any(|r| r.rule_type == MerchantRuleType::Deny && r.matches(merchant_id, merchant_category, now))
        {
            return Err("merchant_denied");
        }
        let allow_rules: Vec<&MerchantRule> = self
            .merchant_rules
            .iter()
            .filter(|r| r.rule_type == MerchantRuleType::Allow)
            .collect();
        if !allow_rules.is_empty() {
            let matched = allow_rules
                .iter()
                .find(|r| r.matches(merchant_id, merchant_category, now));
            match matched {
                None => return Err("merchant_not_allowlisted"),
                Some(rule) => {
                    if let Some(cap) = rule.max_per_tx {
                        if amount > cap {
                            return Err("merchant_cap_exceeded");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MccInfo {
    pub category: &'static str,
    pub description: &'static str,
    pub default_blocked: bool,
}

/// Static MCC (Merchant Category Code) registry. Extend as needed; unknown
/// codes are treated as unrestricted (the source's `get_mcc_info` returns
/// `None` and every check short-circuits to "allowed").
#[derive(Debug, Default)]
pub struct MccRegistry;

impl MccRegistry {
    pub fn get(&self, code: &str) -> Option<MccInfo> {
        match code {
            "7995" => Some(MccInfo {
                category: "gambling",
                description: "Betting/Casino Gambling",
                default_blocked: true,
            }),
            "5993" => Some(MccInfo {
                category: "tobacco",
                description: "Cigar Stores and Stands",
                default_blocked: false,
            }),
            "6051" => Some(MccInfo {
                category: "crypto",
                description: "Quasi Cash - Crypto",
                default_blocked: true,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluateRequest<'a> {
    pub amount_minor: u64,
    pub fee_minor: u64,
    pub chain: &'a str,
    pub token: &'a str,
    pub merchant_id: Option<&'a str>,
    pub merchant_category: Option<&'a str>,
    pub mcc_code: Option<&'a str>,
    pub scope: Option<SpendingScope>,
    pub drift_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: String,
}

impl PolicyDecision {
    /// Exposed per SPEC_FULL.md §D.2: `requires_approval` is allowed=true from
    /// the engine's point of view; callers that want a pipeline pause check this.
    pub fn requires_manual_review(&self) -> bool {
        self.allowed && self.reason == "requires_approval"
    }

    fn allow(reason: &str) -> Self {
        PolicyDecision {
            allowed: true,
            reason: reason.to_string(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        PolicyDecision {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Evaluates `request` against `policy` for `wallet`, following the exact
/// short-circuit order in spec.md §4.5. `rpc_port`/`policy_state_port` are
/// optional — their absence falls back to in-memory counters (dev/test only).
pub async fn evaluate(
    policy: &SpendingPolicy,
    wallet: &Wallet,
    request: &EvaluateRequest<'_>,
    mcc_registry: &MccRegistry,
    rpc_port: Option<&dyn RpcPort>,
    policy_state_port: Option<&dyn PolicyStatePort>,
    now: UnixTimestamp,
) -> PolicyDecision {
    if request.amount_minor == 0 {
        return PolicyDecision::deny("amount_must_be_positive");
    }
    // fee_minor is u64, always >= 0; kept as an explicit check to mirror the
    // source's "fee must be non-negative" step even though it's unreachable here.

    let total_cost = match request.amount_minor.checked_add(request.fee_minor) {
        Some(v) => v,
        None => return PolicyDecision::deny("amount_overflow"),
    };

    let scope = request.scope.unwrap_or(SpendingScope::All);
    if !policy.allowed_scopes.contains(&SpendingScope::All) && !policy.allowed_scopes.contains(&scope) {
        return PolicyDecision::deny("scope_not_allowed");
    }

    if let Err(reason) = policy.check_mcc(mcc_registry, request.mcc_code) {
        return PolicyDecision::deny(reason);
    }

    if total_cost > policy.limit_per_tx {
        return PolicyDecision::deny("per_transaction_limit");
    }

    if let Some(state_port) = policy_state_port {
        if policy.velocity_mode == VelocityMode::Hard {
            match state_port.check_velocity(&policy.agent_id).await {
                Ok((true, _)) => {}
                Ok((false, reason)) => {
                    return PolicyDecision::deny(reason.unwrap_or_else(|| "velocity_exceeded".into()));
                }
                Err(_) => return PolicyDecision::deny("velocity_check_failed"),
            }
        }

        let spent_total = state_port.spent_total(&policy.agent_id).await.unwrap_or(policy.spent_total);
        if spent_total.saturating_add(total_cost) > policy.limit_total {
            return PolicyDecision::deny("total_limit_exceeded");
        }
        for window in [
            policy.daily_limit.as_ref(),
            policy.weekly_limit.as_ref(),
            policy.monthly_limit.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            let spent = state_port
                .window_spent(&policy.agent_id, window.window_type.as_str())
                .await
                .unwrap_or(window.current_spent);
            if spent.saturating_add(total_cost) > window.limit_amount {
                return PolicyDecision::deny(match window.window_type {
                    WindowType::Daily => "daily_limit_exceeded",
                    WindowType::Weekly => "weekly_limit_exceeded",
                    WindowType::Monthly => "monthly_limit_exceeded",
                });
            }
        }
    } else {
        if policy.spent_total.saturating_add(total_cost) > policy.limit_total {
            return PolicyDecision::deny("total_limit_exceeded");
        }
        let mut windows: Vec<TimeWindowLimit> = [
            policy.daily_limit.clone(),
            policy.weekly_limit.clone(),
            policy.monthly_limit.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();
        for window in windows.iter_mut() {
            if let Err(reason) = window.can_spend(total_cost, now) {
                return PolicyDecision::deny(reason);
            }
        }
    }

    if let Some(rpc) = rpc_port {
        match rpc.get_balance(&wallet.wallet_id, request.chain, request.token).await {
            Ok(balance) if balance >= total_cost => {}
            Ok(_) => return PolicyDecision::deny("insufficient_balance"),
            Err(_) => return PolicyDecision::deny("balance_check_failed"),
        }
    }

    if let Some(merchant_id) = request.merchant_id {
        if let Err(reason) =
            policy.check_merchant_rules(merchant_id, request.merchant_category, request.amount_minor, now)
        {
            return PolicyDecision::deny(reason);
        }
    }

    if let (Some(drift_score), Some(max_drift)) = (request.drift_score, policy.max_drift_score) {
        if drift_score > max_drift {
            return PolicyDecision::deny("goal_drift_exceeded");
        }
    }

    if let Some(threshold) = policy.approval_threshold {
        if request.amount_minor > threshold {
            return PolicyDecision::allow("requires_approval");
        }
    }

    PolicyDecision::allow("OK")
}
