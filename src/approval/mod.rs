//! Approval workflow & confidence router (C15).
//!
//! `ConfidenceRouter` scores a transaction against six bounded factors,
//! calibrates the sum through a sigmoid, and discretizes the result into a
//! routing tier. `ApprovalWorkflow` then tracks the multi-signer quorum for
//! whichever tier isn't auto-approved.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};
use crate::ids::approval_request_id;
use crate::policy::SpendingPolicy;
use crate::timestamp::UnixTimestamp;

/// Know-Your-Agent verification tier, carried on [`crate::identity::AgentIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KyaLevel {
    #[default]
    None,
    Basic,
    Verified,
    Attested,
}

impl KyaLevel {
    fn score(self) -> f64 {
        match self {
            KyaLevel::None => 0.0,
            KyaLevel::Basic => 0.10,
            KyaLevel::Verified => 0.20,
            KyaLevel::Attested => 0.30,
        }
    }
}

/// A single past transaction, used to build the history aggregates that the
/// merchant-familiarity, amount-normalcy, and time-of-day factors read.
#[derive(Debug, Clone)]
pub struct TransactionHistoryEntry {
    pub merchant_id: Option<String>,
    pub amount_minor: u64,
    pub timestamp: UnixTimestamp,
}

/// The transaction currently being scored.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    pub amount_minor: u64,
    pub merchant_id: Option<String>,
    pub timestamp: UnixTimestamp,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceFactors {
    /// Know-Your-Agent tier, 0.0-0.30.
    pub kya_level: f64,
    /// Remaining budget as a fraction of the limit, 0.0-0.25.
    pub budget_headroom: f64,
    /// How often this agent has transacted with this merchant, 0.0-0.20.
    pub merchant_familiarity: f64,
    /// z-score-derived normalcy of this amount against history, 0.0-0.15.
    pub amount_normalcy: f64,
    /// Favorable time-of-day, 0.0-0.05.
    pub time_of_day: f64,
    /// Clean compliance history, 0.0-0.05.
    pub compliance_history: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTier {
    AutoApprove,
    ManagerApproval,
    MultiSig,
    HumanRewrite,
}

/// Score, tier, and the factor breakdown that produced them, for one
/// transaction. `recommendation` is a human-readable summary suitable for
/// an audit log or an approver's inbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfidence {
    pub score: f64,
    pub level: RoutingTier,
    pub factors: ConfidenceFactors,
    pub recommendation: String,
}

/// Routing decision produced from a [`TransactionConfidence`]: who needs to
/// sign off, how long they have, and how many signatures make a quorum.
/// `required_approvers` is a placeholder roster (`manager_default`,
/// `approver_1`/`approver_2`) — callers override it with the agent's actual
/// approver list before creating an [`ApprovalWorkflow`] request.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub approval_type: RoutingTier,
    pub required_approvers: Vec<String>,
    pub timeout_seconds: u64,
    pub quorum: usize,
}

/// Single-pass aggregates over recent transaction history, built with
/// Welford's algorithm so a long history never needs to be re-walked per
/// factor.
#[derive(Debug, Clone, Default)]
struct HistoryStats {
    merchant_counts: HashMap<String, u32>,
    hour_counts: HashMap<u32, u32>,
    amount_count: u64,
    amount_mean: f64,
    amount_m2: f64,
}

impl HistoryStats {
    fn build(history: &[TransactionHistoryEntry]) -> Self {
        let mut stats = HistoryStats::default();
        for entry in history {
            if let Some(merchant_id) = &entry.merchant_id {
                *stats.merchant_counts.entry(merchant_id.clone()).or_insert(0) += 1;
            }
            *stats.hour_counts.entry(entry.timestamp.hour_utc()).or_insert(0) += 1;

            stats.amount_count += 1;
            let value = entry.amount_minor as f64;
            let delta = value - stats.amount_mean;
            stats.amount_mean += delta / stats.amount_count as f64;
            let delta2 = value - stats.amount_mean;
            stats.amount_m2 += delta * delta2;
        }
        stats
    }

    fn amount_std_dev(&self) -> f64 {
        if self.amount_count > 1 {
            (self.amount_m2 / (self.amount_count - 1) as f64).max(0.0).sqrt()
        } else if self.amount_count == 1 {
            self.amount_mean * 0.5
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfidenceRouter;

impl ConfidenceRouter {
    /// Scores `transaction` for `agent_id` against `policy`, optional recent
    /// `history`, the agent's `kya_level`, and its recent `violation_count`.
    /// Mirrors the bucketing rules: each factor is looked up from a fixed
    /// table rather than computed continuously, so the score only ever takes
    /// one of a small number of values per factor.
    pub fn calculate_confidence(
        &self,
        agent_id: &str,
        transaction: &TransactionContext,
        policy: &SpendingPolicy,
        history: &[TransactionHistoryEntry],
        kya_level: KyaLevel,
        violation_count: u32,
    ) -> TransactionConfidence {
        let _ = agent_id;
        let history_stats = if history.is_empty() { None } else { Some(HistoryStats::build(history)) };

        let factors = ConfidenceFactors {
            kya_level: kya_level.score(),
            budget_headroom: Self::budget_headroom_factor(policy),
            merchant_familiarity: Self::merchant_familiarity_factor(history_stats.as_ref(), transaction.merchant_id.as_deref()),
            amount_normalcy: Self::amount_normalcy_factor(history_stats.as_ref(), transaction.amount_minor),
            time_of_day: Self::time_of_day_factor(history_stats.as_ref(), transaction.timestamp),
            compliance_history: Self::compliance_history_factor(violation_count),
        };

        let score = self.score_factors(factors);
        let level = self.route(score);
        let recommendation = match level {
            RoutingTier::AutoApprove => "High confidence - auto-approve and execute immediately",
            RoutingTier::ManagerApproval => "Medium confidence - single manager approval required",
            RoutingTier::MultiSig => "Low confidence - multi-signature approval required",
            RoutingTier::HumanRewrite => "Very low confidence - transaction should be redesigned",
        }
        .to_string();

        TransactionConfidence { score, level, factors, recommendation }
    }

    fn budget_headroom_factor(policy: &SpendingPolicy) -> f64 {
        if policy.limit_total == 0 {
            return 0.0;
        }
        let headroom_ratio = policy.remaining_total() as f64 / policy.limit_total as f64;
        if headroom_ratio >= 0.8 {
            0.25
        } else if headroom_ratio >= 0.5 {
            0.20
        } else if headroom_ratio >= 0.2 {
            0.10
        } else {
            0.0
        }
    }

    fn merchant_familiarity_factor(history_stats: Option<&HistoryStats>, merchant_id: Option<&str>) -> f64 {
        match (history_stats, merchant_id) {
            (Some(stats), Some(merchant_id)) => {
                let count = stats.merchant_counts.get(merchant_id).copied().unwrap_or(0);
                if count >= 10 {
                    0.20
                } else if count >= 5 {
                    0.15
                } else if count >= 2 {
                    0.10
                } else {
                    0.0
                }
            }
            _ => 0.05,
        }
    }

    fn amount_normalcy_factor(history_stats: Option<&HistoryStats>, amount_minor: u64) -> f64 {
        let Some(stats) = history_stats.filter(|s| s.amount_count > 0) else {
            return 0.05;
        };
        let std_dev = stats.amount_std_dev();
        if std_dev <= 0.0 {
            return 0.10;
        }
        let z_score = ((amount_minor as f64 - stats.amount_mean) / std_dev).abs();
        if z_score <= 1.0 {
            0.15
        } else if z_score <= 2.0 {
            0.10
        } else if z_score <= 3.0 {
            0.05
        } else {
            0.0
        }
    }

    fn time_of_day_factor(history_stats: Option<&HistoryStats>, timestamp: UnixTimestamp) -> f64 {
        match history_stats {
            Some(stats) => {
                let hour = timestamp.hour_utc();
                if stats.hour_counts.get(&hour).copied().unwrap_or(0) >= 2 {
                    0.05
                } else {
                    0.02
                }
            }
            None => 0.03,
        }
    }

    fn compliance_history_factor(violation_count: u32) -> f64 {
        if violation_count == 0 {
            0.05
        } else if violation_count <= 2 {
            0.02
        } else {
            0.0
        }
    }

    /// Combines a pre-bucketed [`ConfidenceFactors`] into the calibrated
    /// score, clamping each field to its documented bound first so a
    /// misbehaving caller can't push the raw score past 1.0 by over-reporting
    /// a single factor.
    pub fn score_factors(&self, factors: ConfidenceFactors) -> f64 {
        let raw = factors.kya_level.clamp(0.0, 0.30)
            + factors.budget_headroom.clamp(0.0, 0.25)
            + factors.merchant_familiarity.clamp(0.0, 0.20)
            + factors.amount_normalcy.clamp(0.0, 0.15)
            + factors.time_of_day.clamp(0.0, 0.05)
            + factors.compliance_history.clamp(0.0, 0.05);

        let sigmoid = 1.0 / (1.0 + (-5.0 * (raw + 0.03)).exp());
        sigmoid.clamp(0.0, 1.0)
    }

    pub fn route(&self, confidence: f64) -> RoutingTier {
        if confidence >= 0.95 {
            RoutingTier::AutoApprove
        } else if confidence >= 0.85 {
            RoutingTier::ManagerApproval
        } else if confidence >= 0.70 {
            RoutingTier::MultiSig
        } else {
            RoutingTier::HumanRewrite
        }
    }

    /// Translates a scored transaction into who must sign off on it.
    /// `required_approvers` is a placeholder roster; callers substitute the
    /// agent's actual approver list before opening an [`ApprovalWorkflow`]
    /// request.
    pub fn route_transaction(&self, confidence: &TransactionConfidence) -> RoutingDecision {
        match confidence.level {
            RoutingTier::AutoApprove => RoutingDecision {
                approval_type: RoutingTier::AutoApprove,
                required_approvers: vec![],
                timeout_seconds: 0,
                quorum: 0,
            },
            RoutingTier::ManagerApproval => RoutingDecision {
                approval_type: RoutingTier::ManagerApproval,
                required_approvers: vec!["manager_default".into()],
                timeout_seconds: 3_600,
                quorum: 1,
            },
            RoutingTier::MultiSig => RoutingDecision {
                approval_type: RoutingTier::MultiSig,
                required_approvers: vec!["approver_1".into(), "approver_2".into()],
                timeout_seconds: 86_400,
                quorum: 2,
            },
            RoutingTier::HumanRewrite => RoutingDecision {
                approval_type: RoutingTier::HumanRewrite,
                required_approvers: vec![],
                timeout_seconds: 0,
                quorum: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub request_id: String,
    pub transaction_id: String,
    pub required_approvers: Vec<String>,
    pub approvals: Vec<String>,
    pub rejections: Vec<String>,
    pub quorum: usize,
    pub expires_at: UnixTimestamp,
    pub is_rejected: bool,
}

impl ApprovalRequest {
    pub fn check_quorum(&self) -> bool {
        self.approvals.len() >= self.quorum
    }

    fn is_expired(&self, now: UnixTimestamp) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct ApprovalWorkflow {
    requests: DashMap<String, ApprovalRequest>,
}

impl ApprovalWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_request(
        &self,
        transaction_id: String,
        required_approvers: Vec<String>,
        quorum: usize,
        ttl_seconds: u64,
        now: UnixTimestamp,
    ) -> ApprovalRequest {
        let request = ApprovalRequest {
            request_id: approval_request_id(),
            transaction_id,
            required_approvers,
            approvals: Vec::new(),
            rejections: Vec::new(),
            quorum,
            expires_at: now + ttl_seconds,
            is_rejected: false,
        };
        self.requests.insert(request.request_id.clone(), request.clone());
        request
    }

    pub fn get(&self, request_id: &str) -> Option<ApprovalRequest> {
        self.requests.get(request_id).map(|r| r.clone())
    }

    pub fn approve(&self, request_id: &str, signer: &str, now: UnixTimestamp) -> Result<ApprovalRequest> {
        let mut entry = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| PlatformError::NotFound(format!("approval request {request_id}")))?;

        if entry.is_rejected {
            return Err(PlatformError::Conflict("approval request already rejected".into()));
        }
        if entry.is_expired(now) {
            return Err(PlatformError::Conflict("approval request has expired".into()));
        }
        if entry.approvals.iter().any(|s| s == signer) {
            return Err(PlatformError::Conflict(format!("{signer} has already voted")));
        }
        entry.approvals.push(signer.to_string());
        Ok(entry.clone())
    }

    pub fn reject(&self, request_id: &str, signer: &str, now: UnixTimestamp) -> Result<ApprovalRequest> {
        let mut entry = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| PlatformError::NotFound(format!("approval request {request_id}")))?;

        if entry.is_rejected {
            return Err(PlatformError::Conflict("approval request already rejected".into()));
        }
        if entry.is_expired(now) {
            return Err(PlatformError::Conflict("approval request has expired".into()));
        }
        if entry.rejections.iter().any(|s| s == signer) || entry.approvals.iter().any(|s| s == signer) {
            return Err(PlatformError::Conflict(format!("{signer} has already voted")));
        }
        entry.rejections.push(signer.to_string());
        entry.is_rejected = true;
        Ok(entry.clone())
    }

    /// Sweeps every still-open, expired request, returning their ids. Does not
    /// mutate rejected state; callers decide what an expired-open request means.
    pub fn sweep_expired(&self, now: UnixTimestamp) -> Vec<String> {
        self.requests
            .iter()
            .filter(|r| !r.is_rejected && !r.check_quorum() && r.is_expired(now))
            .map(|r| r.request_id.clone())
            .collect()
    }

    pub fn distinct_required_approvers(&self, request_id: &str) -> HashSet<String> {
        self.get(request_id)
            .map(|r| r.required_approvers.into_iter().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_approve_requires_near_perfect_confidence() {
        let router = ConfidenceRouter;
        let factors = ConfidenceFactors {
            kya_level: 0.30,
            budget_headroom: 0.25,
            merchant_familiarity: 0.20,
            amount_normalcy: 0.15,
            time_of_day: 0.05,
            compliance_history: 0.05,
        };
        let confidence = router.score_factors(factors);
        assert!(confidence >= 0.95);
        assert_eq!(router.route(confidence), RoutingTier::AutoApprove);
    }

    #[test]
    fn zero_factors_route_to_human_rewrite() {
        let router = ConfidenceRouter;
        let confidence = router.score_factors(ConfidenceFactors::default());
        assert!(confidence < 0.70);
        assert_eq!(router.route(confidence), RoutingTier::HumanRewrite);
    }

    #[test]
    fn increasing_budget_headroom_never_decreases_confidence() {
        let router = ConfidenceRouter;
        let mut factors = ConfidenceFactors {
            kya_level: 0.1,
            budget_headroom: 0.05,
            merchant_familiarity: 0.1,
            amount_normalcy: 0.05,
            time_of_day: 0.02,
            compliance_history: 0.02,
        };
        let low = router.score_factors(factors);
        factors.budget_headroom = 0.25;
        let high = router.score_factors(factors);
        assert!(high >= low);
    }

    #[test]
    fn factors_are_clamped_to_their_documented_bounds() {
        let router = ConfidenceRouter;
        let over_reported = ConfidenceFactors {
            kya_level: 10.0,
            ..ConfidenceFactors::default()
        };
        let clamped = ConfidenceFactors {
            kya_level: 0.30,
            ..ConfidenceFactors::default()
        };
        assert_eq!(
            router.score_factors(over_reported),
            router.score_factors(clamped)
        );
    }

    #[test]
    fn calculate_confidence_routes_a_clean_familiar_transaction_to_auto_approve() {
        let router = ConfidenceRouter;
        let now = UnixTimestamp(1_700_000_000);
        let policy = sample_policy(now);
        let history: Vec<TransactionHistoryEntry> = (0..12)
            .map(|_| TransactionHistoryEntry {
                merchant_id: Some("merchant_1".into()),
                amount_minor: 10_000_000,
                timestamp: now,
            })
            .collect();
        let transaction = TransactionContext {
            amount_minor: 10_000_000,
            merchant_id: Some("merchant_1".into()),
            timestamp: now,
        };
        let confidence = router.calculate_confidence("agent_1", &transaction, &policy, &history, KyaLevel::Attested, 0);
        assert_eq!(confidence.level, RoutingTier::AutoApprove);
        assert_eq!(confidence.factors.merchant_familiarity, 0.20);
    }

    #[test]
    fn calculate_confidence_with_no_history_and_no_kya_routes_to_human_rewrite() {
        let router = ConfidenceRouter;
        let now = UnixTimestamp(1_700_000_000);
        let mut policy = sample_policy(now);
        policy.spent_total = policy.limit_total;
        let transaction = TransactionContext { amount_minor: 10_000_000, merchant_id: None, timestamp: now };
        let confidence = router.calculate_confidence("agent_1", &transaction, &policy, &[], KyaLevel::None, 5);
        assert_eq!(confidence.level, RoutingTier::HumanRewrite);
        assert_eq!(confidence.factors.compliance_history, 0.0);
    }

    #[test]
    fn route_transaction_assigns_quorum_per_tier() {
        let router = ConfidenceRouter;
        let auto = TransactionConfidence {
            score: 0.99,
            level: RoutingTier::AutoApprove,
            factors: ConfidenceFactors::default(),
            recommendation: String::new(),
        };
        assert_eq!(router.route_transaction(&auto).quorum, 0);

        let multi_sig = TransactionConfidence {
            score: 0.75,
            level: RoutingTier::MultiSig,
            factors: ConfidenceFactors::default(),
            recommendation: String::new(),
        };
        let decision = router.route_transaction(&multi_sig);
        assert_eq!(decision.quorum, 2);
        assert_eq!(decision.required_approvers.len(), 2);
    }

    fn sample_policy(now: UnixTimestamp) -> SpendingPolicy {
        SpendingPolicy {
            policy_id: "policy_1".into(),
            agent_id: "agent_1".into(),
            trust_level: crate::policy::TrustLevel::Medium,
            limit_per_tx: 100_000_000,
            limit_total: 1_000_000_000,
            spent_total: 0,
            daily_limit: None,
            weekly_limit: None,
            monthly_limit: None,
            merchant_rules: vec![],
            allowed_scopes: vec![crate::policy::SpendingScope::All],
            blocked_merchant_categories: vec![],
            allowed_destinations: vec![],
            blocked_destinations: vec![],
            require_preauth: false,
            approval_threshold: None,
            max_drift_score: None,
            max_hold_hours: 168,
            velocity_mode: crate::policy::VelocityMode::Hard,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn quorum_is_reached_once_enough_approvals_land() {
        let workflow = ApprovalWorkflow::new();
        let now = UnixTimestamp(1_000);
        let request = workflow.create_request(
            "tx_1".into(),
            vec!["alice".into(), "bob".into(), "carol".into()],
            2,
            3600,
            now,
        );
        workflow.approve(&request.request_id, "alice", now).unwrap();
        assert!(!workflow.get(&request.request_id).unwrap().check_quorum());
        let after = workflow.approve(&request.request_id, "bob", now).unwrap();
        assert!(after.check_quorum());
    }

    #[test]
    fn a_signer_cannot_vote_twice() {
        let workflow = ApprovalWorkflow::new();
        let now = UnixTimestamp(1_000);
        let request = workflow.create_request("tx_1".into(), vec!["alice".into()], 1, 3600, now);
        workflow.approve(&request.request_id, "alice", now).unwrap();
        let err = workflow.approve(&request.request_id, "alice", now).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn expired_requests_cannot_be_voted_on() {
        let workflow = ApprovalWorkflow::new();
        let now = UnixTimestamp(0);
        let request = workflow.create_request("tx_1".into(), vec!["alice".into()], 1, 60, now);
        let later = now + 61;
        let err = workflow.approve(&request.request_id, "alice", later).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }

    #[test]
    fn rejection_is_terminal_for_the_request() {
        let workflow = ApprovalWorkflow::new();
        let now = UnixTimestamp(1_000);
        let request = workflow.create_request("tx_1".into(), vec!["alice".into(), "bob".into()], 2, 3600, now);
        workflow.reject(&request.request_id, "alice", now).unwrap();
        let err = workflow.approve(&request.request_id, "bob", now).unwrap_err();
        assert_eq!(err.code(), "conflict");
    }
}
