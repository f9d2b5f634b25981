//! Error taxonomy (C18).
//!
//! Every fallible operation in the platform returns a `PlatformError` variant.
//! Each variant carries a machine-readable `code()` and an HTTP-agnostic
//! `transport_status()` so the HTTP layer (`http::mod`) maps `code -> status`
//! through one table instead of scattering status codes across handlers.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("mandate expired")]
    MandateExpired,

    #[error("chain linkage error: {0}")]
    ChainLinkageError(String),

    #[error("payment amount {amount_minor} exceeds cart total {cart_total_minor}")]
    AmountExceedsCart { amount_minor: u64, cart_total_minor: u64 },

    #[error("payment amount {amount_minor} exceeds intent's requested amount {requested_amount_minor}")]
    AmountExceedsIntent { amount_minor: u64, requested_amount_minor: u64 },

    #[error("mandate expirations are not in intent <= cart <= payment order")]
    ExpiryOrderViolation,

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("compliance denied: {reason}")]
    ComplianceDenied {
        reason: String,
        provider: Option<String>,
        rule_id: Option<String>,
    },

    #[error("replay detected for mandate {0}")]
    ReplayDetected(String),

    #[error("transaction failed on {chain}: {reason}")]
    TransactionFailed { chain: String, reason: String },

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PlatformError {
    /// Machine-readable code. Stable external contract (spec.md §7).
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::Validation(_) => "validation_error",
            PlatformError::NotFound(_) => "not_found",
            PlatformError::Conflict(_) => "conflict",
            PlatformError::MandateExpired => "mandate_expired",
            PlatformError::ChainLinkageError(_) => "chain_linkage_error",
            PlatformError::AmountExceedsCart { .. } => "amount_exceeds_cart",
            PlatformError::AmountExceedsIntent { .. } => "amount_exceeds_intent",
            PlatformError::ExpiryOrderViolation => "expiry_order_violation",
            PlatformError::PolicyDenied(_) => "policy_denied",
            PlatformError::ComplianceDenied { .. } => "compliance_denied",
            PlatformError::ReplayDetected(_) => "replay_detected",
            PlatformError::TransactionFailed { .. } => "transaction_failed",
            PlatformError::UpstreamUnavailable(_) => "upstream_unavailable",
            PlatformError::Timeout(_) => "timeout",
            PlatformError::Internal(_) => "internal_error",
        }
    }

    pub fn transport_status(&self) -> StatusCode {
        match self {
            PlatformError::Validation(_) => StatusCode::BAD_REQUEST,
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            PlatformError::Conflict(_) => StatusCode::CONFLICT,
            PlatformError::MandateExpired => StatusCode::BAD_REQUEST,
            PlatformError::ChainLinkageError(_) => StatusCode::BAD_REQUEST,
            PlatformError::AmountExceedsCart { .. } => StatusCode::BAD_REQUEST,
            PlatformError::AmountExceedsIntent { .. } => StatusCode::BAD_REQUEST,
            PlatformError::ExpiryOrderViolation => StatusCode::BAD_REQUEST,
            PlatformError::PolicyDenied(_) => StatusCode::FORBIDDEN,
            PlatformError::ComplianceDenied { .. } => StatusCode::from_u16(451).unwrap(),
            PlatformError::ReplayDetected(_) => StatusCode::CONFLICT,
            PlatformError::TransactionFailed { .. } => StatusCode::BAD_GATEWAY,
            PlatformError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PlatformError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PlatformError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a caller could plausibly retry this with a *new* mandate id.
    /// Never true for policy/compliance/replay — those are terminal per spec.md §7.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::TransactionFailed { .. }
                | PlatformError::UpstreamUnavailable(_)
                | PlatformError::Timeout(_)
        )
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.transport_status();
        let code = self.code();
        let details = match &self {
            PlatformError::ComplianceDenied {
                provider, rule_id, ..
            } => Some(serde_json::json!({ "provider": provider, "rule_id": rule_id })),
            PlatformError::TransactionFailed { chain, .. } => {
                Some(serde_json::json!({ "chain": chain }))
            }
            _ => None,
        };
        // Internal errors never surface their source detail to the transport.
        let message = match &self {
            PlatformError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        (status, Json(ErrorBody { code, message, details })).into_response()
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_errors_are_never_retryable() {
        assert!(!PlatformError::PolicyDenied("x".into()).is_retryable());
        assert!(!PlatformError::ComplianceDenied {
            reason: "x".into(),
            provider: None,
            rule_id: None
        }
        .is_retryable());
        assert!(!PlatformError::ReplayDetected("m1".into()).is_retryable());
    }

    #[test]
    fn transaction_failures_are_retryable() {
        assert!(PlatformError::TransactionFailed {
            chain: "base".into(),
            reason: "nonce too low".into()
        }
        .is_retryable());
    }

    #[test]
    fn codes_match_the_external_contract() {
        assert_eq!(PlatformError::MandateExpired.code(), "mandate_expired");
        assert_eq!(
            PlatformError::ReplayDetected("m".into()).code(),
            "replay_detected"
        );
    }
}
