//! Mandate model & chain validator (C2).
//!
//! Replaces the source's untyped mandate dicts with a tagged sum type and a
//! `MandateChain` constructor that enforces every invariant in spec.md §3 up
//! front — no caller can hold an `IntentMandate`/`CartMandate`/`PaymentMandate`
//! triple that violates subject/amount/expiry linkage.

use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result};
use crate::timestamp::UnixTimestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionModality {
    HumanPresent,
    HumanNotPresent,
}

/// Fields shared by every mandate kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandateCore {
    pub mandate_id: String,
    pub issuer: String,
    pub subject: String,
    pub expires_at: UnixTimestamp,
    pub nonce: String,
    pub proof: Vec<u8>,
    pub domain: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentMandate {
    #[serde(flatten)]
    pub core: MandateCore,
    pub scope: Vec<String>,
    pub requested_amount_minor: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount_minor: u64,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartMandate {
    #[serde(flatten)]
    pub core: MandateCore,
    pub line_items: Vec<LineItem>,
    pub merchant_domain: String,
    pub currency: String,
    pub subtotal_minor: u64,
    pub taxes_minor: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMandate {
    #[serde(flatten)]
    pub core: MandateCore,
    pub chain: String,
    pub token: String,
    pub amount_minor: u64,
    pub destination: String,
    pub audit_hash: String,
    pub ai_agent_presence: bool,
    pub transaction_modality: TransactionModality,
    /// Execution-only hint. Not part of the signed payload.
    pub wallet_id: Option<String>,
}

/// A verified, structurally-sound Intent -> Cart -> Payment triple.
///
/// Constructed only via [`MandateChain::new`], which enforces every invariant
/// in spec.md §3. Once built, the invariants hold for the lifetime of the value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MandateChain {
    pub intent: IntentMandate,
    pub cart: CartMandate,
    pub payment: PaymentMandate,
}

impl MandateChain {
    /// Validates and constructs a mandate chain. Never consults signatures —
    /// only structure and time, per C2's contract.
    pub fn new(
        intent: IntentMandate,
        cart: CartMandate,
        payment: PaymentMandate,
        now: UnixTimestamp,
    ) -> Result<Self> {
        if intent.core.subject != cart.core.subject || cart.core.subject != payment.core.subject {
            return Err(PlatformError::ChainLinkageError(
                "intent/cart/payment subjects do not match".into(),
            ));
        }

        let cart_total = cart
            .subtotal_minor
            .checked_add(cart.taxes_minor)
            .ok_or_else(|| PlatformError::Validation("cart total overflows u64".into()))?;
        if payment.amount_minor > cart_total {
            return Err(PlatformError::AmountExceedsCart {
                amount_minor: payment.amount_minor,
                cart_total_minor: cart_total,
            });
        }

        if let Some(requested) = intent.requested_amount_minor {
            if payment.amount_minor > requested {
                return Err(PlatformError::AmountExceedsIntent {
                    amount_minor: payment.amount_minor,
                    requested_amount_minor: requested,
                });
            }
        }

        if !(intent.core.expires_at <= cart.core.expires_at
            && cart.core.expires_at <= payment.core.expires_at)
        {
            return Err(PlatformError::ExpiryOrderViolation);
        }

        for (label, expires_at) in [
            ("intent", intent.core.expires_at),
            ("cart", cart.core.expires_at),
            ("payment", payment.core.expires_at),
        ] {
            if expires_at <= now {
                return Err(PlatformError::MandateExpired).map_err(|e| {
                    tracing::debug!(mandate = label, "mandate expired at verification time");
                    e
                });
            }
        }

        Ok(MandateChain {
            intent,
            cart,
            payment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(subject: &str, expires_at: u64) -> MandateCore {
        MandateCore {
            mandate_id: "m1".into(),
            issuer: "sardis".into(),
            subject: subject.into(),
            expires_at: UnixTimestamp(expires_at),
            nonce: "n1".into(),
            proof: vec![],
            domain: "sardis.dev".into(),
            purpose: "payment".into(),
        }
    }

    fn valid_chain() -> (IntentMandate, CartMandate, PaymentMandate) {
        let intent = IntentMandate {
            core: core("agent-1", 300),
            scope: vec!["checkout".into()],
            requested_amount_minor: Some(1_000_000),
        };
        let cart = CartMandate {
            core: core("agent-1", 200),
            line_items: vec![],
            merchant_domain: "merchant.example".into(),
            currency: "USD".into(),
            subtotal_minor: 500_000,
            taxes_minor: 10_000,
        };
        let payment = PaymentMandate {
            core: core("agent-1", 100),
            chain: "base".into(),
            token: "USDC".into(),
            amount_minor: 300_000,
            destination: "0xabc".into(),
            audit_hash: "h".into(),
            ai_agent_presence: true,
            transaction_modality: TransactionModality::HumanNotPresent,
            wallet_id: Some("wallet_1".into()),
        };
        // expires_at ordering: intent(300) <= cart(200) <= payment(100) fails — fix below
        (intent, cart, payment)
    }

    #[test]
    fn rejects_mismatched_subjects() {
        let (intent, mut cart, payment) = valid_chain();
        cart.core.subject = "agent-2".into();
        let err = MandateChain::new(intent, cart, payment, UnixTimestamp(50)).unwrap_err();
        assert_eq!(err.code(), "chain_linkage_error");
    }

    #[test]
    fn rejects_payment_exceeding_cart_total() {
        let (intent, cart, mut payment) = valid_chain();
        payment.amount_minor = cart.subtotal_minor + cart.taxes_minor + 1;
        // Fix expiry ordering for this test: payment must still be last to expire.
        payment.core.expires_at = UnixTimestamp(1_000);
        let mut cart = cart;
        cart.core.expires_at = UnixTimestamp(500);
        let mut intent = intent;
        intent.core.expires_at = UnixTimestamp(100);
        let err = MandateChain::new(intent, cart, payment, UnixTimestamp(50)).unwrap_err();
        assert_eq!(err.code(), "amount_exceeds_cart");
    }

    #[test]
    fn accepts_a_well_formed_chain() {
        let mut intent = IntentMandate {
            core: core("agent-1", 100),
            scope: vec!["checkout".into()],
            requested_amount_minor: Some(1_000_000),
        };
        let mut cart = CartMandate {
            core: core("agent-1", 200),
            line_items: vec![],
            merchant_domain: "merchant.example".into(),
            currency: "USD".into(),
            subtotal_minor: 500_000,
            taxes_minor: 10_000,
        };
        let mut payment = PaymentMandate {
            core: core("agent-1", 300),
            chain: "base".into(),
            token: "USDC".into(),
            amount_minor: 300_000,
            destination: "0xabc".into(),
            audit_hash: "h".into(),
            ai_agent_presence: true,
            transaction_modality: TransactionModality::HumanNotPresent,
            wallet_id: Some("wallet_1".into()),
        };
        intent.core.expires_at = UnixTimestamp(100);
        cart.core.expires_at = UnixTimestamp(200);
        payment.core.expires_at = UnixTimestamp(300);

        let chain = MandateChain::new(intent, cart, payment, UnixTimestamp(50)).unwrap();
        assert_eq!(chain.payment.amount_minor, 300_000);
    }

    #[test]
    fn rejects_already_expired_mandate() {
        let mut intent = IntentMandate {
            core: core("agent-1", 100),
            scope: vec![],
            requested_amount_minor: None,
        };
        let mut cart = CartMandate {
            core: core("agent-1", 200),
            line_items: vec![],
            merchant_domain: "merchant.example".into(),
            currency: "USD".into(),
            subtotal_minor: 500_000,
            taxes_minor: 0,
        };
        let mut payment = PaymentMandate {
            core: core("agent-1", 300),
            chain: "base".into(),
            token: "USDC".into(),
            amount_minor: 100,
            destination: "0xabc".into(),
            audit_hash: "h".into(),
            ai_agent_presence: false,
            transaction_modality: TransactionModality::HumanPresent,
            wallet_id: None,
        };
        intent.core.expires_at = UnixTimestamp(100);
        cart.core.expires_at = UnixTimestamp(200);
        payment.core.expires_at = UnixTimestamp(300);

        let err = MandateChain::new(intent, cart, payment, UnixTimestamp(1_000)).unwrap_err();
        assert_eq!(err.code(), "mandate_expired");
    }
}
