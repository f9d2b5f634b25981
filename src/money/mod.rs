//! Monetary & token registry (C1).
//!
//! Money is represented as an exact `Decimal` for display and as a
//! non-negative `u64` in the token's minor unit for wire and policy math.
//! `TokenMetadata` maps a token symbol to its decimals, issuer, peg, and the
//! per-chain contract addresses it is deployed at.

use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;

use crate::error::{PlatformError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenMetadata {
    pub symbol: &'static str,
    pub decimals: u32,
    pub issuer: &'static str,
    pub peg_currency: &'static str,
    /// Peg ratio expressed as token-units-per-peg-currency-unit (1.0 for USDC/USD).
    pub peg_ratio: Decimal,
    pub contracts: &'static [(&'static str, &'static str)],
}

impl TokenMetadata {
    pub fn contract_address(&self, chain: &str) -> Result<&'static str> {
        self.contracts
            .iter()
            .find(|(c, _)| *c == chain)
            .map(|(_, addr)| *addr)
            .ok_or_else(|| {
                PlatformError::Validation(format!(
                    "token {} has no contract on chain {chain}",
                    self.symbol
                ))
            })
    }
}

static KNOWN_TOKENS: &[TokenMetadata] = &[
    TokenMetadata {
        symbol: "USDC",
        decimals: 6,
        issuer: "Circle",
        peg_currency: "USD",
        peg_ratio: Decimal::ONE,
        contracts: &[
            ("base", "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            ("base-sepolia", "0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
            ("ethereum", "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"),
        ],
    },
    TokenMetadata {
        symbol: "USDT",
        decimals: 6,
        issuer: "Tether",
        peg_currency: "USD",
        peg_ratio: Decimal::ONE,
        contracts: &[("ethereum", "0xdAC17F958D2ee523a2206206994597C13D831ec7")],
    },
    TokenMetadata {
        symbol: "PYUSD",
        decimals: 6,
        issuer: "PayPal",
        peg_currency: "USD",
        peg_ratio: Decimal::ONE,
        contracts: &[("ethereum", "0x6c3ea9036406852006290770BEdFcAbA0e23A0e8")],
    },
];

static TOKEN_BY_SYMBOL: Lazy<HashMap<&'static str, &'static TokenMetadata>> = Lazy::new(|| {
    let mut map = HashMap::with_capacity(KNOWN_TOKENS.len());
    for token in KNOWN_TOKENS {
        map.insert(token.symbol, token);
    }
    map
});

/// Returns metadata for a known token symbol.
pub fn get(token: &str) -> Result<&'static TokenMetadata> {
    TOKEN_BY_SYMBOL
        .get(token)
        .copied()
        .ok_or_else(|| PlatformError::Validation(format!("unknown token: {token}")))
}

/// Converts a minor-unit integer amount into an exact decimal for display.
pub fn normalize(token: &str, minor: u64) -> Result<Decimal> {
    let meta = get(token)?;
    Ok(Decimal::from(minor) / Decimal::from(10u64.pow(meta.decimals)))
}

/// Converts a decimal amount into the token's minor unit. Truncation of a
/// fractional minor unit is rejected rather than silently rounded, since
/// truncation here is the bug the spec explicitly calls out.
pub fn to_minor(token: &str, decimal: Decimal) -> Result<u64> {
    let meta = get(token)?;
    if decimal.is_sign_negative() {
        return Err(PlatformError::Validation(
            "amount must be non-negative".into(),
        ));
    }
    let scaled = decimal * Decimal::from(10u64.pow(meta.decimals));
    if scaled.fract() != Decimal::ZERO {
        return Err(PlatformError::Validation(format!(
            "amount {decimal} has sub-minor-unit precision for {token}"
        )));
    }
    scaled
        .to_u64()
        .ok_or_else(|| PlatformError::Validation("amount overflows minor-unit range".into()))
}

/// Returns the contract address for `token` on `chain`.
pub fn contract_address(token: &str, chain: &str) -> Result<&'static str> {
    get(token)?.contract_address(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn known_token_round_trips_minor_units() {
        let amount = Decimal::from_str("12.50").unwrap();
        let minor = to_minor("USDC", amount).unwrap();
        assert_eq!(minor, 12_500_000);
        let back = normalize("USDC", minor).unwrap();
        assert_eq!(back, amount);
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert!(get("DOGE").is_err());
    }

    #[test]
    fn unsupported_chain_is_rejected() {
        let err = contract_address("USDT", "base").unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn sub_minor_precision_is_rejected_not_truncated() {
        let amount = Decimal::from_str("1.0000001").unwrap();
        assert!(to_minor("USDC", amount).is_err());
    }

    #[test]
    fn known_contract_lookup_succeeds() {
        assert_eq!(
            contract_address("USDC", "base").unwrap(),
            "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"
        );
    }
}
