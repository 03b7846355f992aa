/// Token ledger access.
///
/// The ledger is the on-chain side of payment: reading how many tokens the
/// connected account holds and transferring the price of an operation from
/// the account to the invoice contract. Amounts use 18 decimals.
///
/// A debit either returns a confirmed receipt or an error. Callers must not
/// assume tokens moved unless `debit` returned `Ok`.
pub mod ethereum;

use std::fmt;
use std::str::FromStr;

use alloy::primitives::utils::{format_ether, parse_ether};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DebitError, Error, Result};
use crate::network::NetworkEnvironment;

/// Non-negative token quantity stored in base units (10^-18 token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAmount(U256);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(U256::ZERO);

    pub fn from_base_units(units: U256) -> Self {
        Self(units)
    }

    /// Whole tokens, e.g. `from_tokens(2)` is 2.0 tokens.
    pub fn from_tokens(tokens: u64) -> Self {
        Self(U256::from(tokens) * U256::from(10u64).pow(U256::from(18u64)))
    }

    pub fn base_units(&self) -> U256 {
        self.0
    }

    pub fn saturating_sub(self, other: TokenAmount) -> TokenAmount {
        TokenAmount(self.0.saturating_sub(other.0))
    }
}

impl FromStr for TokenAmount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_ether(s.trim())
            .map(TokenAmount)
            .map_err(|e| Error::Config(format!("invalid token amount {s:?}: {e}")))
    }
}

impl TryFrom<String> for TokenAmount {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<TokenAmount> for String {
    fn from(amount: TokenAmount) -> String {
        amount.to_string()
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = format_ether(self.0);
        let trimmed = match full.split_once('.') {
            Some((whole, frac)) => {
                let frac = frac.trim_end_matches('0');
                if frac.is_empty() {
                    whole.to_string()
                } else {
                    format!("{whole}.{frac}")
                }
            }
            None => full,
        };
        f.write_str(&trimmed)
    }
}

/// Confirmed on-chain transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub amount: TokenAmount,
}

/// Reads balances and performs debits against a resolved contract pair.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Current balance of `account`. Errors mean "unknown", never zero.
    async fn balance(&self, account: Address, env: &NetworkEnvironment) -> Result<TokenAmount>;

    /// Transfer `amount` to the environment's invoice contract and wait for
    /// confirmation.
    async fn debit(
        &self,
        env: &NetworkEnvironment,
        amount: TokenAmount,
    ) -> std::result::Result<TransactionReceipt, DebitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let a: TokenAmount = "2".parse().unwrap();
        assert_eq!(a, TokenAmount::from_tokens(2));
        assert_eq!(a.to_string(), "2");

        let b: TokenAmount = "0.5".parse().unwrap();
        assert_eq!(b.to_string(), "0.5");
        assert!(b < a);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("two".parse::<TokenAmount>().is_err());
    }

    #[test]
    fn test_saturating_sub() {
        let five = TokenAmount::from_tokens(5);
        let two = TokenAmount::from_tokens(2);
        assert_eq!(five.saturating_sub(two), TokenAmount::from_tokens(3));
        assert_eq!(two.saturating_sub(five), TokenAmount::ZERO);
    }
}
