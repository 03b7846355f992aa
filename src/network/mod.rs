/// Network resolution.
///
/// Maps the chain the wallet is currently connected to onto one of the
/// configured environments and its contract pair. The wallet can switch
/// networks at any time, so callers resolve on every contract interaction
/// instead of holding on to an environment.
use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Deployed contracts on one network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    /// ERC-20 token debited for metered operations.
    pub token_contract: Address,
    /// Recipient of debits; also reports per-user token holdings.
    pub invoice_contract: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEnvironment {
    pub chain_id: u64,
    pub name: String,
    pub contracts: ContractAddresses,
}

/// Lookup over the static network table.
#[derive(Debug, Clone, Default)]
pub struct NetworkResolver {
    environments: Vec<NetworkEnvironment>,
}

impl NetworkResolver {
    pub fn new(environments: Vec<NetworkEnvironment>) -> Self {
        Self { environments }
    }

    pub fn resolve(&self, chain_id: u64) -> Result<&NetworkEnvironment> {
        self.environments
            .iter()
            .find(|env| env.chain_id == chain_id)
            .ok_or(Error::UnsupportedNetwork { chain_id })
    }

    pub fn environments(&self) -> &[NetworkEnvironment] {
        &self.environments
    }
}

/// Parse a chain id written either as `0x`-prefixed hex or as decimal.
pub fn parse_chain_id(s: &str) -> Result<u64> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| Error::Config(format!("invalid chain id {s:?}: {e}")))
}

/// Connected wallet session.
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Account whose tokens pay for operations.
    fn account(&self) -> Address;

    /// Chain the wallet is connected to right now.
    async fn chain_id(&self) -> Result<u64>;
}
