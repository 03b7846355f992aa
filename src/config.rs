/// Static configuration: network table, operation prices, backend endpoints.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::guard::CostTable;
use crate::network::{parse_chain_id, ContractAddresses, NetworkEnvironment};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub networks: Vec<NetworkEntry>,
    pub costs: CostTable,
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub storacha: StorachaSettings,
    #[serde(default)]
    pub lighthouse: LighthouseSettings,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// One row of the network table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEntry {
    pub name: String,
    /// Hex (`0xaa36a7`) or decimal.
    pub chain_id: String,
    pub token_contract: String,
    pub invoice_contract: String,
}

impl NetworkEntry {
    fn to_environment(&self) -> Result<NetworkEnvironment> {
        let address = |field: &str, value: &str| -> Result<Address> {
            value.parse().map_err(|e| {
                Error::Config(format!("network {}: invalid {field} {value:?}: {e}", self.name))
            })
        };

        Ok(NetworkEnvironment {
            chain_id: parse_chain_id(&self.chain_id)?,
            name: self.name.clone(),
            contracts: ContractAddresses {
                token_contract: address("token_contract", &self.token_contract)?,
                invoice_contract: address("invoice_contract", &self.invoice_contract)?,
            },
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the wallet's node.
    pub rpc_url: String,

    /// Seconds to wait for a transfer to be mined
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,

    /// Receipt poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl LedgerConfig {
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_confirmation_timeout() -> u64 { 120 }
fn default_poll_interval() -> u64 { 1500 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorachaSettings {
    #[serde(default = "default_storacha_url")]
    pub api_url: String,
    /// Bearer token for the upload bridge, if it requires one.
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for StorachaSettings {
    fn default() -> Self {
        Self {
            api_url: default_storacha_url(),
            auth_token: None,
        }
    }
}

fn default_storacha_url() -> String {
    "https://up.storacha.network".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LighthouseSettings {
    #[serde(default = "default_lighthouse_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for LighthouseSettings {
    fn default() -> Self {
        Self {
            api_url: default_lighthouse_url(),
            api_key: String::new(),
        }
    }
}

fn default_lighthouse_url() -> String {
    "https://node.lighthouse.storage".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Holds file records, account setup and the active document.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".medisave")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            return Err(Error::Config("no networks configured".into()));
        }
        let mut seen = HashSet::new();
        for env in self.environments()? {
            if !seen.insert(env.chain_id) {
                return Err(Error::Config(format!(
                    "duplicate chain id {:#x} ({})",
                    env.chain_id, env.name
                )));
            }
        }
        Ok(())
    }

    /// The network table as resolved environments.
    pub fn environments(&self) -> Result<Vec<NetworkEnvironment>> {
        self.networks.iter().map(NetworkEntry::to_environment).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::Operation;
    use crate::ledger::TokenAmount;

    const SAMPLE: &str = r#"
[[networks]]
name = "sepolia"
chain_id = "0xaa36a7"
token_contract = "0x1111111111111111111111111111111111111111"
invoice_contract = "0x2222222222222222222222222222222222222222"

[costs]
save = "1"
save_as = "1.5"
print = "0.5"

[ledger]
rpc_url = "http://127.0.0.1:8545"
"#;

    #[test]
    fn test_load_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();
        let envs = config.environments().unwrap();
        assert_eq!(envs[0].chain_id, 11155111);
        assert_eq!(config.costs.cost(Operation::SaveAs), "1.5".parse::<TokenAmount>().unwrap());
        assert_eq!(config.ledger.confirmation_timeout_secs, 120);
        assert_eq!(config.lighthouse.api_url, "https://node.lighthouse.storage");
        assert_eq!(config.workspace.data_dir, PathBuf::from(".medisave"));
    }

    #[test]
    fn test_missing_cost_rejected() {
        let text = SAMPLE.replace("print = \"0.5\"\n", "");
        assert!(matches!(Config::from_toml(&text), Err(Error::Config(_))));
    }

    #[test]
    fn test_duplicate_chain_rejected() {
        let dup = SAMPLE.replace(
            "[costs]",
            "[[networks]]\nname = \"again\"\nchain_id = \"11155111\"\ntoken_contract = \"0x1111111111111111111111111111111111111111\"\ninvoice_contract = \"0x2222222222222222222222222222222222222222\"\n\n[costs]",
        );
        let err = Config::from_toml(&dup).unwrap_err();
        assert!(err.to_string().contains("duplicate chain id"));
    }

    #[test]
    fn test_bad_address_rejected() {
        let text = SAMPLE.replace("0x2222222222222222222222222222222222222222", "0x22");
        assert!(matches!(Config::from_toml(&text), Err(Error::Config(_))));
    }
}
