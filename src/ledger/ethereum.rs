/// EVM token ledger over raw JSON-RPC.
///
/// Balance reads call `getUserTokens()` on the invoice contract with the
/// account as sender. Debits are an ERC-20 `transfer(invoice, amount)` signed
/// locally as a legacy transaction, then polled until the receipt shows up
/// or the confirmation timeout elapses.
use std::time::Duration;

use alloy::primitives::{keccak256, Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::{TokenAmount, TokenLedger, TransactionReceipt};
use crate::error::{DebitError, Error, Result};
use crate::network::{NetworkEnvironment, Wallet};

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;

#[derive(Debug, Clone)]
pub struct EthereumConfig {
    /// JSON-RPC endpoint (e.g., Infura, Alchemy, local node).
    pub rpc_url: String,
    /// Private key (hex, with or without 0x prefix) for signing transfers.
    pub private_key_hex: String,
    /// How long to wait for a transfer to be mined.
    pub confirmation_timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
}

/// Ledger client and wallet session backed by one signing key.
pub struct EthereumLedger {
    config: EthereumConfig,
    client: Client,
    signer: PrivateKeySigner,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug)]
enum RpcFailure {
    Transport(String),
    Node { code: i64, message: String },
}

impl std::fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcFailure::Transport(msg) => write!(f, "{msg}"),
            RpcFailure::Node { code, message } => write!(f, "{message} (code {code})"),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ABI calldata for `transfer(address,uint256)`.
pub fn transfer_calldata(to: Address, amount: U256) -> Bytes {
    let mut data = Vec::with_capacity(4 + 64);
    data.extend_from_slice(&selector("transfer(address,uint256)"));
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(to.as_slice());
    data.extend_from_slice(&amount.to_be_bytes::<32>());
    Bytes::from(data)
}

fn parse_quantity_u64(hex_str: &str) -> Result<u64> {
    u64::from_str_radix(hex_str.trim_start_matches("0x"), 16)
        .map_err(|e| Error::Rpc(format!("invalid quantity {hex_str:?}: {e}")))
}

fn parse_quantity_u128(hex_str: &str) -> Result<u128> {
    u128::from_str_radix(hex_str.trim_start_matches("0x"), 16)
        .map_err(|e| Error::Rpc(format!("invalid quantity {hex_str:?}: {e}")))
}

/// Decode a single `uint256` return value.
fn decode_uint256(hex_str: &str) -> Result<U256> {
    let digits = hex_str.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| Error::LedgerRead(format!("invalid uint256 {hex_str:?}: {e}")))
}

impl EthereumLedger {
    pub fn new(config: EthereumConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key_hex
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| Error::Config(format!("Invalid private key: {e}")))?;

        Ok(Self {
            config,
            client: Client::new(),
            signer,
        })
    }

    /// Send a JSON-RPC request; `None` when the node answers with a null result.
    async fn rpc_request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<Option<T>, RpcFailure> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp: JsonRpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(format!("RPC response parse error: {e}")))?;

        if let Some(err) = resp.error {
            return Err(RpcFailure::Node {
                code: err.code,
                message: err.message,
            });
        }

        Ok(resp.result)
    }

    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<T, RpcFailure> {
        self.rpc_request(method, params)
            .await?
            .ok_or_else(|| RpcFailure::Transport(format!("Empty {method} response")))
    }

    /// Build, sign, and broadcast the transfer. Returns the transaction hash.
    ///
    /// Only an explicit wallet refusal is a rejection; node and transport
    /// failures before broadcast are submission failures.
    async fn send_transfer(
        &self,
        env: &NetworkEnvironment,
        amount: TokenAmount,
    ) -> std::result::Result<String, DebitError> {
        use alloy::consensus::SignableTransaction;
        use alloy::signers::Signer;

        let submission = |e: &dyn std::fmt::Display| DebitError::Submission(e.to_string());

        let from = self.signer.address();
        let token = env.contracts.token_contract;
        let input = transfer_calldata(env.contracts.invoice_contract, amount.base_units());

        let nonce_hex: String = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([format!("{from:?}"), "pending"]),
            )
            .await
            .map_err(|e| submission(&e))?;
        let nonce = parse_quantity_u64(&nonce_hex).map_err(|e| submission(&e))?;

        let gas_price_hex: String = self
            .rpc_call("eth_gasPrice", serde_json::json!([]))
            .await
            .map_err(|e| submission(&e))?;
        let gas_price = parse_quantity_u128(&gas_price_hex).map_err(|e| submission(&e))?;

        let gas_hex: String = self
            .rpc_call(
                "eth_estimateGas",
                serde_json::json!([{
                    "from": format!("{from:?}"),
                    "to": format!("{token:?}"),
                    "data": format!("0x{}", hex::encode(&input)),
                }]),
            )
            .await
            .map_err(|e| submission(&e))?;
        let gas_limit = parse_quantity_u64(&gas_hex).map_err(|e| submission(&e))?;

        let tx = alloy::consensus::TxLegacy {
            chain_id: Some(env.chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: alloy::primitives::TxKind::Call(token),
            value: U256::ZERO,
            input,
        };

        let sig_hash = tx.signature_hash();
        let sig = self
            .signer
            .sign_hash(&sig_hash)
            .await
            .map_err(|e| DebitError::Submission(format!("signing failed: {e}")))?;

        let signed = alloy::consensus::TxEnvelope::Legacy(tx.into_signed(sig));

        let mut raw_tx = Vec::new();
        alloy::eips::eip2718::Encodable2718::encode_2718(&signed, &mut raw_tx);
        let raw_hex = format!("0x{}", hex::encode(&raw_tx));

        self.rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await
            .map_err(|e| match e {
                RpcFailure::Node { code, message } if code == USER_REJECTED_CODE => {
                    DebitError::Rejected(format!("user rejected: {message}"))
                }
                other => submission(&other),
            })
    }

    /// Poll for the receipt until it is mined or the timeout elapses.
    async fn wait_for_receipt(
        &self,
        tx_hash: &str,
    ) -> std::result::Result<Option<u64>, DebitError> {
        let deadline = tokio::time::Instant::now() + self.config.confirmation_timeout;

        loop {
            match self
                .rpc_request::<RpcReceipt>(
                    "eth_getTransactionReceipt",
                    serde_json::json!([tx_hash]),
                )
                .await
            {
                Ok(Some(receipt)) => {
                    if receipt.status.as_deref() == Some("0x0") {
                        return Err(DebitError::Reverted {
                            tx_hash: tx_hash.to_string(),
                        });
                    }
                    let block = receipt
                        .block_number
                        .as_deref()
                        .and_then(|b| parse_quantity_u64(b).ok());
                    return Ok(block);
                }
                Ok(None) => debug!(tx_hash, "Transfer not mined yet"),
                Err(e) => warn!(tx_hash, error = %e, "Receipt poll failed"),
            }

            if tokio::time::Instant::now() + self.config.poll_interval > deadline {
                return Err(DebitError::Timeout {
                    tx_hash: tx_hash.to_string(),
                    secs: self.config.confirmation_timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

#[async_trait]
impl Wallet for EthereumLedger {
    fn account(&self) -> Address {
        self.signer.address()
    }

    async fn chain_id(&self) -> Result<u64> {
        let chain_hex: String = self
            .rpc_call("eth_chainId", serde_json::json!([]))
            .await
            .map_err(|e| Error::Rpc(e.to_string()))?;
        parse_quantity_u64(&chain_hex)
    }
}

#[async_trait]
impl TokenLedger for EthereumLedger {
    async fn balance(&self, account: Address, env: &NetworkEnvironment) -> Result<TokenAmount> {
        let data = format!("0x{}", hex::encode(selector("getUserTokens()")));
        let result: String = self
            .rpc_call(
                "eth_call",
                serde_json::json!([
                    {
                        "from": format!("{account:?}"),
                        "to": format!("{:?}", env.contracts.invoice_contract),
                        "data": data,
                    },
                    "latest"
                ]),
            )
            .await
            .map_err(|e| Error::LedgerRead(e.to_string()))?;

        Ok(TokenAmount::from_base_units(decode_uint256(&result)?))
    }

    async fn debit(
        &self,
        env: &NetworkEnvironment,
        amount: TokenAmount,
    ) -> std::result::Result<TransactionReceipt, DebitError> {
        let tx_hash = self.send_transfer(env, amount).await?;
        info!(tx_hash = %tx_hash, network = %env.name, amount = %amount, "Transfer submitted");

        let block_number = self.wait_for_receipt(&tx_hash).await?;

        Ok(TransactionReceipt {
            tx_hash,
            block_number,
            amount,
        })
    }
}
