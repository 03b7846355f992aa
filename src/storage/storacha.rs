/// Storacha (formerly web3.storage) upload backend via its HTTP bridge.
///
/// Uploads are made into the user's own space, identified by the account
/// email and space DID they set up beforehand. Storacha pins to IPFS, so the
/// returned CID is reachable through the w3s.link gateway right away.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;

use super::{ContentAddress, FileData, UploadBackend, UploadMethod, UploadReceipt};
use crate::account::AccountSetupProvider;
use crate::error::{Error, Result};

/// Configuration for the Storacha bridge.
#[derive(Debug, Clone)]
pub struct StorachaConfig {
    /// Bridge API endpoint.
    pub api_url: String,
    /// Bearer token, when the bridge requires one.
    pub auth_token: Option<String>,
}

pub struct StorachaBackend {
    client: Client,
    config: StorachaConfig,
    accounts: Arc<dyn AccountSetupProvider>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    /// CID of the uploaded directory.
    cid: String,
}

impl StorachaBackend {
    pub fn new(config: StorachaConfig, accounts: Arc<dyn AccountSetupProvider>) -> Self {
        Self {
            client: Client::new(),
            config,
            accounts,
        }
    }

    fn fail(cause: impl Into<String>) -> Error {
        Error::Upload {
            backend: UploadMethod::Storacha,
            cause: cause.into(),
        }
    }
}

#[async_trait]
impl UploadBackend for StorachaBackend {
    fn method(&self) -> UploadMethod {
        UploadMethod::Storacha
    }

    /// Upload the document as a one-file directory in the user's space.
    async fn upload(&self, file: &FileData) -> Result<UploadReceipt> {
        let account = self
            .accounts
            .storacha_account()?
            .ok_or(Error::AccountNotConfigured {
                method: UploadMethod::Storacha,
            })?;

        let blob = file.to_blob()?;
        let part = multipart::Part::bytes(blob.clone())
            .file_name(file.blob_name())
            .mime_str("application/json")
            .map_err(|e| Self::fail(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let mut request = self
            .client
            .post(format!("{}/upload", self.config.api_url))
            .header("X-Agent-Email", &account.email)
            .header("X-Space-DID", &account.space)
            .query(&[("wrap-with-directory", "true")])
            .multipart(form);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| Self::fail(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::fail(format!("HTTP {status}: {body}")));
        }

        let upload_resp: UploadResponse = resp
            .json()
            .await
            .map_err(|e| Self::fail(format!("response parse error: {e}")))?;

        Ok(UploadReceipt::for_blob(
            ContentAddress::new(upload_resp.cid),
            &blob,
        ))
    }
}
