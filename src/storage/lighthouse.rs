/// Lighthouse upload backend.
///
/// Lighthouse exposes an IPFS-style `add` endpoint authenticated with an API
/// key and pins everything it receives.
use async_trait::async_trait;
use reqwest::multipart;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{ContentAddress, FileData, UploadBackend, UploadMethod, UploadReceipt};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LighthouseConfig {
    /// Upload node (e.g., "https://node.lighthouse.storage").
    pub api_url: String,
    pub api_key: String,
}

pub struct LighthouseBackend {
    client: Client,
    config: LighthouseConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
    #[allow(dead_code)]
    name: Option<String>,
    size: Option<String>,
}

impl LighthouseBackend {
    pub fn new(config: LighthouseConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn fail(cause: impl Into<String>) -> Error {
        Error::Upload {
            backend: UploadMethod::Lighthouse,
            cause: cause.into(),
        }
    }
}

#[async_trait]
impl UploadBackend for LighthouseBackend {
    fn method(&self) -> UploadMethod {
        UploadMethod::Lighthouse
    }

    async fn upload(&self, file: &FileData) -> Result<UploadReceipt> {
        if self.config.api_key.is_empty() {
            return Err(Self::fail("no API key configured"));
        }

        let blob = file.to_blob()?;
        let part = multipart::Part::bytes(blob.clone())
            .file_name(file.blob_name())
            .mime_str("application/json")
            .map_err(|e| Self::fail(e.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{}/api/v0/add", self.config.api_url))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::fail(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::fail(format!("HTTP {status}: {body}")));
        }

        let add_resp: AddResponse = resp
            .json()
            .await
            .map_err(|e| Self::fail(format!("response parse error: {e}")))?;
        debug!(cid = %add_resp.hash, size = ?add_resp.size, "Lighthouse upload stored");

        Ok(UploadReceipt::for_blob(
            ContentAddress::new(add_resp.hash),
            &blob,
        ))
    }
}
