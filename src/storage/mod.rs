/// Pluggable upload backends for saved documents.
///
/// A document is packaged as one JSON blob named `<name>.json` and pushed to
/// a content-addressed network. The backend answers with the content
/// address (an IPFS CID) which, together with the backend, determines the
/// public gateway URL.
///
/// Backends never retry. A failed upload is reported to the caller as
/// `Error::Upload` naming the backend.
pub mod lighthouse;
pub mod storacha;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMethod {
    Storacha,
    Lighthouse,
}

impl UploadMethod {
    pub const ALL: [UploadMethod; 2] = [UploadMethod::Storacha, UploadMethod::Lighthouse];

    /// Public gateway URL for content uploaded through this backend.
    pub fn gateway_url(&self, address: &ContentAddress) -> String {
        match self {
            UploadMethod::Storacha => format!("https://w3s.link/ipfs/{address}"),
            UploadMethod::Lighthouse => {
                format!("https://gateway.lighthouse.storage/ipfs/{address}")
            }
        }
    }
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UploadMethod::Storacha => "Storacha",
            UploadMethod::Lighthouse => "Lighthouse",
        })
    }
}

impl FromStr for UploadMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "storacha" | "1" => Ok(UploadMethod::Storacha),
            "lighthouse" | "2" => Ok(UploadMethod::Lighthouse),
            other => Err(format!("unknown upload method {other:?}")),
        }
    }
}

/// Backend-assigned identifier of uploaded content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What gets uploaded on save-as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub name: String,
    /// Percent-encoded document content.
    pub content: String,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

impl FileData {
    pub fn blob_name(&self) -> String {
        format!("{}.json", self.name)
    }

    /// JSON body of the uploaded blob.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(format!("file blob: {e}")))
    }
}

/// Metadata returned after a successful upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub address: ContentAddress,
    /// BLAKE3 hash of the uploaded blob.
    pub content_hash: [u8; 32],
    /// Size in bytes of the uploaded blob.
    pub size: u64,
}

impl UploadReceipt {
    pub fn for_blob(address: ContentAddress, blob: &[u8]) -> Self {
        Self {
            address,
            content_hash: blake3::hash(blob).into(),
            size: blob.len() as u64,
        }
    }
}

#[async_trait]
pub trait UploadBackend: Send + Sync {
    fn method(&self) -> UploadMethod;

    async fn upload(&self, file: &FileData) -> Result<UploadReceipt>;
}

/// Upload backends keyed by method.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: HashMap<UploadMethod, Arc<dyn UploadBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, backend: Arc<dyn UploadBackend>) -> Self {
        self.backends.insert(backend.method(), backend);
        self
    }

    pub fn get(&self, method: UploadMethod) -> Result<Arc<dyn UploadBackend>> {
        self.backends.get(&method).cloned().ok_or_else(|| Error::Upload {
            backend: method,
            cause: "backend not configured".to_string(),
        })
    }
}
