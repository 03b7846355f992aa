/// Externally configured backend accounts.
///
/// Storacha uploads need an account email and a storage space that the user
/// sets up outside of the save workflow. The workflow only asks whether they
/// are present.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorachaAccount {
    pub email: String,
    /// Space DID, e.g. `did:key:z6Mk...`.
    pub space: String,
}

pub trait AccountSetupProvider: Send + Sync {
    /// `None` until both email and space have been set up.
    fn storacha_account(&self) -> Result<Option<StorachaAccount>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountFile {
    #[serde(default)]
    storacha_email: Option<String>,
    #[serde(default)]
    storacha_space: Option<String>,
}

/// Account flags persisted as `accounts.json` in the workspace.
pub struct JsonAccountSetup {
    path: PathBuf,
}

impl JsonAccountSetup {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<AccountFile> {
        match std::fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Serialization(format!("account file: {e}"))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AccountFile::default()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn save_storacha(&self, account: &StorachaAccount) -> Result<()> {
        let mut file = self.read()?;
        file.storacha_email = Some(account.email.clone());
        file.storacha_space = Some(account.space.clone());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| Error::Serialization(format!("account file: {e}")))?;
        std::fs::write(&self.path, bytes)?;

        info!(email = %account.email, space = %account.space, "Storacha account saved");
        Ok(())
    }
}

impl AccountSetupProvider for JsonAccountSetup {
    fn storacha_account(&self) -> Result<Option<StorachaAccount>> {
        let file = self.read()?;
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        Ok(
            match (non_empty(file.storacha_email), non_empty(file.storacha_space)) {
                (Some(email), Some(space)) => Some(StorachaAccount { email, space }),
                _ => None,
            },
        )
    }
}
