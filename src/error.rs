use std::fmt;

use thiserror::Error;

use crate::guard::Operation;
use crate::ledger::TokenAmount;
use crate::storage::UploadMethod;

/// Why a debit did not produce a confirmed receipt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebitError {
    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("transaction could not be submitted: {0}")]
    Submission(String),

    #[error("transaction {tx_hash} reverted on-chain")]
    Reverted { tx_hash: String },

    #[error("transaction {tx_hash} not confirmed within {secs}s")]
    Timeout { tx_hash: String, secs: u64 },
}

/// Workflow named in error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    New,
    Print,
    Save,
    SaveAs,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Workflow::New => "new",
            Workflow::Print => "print",
            Workflow::Save => "save",
            Workflow::SaveAs => "save-as",
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported network: chain id {chain_id:#x}")]
    UnsupportedNetwork { chain_id: u64 },

    #[error("Ledger read failed: {0}")]
    LedgerRead(String),

    #[error("Token balance unknown: {0}")]
    BalanceUnknown(String),

    #[error("Insufficient funds for {operation}: need {required}, have {available}")]
    InsufficientFunds {
        operation: Operation,
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("Token payment for {operation} failed: {source}")]
    DebitFailed {
        operation: Operation,
        #[source]
        source: DebitError,
    },

    #[error("{method} account is not set up")]
    AccountNotConfigured { method: UploadMethod },

    #[error("Upload to {backend} failed: {cause}")]
    Upload { backend: UploadMethod, cause: String },

    #[error("Invalid filename {name:?}: {rule}")]
    InvalidFilename { name: String, rule: &'static str },

    #[error("Tokens spent for {operation} (tx {tx_hash}) but the operation did not complete: {cause}")]
    EffectFailedAfterDebit {
        operation: Operation,
        tx_hash: String,
        cause: Box<Error>,
    },

    #[error("Cannot update the default document")]
    DefaultDocumentReadOnly,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("A {0} prompt is already pending")]
    InteractionPending(&'static str),

    #[error("No {0} prompt is pending")]
    InteractionNotPending(&'static str),

    #[error("The {0} prompt was dismissed")]
    PromptDismissed(&'static str),

    #[error("{workflow} failed at {step}: {source}")]
    Workflow {
        workflow: Workflow,
        step: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Attach workflow and step context.
    pub fn during(self, workflow: Workflow, step: &'static str) -> Self {
        Error::Workflow {
            workflow,
            step,
            source: Box::new(self),
        }
    }

    /// The underlying error with any workflow context stripped.
    pub fn root(&self) -> &Error {
        match self {
            Error::Workflow { source, .. } => source.root(),
            other => other,
        }
    }

    /// Plain-language message for the user.
    pub fn user_message(&self) -> String {
        match self.root() {
            Error::InsufficientFunds {
                operation,
                required,
                available,
            } => format!(
                "You need at least {required} MediToken to {} (you have {available})",
                operation.verb()
            ),
            Error::DebitFailed { .. } => "Failed to process token payment".to_string(),
            Error::Upload { backend, cause } => {
                format!("Error saving file: upload to {backend} failed ({cause})")
            }
            Error::InvalidFilename { name, rule } => format!("Invalid filename {name:?}: {rule}"),
            Error::AccountNotConfigured { method } => format!(
                "Your {method} account is not configured. Set it up before uploading."
            ),
            Error::EffectFailedAfterDebit {
                tx_hash, cause, ..
            } => format!(
                "Tokens were spent (transaction {tx_hash}) but the file was not saved: {cause}"
            ),
            Error::DefaultDocumentReadOnly => "Cannot update default file!".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
