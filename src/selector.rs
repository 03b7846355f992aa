/// Interactive upload method selection and account readiness checks.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::account::AccountSetupProvider;
use crate::error::Result;
use crate::interaction::{PromptSlot, Presenter};
use crate::storage::UploadMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    NeedsSetup,
}

/// Which prompt is waiting for the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    UploadMethod,
    AccountSetup,
}

pub struct UploadMethodSelector {
    presenter: Arc<dyn Presenter>,
    accounts: Arc<dyn AccountSetupProvider>,
    method_choice: PromptSlot<UploadMethod>,
    setup_notice: PromptSlot<()>,
    raised: Notify,
}

impl UploadMethodSelector {
    pub fn new(presenter: Arc<dyn Presenter>, accounts: Arc<dyn AccountSetupProvider>) -> Self {
        Self {
            presenter,
            accounts,
            method_choice: PromptSlot::new("upload method"),
            setup_notice: PromptSlot::new("account setup"),
            raised: Notify::new(),
        }
    }

    /// Ask the user which backend to upload with and wait for the answer.
    pub async fn choose_method(&self) -> Result<UploadMethod> {
        let pending = self.method_choice.open()?;
        self.presenter.choose_upload_method(&UploadMethod::ALL);
        self.raised.notify_one();

        let method = pending.answer().await?;
        info!(method = %method, "Upload method chosen");
        Ok(method)
    }

    pub fn resolve_method(&self, method: UploadMethod) -> Result<()> {
        self.method_choice.resolve(method)
    }

    pub fn dismiss_method_choice(&self) -> Result<()> {
        self.method_choice.dismiss()
    }

    /// Readiness without prompting.
    pub fn readiness(&self, method: UploadMethod) -> Result<Readiness> {
        match method {
            UploadMethod::Storacha => Ok(match self.accounts.storacha_account()? {
                Some(_) => Readiness::Ready,
                None => Readiness::NeedsSetup,
            }),
            UploadMethod::Lighthouse => Ok(Readiness::Ready),
        }
    }

    /// Check readiness; when setup is missing, show the setup notice and wait
    /// until the user closes it. Setup itself happens elsewhere.
    pub async fn ensure_account_ready(&self, method: UploadMethod) -> Result<Readiness> {
        let readiness = self.readiness(method)?;
        if readiness == Readiness::NeedsSetup {
            warn!(method = %method, "Upload account not set up");
            let pending = self.setup_notice.open()?;
            self.presenter.setup_required(method);
            self.raised.notify_one();
            // Acknowledging and dismissing both end the notice.
            let _ = pending.answer().await;
        }
        Ok(readiness)
    }

    pub fn acknowledge_setup(&self) -> Result<()> {
        self.setup_notice.resolve(())
    }

    pub fn dismiss_setup(&self) -> Result<()> {
        self.setup_notice.dismiss()
    }

    pub fn pending_prompt(&self) -> Option<PromptKind> {
        if self.method_choice.is_pending() {
            Some(PromptKind::UploadMethod)
        } else if self.setup_notice.is_pending() {
            Some(PromptKind::AccountSetup)
        } else {
            None
        }
    }

    /// Wait until some prompt is outstanding.
    pub async fn next_prompt(&self) -> PromptKind {
        loop {
            if let Some(kind) = self.pending_prompt() {
                return kind;
            }
            self.raised.notified().await;
        }
    }
}
