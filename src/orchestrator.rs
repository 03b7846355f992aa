/// Save orchestrator: the New, Print, Save and Save-As workflows.
///
/// Save-As order:
/// 1. Validate the filename
/// 2. Ask for an upload method
/// 3. Check the backend account (abort if setup is missing)
/// 4. Upload
/// 5. Guarded by SAVE_AS payment: persist the record, select it
/// 6. Report filename, content address and gateway URL
///
/// Steps run strictly in sequence. Nothing is debited before the upload
/// succeeds. An upload followed by a failed guard leaves an orphaned remote
/// copy with no local record; it is logged and not cleaned up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::account::AccountSetupProvider;
use crate::document::{default_template, DocumentEngine, PrintSurface};
use crate::error::{Error, Result, Workflow};
use crate::guard::{CostTable, Operation, PaymentGuard};
use crate::interaction::{Presenter, SaveSummary};
use crate::ledger::{TokenAmount, TokenLedger};
use crate::network::{NetworkResolver, Wallet};
use crate::records::{decode_content, encode_content, FileRecord, FileStore, DEFAULT_DOCUMENT};
use crate::selector::{Readiness, UploadMethodSelector};
use crate::storage::{BackendRegistry, FileData};

const MAX_FILENAME_LEN: usize = 30;
const RESERVED_NAMES: [&str; 2] = ["default", "Untitled"];

/// Check a proposed filename and return it trimmed.
pub fn validate_filename(raw: &str) -> Result<String> {
    let name = raw.trim();
    let reject = |rule: &'static str| Error::InvalidFilename {
        name: raw.to_string(),
        rule,
    };

    if name.is_empty() {
        return Err(reject("name must not be empty"));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(reject("name is reserved"));
    }
    if name.chars().count() > MAX_FILENAME_LEN {
        return Err(reject("name must be at most 30 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == ' ')
    {
        return Err(reject("only letters, digits, hyphens and spaces are allowed"));
    }
    Ok(name.to_string())
}

/// Everything the orchestrator talks to.
pub struct Collaborators {
    pub wallet: Arc<dyn Wallet>,
    pub ledger: Arc<dyn TokenLedger>,
    pub resolver: NetworkResolver,
    pub costs: CostTable,
    pub accounts: Arc<dyn AccountSetupProvider>,
    pub backends: BackendRegistry,
    pub store: Arc<dyn FileStore>,
    pub document: Arc<dyn DocumentEngine>,
    pub printer: Arc<dyn PrintSurface>,
    pub presenter: Arc<dyn Presenter>,
}

pub struct SaveOrchestrator {
    guard: PaymentGuard,
    selector: UploadMethodSelector,
    backends: BackendRegistry,
    store: Arc<dyn FileStore>,
    document: Arc<dyn DocumentEngine>,
    printer: Arc<dyn PrintSurface>,
    presenter: Arc<dyn Presenter>,
    active_file: Mutex<String>,
    uploading: AtomicBool,
}

/// Clears the uploading flag on every exit path.
struct UploadingFlag<'a> {
    orchestrator: &'a SaveOrchestrator,
}

impl<'a> UploadingFlag<'a> {
    fn raise(orchestrator: &'a SaveOrchestrator) -> Self {
        orchestrator.set_uploading(true);
        Self { orchestrator }
    }
}

impl Drop for UploadingFlag<'_> {
    fn drop(&mut self) {
        self.orchestrator.set_uploading(false);
    }
}

fn guard_step(err: &Error) -> &'static str {
    match err {
        Error::InsufficientFunds { .. }
        | Error::BalanceUnknown(_)
        | Error::UnsupportedNetwork { .. } => "balance check",
        Error::DebitFailed { .. } => "debit",
        Error::EffectFailedAfterDebit { .. } => "guarded effect",
        _ => "payment",
    }
}

impl SaveOrchestrator {
    pub fn new(parts: Collaborators, active_file: impl Into<String>) -> Self {
        let selector = UploadMethodSelector::new(parts.presenter.clone(), parts.accounts);
        Self {
            guard: PaymentGuard::new(parts.wallet, parts.ledger, parts.resolver, parts.costs)
                .observe_balance(parts.presenter.clone()),
            selector,
            backends: parts.backends,
            store: parts.store,
            document: parts.document,
            printer: parts.printer,
            presenter: parts.presenter,
            active_file: Mutex::new(active_file.into()),
            uploading: AtomicBool::new(false),
        }
    }

    pub fn selector(&self) -> &UploadMethodSelector {
        &self.selector
    }

    pub fn guard(&self) -> &PaymentGuard {
        &self.guard
    }

    pub fn active_file(&self) -> String {
        self.active_file
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn select(&self, name: &str) -> Result<()> {
        self.document.select_document(name)?;
        *self.active_file.lock().unwrap_or_else(|e| e.into_inner()) = name.to_string();
        self.presenter.selection_changed(name);
        Ok(())
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::SeqCst)
    }

    fn set_uploading(&self, uploading: bool) {
        self.uploading.store(uploading, Ordering::SeqCst);
        self.presenter.uploading_changed(uploading);
    }

    pub fn last_known_balance(&self) -> Option<TokenAmount> {
        self.guard.last_known_balance()
    }

    /// Fresh balance read, pushed to the presenter.
    pub async fn refresh_balance(&self) -> Result<TokenAmount> {
        self.guard.refresh_balance().await
    }

    async fn refresh_for_display(&self) {
        if let Err(e) = self.refresh_balance().await {
            warn!(error = %e, "Error fetching token balance");
        }
    }

    /// Initial balance read when a session starts. Failures are logged only.
    pub async fn start(&self) {
        self.refresh_for_display().await;
    }

    /// Wallet switched networks: refresh the balance once.
    pub async fn on_network_changed(&self, chain_id: u64) {
        info!(chain_id, "Network changed");
        self.refresh_for_display().await;
    }

    /// Consume chain-change notifications until the sender goes away.
    pub async fn watch_network(&self, mut chain_ids: watch::Receiver<u64>) {
        while chain_ids.changed().await.is_ok() {
            let chain_id = *chain_ids.borrow_and_update();
            self.on_network_changed(chain_id).await;
        }
    }

    fn report<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            warn!(error = %e, "Workflow aborted");
            self.presenter.notify(&e.user_message());
        }
        result
    }

    fn current_record(&self, name: &str, workflow: Workflow) -> Result<FileRecord> {
        let content = self
            .document
            .serialized_content()
            .map_err(|e| e.during(workflow, "serialize"))?;
        let encoded = encode_content(&content);
        let existing = self
            .store
            .get_file(name)
            .map_err(|e| e.during(workflow, "lookup"))?;
        Ok(match existing {
            Some(record) => record.updated(encoded),
            None => FileRecord::new(name, encoded),
        })
    }

    /// Make a stored record the active document.
    pub fn open(&self, name: &str) -> Result<()> {
        let record = self
            .store
            .get_file(name)?
            .ok_or_else(|| Error::FileNotFound(name.to_string()))?;
        let content = decode_content(&record.encoded_content)?;
        self.document.load_document(name, &content)?;
        self.select(name)
    }

    /// Persist the open document (unless it is the template), then load the
    /// blank template. Not metered.
    pub async fn new_document(&self) -> Result<()> {
        let result = self.new_document_inner();
        self.report(result)
    }

    fn new_document_inner(&self) -> Result<()> {
        let name = self.active_file();
        if name != DEFAULT_DOCUMENT {
            let record = self.current_record(&name, Workflow::New)?;
            self.store
                .save_file(&record)
                .map_err(|e| e.during(Workflow::New, "persist"))?;
            info!(file = %name, "Saved open document before new");
            self.select(&name)
                .map_err(|e| e.during(Workflow::New, "select"))?;
        }

        let template = default_template(self.document.device_profile());
        self.document
            .load_document(DEFAULT_DOCUMENT, &template)
            .map_err(|e| e.during(Workflow::New, "load template"))?;
        self.select(DEFAULT_DOCUMENT)
            .map_err(|e| e.during(Workflow::New, "select"))
    }

    pub async fn print(&self) -> Result<()> {
        let result = self.print_inner().await;
        self.report(result)
    }

    async fn print_inner(&self) -> Result<()> {
        let markup = self
            .document
            .renderable_content()
            .map_err(|e| e.during(Workflow::Print, "render"))?;

        self.guard
            .run_guarded(Operation::Print, || async { self.printer.print(&markup) })
            .await
            .map_err(|e| {
                let step = guard_step(&e);
                e.during(Workflow::Print, step)
            })?;

        info!("Document printed");
        Ok(())
    }

    /// Re-save the open named document in place.
    pub async fn save(&self) -> Result<()> {
        let result = self.save_inner().await;
        self.report(result)
    }

    async fn save_inner(&self) -> Result<()> {
        let name = self.active_file();
        if name == DEFAULT_DOCUMENT {
            return Err(Error::DefaultDocumentReadOnly.during(Workflow::Save, "validate"));
        }

        let existing = self
            .store
            .get_file(&name)
            .map_err(|e| e.during(Workflow::Save, "lookup"))?
            .ok_or_else(|| Error::FileNotFound(name.clone()).during(Workflow::Save, "lookup"))?;
        let content = self
            .document
            .serialized_content()
            .map_err(|e| e.during(Workflow::Save, "serialize"))?;
        let record = existing.updated(encode_content(&content));

        self.guard
            .run_guarded(Operation::Save, || async {
                self.store.save_file(&record)?;
                self.select(&name)
            })
            .await
            .map_err(|e| {
                let step = guard_step(&e);
                e.during(Workflow::Save, step)
            })?;

        info!(file = %name, "File updated");
        self.presenter
            .notify(&format!("File {name} updated successfully!"));
        Ok(())
    }

    /// Upload the open document under a new name, then pay and record it.
    pub async fn save_as(&self, filename: &str) -> Result<SaveSummary> {
        let result = self.save_as_inner(filename).await;
        self.report(result)
    }

    async fn save_as_inner(&self, filename: &str) -> Result<SaveSummary> {
        let name = validate_filename(filename).map_err(|e| e.during(Workflow::SaveAs, "validate"))?;

        let method = self
            .selector
            .choose_method()
            .await
            .map_err(|e| e.during(Workflow::SaveAs, "choose method"))?;

        let _uploading = UploadingFlag::raise(self);

        let readiness = self
            .selector
            .ensure_account_ready(method)
            .await
            .map_err(|e| e.during(Workflow::SaveAs, "account setup"))?;
        if readiness == Readiness::NeedsSetup {
            return Err(Error::AccountNotConfigured { method }.during(Workflow::SaveAs, "account setup"));
        }

        let content = self
            .document
            .serialized_content()
            .map_err(|e| e.during(Workflow::SaveAs, "serialize"))?;
        let now = Utc::now();
        let file_data = FileData {
            name: name.clone(),
            content: encode_content(&content),
            created: now,
            modified: now,
        };

        let backend = self
            .backends
            .get(method)
            .map_err(|e| e.during(Workflow::SaveAs, "upload"))?;
        info!(file = %name, method = %method, "Uploading");
        let receipt = backend
            .upload(&file_data)
            .await
            .map_err(|e| e.during(Workflow::SaveAs, "upload"))?;
        info!(
            file = %name,
            cid = %receipt.address,
            size = receipt.size,
            hash = %hex::encode(receipt.content_hash),
            "Upload complete"
        );

        let record = FileRecord {
            created: file_data.created,
            modified: file_data.modified,
            encoded_content: file_data.content,
            name: name.clone(),
        };

        let paid = self
            .guard
            .run_guarded(Operation::SaveAs, || async {
                self.store.save_file(&record)?;
                self.select(&name)
            })
            .await;
        if let Err(e) = paid {
            if !matches!(e, Error::EffectFailedAfterDebit { .. }) {
                warn!(cid = %receipt.address, method = %method, "Uploaded content left without a local record");
            }
            let step = guard_step(&e);
            return Err(e.during(Workflow::SaveAs, step));
        }

        let summary = SaveSummary {
            filename: name,
            gateway_url: method.gateway_url(&receipt.address),
            address: receipt.address,
        };
        info!(file = %summary.filename, gateway = %summary.gateway_url, "Save-as complete");
        self.presenter.save_succeeded(&summary);
        Ok(summary)
    }
}
