/// In-memory collaborators for unit tests. Each one appends to a shared
/// [`CallLog`] so tests can assert on the order of side effects.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::Address;
use async_trait::async_trait;

use crate::account::{AccountSetupProvider, StorachaAccount};
use crate::document::{DeviceKind, DocumentEngine, PrintSurface};
use crate::error::{DebitError, Error, Result};
use crate::guard::CostTable;
use crate::interaction::{Presenter, SaveSummary};
use crate::ledger::{TokenAmount, TokenLedger, TransactionReceipt};
use crate::network::{ContractAddresses, NetworkEnvironment, NetworkResolver, Wallet};
use crate::orchestrator::{Collaborators, SaveOrchestrator};
use crate::records::{FileRecord, FileStore};
use crate::storage::{
    BackendRegistry, ContentAddress, FileData, UploadBackend, UploadMethod, UploadReceipt,
};

pub const SEPOLIA: u64 = 11155111;

#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }

    /// Index of the first occurrence. Panics if absent so ordering
    /// assertions never pass vacuously.
    pub fn position(&self, entry: &str) -> usize {
        self.entries()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("{entry:?} not in {:?}", self.entries()))
    }
}

pub fn resolver() -> NetworkResolver {
    NetworkResolver::new(vec![
        NetworkEnvironment {
            chain_id: SEPOLIA,
            name: "sepolia".into(),
            contracts: ContractAddresses {
                token_contract: Address::repeat_byte(0x11),
                invoice_contract: Address::repeat_byte(0x22),
            },
        },
        NetworkEnvironment {
            chain_id: 80002,
            name: "amoy".into(),
            contracts: ContractAddresses {
                token_contract: Address::repeat_byte(0x33),
                invoice_contract: Address::repeat_byte(0x44),
            },
        },
    ])
}

pub fn costs() -> CostTable {
    CostTable {
        save: TokenAmount::from_tokens(2),
        save_as: TokenAmount::from_tokens(3),
        print: TokenAmount::from_tokens(1),
    }
}

pub struct FakeWallet {
    chain_id: AtomicU64,
    pending_switch: Mutex<Option<u64>>,
}

impl FakeWallet {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id: AtomicU64::new(chain_id),
            pending_switch: Mutex::new(None),
        }
    }

    pub fn switch_to(&self, chain_id: u64) {
        self.chain_id.store(chain_id, Ordering::SeqCst);
    }

    /// The next `chain_id` call still reports the current chain; every call
    /// after it reports `chain_id`.
    pub fn switch_after_next_read(&self, chain_id: u64) {
        *self.pending_switch.lock().unwrap() = Some(chain_id);
    }
}

#[async_trait]
impl Wallet for FakeWallet {
    fn account(&self) -> Address {
        Address::repeat_byte(0xaa)
    }

    async fn chain_id(&self) -> Result<u64> {
        let current = self.chain_id.load(Ordering::SeqCst);
        if let Some(next) = self.pending_switch.lock().unwrap().take() {
            self.switch_to(next);
        }
        Ok(current)
    }
}

/// Ledger whose balance drops by each confirmed debit.
pub struct FakeLedger {
    balance: Mutex<TokenAmount>,
    fail_reads: AtomicBool,
    next_debit_error: Mutex<Option<DebitError>>,
    reads: AtomicUsize,
    debits: AtomicUsize,
    log: CallLog,
}

impl FakeLedger {
    pub fn new(tokens: u64, log: CallLog) -> Self {
        Self {
            balance: Mutex::new(TokenAmount::from_tokens(tokens)),
            fail_reads: AtomicBool::new(false),
            next_debit_error: Mutex::new(None),
            reads: AtomicUsize::new(0),
            debits: AtomicUsize::new(0),
            log,
        }
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_next_debit(&self, error: DebitError) {
        *self.next_debit_error.lock().unwrap() = Some(error);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Confirmed debits.
    pub fn debit_count(&self) -> usize {
        self.debits.load(Ordering::SeqCst)
    }

    pub fn balance_now(&self) -> TokenAmount {
        *self.balance.lock().unwrap()
    }
}

#[async_trait]
impl TokenLedger for FakeLedger {
    async fn balance(&self, _account: Address, _env: &NetworkEnvironment) -> Result<TokenAmount> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.log.push("balance");
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::LedgerRead("rpc unreachable".into()));
        }
        Ok(self.balance_now())
    }

    async fn debit(
        &self,
        env: &NetworkEnvironment,
        amount: TokenAmount,
    ) -> std::result::Result<TransactionReceipt, DebitError> {
        self.log.push("debit-attempt");
        if let Some(error) = self.next_debit_error.lock().unwrap().take() {
            return Err(error);
        }
        let mut balance = self.balance.lock().unwrap();
        *balance = balance.saturating_sub(amount);
        let n = self.debits.fetch_add(1, Ordering::SeqCst);
        self.log.push("debit");
        Ok(TransactionReceipt {
            tx_hash: format!("0x{}{n:04x}", env.name),
            block_number: Some(100 + n as u64),
            amount,
        })
    }
}

pub struct FakeBackend {
    method: UploadMethod,
    failure: Mutex<Option<String>>,
    uploads: Mutex<Vec<FileData>>,
    log: CallLog,
}

impl FakeBackend {
    pub fn new(method: UploadMethod, log: CallLog) -> Self {
        Self {
            method,
            failure: Mutex::new(None),
            uploads: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn fail_with(&self, cause: &str) {
        *self.failure.lock().unwrap() = Some(cause.to_string());
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl UploadBackend for FakeBackend {
    fn method(&self) -> UploadMethod {
        self.method
    }

    async fn upload(&self, file: &FileData) -> Result<UploadReceipt> {
        self.log.push(format!("upload-attempt:{}", self.method));
        if let Some(cause) = self.failure.lock().unwrap().clone() {
            return Err(Error::Upload {
                backend: self.method,
                cause,
            });
        }
        self.uploads.lock().unwrap().push(file.clone());
        self.log.push(format!("upload:{}", self.method));
        let address = ContentAddress::new(format!(
            "bafy-{}-{}",
            self.method.to_string().to_lowercase(),
            file.name
        ));
        Ok(UploadReceipt::for_blob(address, &file.to_blob()?))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, FileRecord>>,
    fail_saves: AtomicBool,
    log: CallLog,
}

impl MemoryStore {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    /// Seed a record without logging.
    pub fn insert(&self, record: FileRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.name.clone(), record);
    }

    pub fn record(&self, name: &str) -> Option<FileRecord> {
        self.records.lock().unwrap().get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl FileStore for MemoryStore {
    fn get_file(&self, name: &str) -> Result<Option<FileRecord>> {
        Ok(self.record(name))
    }

    fn save_file(&self, record: &FileRecord) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence("disk full".into()));
        }
        self.insert(record.clone());
        self.log.push(format!("persist:{}", record.name));
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.records.lock().unwrap().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

pub struct FakeDocument {
    content: Mutex<String>,
    log: CallLog,
}

impl FakeDocument {
    pub fn new(log: CallLog) -> Self {
        Self {
            content: Mutex::new(String::new()),
            log,
        }
    }

    pub fn set_content(&self, content: &str) {
        *self.content.lock().unwrap() = content.to_string();
    }

    pub fn content(&self) -> String {
        self.content.lock().unwrap().clone()
    }
}

impl DocumentEngine for FakeDocument {
    fn serialized_content(&self) -> Result<String> {
        Ok(self.content())
    }

    fn renderable_content(&self) -> Result<String> {
        Ok(format!("<pre>{}</pre>", self.content()))
    }

    fn device_profile(&self) -> DeviceKind {
        DeviceKind::Default
    }

    fn load_document(&self, name: &str, template_json: &str) -> Result<()> {
        self.set_content(template_json);
        self.log.push(format!("load:{name}"));
        Ok(())
    }

    fn select_document(&self, name: &str) -> Result<()> {
        self.log.push(format!("select:{name}"));
        Ok(())
    }
}

pub struct RecordingPrinter {
    printed: Mutex<Vec<String>>,
    log: CallLog,
}

impl RecordingPrinter {
    pub fn new(log: CallLog) -> Self {
        Self {
            printed: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn printed(&self) -> Vec<String> {
        self.printed.lock().unwrap().clone()
    }
}

impl PrintSurface for RecordingPrinter {
    fn print(&self, markup: &str) -> Result<()> {
        self.printed.lock().unwrap().push(markup.to_string());
        self.log.push("print");
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    events: Mutex<Vec<String>>,
}

impl RecordingPresenter {
    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    /// Prompt, notice, message and balance events. Selection and upload-flag
    /// updates are left out.
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn has(&self, event: &str) -> bool {
        self.events().iter().any(|e| e == event)
    }
}

impl Presenter for RecordingPresenter {
    fn choose_upload_method(&self, _options: &[UploadMethod]) {
        self.push("choose-method".into());
    }

    fn setup_required(&self, method: UploadMethod) {
        self.push(format!("setup-required:{method}"));
    }

    fn save_succeeded(&self, summary: &SaveSummary) {
        self.push(format!("success:{}", summary.filename));
    }

    fn notify(&self, message: &str) {
        self.push(format!("notify:{message}"));
    }

    fn selection_changed(&self, _name: &str) {}

    fn balance_changed(&self, balance: TokenAmount) {
        self.push(format!("balance:{balance}"));
    }
}

pub struct StaticAccounts(pub Option<StorachaAccount>);

impl AccountSetupProvider for StaticAccounts {
    fn storacha_account(&self) -> Result<Option<StorachaAccount>> {
        Ok(self.0.clone())
    }
}

/// A full set of fakes wired into an orchestrator.
pub struct Harness {
    pub log: CallLog,
    pub wallet: Arc<FakeWallet>,
    pub ledger: Arc<FakeLedger>,
    pub storacha: Arc<FakeBackend>,
    pub lighthouse: Arc<FakeBackend>,
    pub store: Arc<MemoryStore>,
    pub document: Arc<FakeDocument>,
    pub printer: Arc<RecordingPrinter>,
    pub presenter: Arc<RecordingPresenter>,
    pub storacha_account: Option<StorachaAccount>,
}

impl Harness {
    /// Everything set up, wallet on Sepolia holding `tokens`.
    pub fn new(tokens: u64) -> Self {
        let log = CallLog::default();
        Self {
            wallet: Arc::new(FakeWallet::new(SEPOLIA)),
            ledger: Arc::new(FakeLedger::new(tokens, log.clone())),
            storacha: Arc::new(FakeBackend::new(UploadMethod::Storacha, log.clone())),
            lighthouse: Arc::new(FakeBackend::new(UploadMethod::Lighthouse, log.clone())),
            store: Arc::new(MemoryStore::new(log.clone())),
            document: Arc::new(FakeDocument::new(log.clone())),
            printer: Arc::new(RecordingPrinter::new(log.clone())),
            presenter: Arc::new(RecordingPresenter::default()),
            storacha_account: Some(StorachaAccount {
                email: "me@example.com".into(),
                space: "did:key:z6Mktest".into(),
            }),
            log,
        }
    }

    pub fn without_storacha_setup(mut self) -> Self {
        self.storacha_account = None;
        self
    }

    pub fn orchestrator(&self, active_file: &str) -> SaveOrchestrator {
        self.orchestrator_with_document(self.document.clone(), active_file)
    }

    pub fn orchestrator_with_document(
        &self,
        document: Arc<dyn DocumentEngine>,
        active_file: impl Into<String>,
    ) -> SaveOrchestrator {
        SaveOrchestrator::new(
            Collaborators {
                wallet: self.wallet.clone(),
                ledger: self.ledger.clone(),
                resolver: resolver(),
                costs: costs(),
                accounts: Arc::new(StaticAccounts(self.storacha_account.clone())),
                backends: BackendRegistry::new()
                    .with(self.storacha.clone())
                    .with(self.lighthouse.clone()),
                store: self.store.clone(),
                document,
                printer: self.printer.clone(),
                presenter: self.presenter.clone(),
            },
            active_file,
        )
    }
}
