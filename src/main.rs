use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use medisave::account::{AccountSetupProvider, JsonAccountSetup, StorachaAccount};
use medisave::config::Config;
use medisave::document::{DeviceKind, HtmlPrinter, WorkspaceDocument};
use medisave::error::{Error, Result};
use medisave::interaction::{Presenter, SaveSummary};
use medisave::ledger::ethereum::{EthereumConfig, EthereumLedger};
use medisave::ledger::TokenAmount;
use medisave::network::{NetworkResolver, Wallet};
use medisave::orchestrator::{Collaborators, SaveOrchestrator};
use medisave::records::{FileStore, JsonFileStore};
use medisave::selector::{PromptKind, UploadMethodSelector};
use medisave::storage::lighthouse::{LighthouseBackend, LighthouseConfig};
use medisave::storage::storacha::{StorachaBackend, StorachaConfig};
use medisave::storage::{BackendRegistry, UploadMethod};

#[derive(Parser)]
#[command(name = "medisave")]
#[command(about = "Token-metered document saving to decentralized storage")]
#[command(version)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, env = "MEDISAVE_CONFIG", default_value = "medisave.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the token balance on the wallet's current network
    Balance,
    /// List supported networks
    Networks,
    /// List saved files
    Files,
    /// Make a saved file the active document
    Open { name: String },
    /// Save the active document locally and start a blank one
    New,
    /// Re-save the active document (costs tokens)
    Save,
    /// Upload the active document under a new name (costs tokens)
    SaveAs {
        filename: String,
        /// Skip the interactive method prompt
        #[arg(long)]
        method: Option<UploadMethod>,
    },
    /// Render the active document (costs tokens)
    Print {
        /// Write HTML here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Refresh the balance whenever the wallet switches networks
    Watch {
        /// Seconds between chain id polls
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Manage backend accounts
    Setup {
        #[command(subcommand)]
        target: SetupCommands,
    },
}

#[derive(Subcommand)]
enum SetupCommands {
    /// Record the Storacha account email and space
    Storacha {
        #[arg(long)]
        email: String,
        #[arg(long)]
        space: String,
    },
    /// Show which backends are ready
    Status,
}

/// Prints prompts and outcomes to the terminal.
struct TerminalPresenter;

impl Presenter for TerminalPresenter {
    fn choose_upload_method(&self, options: &[UploadMethod]) {
        eprintln!("Choose an upload method:");
        for (i, method) in options.iter().enumerate() {
            eprintln!("  {}) {method}", i + 1);
        }
        eprintln!("(empty line cancels)");
    }

    fn setup_required(&self, method: UploadMethod) {
        eprintln!("Your {method} account is not set up.");
        eprintln!("Run `medisave setup storacha --email <EMAIL> --space <DID>` first.");
        eprintln!("Press Enter to continue.");
    }

    fn save_succeeded(&self, summary: &SaveSummary) {
        println!("Saved {}", summary.filename);
        println!("  CID:     {}", summary.address);
        println!("  Gateway: {}", summary.gateway_url);
        println!("  Copy:    {}", summary.clipboard_text());
    }

    fn notify(&self, message: &str) {
        eprintln!("{message}");
    }

    fn selection_changed(&self, name: &str) {
        debug!(file = %name, "Active document changed");
    }

    fn balance_changed(&self, balance: TokenAmount) {
        println!("Balance: {balance} MediToken");
    }

    fn uploading_changed(&self, uploading: bool) {
        if uploading {
            eprintln!("Uploading...");
        }
    }
}

struct Workspace {
    config: Config,
    accounts: Arc<JsonAccountSetup>,
    store: Arc<JsonFileStore>,
    document: Arc<WorkspaceDocument>,
}

impl Workspace {
    fn open(config: Config) -> Self {
        let dir = config.workspace.data_dir.clone();
        Self {
            accounts: Arc::new(JsonAccountSetup::new(dir.join("accounts.json"))),
            store: Arc::new(JsonFileStore::new(dir.join("records"))),
            document: Arc::new(WorkspaceDocument::new(
                dir.join("document.json"),
                DeviceKind::Default,
            )),
            config,
        }
    }

    fn ledger(&self) -> Result<Arc<EthereumLedger>> {
        let private_key_hex = std::env::var("MEDISAVE_PRIVATE_KEY")
            .map_err(|_| Error::Config("MEDISAVE_PRIVATE_KEY is not set".into()))?;
        let ledger = &self.config.ledger;
        Ok(Arc::new(EthereumLedger::new(EthereumConfig {
            rpc_url: ledger.rpc_url.clone(),
            private_key_hex,
            confirmation_timeout: ledger.confirmation_timeout(),
            poll_interval: ledger.poll_interval(),
        })?))
    }

    fn backends(&self) -> BackendRegistry {
        let storacha = &self.config.storacha;
        let lighthouse = &self.config.lighthouse;
        let api_key = std::env::var("MEDISAVE_LIGHTHOUSE_KEY")
            .unwrap_or_else(|_| lighthouse.api_key.clone());

        BackendRegistry::new()
            .with(Arc::new(StorachaBackend::new(
                StorachaConfig {
                    api_url: storacha.api_url.clone(),
                    auth_token: storacha.auth_token.clone(),
                },
                self.accounts.clone(),
            )))
            .with(Arc::new(LighthouseBackend::new(LighthouseConfig {
                api_url: lighthouse.api_url.clone(),
                api_key,
            })))
    }

    fn orchestrator(
        &self,
        ledger: Arc<EthereumLedger>,
        print_to: Option<PathBuf>,
    ) -> Result<SaveOrchestrator> {
        let active = self.document.active()?;
        Ok(SaveOrchestrator::new(
            Collaborators {
                wallet: ledger.clone(),
                ledger,
                resolver: NetworkResolver::new(self.config.environments()?),
                costs: self.config.costs.clone(),
                accounts: self.accounts.clone(),
                backends: self.backends(),
                store: self.store.clone(),
                document: self.document.clone(),
                printer: Arc::new(HtmlPrinter::new(print_to)),
                presenter: Arc::new(TerminalPresenter),
            },
            active.name,
        ))
    }
}

/// Answer one outstanding prompt from the terminal or the preset method.
async fn answer_prompt(
    selector: &UploadMethodSelector,
    kind: PromptKind,
    preset: Option<UploadMethod>,
    lines: &mut Lines<BufReader<Stdin>>,
) -> Result<()> {
    match kind {
        PromptKind::UploadMethod => {
            let choice = match preset {
                Some(method) => Some(method),
                None => loop {
                    match lines.next_line().await? {
                        Some(line) if line.trim().is_empty() => break None,
                        Some(line) => match line.parse::<UploadMethod>() {
                            Ok(method) => break Some(method),
                            Err(e) => eprintln!("{e}"),
                        },
                        None => break None,
                    }
                },
            };
            match choice {
                Some(method) => selector.resolve_method(method),
                None => selector.dismiss_method_choice(),
            }
        }
        PromptKind::AccountSetup => {
            if preset.is_none() {
                lines.next_line().await?;
            }
            selector.acknowledge_setup()
        }
    }
}

async fn save_as(
    orchestrator: &SaveOrchestrator,
    filename: &str,
    preset: Option<UploadMethod>,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let workflow = orchestrator.save_as(filename);
    tokio::pin!(workflow);
    loop {
        tokio::select! {
            result = &mut workflow => return result.map(|_| ()),
            kind = orchestrator.selector().next_prompt() => {
                answer_prompt(orchestrator.selector(), kind, preset, &mut lines).await?;
            }
        }
    }
}

/// Feed chain id changes into the orchestrator until the process is stopped.
async fn watch_chain(orchestrator: &SaveOrchestrator, wallet: &dyn Wallet, interval: Duration) -> Result<()> {
    let initial = wallet.chain_id().await?;
    orchestrator.on_network_changed(initial).await;
    let (tx, rx) = watch::channel(initial);

    let poll = async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match wallet.chain_id().await {
                Ok(chain_id) => {
                    tx.send_if_modified(|current| {
                        let changed = *current != chain_id;
                        *current = chain_id;
                        changed
                    });
                }
                Err(e) => warn!(error = %e, "Chain id poll failed"),
            }
        }
    };

    tokio::join!(orchestrator.watch_network(rx), poll);
    Ok(())
}

fn setup_status(accounts: &JsonAccountSetup, config: &Config) -> Result<()> {
    match accounts.storacha_account()? {
        Some(account) => println!("Storacha:   ready ({} / {})", account.email, account.space),
        None => println!("Storacha:   not set up"),
    }
    let lighthouse_key = std::env::var("MEDISAVE_LIGHTHOUSE_KEY").is_ok()
        || !config.lighthouse.api_key.is_empty();
    if lighthouse_key {
        println!("Lighthouse: ready");
    } else {
        println!("Lighthouse: no API key configured");
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    info!(config = %cli.config.display(), networks = config.networks.len(), "Config loaded");
    let workspace = Workspace::open(config);

    match cli.command {
        Commands::Networks => {
            for env in workspace.config.environments()? {
                println!(
                    "{:<12} {:#x}  token {}  invoice {}",
                    env.name,
                    env.chain_id,
                    env.contracts.token_contract,
                    env.contracts.invoice_contract
                );
            }
        }
        Commands::Files => {
            for name in workspace.store.list_files()? {
                println!("{name}");
            }
        }
        Commands::Setup { target } => match target {
            SetupCommands::Storacha { email, space } => {
                workspace
                    .accounts
                    .save_storacha(&StorachaAccount { email, space })?;
                println!("Storacha account saved");
            }
            SetupCommands::Status => setup_status(&workspace.accounts, &workspace.config)?,
        },
        Commands::Balance => {
            let orchestrator = workspace.orchestrator(workspace.ledger()?, None)?;
            let env = orchestrator.guard().current_environment().await?;
            info!(network = %env.name, "Reading balance");
            orchestrator.refresh_balance().await?;
        }
        Commands::Open { name } => {
            let orchestrator = workspace.orchestrator(workspace.ledger()?, None)?;
            orchestrator.open(&name)?;
            println!("Opened {name}");
        }
        Commands::New => {
            let orchestrator = workspace.orchestrator(workspace.ledger()?, None)?;
            orchestrator.start().await;
            orchestrator.new_document().await?;
        }
        Commands::Save => {
            let orchestrator = workspace.orchestrator(workspace.ledger()?, None)?;
            orchestrator.start().await;
            orchestrator.save().await?;
        }
        Commands::SaveAs { filename, method } => {
            let orchestrator = workspace.orchestrator(workspace.ledger()?, None)?;
            orchestrator.start().await;
            save_as(&orchestrator, &filename, method).await?;
        }
        Commands::Print { out } => {
            let orchestrator = workspace.orchestrator(workspace.ledger()?, out)?;
            orchestrator.start().await;
            orchestrator.print().await?;
        }
        Commands::Watch { interval } => {
            let ledger = workspace.ledger()?;
            let orchestrator = workspace.orchestrator(ledger.clone(), None)?;
            watch_chain(&orchestrator, ledger.as_ref(), Duration::from_secs(interval.max(1))).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "medisave=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            ExitCode::FAILURE
        }
    }
}
