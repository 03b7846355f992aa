/// Payment guard: balance check, then debit, then the protected effect.
///
/// The effect never runs unless a debit was confirmed first. Debits are
/// irreversible, so an effect that fails after its debit is reported as
/// [`Error::EffectFailedAfterDebit`] and nothing is rolled back.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::interaction::Presenter;
use crate::ledger::{TokenAmount, TokenLedger};
use crate::network::{NetworkEnvironment, NetworkResolver, Wallet};

/// Metered operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Save,
    SaveAs,
    Print,
}

impl Operation {
    /// Verb used in user messages ("you need N tokens to ...").
    pub fn verb(&self) -> &'static str {
        match self {
            Operation::Save | Operation::SaveAs => "save",
            Operation::Print => "print",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::Save => "save",
            Operation::SaveAs => "save-as",
            Operation::Print => "print",
        })
    }
}

/// Token price per operation. Every operation has a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostTable {
    pub save: TokenAmount,
    pub save_as: TokenAmount,
    pub print: TokenAmount,
}

impl CostTable {
    pub fn cost(&self, operation: Operation) -> TokenAmount {
        match operation {
            Operation::Save => self.save,
            Operation::SaveAs => self.save_as,
            Operation::Print => self.print,
        }
    }
}

pub struct PaymentGuard {
    wallet: Arc<dyn Wallet>,
    ledger: Arc<dyn TokenLedger>,
    resolver: NetworkResolver,
    costs: CostTable,
    last_balance: Mutex<Option<TokenAmount>>,
    balance_observer: Option<Arc<dyn Presenter>>,
}

impl PaymentGuard {
    pub fn new(
        wallet: Arc<dyn Wallet>,
        ledger: Arc<dyn TokenLedger>,
        resolver: NetworkResolver,
        costs: CostTable,
    ) -> Self {
        Self {
            wallet,
            ledger,
            resolver,
            costs,
            last_balance: Mutex::new(None),
            balance_observer: None,
        }
    }

    /// Report every successful balance read to `presenter`, including the
    /// re-read that follows each debit.
    pub fn observe_balance(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.balance_observer = Some(presenter);
        self
    }

    pub fn costs(&self) -> &CostTable {
        &self.costs
    }

    pub fn resolver(&self) -> &NetworkResolver {
        &self.resolver
    }

    /// Resolve the environment for the chain the wallet is on right now.
    pub async fn current_environment(&self) -> Result<NetworkEnvironment> {
        let chain_id = self.wallet.chain_id().await?;
        self.resolver.resolve(chain_id).cloned()
    }

    /// Fresh balance read; never served from the cache.
    pub async fn read_balance(&self) -> Result<TokenAmount> {
        let env = self.current_environment().await?;
        self.ledger.balance(self.wallet.account(), &env).await
    }

    /// Re-read the balance and remember it for display.
    pub async fn refresh_balance(&self) -> Result<TokenAmount> {
        let balance = self.read_balance().await?;
        *self.last_balance.lock().unwrap_or_else(|e| e.into_inner()) = Some(balance);
        if let Some(presenter) = &self.balance_observer {
            presenter.balance_changed(balance);
        }
        Ok(balance)
    }

    /// Balance from the most recent successful read.
    pub fn last_known_balance(&self) -> Option<TokenAmount> {
        *self.last_balance.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `action` only after `operation`'s price has been debited.
    pub async fn run_guarded<T, F, Fut>(&self, operation: Operation, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cost = self.costs.cost(operation);

        let balance = match self.read_balance().await {
            Ok(balance) => balance,
            Err(e @ Error::UnsupportedNetwork { .. }) => return Err(e),
            Err(e) => return Err(Error::BalanceUnknown(e.to_string())),
        };

        if balance < cost {
            info!(operation = %operation, cost = %cost, balance = %balance, "Insufficient funds");
            return Err(Error::InsufficientFunds {
                operation,
                required: cost,
                available: balance,
            });
        }

        // The wallet may have switched networks since the balance read.
        let env = self.current_environment().await?;
        let receipt = self
            .ledger
            .debit(&env, cost)
            .await
            .map_err(|source| Error::DebitFailed { operation, source })?;
        info!(
            operation = %operation,
            cost = %cost,
            tx_hash = %receipt.tx_hash,
            network = %env.name,
            "Debit confirmed"
        );

        if let Err(e) = self.refresh_balance().await {
            warn!(error = %e, "Balance refresh after debit failed");
        }

        action().await.map_err(|cause| {
            error!(
                operation = %operation,
                tx_hash = %receipt.tx_hash,
                error = %cause,
                "Effect failed after debit"
            );
            Error::EffectFailedAfterDebit {
                operation,
                tx_hash: receipt.tx_hash.clone(),
                cause: Box::new(cause),
            }
        })
    }
}
