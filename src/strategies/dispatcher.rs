// DANS : src/strategies/dispatcher.rs

use super::sniper::{Sniper, SniperConfig, SniperError};
use super::task::{AutoSell, Task};
use crate::data_pipeline::pool_resolver::PoolStateSource;
use crate::decoders::pool_state::now_millis;
use crate::execution::{ExecutionError, SwapOutcome, SwapRequest, SwapService, TransactionSigner};
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Signataires disponibles, indexés par le `walletRef` des tâches.
pub type WalletBook = HashMap<String, Arc<dyn TransactionSigner>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub workers: usize,
    /// Budget de chaque swap (achat ou revente), attente du permis exclue.
    pub task_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { workers: 4, task_deadline: Duration::from_secs(120) }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("wallet `{0}` inconnu")]
    UnknownWallet(String),
    #[error("tâche de sniping sans sniper configuré")]
    SniperUnavailable,
    #[error("échéance de {0:?} dépassée")]
    Deadline(Duration),
    #[error("annulé")]
    Cancelled,
    #[error(transparent)]
    Swap(#[from] ExecutionError),
    #[error(transparent)]
    Snipe(#[from] SniperError),
}

impl DispatchError {
    pub fn status(&self) -> &'static str {
        match self {
            DispatchError::Cancelled | DispatchError::Snipe(SniperError::Cancelled) => "cancelled",
            DispatchError::Swap(e) if e.is_cancelled() => "cancelled",
            DispatchError::Deadline(_) | DispatchError::Swap(ExecutionError::DeadlineExceeded) => "timeout",
            _ => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Snipe,
}

/// Une ligne du journal de trades, transmise telle quelle à l'exporteur.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub timestamp: u64,
    pub task: String,
    pub wallet: String,
    pub pair: String,
    pub action: TradeAction,
    /// Montants bruts ; absents quand le swap n'a pas été construit.
    pub amount_in: Option<u64>,
    pub amount_out: Option<u64>,
    pub signature: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

fn pair(input: &Pubkey, output: &Pubkey) -> String {
    format!("{input}/{output}")
}

impl TradeRecord {
    fn from_outcome(task: &str, wallet: &str, pair: String, action: TradeAction, outcome: &SwapOutcome) -> Self {
        Self {
            timestamp: now_millis(),
            task: task.to_string(),
            wallet: wallet.to_string(),
            pair,
            action,
            amount_in: Some(outcome.params.amount_in),
            amount_out: outcome.received(),
            signature: Some(outcome.status.signature.to_string()),
            status: outcome.status.state.as_str().to_string(),
            error_message: outcome.status.error_message.clone(),
        }
    }

    fn from_error(task: &str, wallet: &str, pair: String, action: TradeAction, error: &DispatchError) -> Self {
        let signature = match error {
            DispatchError::Snipe(SniperError::OnChain { signature, .. }) => Some(signature.to_string()),
            _ => None,
        };
        Self {
            timestamp: now_millis(),
            task: task.to_string(),
            wallet: wallet.to_string(),
            pair,
            action,
            amount_in: None,
            amount_out: None,
            signature,
            status: error.status().to_string(),
            error_message: Some(error.to_string()),
        }
    }
}

/// Bilan d'une exécution. `succeeded` compte les achats envoyés sans échec connu.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub autosells: usize,
}

impl DispatchSummary {
    fn absorb(&mut self, other: DispatchSummary) {
        self.tasks += other.tasks;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.autosells += other.autosells;
    }

    fn count_error(&mut self, error: &DispatchError) {
        if error.status() == "cancelled" {
            self.cancelled += 1;
        } else {
            self.failed += 1;
        }
    }
}

/// Exécute des tâches indépendantes sur un nombre borné de workers.
pub struct TaskDispatcher {
    swapper: Arc<dyn SwapService>,
    wallets: Arc<WalletBook>,
    sniper: Option<(Arc<dyn PoolStateSource>, SniperConfig)>,
    config: DispatcherConfig,
}

impl TaskDispatcher {
    pub fn new(swapper: Arc<dyn SwapService>, wallets: WalletBook, config: DispatcherConfig) -> Self {
        Self { swapper, wallets: Arc::new(wallets), sniper: None, config }
    }

    /// Les tâches portant `snipePool` passent par un sniper construit sur `source`.
    pub fn with_sniper(mut self, source: Arc<dyn PoolStateSource>, config: SniperConfig) -> Self {
        self.sniper = Some((source, config));
        self
    }

    /// Lance toutes les tâches et rend la main quand la dernière est terminée.
    /// Chaque achat et chaque revente produit un `TradeRecord` sur `records`.
    pub async fn run(
        &self,
        tasks: Vec<Task>,
        records: mpsc::Sender<TradeRecord>,
        cancel: CancellationToken,
    ) -> DispatchSummary {
        let workers = self.config.workers.max(1);
        let worker = Worker {
            swapper: self.swapper.clone(),
            wallets: self.wallets.clone(),
            sniper: self.sniper.clone(),
            config: self.config,
            permits: Arc::new(Semaphore::new(workers)),
            records,
        };
        info!(tasks = tasks.len(), workers, "[Dispatcher] Démarrage");

        let mut set = JoinSet::new();
        for task in tasks {
            let span = info_span!("task", task = %task.name);
            set.spawn(worker.clone().run(task, cancel.clone()).instrument(span));
        }
        drop(worker);

        let mut summary = DispatchSummary::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(one) => summary.absorb(one),
                Err(e) => {
                    error!(error = %e, "[Dispatcher] Worker interrompu");
                    summary.tasks += 1;
                    summary.failed += 1;
                }
            }
        }
        info!(
            tasks = summary.tasks,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "[Dispatcher] Terminé"
        );
        summary
    }
}

#[derive(Clone)]
struct Worker {
    swapper: Arc<dyn SwapService>,
    wallets: Arc<WalletBook>,
    sniper: Option<(Arc<dyn PoolStateSource>, SniperConfig)>,
    config: DispatcherConfig,
    permits: Arc<Semaphore>,
    records: mpsc::Sender<TradeRecord>,
}

impl Worker {
    async fn run(self, task: Task, cancel: CancellationToken) -> DispatchSummary {
        let mut summary = DispatchSummary { tasks: 1, ..Default::default() };
        let action = if task.snipe_pool.is_some() { TradeAction::Snipe } else { TradeAction::Buy };
        let buy_pair = pair(&task.input_mint, &task.output_mint);

        let Some(signer) = self.wallets.get(&task.wallet_ref).cloned() else {
            let error = DispatchError::UnknownWallet(task.wallet_ref.clone());
            warn!(error = %error, "[Dispatcher] Tâche ignorée");
            self.emit(TradeRecord::from_error(&task.name, &task.wallet_ref, buy_pair, action, &error)).await;
            summary.failed = 1;
            return summary;
        };
        let wallet = signer.pubkey().to_string();

        let outcome = match self.buy(&task, signer.clone(), &cancel).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.report(&task, &wallet, buy_pair, action, &error).await;
                summary.count_error(&error);
                return summary;
            }
        };
        self.emit(TradeRecord::from_outcome(&task.name, &wallet, buy_pair, action, &outcome)).await;
        if let Some(failure) = outcome.status.failure() {
            warn!(error = %failure, "[Dispatcher] Achat échoué on-chain, pas de revente");
            summary.failed = 1;
            return summary;
        }
        summary.succeeded = 1;
        info!(signature = %outcome.status.signature, state = outcome.status.state.as_str(), "[Dispatcher] Achat terminé");

        let Some(autosell) = task.autosell else {
            return summary;
        };
        summary.autosells = 1;
        let sell_pair = pair(&task.output_mint, &task.input_mint);
        match self.autosell(&task, autosell, signer, &outcome, &cancel).await {
            Ok(Some(sold)) => {
                info!(signature = %sold.status.signature, state = sold.status.state.as_str(), "[Dispatcher] Revente terminée");
                self.emit(TradeRecord::from_outcome(&task.name, &wallet, sell_pair, TradeAction::Sell, &sold)).await;
            }
            Ok(None) => info!("[Dispatcher] Rien à revendre"),
            Err(error) => self.report(&task, &wallet, sell_pair, TradeAction::Sell, &error).await,
        }
        summary
    }

    async fn buy(
        &self,
        task: &Task,
        signer: Arc<dyn TransactionSigner>,
        cancel: &CancellationToken,
    ) -> Result<SwapOutcome, DispatchError> {
        let _permit = self.acquire(cancel).await?;
        let deadline = Instant::now() + self.config.task_deadline;
        let token = cancel.child_token();
        let request = task.swap_request(Some(deadline));

        let work = self.execute(task.snipe_pool, request, signer, &token);
        self.within(deadline, cancel, &token, work).await
    }

    async fn execute(
        &self,
        snipe_pool: Option<Pubkey>,
        request: SwapRequest,
        signer: Arc<dyn TransactionSigner>,
        token: &CancellationToken,
    ) -> Result<SwapOutcome, DispatchError> {
        match snipe_pool {
            Some(pool_id) => {
                let (source, config) = self.sniper.as_ref().ok_or(DispatchError::SniperUnavailable)?;
                let sniper = Sniper::new(source.clone(), self.swapper.clone(), config.clone());
                let report = sniper.run(pool_id, request, signer, token.clone()).await?;
                Ok(report.outcome)
            }
            None => Ok(self.swapper.execute_swap(&request, signer, token).await?),
        }
    }

    /// Revente différée. Le permis est rendu pendant l'attente.
    async fn autosell(
        &self,
        task: &Task,
        autosell: AutoSell,
        signer: Arc<dyn TransactionSigner>,
        bought: &SwapOutcome,
        cancel: &CancellationToken,
    ) -> Result<Option<SwapOutcome>, DispatchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DispatchError::Cancelled),
            _ = tokio::time::sleep(autosell.delay) => {}
        }

        let received = match bought.received() {
            Some(received) => received,
            None => self.swapper.token_balance(&signer.pubkey(), &task.output_mint).await?,
        };
        let amount = autosell.amount_to_sell(received);
        if amount == 0 {
            return Ok(None);
        }
        debug!(received, amount, percent = autosell.percent, "[Dispatcher] Revente");

        let _permit = self.acquire(cancel).await?;
        let deadline = Instant::now() + self.config.task_deadline;
        let token = cancel.child_token();
        let request = task.sell_request(amount, Some(deadline));
        let work = self.execute(None, request, signer, &token);
        self.within(deadline, cancel, &token, work).await.map(Some)
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<OwnedSemaphorePermit, DispatchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DispatchError::Cancelled),
            permit = self.permits.clone().acquire_owned() => permit.map_err(|_| DispatchError::Cancelled),
        }
    }

    /// À l'échéance, `token` est annulé et on attend que `work` se replie : un
    /// swap déjà envoyé rend alors son `Pending` et sa signature au lieu d'être perdu.
    async fn within<T>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        token: &CancellationToken,
        work: impl Future<Output = Result<T, DispatchError>>,
    ) -> Result<T, DispatchError> {
        tokio::pin!(work);
        tokio::select! {
            result = &mut work => result,
            _ = tokio::time::sleep_until(deadline) => {
                token.cancel();
                match work.await {
                    Err(e) if e.status() == "cancelled" && !cancel.is_cancelled() => {
                        Err(DispatchError::Deadline(self.config.task_deadline))
                    }
                    other => other,
                }
            }
        }
    }

    async fn report(&self, task: &Task, wallet: &str, pair: String, action: TradeAction, error: &DispatchError) {
        if error.status() == "cancelled" {
            debug!(?action, "[Dispatcher] Tâche annulée");
        } else {
            warn!(?action, error = %error, "[Dispatcher] Tâche en échec");
        }
        self.emit(TradeRecord::from_error(&task.name, wallet, pair, action, error)).await;
    }

    async fn emit(&self, record: TradeRecord) {
        if self.records.send(record).await.is_err() {
            debug!("[Dispatcher] Plus de consommateur pour le journal de trades");
        }
    }
}
