// DANS : src/execution/swap_executor.rs

use super::fee_manager::{priority_fee_lamports, priority_fee_micro_lamports, required_native_balance};
use super::sender::{SubmitOptions, TransactionSubmitter};
use super::simulate::simulate_swap;
use super::transaction_builder::{build_transaction, compute_budget_preamble};
use super::{until_cancelled, ExecutionError, ExecutionState, ExecutionStatus, TransactionSigner};
use crate::data_pipeline::pool_resolver::PoolResolver;
use crate::decoders::raydium::amm_v4::{build_swap_instruction, SwapInstructionKind, UserSwapAccounts};
use crate::decoders::spl_token_decoders::account::decode_account;
use crate::decoders::{Pool, SwapDirection};
use crate::math::{PricingEngine, SlippagePolicy, SwapQuote};
use crate::monitoring::{MetricsSink, NoopMetrics};
use crate::rpc::{Commitment, RpcEndpointPool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{account::Account, instruction::Instruction, pubkey::Pubkey};
#[allow(deprecated)]
use solana_sdk::system_instruction;
use spl_associated_token_account::{get_associated_token_address, instruction::create_associated_token_account_idempotent};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Montant d'entrée : brut (unités du mint) ou "humain" (converti avec les décimales du pool).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Amount {
    Raw(u64),
    Ui(f64),
}

impl Amount {
    pub fn to_raw(self, decimals: u8) -> Result<u64, ExecutionError> {
        let raw = match self {
            Amount::Raw(raw) => raw,
            Amount::Ui(value) => {
                if !value.is_finite() || value < 0.0 {
                    return Err(ExecutionError::Input(format!("montant invalide : {value}")));
                }
                let scaled = (value * 10f64.powi(decimals as i32)).floor();
                if scaled >= u64::MAX as f64 {
                    return Err(ExecutionError::Input(format!("montant démesuré : {value}")));
                }
                scaled as u64
            }
        };
        if raw == 0 {
            return Err(ExecutionError::Input("montant d'entrée nul".to_string()));
        }
        Ok(raw)
    }
}

/// Une demande de swap, telle que la formulent le dispatcher et le sniper.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: Amount,
    pub slippage: SlippagePolicy,
    /// SOL dépensés en priorité pour toute la transaction.
    pub priority_fee_sol: f64,
    pub compute_unit_limit: u32,
    pub wait_confirmation: bool,
    pub deadline: Option<Instant>,
}

/// Paramètres figés d'une tentative. Usage unique : une nouvelle tentative en
/// recalcule un jeu complet.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapParams {
    pub user_wallet: Pubkey,
    pub pool: Pool,
    pub direction: SwapDirection,
    pub amount_in: u64,
    pub min_amount_out: u64,
    pub source_token_account: Pubkey,
    pub destination_token_account: Pubkey,
    pub priority_fee_micro_lamports: u64,
    pub compute_unit_limit: u32,
    pub slippage_bps: u16,
    pub wait_confirmation: bool,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapOutcome {
    pub params: SwapParams,
    pub quote: SwapQuote,
    pub status: ExecutionStatus,
    pub attempts: u32,
    /// Solde du compte de destination avant l'envoi.
    pub balance_before: u64,
    /// Relu seulement quand la transaction a atterri.
    pub balance_after: Option<u64>,
    pub simulated_out: Option<u64>,
}

impl SwapOutcome {
    /// Montant effectivement reçu, quand on a pu le mesurer.
    pub fn received(&self) -> Option<u64> {
        self.balance_after.map(|after| after.saturating_sub(self.balance_before))
    }
}

#[async_trait]
pub trait SwapService: Send + Sync {
    async fn execute_swap(
        &self,
        request: &SwapRequest,
        signer: Arc<dyn TransactionSigner>,
        cancel: &CancellationToken,
    ) -> Result<SwapOutcome, ExecutionError>;

    /// Solde de `owner` pour `mint` (ATA), 0 si le compte n'existe pas.
    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, ExecutionError>;
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub swap_kind: SwapInstructionKind,
    pub max_retries: u32,
    /// Attente exponentielle : 2^tentative × `retry_base_delay`.
    pub retry_base_delay: Duration,
    pub simulate_before_send: bool,
    pub pricing: PricingEngine,
    pub submit: SubmitOptions,
    pub account_commitment: Commitment,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            swap_kind: SwapInstructionKind::default(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            simulate_before_send: false,
            pricing: PricingEngine::default(),
            submit: SubmitOptions::default(),
            account_commitment: Commitment::Confirmed,
        }
    }
}

pub struct SwapExecutor {
    rpc: Arc<RpcEndpointPool>,
    resolver: Arc<PoolResolver>,
    submitter: Arc<dyn TransactionSubmitter>,
    config: ExecutorConfig,
    metrics: Arc<dyn MetricsSink>,
}

fn token_amount(account: Option<&Account>) -> Result<u64, ExecutionError> {
    match account {
        Some(account) => Ok(decode_account(&account.data)?.amount),
        None => Ok(0),
    }
}

impl SwapExecutor {
    pub fn new(
        rpc: Arc<RpcEndpointPool>,
        resolver: Arc<PoolResolver>,
        submitter: Arc<dyn TransactionSubmitter>,
        config: ExecutorConfig,
    ) -> Self {
        Self { rpc, resolver, submitter, config, metrics: Arc::new(NoopMetrics) }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    fn fail(&self, attempt: u32, error: ExecutionError) -> ExecutionError {
        self.metrics.record_swap("failed", attempt + 1);
        error!(attempts = attempt + 1, error = %error, "[Swap] Échec");
        error
    }

    /// Une tentative complète : résolution, quote, comptes, envoi. Tout ce qui
    /// précède l'envoi cède à l'annulation ; après l'envoi, l'annulation ne fait
    /// qu'écourter l'attente de confirmation (résultat `Pending` et sa signature).
    async fn attempt(
        &self,
        request: &SwapRequest,
        signer: &dyn TransactionSigner,
        cancel: &CancellationToken,
    ) -> Result<SwapOutcome, ExecutionError> {
        let commitment = self.config.account_commitment;
        let owner = signer.pubkey();

        // 1-2. Pool frais et sens du swap.
        let pool = until_cancelled(cancel, self.resolver.resolve_live(&request.input_mint, &request.output_mint)).await?;
        let direction = pool.direction_for(&request.input_mint).ok_or_else(|| {
            ExecutionError::Input(format!("{} absent du pool {}", request.input_mint, pool.id))
        })?;
        let (_, _, decimals_in, _) = pool.reserves_for(direction);
        let amount_in = request.amount.to_raw(decimals_in)?;

        // 3. ATA de l'utilisateur. Ceux qui manquent sont créés (idempotent).
        let source_ata = get_associated_token_address(&owner, &request.input_mint);
        let destination_ata = get_associated_token_address(&owner, &request.output_mint);
        let accounts =
            until_cancelled(cancel, self.rpc.get_multiple_accounts(&[source_ata, destination_ata], commitment)).await?;
        let (source_account, destination_account) = (accounts.first().cloned().flatten(), accounts.get(1).cloned().flatten());

        let mut setup: Vec<Instruction> = Vec::new();
        for (account, mint) in [(&source_account, request.input_mint), (&destination_account, request.output_mint)] {
            if account.is_none() {
                setup.push(create_associated_token_account_idempotent(&owner, &owner, &mint, &spl_token::id()));
            }
        }
        let created_accounts = setup.len();

        let native_input = request.input_mint == spl_token::native_mint::id();
        if native_input {
            // On enveloppe exactement le montant échangé.
            #[allow(deprecated)]
            setup.push(system_instruction::transfer(&owner, &source_ata, amount_in));
            setup.push(
                spl_token::instruction::sync_native(&spl_token::id(), &source_ata)
                    .map_err(|e| ExecutionError::Compile(e.to_string()))?,
            );
        } else {
            let available = token_amount(source_account.as_ref())?;
            if available < amount_in {
                return Err(ExecutionError::InsufficientBalance { required: amount_in, available });
            }
        }

        // 4. Quote et garde-fous.
        let quote = self.config.pricing.quote(&pool, direction, amount_in, &request.slippage)?;

        // 5. SOL natif : frais, priorité, rente des ATA, et le montant s'il est enveloppé.
        let micro_lamports = priority_fee_micro_lamports(request.priority_fee_sol, request.compute_unit_limit)?;
        let priority_lamports = priority_fee_lamports(micro_lamports, request.compute_unit_limit);
        let required = required_native_balance(if native_input { amount_in } else { 0 }, priority_lamports, created_accounts);
        let native_balance = until_cancelled(cancel, self.rpc.get_balance(&owner, commitment)).await?;
        if native_balance < required {
            return Err(ExecutionError::InsufficientBalance { required, available: native_balance });
        }

        // 6. Préambule, création des comptes, puis le swap en dernier.
        let market = if self.config.swap_kind.needs_market() {
            Some(until_cancelled(cancel, self.resolver.market_accounts(&pool)).await?)
        } else {
            None
        };
        let user = UserSwapAccounts { owner, source: source_ata, destination: destination_ata };
        let swap_ix = build_swap_instruction(&pool, market.as_ref(), self.config.swap_kind, &user, amount_in, quote.min_amount_out)?;

        let mut instructions = compute_budget_preamble(request.compute_unit_limit, micro_lamports);
        instructions.extend(setup);
        instructions.push(swap_ix);

        let params = SwapParams {
            user_wallet: owner,
            direction,
            amount_in,
            min_amount_out: quote.min_amount_out,
            source_token_account: source_ata,
            destination_token_account: destination_ata,
            priority_fee_micro_lamports: micro_lamports,
            compute_unit_limit: request.compute_unit_limit,
            slippage_bps: request.slippage.bps(quote.amount_out, quote.min_amount_out),
            wait_confirmation: request.wait_confirmation,
            deadline: request.deadline,
            pool,
        };
        debug!(
            pool = %params.pool.id,
            amount_in,
            amount_out = quote.amount_out,
            min_amount_out = quote.min_amount_out,
            impact_pct = quote.price_impact_pct,
            "[Swap] Quote accepté"
        );

        // 7. Simulation facultative.
        let simulated_out = if self.config.simulate_before_send {
            let blockhash = until_cancelled(cancel, self.rpc.get_latest_blockhash(commitment)).await?;
            let transaction = build_transaction(&instructions, signer, blockhash.hash)?;
            until_cancelled(cancel, simulate_swap(&self.rpc, Arc::new(transaction), commitment)).await?.swap_out
        } else {
            None
        };

        // 8. Envoi.
        let balance_before = token_amount(destination_account.as_ref())?;
        let options = SubmitOptions { wait_confirmation: request.wait_confirmation, ..self.config.submit };
        let status = self.submitter.submit(&instructions, signer, &options, cancel).await?;

        let balance_after = if status.state.is_landed() {
            match self.rpc.get_account(&destination_ata, commitment).await {
                Ok(account) => token_amount(account.as_ref()).ok(),
                Err(e) => {
                    warn!(signature = %status.signature, error = %e, "[Swap] Solde après swap illisible");
                    None
                }
            }
        } else {
            None
        };

        Ok(SwapOutcome { params, quote, status, attempts: 1, balance_before, balance_after, simulated_out })
    }
}

#[async_trait]
impl SwapService for SwapExecutor {
    #[instrument(name = "swap", skip_all, fields(input = %request.input_mint, output = %request.output_mint))]
    async fn execute_swap(
        &self,
        request: &SwapRequest,
        signer: Arc<dyn TransactionSigner>,
        cancel: &CancellationToken,
    ) -> Result<SwapOutcome, ExecutionError> {
        if request.input_mint == request.output_mint {
            return Err(ExecutionError::Input("mints d'entrée et de sortie identiques".to_string()));
        }

        let mut attempt: u32 = 0;
        loop {
            if request.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Err(self.fail(attempt, ExecutionError::DeadlineExceeded));
            }

            // L'échéance annule la tentative au lieu de l'abandonner : une
            // transaction déjà partie revient en `Pending` avec sa signature.
            let token = cancel.child_token();
            let run = self.attempt(request, signer.as_ref(), &token);
            tokio::pin!(run);
            let result = match request.deadline {
                Some(deadline) => tokio::select! {
                    result = &mut run => result,
                    _ = tokio::time::sleep_until(deadline) => {
                        token.cancel();
                        run.await
                    }
                },
                None => run.await,
            };
            let expired = token.is_cancelled() && !cancel.is_cancelled();

            let error = match result {
                Ok(mut outcome) => {
                    outcome.attempts = attempt + 1;
                    if expired && outcome.status.state == ExecutionState::Pending {
                        warn!(signature = %outcome.status.signature, "[Swap] Échéance atteinte avant confirmation");
                        outcome.status.error_message = Some("échéance dépassée avant confirmation".to_string());
                    }
                    self.metrics.record_swap(outcome.status.state.as_str(), outcome.attempts);
                    info!(
                        signature = %outcome.status.signature,
                        state = outcome.status.state.as_str(),
                        attempts = outcome.attempts,
                        amount_out = outcome.quote.amount_out,
                        "[Swap] Terminé"
                    );
                    return Ok(outcome);
                }
                Err(e) => e,
            };

            if error.is_cancelled() {
                if expired {
                    return Err(self.fail(attempt, ExecutionError::DeadlineExceeded));
                }
                debug!("[Swap] Annulé");
                return Err(ExecutionError::Cancelled);
            }
            if error.is_retryable() && attempt < self.config.max_retries {
                let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %error, "[Swap] Échec transitoire, on recommence tout");
                let wake = Instant::now() + delay;
                let wake = request.deadline.map_or(wake, |deadline| wake.min(deadline));
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ExecutionError::Cancelled),
                    _ = tokio::time::sleep_until(wake) => {}
                }
                attempt += 1;
                continue;
            }

            return Err(self.fail(
                attempt,
                if attempt > 0 && error.is_retryable() {
                    ExecutionError::RetriesExhausted { attempts: attempt + 1, last: Box::new(error) }
                } else {
                    error
                },
            ));
        }
    }

    async fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<u64, ExecutionError> {
        let ata = get_associated_token_address(owner, mint);
        let account = self.rpc.get_account(&ata, self.config.account_commitment).await?;
        token_amount(account.as_ref())
    }
}
