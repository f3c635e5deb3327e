// DANS : src/strategies/sniper.rs
//
// Surveillance d'un pool fraîchement créé : on sonde son état à intervalle
// fixe et on déclenche le swap dès que le pool devient négociable.

use crate::data_pipeline::pool_resolver::PoolStateSource;
use crate::decoders::{Pool, PoolState};
use crate::execution::{ExecutionError, SwapOutcome, SwapRequest, SwapService, TransactionSigner};
use crate::math::{LiquidityLimits, PricingError};
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_secs(1);
/// Plancher par défaut du prédicat de tir, en unités brutes de chaque réserve.
pub const DEFAULT_MIN_AMOUNT: u64 = 1_000_000;

#[derive(Debug, Clone)]
pub struct SniperConfig {
    /// Cadence de sondage, jamais sous 1 s.
    pub monitor_interval: Duration,
    /// Variation relative d'une réserve qui mérite un log.
    pub warn_threshold: f64,
    /// Variation relative qui déclenche l'évaluation du tir.
    pub fire_threshold: f64,
    pub max_retries: u32,
    /// Attente après l'échec n : 2^(n-1) × `retry_backoff`.
    pub retry_backoff: Duration,
    pub sanity_interval: Duration,
    pub sanity_limits: LiquidityLimits,
    /// Prédicat utilisé tant qu'aucun autre n'est fourni par `with_predicate`.
    pub fire: DefaultFirePredicate,
}

impl Default for SniperConfig {
    fn default() -> Self {
        Self {
            monitor_interval: Duration::from_secs(1),
            warn_threshold: 0.01,
            fire_threshold: 0.05,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            sanity_interval: Duration::from_secs(10),
            sanity_limits: LiquidityLimits::strict(),
            fire: DefaultFirePredicate { min_amount: DEFAULT_MIN_AMOUNT, ..Default::default() },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SniperState {
    Watching,
    Firing,
    Backoff { failures: u32 },
    Success,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    /// Première observation.
    First,
    None,
    Warn,
    Significant,
}

fn relative_change(previous: u64, current: u64) -> f64 {
    match (previous, current) {
        (0, 0) => 0.0,
        (0, _) => f64::INFINITY,
        (p, c) => (c as f64 - p as f64).abs() / p as f64,
    }
}

/// Compare deux états successifs. Un changement de statut est toujours significatif.
pub fn detect_change(previous: Option<&PoolState>, current: &PoolState, warn_threshold: f64, fire_threshold: f64) -> StateChange {
    let Some(previous) = previous else {
        return StateChange::First;
    };
    if previous.status != current.status {
        return StateChange::Significant;
    }
    let delta = relative_change(previous.base_reserve, current.base_reserve)
        .max(relative_change(previous.quote_reserve, current.quote_reserve));
    if delta > fire_threshold {
        StateChange::Significant
    } else if delta > warn_threshold {
        StateChange::Warn
    } else {
        StateChange::None
    }
}

/// Condition de tir, remplaçable par l'appelant.
pub trait FirePredicate: Send + Sync {
    fn should_fire(&self, pool: &Pool) -> bool;
}

/// Pool actif, réserves équilibrées à ±`ratio_band` près, et chacune au-dessus
/// de 2 × `min_amount`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultFirePredicate {
    pub ratio_band: f64,
    pub min_amount: u64,
}

impl Default for DefaultFirePredicate {
    fn default() -> Self {
        Self { ratio_band: 0.2, min_amount: 0 }
    }
}

impl FirePredicate for DefaultFirePredicate {
    fn should_fire(&self, pool: &Pool) -> bool {
        let state = &pool.state;
        if !state.is_active() || state.quote_reserve == 0 {
            return false;
        }
        let ratio = state.base_reserve as f64 / state.quote_reserve as f64;
        let floor = self.min_amount.saturating_mul(2);
        (ratio - 1.0).abs() <= self.ratio_band && state.base_reserve > floor && state.quote_reserve > floor
    }
}

#[derive(Debug, Error)]
pub enum SniperError {
    #[error("sniper annulé")]
    Cancelled,
    #[error("transaction {signature} échouée on-chain : {message}")]
    OnChain { signature: Signature, message: String },
    #[error("swap abandonné après {attempts} tir(s) : {source}")]
    Execution {
        attempts: u32,
        #[source]
        source: ExecutionError,
    },
}

#[derive(Debug, Clone)]
pub struct SnipeReport {
    pub outcome: SwapOutcome,
    /// Nombre de sondages effectués avant le tir réussi.
    pub observations: u32,
    pub fire_attempts: u32,
}

// Un swap dont les ré-essais internes ont échoué sur une erreur transitoire
// reste transitoire pour le sniper, qui a son propre budget.
fn is_transient(error: &ExecutionError) -> bool {
    match error {
        ExecutionError::RetriesExhausted { last, .. } => last.is_retryable(),
        other => other.is_retryable(),
    }
}

pub struct Sniper {
    source: Arc<dyn PoolStateSource>,
    swapper: Arc<dyn SwapService>,
    predicate: Arc<dyn FirePredicate>,
    config: SniperConfig,
    state: watch::Sender<SniperState>,
}

impl Sniper {
    pub fn new(source: Arc<dyn PoolStateSource>, swapper: Arc<dyn SwapService>, config: SniperConfig) -> Self {
        let (state, _) = watch::channel(SniperState::Watching);
        Self { source, swapper, predicate: Arc::new(config.fire), config, state }
    }

    pub fn with_predicate(mut self, predicate: Arc<dyn FirePredicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SniperState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SniperState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "[Sniper] Transition");
        }
    }

    /// Contrôle de liquidité indépendant de la détection de changement.
    fn sanity_check(&self, pool: &Pool) -> Result<(), PricingError> {
        let limits = &self.config.sanity_limits;
        limits.check_balance(pool.state.base_reserve, pool.state.quote_reserve)?;
        let total = pool.state.total_liquidity();
        if total < limits.min_total_liquidity {
            return Err(PricingError::UnderLiquidity { total, min: limits.min_total_liquidity });
        }
        Ok(())
    }

    /// Surveille `pool_id` et tire `request` dès que le prédicat est satisfait.
    #[instrument(name = "snipe", skip_all, fields(pool = %pool_id))]
    pub async fn run(
        &self,
        pool_id: Pubkey,
        request: SwapRequest,
        signer: Arc<dyn TransactionSigner>,
        cancel: CancellationToken,
    ) -> Result<SnipeReport, SniperError> {
        let period = self.config.monitor_interval.max(MIN_MONITOR_INTERVAL);
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sanity = interval_at(Instant::now() + self.config.sanity_interval, self.config.sanity_interval);
        sanity.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut previous: Option<PoolState> = None;
        let mut last_pool: Option<Pool> = None;
        let mut observations: u32 = 0;
        let mut failures: u32 = 0;
        self.set_state(SniperState::Watching);
        info!(interval_ms = period.as_millis() as u64, "[Sniper] Surveillance démarrée");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(SniperState::Stopped);
                    debug!(observations, "[Sniper] Annulé");
                    return Err(SniperError::Cancelled);
                }
                _ = sanity.tick() => {
                    if let Some(pool) = &last_pool {
                        if let Err(e) = self.sanity_check(pool) {
                            warn!(error = %e, base = pool.state.base_reserve, quote = pool.state.quote_reserve, "[Sniper] Contrôle de liquidité en échec");
                        }
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(SniperState::Stopped);
                    debug!(observations, "[Sniper] Annulé pendant la lecture du pool");
                    return Err(SniperError::Cancelled);
                }
                fetched = self.source.fetch_pool(&pool_id) => fetched,
            };
            let pool = match fetched {
                Ok(pool) => pool,
                Err(e) => {
                    // Pool absent ou illisible : pas encore prêt.
                    debug!(error = %e, "[Sniper] Lecture du pool en échec");
                    continue;
                }
            };
            observations += 1;

            let change = detect_change(previous.as_ref(), &pool.state, self.config.warn_threshold, self.config.fire_threshold);
            previous = Some(pool.state);
            last_pool = Some(pool.clone());
            match change {
                StateChange::None => continue,
                StateChange::Warn => {
                    info!(base = pool.state.base_reserve, quote = pool.state.quote_reserve, "[Sniper] Variation de réserves");
                    continue;
                }
                StateChange::First | StateChange::Significant => {
                    info!(?change, status = ?pool.state.status, base = pool.state.base_reserve, quote = pool.state.quote_reserve, "[Sniper] Changement d'état");
                }
            }
            if !self.predicate.should_fire(&pool) {
                continue;
            }

            self.set_state(SniperState::Firing);
            info!(attempt = failures + 1, "[Sniper] Conditions réunies, tir");
            let error = match self.swapper.execute_swap(&request, signer.clone(), &cancel).await {
                Ok(outcome) => {
                    if let Some(ExecutionError::OnChain { signature, message }) = outcome.status.failure() {
                        self.set_state(SniperState::Stopped);
                        error!(signature = %signature, message = %message, "[Sniper] Swap échoué on-chain");
                        return Err(SniperError::OnChain { signature, message });
                    }
                    self.set_state(SniperState::Success);
                    info!(signature = %outcome.status.signature, state = outcome.status.state.as_str(), "[Sniper] Swap envoyé");
                    return Ok(SnipeReport { outcome, observations, fire_attempts: failures + 1 });
                }
                Err(e) => e,
            };

            if error.is_cancelled() {
                self.set_state(SniperState::Stopped);
                debug!("[Sniper] Annulé pendant le tir");
                return Err(SniperError::Cancelled);
            }
            if error.is_not_ready() {
                // On attend un nouveau changement significatif.
                self.set_state(SniperState::Watching);
                info!(error = %error, "[Sniper] Pool pas encore prêt");
                continue;
            }
            failures += 1;
            if !is_transient(&error) || failures > self.config.max_retries {
                self.set_state(SniperState::Stopped);
                error!(attempts = failures, error = %error, "[Sniper] Abandon");
                return Err(SniperError::Execution { attempts: failures, source: error });
            }

            let delay = self.config.retry_backoff * 2u32.pow(failures - 1);
            self.set_state(SniperState::Backoff { failures });
            warn!(attempt = failures, delay_ms = delay.as_millis() as u64, error = %error, "[Sniper] Tir en échec transitoire");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.set_state(SniperState::Stopped);
                    return Err(SniperError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            // L'état suivant sera réévalué comme une première observation.
            previous = None;
            self.set_state(SniperState::Watching);
        }
    }
}
