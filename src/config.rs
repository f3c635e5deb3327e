// src/config.rs

use crate::data_pipeline::pool_resolver::ResolverConfig;
use crate::decoders::raydium::amm_v4::SwapInstructionKind;
use crate::execution::fee_manager::MAX_PRIORITY_FEE_SOL;
use crate::execution::{ConfirmationOptions, ExecutorConfig, OrchestratorConfig, SubmitOptions};
use crate::math::SlippagePolicy;
use crate::rpc::{Commitment, EndpointPoolConfig};
use crate::state::CacheConfig;
use crate::strategies::sniper::DEFAULT_MIN_AMOUNT;
use crate::strategies::{DispatcherConfig, SniperConfig, TaskDefaults};
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Réglages lus dans l'environnement (et `.env`). Les noms de variables sont
/// ceux des champs en majuscules : `RPC_LIST`, `WORKERS`, etc.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Liste séparée par des virgules.
    #[serde(default = "default_rpc_list")]
    pub rpc_list: Vec<String>,
    #[serde(default = "default_commitment")]
    pub poll_commitment: String,
    /// `none`, `fixed:<montant>` ou `<pourcentage>`.
    #[serde(default = "default_slippage")]
    pub default_slippage: String,
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default)]
    pub pool_index_url: Option<String>,
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
    #[serde(default)]
    pub skip_preflight: bool,
    #[serde(default)]
    pub simulate_before_send: bool,
    #[serde(default)]
    pub swap_kind: SwapInstructionKind,
    #[serde(default = "default_priority_fee_sol")]
    pub priority_fee_sol: f64,
    #[serde(default = "default_task_deadline_secs")]
    pub task_deadline_secs: u64,
    /// Plancher du tir du sniper, en unités brutes de chaque réserve.
    #[serde(default = "default_sniper_min_amount")]
    pub sniper_min_amount: u64,
    #[serde(default = "default_wallet_path")]
    pub wallet_path: String,
    #[serde(default = "default_tasks_path")]
    pub tasks_path: String,
    #[serde(default)]
    pub log_json: bool,
}

fn default_rpc_list() -> Vec<String> {
    vec!["https://api.mainnet-beta.solana.com".to_string()]
}
fn default_commitment() -> String {
    "confirmed".to_string()
}
fn default_slippage() -> String {
    "1".to_string()
}
fn default_monitor_interval_ms() -> u64 {
    1_000
}
fn default_workers() -> usize {
    4
}
fn default_retries() -> u32 {
    3
}
fn default_request_timeout_ms() -> u64 {
    10_000
}
fn default_health_check_interval_ms() -> u64 {
    30_000
}
fn default_cache_ttl_secs() -> u64 {
    900
}
fn default_confirmation_timeout_ms() -> u64 {
    45_000
}
fn default_priority_fee_sol() -> f64 {
    0.0001
}
fn default_task_deadline_secs() -> u64 {
    120
}
fn default_sniper_min_amount() -> u64 {
    DEFAULT_MIN_AMOUNT
}
fn default_wallet_path() -> String {
    "wallet.json".to_string()
}
fn default_tasks_path() -> String {
    "tasks.json".to_string()
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let config = envy::from_env::<Config>().context("lecture de la configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_list.iter().all(|url| url.trim().is_empty()) {
            bail!("RPC_LIST est vide");
        }
        if self.workers == 0 {
            bail!("WORKERS doit être au moins 1");
        }
        if !self.priority_fee_sol.is_finite() || !(0.0..=MAX_PRIORITY_FEE_SOL).contains(&self.priority_fee_sol) {
            bail!("PRIORITY_FEE_SOL hors de [0, {MAX_PRIORITY_FEE_SOL}] : {}", self.priority_fee_sol);
        }
        self.commitment()?;
        self.slippage()?;
        Ok(())
    }

    pub fn rpc_urls(&self) -> Vec<String> {
        self.rpc_list.iter().map(|url| url.trim().to_string()).filter(|url| !url.is_empty()).collect()
    }

    pub fn commitment(&self) -> Result<Commitment> {
        self.poll_commitment
            .parse::<Commitment>()
            .map_err(anyhow::Error::msg)
            .context("POLL_COMMITMENT")
    }

    pub fn slippage(&self) -> Result<SlippagePolicy> {
        self.default_slippage.parse::<SlippagePolicy>().context("DEFAULT_SLIPPAGE")
    }

    pub fn endpoint_pool(&self) -> EndpointPoolConfig {
        EndpointPoolConfig {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            health_check_interval: Duration::from_millis(self.health_check_interval_ms),
            ..Default::default()
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig { max_retries: self.retries, ..Default::default() }
    }

    pub fn executor(&self) -> Result<ExecutorConfig> {
        let commitment = self.commitment()?;
        let submit = SubmitOptions {
            skip_preflight: self.skip_preflight,
            preflight_commitment: commitment,
            confirmation: ConfirmationOptions {
                target: commitment,
                timeout: Duration::from_millis(self.confirmation_timeout_ms),
                ..Default::default()
            },
            ..Default::default()
        };
        Ok(ExecutorConfig {
            swap_kind: self.swap_kind,
            max_retries: self.retries,
            simulate_before_send: self.simulate_before_send,
            submit,
            account_commitment: commitment,
            ..Default::default()
        })
    }

    pub fn resolver(&self) -> Result<ResolverConfig> {
        Ok(ResolverConfig { commitment: self.commitment()?, ..Default::default() })
    }

    pub fn cache(&self) -> CacheConfig {
        CacheConfig { ttl: Duration::from_secs(self.cache_ttl_secs), ..Default::default() }
    }

    pub fn sniper(&self) -> SniperConfig {
        let mut config = SniperConfig {
            monitor_interval: Duration::from_millis(self.monitor_interval_ms),
            max_retries: self.retries,
            ..Default::default()
        };
        config.fire.min_amount = self.sniper_min_amount;
        config
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig { workers: self.workers, task_deadline: Duration::from_secs(self.task_deadline_secs) }
    }

    pub fn task_defaults(&self) -> Result<TaskDefaults> {
        Ok(TaskDefaults { slippage: self.slippage()?, priority_fee_sol: self.priority_fee_sol, ..Default::default() })
    }
}
