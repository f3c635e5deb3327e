// DANS : src/strategies/task.rs

use crate::execution::fee_manager::MAX_PRIORITY_FEE_SOL;
use crate::execution::{Amount, SwapRequest};
use crate::math::SlippagePolicy;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("tâche `{task}` : pubkey invalide pour `{field}` : {value}")]
    InvalidPubkey { task: String, field: &'static str, value: String },
    #[error("tâche `{task}` : slippage invalide : {reason}")]
    InvalidSlippage { task: String, reason: String },
    #[error("tâche `{task}` : montant invalide : {value}")]
    InvalidAmount { task: String, value: f64 },
    #[error("tâche `{task}` : frais de priorité invalides : {value} SOL")]
    InvalidFee { task: String, value: f64 },
    #[error("tâche `{task}` : autosell invalide : {reason}")]
    InvalidAutosell { task: String, reason: String },
    #[error("tâche `{task}` : mints d'entrée et de sortie identiques")]
    SamePair { task: String },
    #[error("fichier de tâches illisible : {0}")]
    Json(String),
}

/// Une tâche telle qu'écrite par l'utilisateur (JSON, clés en camelCase).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub task_name: String,
    pub wallet_ref: String,
    pub source_token: String,
    pub target_token: String,
    /// En unités "humaines" du token source.
    pub amount_in: f64,
    #[serde(default)]
    pub slippage: Option<String>,
    /// SOL dépensés en priorité pour la transaction.
    #[serde(default)]
    pub priority_fee: Option<f64>,
    #[serde(default)]
    pub compute_unit_limit: Option<u32>,
    #[serde(default)]
    pub wait_confirmation: Option<bool>,
    #[serde(default)]
    pub autosell_percent: Option<f64>,
    #[serde(default)]
    pub autosell_delay_seconds: Option<u64>,
    /// Pool à surveiller : la tâche passe alors par le sniper.
    #[serde(default)]
    pub snipe_pool: Option<String>,
}

/// Valeurs appliquées quand une tâche ne précise rien.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskDefaults {
    pub slippage: SlippagePolicy,
    pub priority_fee_sol: f64,
    pub compute_unit_limit: u32,
    pub wait_confirmation: bool,
}

impl Default for TaskDefaults {
    fn default() -> Self {
        Self {
            slippage: SlippagePolicy::Percent(1.0),
            priority_fee_sol: 0.0001,
            compute_unit_limit: 200_000,
            wait_confirmation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoSell {
    /// Part du montant reçu à revendre, dans (0, 100].
    pub percent: f64,
    pub delay: Duration,
}

impl AutoSell {
    pub fn amount_to_sell(&self, received: u64) -> u64 {
        (received as f64 * self.percent / 100.0).floor() as u64
    }
}

/// Une tâche validée, prête pour le dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: String,
    pub wallet_ref: String,
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub amount: Amount,
    pub slippage: SlippagePolicy,
    pub priority_fee_sol: f64,
    pub compute_unit_limit: u32,
    pub wait_confirmation: bool,
    pub autosell: Option<AutoSell>,
    pub snipe_pool: Option<Pubkey>,
}

impl TaskDescriptor {
    pub fn into_task(self, defaults: &TaskDefaults) -> Result<Task, TaskError> {
        let name = self.task_name;
        let pubkey = |field: &'static str, value: &str| {
            Pubkey::from_str(value.trim()).map_err(|_| TaskError::InvalidPubkey {
                task: name.clone(),
                field,
                value: value.to_string(),
            })
        };
        let input_mint = pubkey("sourceToken", &self.source_token)?;
        let output_mint = pubkey("targetToken", &self.target_token)?;
        let snipe_pool = self.snipe_pool.as_deref().map(|p| pubkey("snipePool", p)).transpose()?;
        if input_mint == output_mint {
            return Err(TaskError::SamePair { task: name });
        }
        if !self.amount_in.is_finite() || self.amount_in <= 0.0 {
            return Err(TaskError::InvalidAmount { task: name, value: self.amount_in });
        }

        let priority_fee_sol = self.priority_fee.unwrap_or(defaults.priority_fee_sol);
        if !priority_fee_sol.is_finite() || !(0.0..=MAX_PRIORITY_FEE_SOL).contains(&priority_fee_sol) {
            return Err(TaskError::InvalidFee { task: name, value: priority_fee_sol });
        }

        let slippage = match self.slippage.as_deref() {
            Some(raw) => raw
                .parse::<SlippagePolicy>()
                .map_err(|e| TaskError::InvalidSlippage { task: name.clone(), reason: e.to_string() })?,
            None => defaults.slippage,
        };

        let autosell = match (self.autosell_percent, self.autosell_delay_seconds) {
            (None, None) => None,
            (Some(percent), delay) => {
                if !percent.is_finite() || percent <= 0.0 || percent > 100.0 {
                    return Err(TaskError::InvalidAutosell { task: name, reason: format!("{percent}% hors de (0, 100]") });
                }
                Some(AutoSell { percent, delay: Duration::from_secs(delay.unwrap_or(0)) })
            }
            (None, Some(_)) => {
                return Err(TaskError::InvalidAutosell { task: name, reason: "délai sans pourcentage".to_string() });
            }
        };

        Ok(Task {
            wallet_ref: self.wallet_ref,
            input_mint,
            output_mint,
            amount: Amount::Ui(self.amount_in),
            slippage,
            priority_fee_sol,
            compute_unit_limit: self.compute_unit_limit.unwrap_or(defaults.compute_unit_limit),
            wait_confirmation: self.wait_confirmation.unwrap_or(defaults.wait_confirmation),
            autosell,
            snipe_pool,
            name,
        })
    }
}

impl Task {
    pub fn swap_request(&self, deadline: Option<Instant>) -> SwapRequest {
        SwapRequest {
            input_mint: self.input_mint,
            output_mint: self.output_mint,
            amount: self.amount,
            slippage: self.slippage,
            priority_fee_sol: self.priority_fee_sol,
            compute_unit_limit: self.compute_unit_limit,
            wait_confirmation: self.wait_confirmation,
            deadline,
        }
    }

    /// Revente : paire inversée, montant brut. L'autosell attend toujours la confirmation.
    pub fn sell_request(&self, amount_raw: u64, deadline: Option<Instant>) -> SwapRequest {
        SwapRequest {
            input_mint: self.output_mint,
            output_mint: self.input_mint,
            amount: Amount::Raw(amount_raw),
            wait_confirmation: true,
            ..self.swap_request(deadline)
        }
    }
}

/// Lit une liste de tâches JSON et les valide toutes ; la première erreur arrête tout.
pub fn parse_tasks(json: &str, defaults: &TaskDefaults) -> Result<Vec<Task>, TaskError> {
    let descriptors: Vec<TaskDescriptor> = serde_json::from_str(json).map_err(|e| TaskError::Json(e.to_string()))?;
    descriptors.into_iter().map(|d| d.into_task(defaults)).collect()
}
