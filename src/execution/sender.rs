// DANS : src/execution/sender.rs

use super::confirmation_service::{await_confirmation, ConfirmationOptions};
use super::transaction_builder::build_transaction;
use super::{until_cancelled, ExecutionError, ExecutionStatus, TransactionSigner};
use crate::rpc::{Commitment, RpcEndpointPool, SendOptions};
use async_trait::async_trait;
use solana_sdk::instruction::Instruction;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Options d'un envoi.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOptions {
    pub skip_preflight: bool,
    pub preflight_commitment: Commitment,
    pub wait_confirmation: bool,
    pub confirmation: ConfirmationOptions,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            skip_preflight: false,
            preflight_commitment: Commitment::Confirmed,
            wait_confirmation: true,
            confirmation: ConfirmationOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Commitment du blockhash de référence.
    pub blockhash_commitment: Commitment,
    pub max_retries: u32,
    /// Attente linéaire entre deux envois : (tentative + 1) × `retry_step`.
    pub retry_step: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            blockhash_commitment: Commitment::Finalized,
            max_retries: 3,
            retry_step: Duration::from_secs(1),
        }
    }
}

/// Le trait unifié pour l'envoi de transactions.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn submit(
        &self,
        instructions: &[Instruction],
        signer: &dyn TransactionSigner,
        options: &SubmitOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecutionStatus, ExecutionError>;
}

/// Instructions + signature -> transaction envoyée (et confirmée si demandé).
pub struct TransactionOrchestrator {
    rpc: Arc<RpcEndpointPool>,
    config: OrchestratorConfig,
}

impl TransactionOrchestrator {
    pub fn new(rpc: Arc<RpcEndpointPool>, config: OrchestratorConfig) -> Self {
        Self { rpc, config }
    }

    /// Une tentative : blockhash frais, signature, envoi, puis attente éventuelle.
    async fn submit_once(
        &self,
        instructions: &[Instruction],
        signer: &dyn TransactionSigner,
        options: &SubmitOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecutionStatus, ExecutionError> {
        let blockhash = until_cancelled(cancel, self.rpc.get_latest_blockhash(self.config.blockhash_commitment)).await?;
        let transaction = build_transaction(instructions, signer, blockhash.hash)?;
        let signature = transaction.signatures[0];
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        let send_options = SendOptions {
            skip_preflight: options.skip_preflight,
            preflight_commitment: options.preflight_commitment,
            ..SendOptions::default()
        };
        // L'envoi lui-même n'est jamais interrompu : la signature doit remonter.
        self.rpc.send_transaction(Arc::new(transaction), send_options).await?;
        info!(signature = %signature, last_valid_block_height = blockhash.last_valid_block_height, "[Orchestrator] Transaction envoyée");

        if !options.wait_confirmation {
            return Ok(ExecutionStatus::pending(signature));
        }
        Ok(await_confirmation(&self.rpc, signature, &options.confirmation, cancel).await)
    }
}

#[async_trait]
impl TransactionSubmitter for TransactionOrchestrator {
    #[instrument(name = "submit", skip_all, fields(payer = %signer.pubkey(), instructions = instructions.len()))]
    async fn submit(
        &self,
        instructions: &[Instruction],
        signer: &dyn TransactionSigner,
        options: &SubmitOptions,
        cancel: &CancellationToken,
    ) -> Result<ExecutionStatus, ExecutionError> {
        if instructions.is_empty() {
            return Err(ExecutionError::EmptyInstructions);
        }

        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ExecutionError::Cancelled);
            }
            let error = match self.submit_once(instructions, signer, options, cancel).await {
                Ok(status) => return Ok(status),
                Err(e) => e,
            };
            if !error.is_retryable() {
                return Err(error);
            }
            if attempt >= self.config.max_retries {
                return Err(if attempt == 0 {
                    error
                } else {
                    ExecutionError::RetriesExhausted { attempts: attempt + 1, last: Box::new(error) }
                });
            }

            // Chaque nouvel essai reprend un blockhash frais.
            let delay = self.config.retry_step * (attempt + 1);
            warn!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, error = %error, "[Orchestrator] Envoi en échec transitoire, nouvel essai");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("[Orchestrator] Annulé pendant l'attente");
                    return Err(ExecutionError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}
