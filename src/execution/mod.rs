// DANS : src/execution/mod.rs

pub mod confirmation_service; // Attente de confirmation et suivi des signatures en suspens.
pub mod fee_manager;          // Conversion des frais de priorité et coûts fixes.
pub mod sender;               // L'orchestrateur : blockhash, signature, envoi, confirmation.
pub mod signer;
pub mod simulate;
pub mod swap_executor;
pub mod transaction_builder;

pub use confirmation_service::{await_confirmation, ConfirmationOptions, PendingTracker};
pub use sender::{OrchestratorConfig, SubmitOptions, TransactionOrchestrator, TransactionSubmitter};
pub use signer::{KeypairSigner, TransactionSigner};
pub use swap_executor::{Amount, ExecutorConfig, SwapExecutor, SwapOutcome, SwapParams, SwapRequest, SwapService};

use crate::data_pipeline::pool_resolver::ResolverError;
use crate::decoders::pool_state::now_millis;
use crate::decoders::DecodeError;
use crate::math::PricingError;
use crate::rpc::RpcError;
use serde::Serialize;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::future::Future;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionState {
    Pending,
    Confirmed,
    Finalized,
    Failed,
}

impl ExecutionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionState::Pending => "pending",
            ExecutionState::Confirmed => "confirmed",
            ExecutionState::Finalized => "finalized",
            ExecutionState::Failed => "failed",
        }
    }

    pub fn is_landed(self) -> bool {
        matches!(self, ExecutionState::Confirmed | ExecutionState::Finalized)
    }
}

/// État d'une transaction envoyée. Un `Pending` garde toujours sa signature :
/// l'appelant peut reprendre le suivi lui-même.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionStatus {
    pub signature: Signature,
    pub state: ExecutionState,
    pub confirmations: Option<usize>,
    pub slot: Option<u64>,
    pub error_message: Option<String>,
    pub observed_at_ms: u64,
}

impl ExecutionStatus {
    pub fn pending(signature: Signature) -> Self {
        Self {
            signature,
            state: ExecutionState::Pending,
            confirmations: None,
            slot: None,
            error_message: None,
            observed_at_ms: now_millis(),
        }
    }

    /// Une transaction incluse mais en échec on-chain, vue comme une erreur.
    pub fn failure(&self) -> Option<ExecutionError> {
        (self.state == ExecutionState::Failed).then(|| ExecutionError::OnChain {
            signature: self.signature,
            message: self.error_message.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("entrée invalide : {0}")]
    Input(String),
    #[error("signature manquante pour {0}")]
    MissingSignature(Pubkey),
    #[error("aucune instruction à envoyer")]
    EmptyInstructions,
    #[error("blockhash nul")]
    ZeroBlockhash,
    #[error("compilation du message : {0}")]
    Compile(String),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("solde insuffisant : {required} requis, {available} disponibles")]
    InsufficientBalance { required: u64, available: u64 },
    #[error("simulation en échec : {message}")]
    Simulation { message: String, logs: Vec<String> },
    #[error("transaction {signature} échouée on-chain : {message}")]
    OnChain { signature: Signature, message: String },
    #[error("échec après {attempts} tentatives : {last}")]
    RetriesExhausted { attempts: u32, last: Box<ExecutionError> },
    #[error("échéance dépassée")]
    DeadlineExceeded,
    #[error("annulé")]
    Cancelled,
}

impl ExecutionError {
    /// Seules les erreurs de transport transitoires justifient de tout rejouer.
    /// Un échec on-chain a déjà consommé des frais : jamais rejoué.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExecutionError::Rpc(e) => e.is_retryable(),
            ExecutionError::Resolver(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Erreurs qui veulent dire "pas encore" pour un sniper : le pool n'est pas prêt.
    pub fn is_not_ready(&self) -> bool {
        match self {
            ExecutionError::Resolver(e) => !e.is_retryable(),
            ExecutionError::Pricing(_) => true,
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutionError::Cancelled | ExecutionError::Rpc(RpcError::Cancelled))
    }
}

/// Fait la course entre `work` et l'annulation. Réservé aux étapes sans effet
/// on-chain : le futur perdant est abandonné en cours de route.
pub(crate) async fn until_cancelled<T, E>(
    cancel: &CancellationToken,
    work: impl Future<Output = Result<T, E>>,
) -> Result<T, ExecutionError>
where
    E: Into<ExecutionError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ExecutionError::Cancelled),
        result = work => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(ExecutionError::Rpc(RpcError::Timeout).is_retryable());
        assert!(!ExecutionError::Rpc(RpcError::Unauthorized).is_retryable());
        assert!(!ExecutionError::Pricing(PricingError::ZeroReserves).is_retryable());
        assert!(ExecutionError::Pricing(PricingError::ZeroReserves).is_not_ready());
        let exhausted = ExecutionError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ExecutionError::Rpc(RpcError::Timeout)),
        };
        assert!(!exhausted.is_retryable());
        assert!(ExecutionError::Rpc(RpcError::Cancelled).is_cancelled());
    }

    #[test]
    fn test_failed_status_becomes_on_chain_error() {
        let mut status = ExecutionStatus::pending(Signature::default());
        assert!(status.failure().is_none());
        status.state = ExecutionState::Failed;
        status.error_message = Some("InstructionError(3, Custom(30))".to_string());
        assert!(matches!(status.failure(), Some(ExecutionError::OnChain { .. })));
    }
}
