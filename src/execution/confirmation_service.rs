// DANS : src/execution/confirmation_service.rs

use super::{ExecutionState, ExecutionStatus};
use crate::decoders::pool_state::now_millis;
use crate::rpc::{Commitment, RpcEndpointPool, SignatureStatus};
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(45);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationOptions {
    /// Niveau à atteindre : `Confirmed` (au moins une confirmation) ou `Finalized`.
    pub target: Commitment,
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmationOptions {
    fn default() -> Self {
        Self {
            target: Commitment::Confirmed,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Traduit un statut RPC. `None` tant que la cible n'est pas atteinte.
fn terminal_status(signature: Signature, status: &SignatureStatus, target: Commitment) -> Option<ExecutionStatus> {
    let state = if status.err.is_some() {
        ExecutionState::Failed
    } else {
        match status.confirmation_status {
            Some(level) if level >= target => {
                if level == Commitment::Finalized {
                    ExecutionState::Finalized
                } else {
                    ExecutionState::Confirmed
                }
            }
            _ => return None,
        }
    };
    Some(ExecutionStatus {
        signature,
        state,
        confirmations: status.confirmations,
        slot: Some(status.slot),
        error_message: status.err.clone(),
        observed_at_ms: now_millis(),
    })
}

/// Interroge getSignatureStatuses toutes les `poll_interval` jusqu'à un état
/// terminal. Le délai dépassé et l'annulation rendent `Pending`, jamais `Failed` :
/// la transaction peut encore atterrir.
pub async fn await_confirmation(
    rpc: &RpcEndpointPool,
    signature: Signature,
    options: &ConfirmationOptions,
    cancel: &CancellationToken,
) -> ExecutionStatus {
    let started = Instant::now();
    let deadline = started + options.timeout;
    let mut last_seen: Option<SignatureStatus> = None;

    loop {
        match rpc.get_signature_statuses(&[signature]).await {
            Ok(statuses) => {
                if let Some(Some(status)) = statuses.into_iter().next() {
                    if let Some(terminal) = terminal_status(signature, &status, options.target) {
                        debug!(signature = %signature, state = terminal.state.as_str(), "[Confirm] État terminal");
                        return terminal;
                    }
                    last_seen = Some(status);
                }
            }
            // Une erreur de sondage n'est pas un verdict : on continue jusqu'au délai.
            Err(e) => debug!(signature = %signature, error = %e, "[Confirm] Sondage en échec"),
        }

        if Instant::now() + options.poll_interval > deadline {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            warn!(signature = %signature, elapsed_ms, "[Confirm] Délai de confirmation dépassé");
            let mut status = ExecutionStatus::pending(signature);
            status.slot = last_seen.as_ref().map(|s| s.slot);
            status.confirmations = last_seen.and_then(|s| s.confirmations);
            status.error_message = Some(format!("ConfirmationTimeout après {elapsed_ms} ms"));
            return status;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(signature = %signature, "[Confirm] Attente annulée");
                let mut status = ExecutionStatus::pending(signature);
                status.error_message = Some("annulé".to_string());
                return status;
            }
            _ = tokio::time::sleep(options.poll_interval) => {}
        }
    }
}

/// Suivi en tâche de fond des signatures restées `Pending` (délai dépassé) :
/// on les sonde par lots et on publie leur état final.
pub struct PendingTracker {
    receiver: Receiver<Signature>,
    updates: Sender<ExecutionStatus>,
    rpc: Arc<RpcEndpointPool>,
    options: ConfirmationOptions,
    check_interval: Duration,
    pending: HashMap<Signature, Instant>,
}

impl PendingTracker {
    /// Crée le service. Retourne l'émetteur des signatures à suivre et le flux des états finaux.
    pub fn new(
        rpc: Arc<RpcEndpointPool>,
        options: ConfirmationOptions,
        check_interval: Duration,
    ) -> (Self, Sender<Signature>, Receiver<ExecutionStatus>) {
        let (sig_tx, sig_rx) = mpsc::channel(1024);
        let (update_tx, update_rx) = mpsc::channel(1024);
        let tracker = Self {
            receiver: sig_rx,
            updates: update_tx,
            rpc,
            options,
            check_interval,
            pending: HashMap::new(),
        };
        (tracker, sig_tx, update_rx)
    }

    pub fn start(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("[Confirm] Démarrage du suivi des transactions en suspens");
            let mut ticker = tokio::time::interval(self.check_interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    Some(signature) = self.receiver.recv() => {
                        debug!(signature = %signature, "[Confirm] Nouvelle signature à suivre");
                        self.pending.insert(signature, Instant::now());
                    }
                    _ = ticker.tick(), if !self.pending.is_empty() => self.check_pending().await,
                }
            }
            debug!(remaining = self.pending.len(), "[Confirm] Suivi arrêté");
        })
    }

    async fn check_pending(&mut self) {
        let signatures: Vec<Signature> = self.pending.keys().copied().collect();
        let statuses = match self.rpc.get_signature_statuses(&signatures).await {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(error = %e, "[Confirm] getSignatureStatuses en échec");
                return;
            }
        };

        let now = Instant::now();
        for (signature, status) in signatures.into_iter().zip(statuses) {
            let finished = match status.as_ref().and_then(|s| terminal_status(signature, s, self.options.target)) {
                Some(terminal) => Some(terminal),
                None => {
                    let tracked_since = self.pending.get(&signature).copied().unwrap_or(now);
                    (now.duration_since(tracked_since) > self.options.timeout).then(|| {
                        warn!(signature = %signature, "[Confirm] Transaction considérée comme perdue");
                        let mut lost = ExecutionStatus::pending(signature);
                        lost.error_message = Some("abandonnée après le délai de suivi".to_string());
                        lost
                    })
                }
            };
            if let Some(update) = finished {
                self.pending.remove(&signature);
                if self.updates.send(update).await.is_err() {
                    debug!("[Confirm] Plus de lecteur pour les états finaux");
                }
            }
        }
    }
}
