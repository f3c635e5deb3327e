// DANS : src/execution/simulate.rs

use super::ExecutionError;
use crate::decoders::raydium::amm_v4::events::parse_swap_base_in_log;
use crate::rpc::{Commitment, RpcEndpointPool};
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const SIMULATION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub units_consumed: Option<u64>,
    /// Montant de sortie lu dans le `ray_log` du swap, s'il est présent.
    pub swap_out: Option<u64>,
    pub logs: Vec<String>,
}

/// Simule la transaction (blockhash remplacé côté noeud, pas de vérification de signature).
/// Une erreur de simulation arrête le swap : rien n'est envoyé.
pub async fn simulate_swap(
    rpc: &RpcEndpointPool,
    transaction: Arc<VersionedTransaction>,
    commitment: Commitment,
) -> Result<SimulationReport, ExecutionError> {
    let outcome = rpc
        .simulate_transaction(transaction, commitment, Instant::now() + SIMULATION_TIMEOUT)
        .await?;

    if let Some(err) = outcome.err {
        warn!(error = %err, units = ?outcome.units_consumed, "[Simulation] Échec");
        return Err(ExecutionError::Simulation { message: err, logs: outcome.logs });
    }

    let swap_out = parse_swap_base_in_log(&outcome.logs).map(|log| log.out_amount);
    debug!(units = ?outcome.units_consumed, swap_out = ?swap_out, "[Simulation] OK");
    Ok(SimulationReport { units_consumed: outcome.units_consumed, swap_out, logs: outcome.logs })
}
