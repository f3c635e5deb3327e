// DANS : src/bin/trader.rs

use anyhow::{Context, Result};
use raysnipe::config::Config;
use raysnipe::data_pipeline::api_connectors::{HttpPoolIndex, PoolIndex};
use raysnipe::data_pipeline::pool_resolver::PoolResolver;
use raysnipe::execution::{KeypairSigner, PendingTracker, SwapExecutor, TransactionOrchestrator, TransactionSigner};
use raysnipe::monitoring::{logging::setup_logging, MetricsSink, NoopMetrics};
use raysnipe::rpc::RpcEndpointPool;
use raysnipe::state::PoolCache;
use raysnipe::strategies::{parse_tasks, TaskDispatcher, TradeRecord, WalletBook};
use solana_sdk::signature::Signature;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PENDING_CHECK_INTERVAL: Duration = Duration::from_secs(2);

/// `WALLET_PATH` accepte plusieurs fichiers séparés par des virgules. Chaque
/// wallet est joignable par le nom de son fichier (sans extension) et par sa pubkey.
fn load_wallets(paths: &str) -> Result<WalletBook> {
    let mut wallets = WalletBook::new();
    for path in paths.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let signer: Arc<dyn TransactionSigner> = Arc::new(KeypairSigner::from_file(path)?);
        let pubkey = signer.pubkey();
        if let Some(stem) = Path::new(path).file_stem().and_then(|s| s.to_str()) {
            wallets.insert(stem.to_string(), signer.clone());
        }
        wallets.insert(pubkey.to_string(), signer);
        info!(wallet = %pubkey, path, "[Init] Wallet chargé");
    }
    anyhow::ensure!(!wallets.is_empty(), "aucun wallet dans WALLET_PATH");
    Ok(wallets)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    setup_logging("info", config.log_json);
    info!("--- Lancement du trader Raydium V4 ---");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("[Main] Ctrl-C reçu, arrêt en cours");
                shutdown.cancel();
            }
        }
    });

    // --- RPC ---
    let metrics: Arc<dyn MetricsSink> = Arc::new(NoopMetrics);
    let rpc = Arc::new(
        RpcEndpointPool::from_urls(&config.rpc_urls(), config.endpoint_pool())
            .with_metrics(metrics.clone())
            .with_shutdown(shutdown.clone()),
    );
    match rpc.get_version().await {
        Ok(version) => info!(version, endpoints = rpc.len(), "[Init] RPC joignable"),
        Err(e) => warn!(error = %e, "[Init] Aucun endpoint ne répond pour l'instant"),
    }
    let health = rpc.spawn_health_monitor(shutdown.clone());

    // --- Pools ---
    let cache_config = config.cache();
    let cache = Arc::new(PoolCache::new(cache_config.ttl));
    let sweeper = cache.clone().spawn_sweeper(cache_config.sweep_interval, shutdown.clone());
    let index = match &config.pool_index_url {
        Some(url) => Some(Arc::new(HttpPoolIndex::new(url.clone())?) as Arc<dyn PoolIndex>),
        None => None,
    };
    let resolver = Arc::new(PoolResolver::new(rpc.clone(), index, cache, config.resolver()?));

    // --- Exécution ---
    let executor_config = config.executor()?;
    let confirmation = executor_config.submit.confirmation;
    let orchestrator = Arc::new(TransactionOrchestrator::new(rpc.clone(), config.orchestrator()));
    let executor = Arc::new(
        SwapExecutor::new(rpc.clone(), resolver.clone(), orchestrator, executor_config).with_metrics(metrics),
    );
    let (tracker, pending_tx, mut final_rx) = PendingTracker::new(rpc.clone(), confirmation, PENDING_CHECK_INTERVAL);
    let tracker_handle = tracker.start(shutdown.clone());
    tokio::spawn(async move {
        while let Some(status) = final_rx.recv().await {
            info!(signature = %status.signature, state = status.state.as_str(), "[Main] Statut final d'une transaction en suspens");
        }
    });

    // --- Tâches ---
    let wallets = load_wallets(&config.wallet_path)?;
    let json = std::fs::read_to_string(&config.tasks_path)
        .with_context(|| format!("lecture des tâches depuis {}", config.tasks_path))?;
    let tasks = parse_tasks(&json, &config.task_defaults()?)?;
    info!(tasks = tasks.len(), path = %config.tasks_path, "[Init] Tâches chargées");

    let dispatcher = TaskDispatcher::new(executor, wallets, config.dispatcher()).with_sniper(resolver, config.sniper());

    // Le journal de trades part sur stdout, une ligne JSON par enregistrement.
    let (records_tx, mut records_rx) = mpsc::channel::<TradeRecord>(256);
    let journal = tokio::spawn(async move {
        let mut pending = 0usize;
        while let Some(record) = records_rx.recv().await {
            if record.status == "pending" {
                if let Some(signature) = record.signature.as_deref().and_then(|s| s.parse::<Signature>().ok()) {
                    if pending_tx.send(signature).await.is_ok() {
                        pending += 1;
                    }
                }
            }
            match serde_json::to_string(&record) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "[Main] Enregistrement non sérialisable"),
            }
        }
        pending
    });

    let summary = dispatcher.run(tasks, records_tx, shutdown.clone()).await;
    let pending = journal.await?;
    info!(
        tasks = summary.tasks,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        autosells = summary.autosells,
        pending,
        "[Main] Toutes les tâches sont terminées"
    );

    if pending > 0 {
        info!(wait_ms = confirmation.timeout.as_millis() as u64, "[Main] Attente des transactions en suspens");
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = tokio::time::sleep(confirmation.timeout) => {}
        }
    }
    shutdown.cancel();
    let _ = tokio::join!(health, sweeper, tracker_handle);
    info!("[Main] Arrêt terminé");
    Ok(())
}
