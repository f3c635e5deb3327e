// DANS : src/rpc/endpoint_pool.rs

use super::errors::{ErrorClass, RpcError};
use super::resilient_client::SolanaRpcTransport;
use super::transport::{
    Commitment, LatestBlockhash, ProgramAccountFilter, RpcTransport, SendOptions, SignatureStatus,
    SimulationOutcome,
};
use crate::monitoring::{MetricsSink, NoopMetrics, RpcOutcome};
use arc_swap::ArcSwap;
use solana_sdk::{account::Account, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

// getMultipleAccounts refuse plus de 100 clés par appel.
const MAX_MULTIPLE_ACCOUNTS: usize = 100;

#[derive(Debug, Clone)]
pub struct EndpointPoolConfig {
    pub request_timeout: Duration,
    /// Par défaut : 2 × nombre d'endpoints.
    pub max_attempts: Option<usize>,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub health_check_interval: Duration,
    pub health_probe_timeout: Duration,
    pub failure_threshold: u32,
    pub reconnect_initial_backoff: Duration,
    pub reconnect_max_backoff: Duration,
}

impl Default for EndpointPoolConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_attempts: None,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            health_check_interval: Duration::from_secs(30),
            health_probe_timeout: Duration::from_secs(5),
            failure_threshold: 3,
            reconnect_initial_backoff: Duration::from_secs(5),
            reconnect_max_backoff: Duration::from_secs(30),
        }
    }
}

/// Un endpoint et ses compteurs. Tout est atomique : les lecteurs du pool ne
/// prennent jamais de verrou.
struct Endpoint {
    transport: Arc<dyn RpcTransport>,
    active: AtomicBool,
    success_count: AtomicU64,
    error_count: AtomicU64,
    consecutive_failures: AtomicU32,
    /// Sondes de santé ratées d'affilée ; seules elles comptent pour la désactivation.
    probe_failures: AtomicU32,
    latency_ema_us: AtomicU64,
}

impl Endpoint {
    fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            active: AtomicBool::new(true),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
            probe_failures: AtomicU32::new(0),
            latency_ema_us: AtomicU64::new(0),
        }
    }

    fn url(&self) -> &str {
        self.transport.url()
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Retourne vrai si l'appel a changé l'état.
    fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::AcqRel) != active
    }

    fn record_success(&self, latency: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
        // EMA : new = 0.7 * old + 0.3 * current
        let sample = latency.as_micros() as u64;
        let old = self.latency_ema_us.load(Ordering::Relaxed);
        let new = if old == 0 { sample } else { (old * 7 + sample * 3) / 10 };
        self.latency_ema_us.store(new, Ordering::Relaxed);
    }

    fn record_error(&self) -> u32 {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn record_probe_success(&self, latency: Duration) {
        self.probe_failures.store(0, Ordering::Relaxed);
        self.record_success(latency);
    }

    fn record_probe_error(&self) -> u32 {
        self.record_error();
        self.probe_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn stats(&self) -> RpcEndpointStats {
        RpcEndpointStats {
            url: self.url().to_string(),
            active: self.is_active(),
            success_count: self.success_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            probe_failures: self.probe_failures.load(Ordering::Relaxed),
            avg_latency: Duration::from_micros(self.latency_ema_us.load(Ordering::Relaxed)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpointStats {
    pub url: String,
    pub active: bool,
    pub success_count: u64,
    pub error_count: u64,
    pub consecutive_failures: u32,
    pub probe_failures: u32,
    pub avg_latency: Duration,
}

/// Pool d'endpoints RPC : round-robin sur les endpoints actifs, ré-essai sur
/// erreur transitoire, mise hors service sur erreur critique, sondes de santé.
pub struct RpcEndpointPool {
    endpoints: ArcSwap<Vec<Arc<Endpoint>>>,
    cursor: AtomicUsize,
    config: EndpointPoolConfig,
    metrics: Arc<dyn MetricsSink>,
    shutdown: CancellationToken,
}

impl RpcEndpointPool {
    pub fn new(transports: Vec<Arc<dyn RpcTransport>>, config: EndpointPoolConfig) -> Self {
        let endpoints = transports.into_iter().map(|t| Arc::new(Endpoint::new(t))).collect();
        Self {
            endpoints: ArcSwap::from_pointee(endpoints),
            cursor: AtomicUsize::new(0),
            config,
            metrics: Arc::new(NoopMetrics),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_urls(urls: &[String], config: EndpointPoolConfig) -> Self {
        let transports = urls
            .iter()
            .map(|url| Arc::new(SolanaRpcTransport::new(url.clone(), config.request_timeout)) as Arc<dyn RpcTransport>)
            .collect();
        Self::new(transports, config)
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Les appels en cours et à venir s'arrêtent avec `Cancelled` quand ce jeton est annulé.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn add_endpoint(&self, transport: Arc<dyn RpcTransport>) {
        let endpoint = Arc::new(Endpoint::new(transport));
        self.endpoints.rcu(|current| {
            let mut next = current.as_ref().clone();
            next.push(endpoint.clone());
            next
        });
        info!(url = endpoint.url(), "[RPC] Endpoint ajouté au pool");
    }

    pub fn len(&self) -> usize {
        self.endpoints.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn active_count(&self) -> usize {
        self.endpoints.load().iter().filter(|e| e.is_active()).count()
    }

    pub fn stats(&self) -> Vec<RpcEndpointStats> {
        self.endpoints.load().iter().map(|e| e.stats()).collect()
    }

    fn next_active(&self) -> Option<Arc<Endpoint>> {
        let endpoints = self.endpoints.load();
        let n = endpoints.len();
        for _ in 0..n {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % n;
            let endpoint = &endpoints[idx];
            if endpoint.is_active() {
                return Some(endpoint.clone());
            }
        }
        None
    }

    fn max_attempts(&self) -> usize {
        self.config.max_attempts.unwrap_or_else(|| 2 * self.len()).max(1)
    }

    /// Exécute `op` sur un endpoint actif, avec la deadline par défaut.
    pub async fn execute<T, F, Fut>(&self, method: &'static str, op: F) -> Result<T, RpcError>
    where
        F: Fn(Arc<dyn RpcTransport>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        self.execute_until(method, Instant::now() + self.config.request_timeout, op).await
    }

    /// Comme `execute`, avec une deadline fournie par l'appelant (bornée par `request_timeout`).
    #[instrument(name = "rpc_execute", skip_all, fields(method = method))]
    pub async fn execute_until<T, F, Fut>(&self, method: &'static str, deadline: Instant, op: F) -> Result<T, RpcError>
    where
        F: Fn(Arc<dyn RpcTransport>) -> Fut,
        Fut: Future<Output = Result<T, RpcError>>,
    {
        let deadline = deadline.min(Instant::now() + self.config.request_timeout);
        let max_attempts = self.max_attempts();
        let mut backoff = self.config.initial_backoff;
        let mut last_error: Option<RpcError> = None;

        for attempt in 0..max_attempts {
            if self.shutdown.is_cancelled() {
                return Err(RpcError::Cancelled);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RpcError::Timeout);
            }
            let Some(endpoint) = self.next_active() else {
                warn!(attempt, "[RPC] Aucun endpoint actif");
                return Err(RpcError::NoHealthyEndpoints);
            };

            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return Err(RpcError::Cancelled),
                res = timeout(remaining, op(endpoint.transport.clone())) => res,
            };
            let latency = started.elapsed();

            let error = match outcome {
                Ok(Ok(value)) => {
                    endpoint.record_success(latency);
                    self.metrics.record_rpc(method, endpoint.url(), RpcOutcome::Success, latency);
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => RpcError::Timeout,
            };

            endpoint.record_error();
            match error.class() {
                ErrorClass::Rejected => {
                    self.metrics.record_rpc(method, endpoint.url(), RpcOutcome::Rejected, latency);
                    return Err(error);
                }
                ErrorClass::Critical => {
                    self.metrics.record_rpc(method, endpoint.url(), RpcOutcome::Critical, latency);
                    if endpoint.set_active(false) {
                        warn!(url = endpoint.url(), error = %error, "[RPC] Erreur critique, endpoint désactivé");
                    }
                    last_error = Some(error);
                    // On passe directement à l'endpoint suivant.
                    continue;
                }
                ErrorClass::Retryable => {
                    self.metrics.record_rpc(method, endpoint.url(), RpcOutcome::Retryable, latency);
                    debug!(url = endpoint.url(), attempt, error = %error, "[RPC] Erreur transitoire, nouvel essai");
                    last_error = Some(error);
                }
            }

            if attempt + 1 < max_attempts {
                let remaining = deadline.saturating_duration_since(Instant::now());
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => return Err(RpcError::Cancelled),
                    _ = sleep(backoff.min(remaining)) => {}
                }
                backoff = (backoff * 2).min(self.config.max_backoff);
            }
        }

        Err(RpcError::AllAttemptsExhausted {
            attempts: max_attempts,
            last_error: Box::new(last_error.unwrap_or(RpcError::NoHealthyEndpoints)),
        })
    }

    // --- SANTÉ ---

    /// Une passe de sondes getVersion sur tous les endpoints. Retourne le nombre d'actifs.
    pub async fn check_health(&self) -> usize {
        let endpoints = self.endpoints.load_full();
        let probes = endpoints.iter().map(|endpoint| self.probe(endpoint));
        futures::future::join_all(probes).await;
        self.active_count()
    }

    async fn probe(&self, endpoint: &Arc<Endpoint>) -> bool {
        let started = Instant::now();
        match timeout(self.config.health_probe_timeout, endpoint.transport.get_version()).await {
            Ok(Ok(version)) => {
                endpoint.record_probe_success(started.elapsed());
                if endpoint.set_active(true) {
                    info!(url = endpoint.url(), version = %version, "[RPC] Endpoint réactivé");
                }
                true
            }
            Ok(Err(e)) => {
                self.on_probe_failure(endpoint, &e);
                false
            }
            Err(_) => {
                self.on_probe_failure(endpoint, &RpcError::Timeout);
                false
            }
        }
    }

    fn on_probe_failure(&self, endpoint: &Endpoint, error: &RpcError) {
        let failures = endpoint.record_probe_error();
        if failures >= self.config.failure_threshold && endpoint.set_active(false) {
            warn!(url = endpoint.url(), failures, error = %error, "[RPC] Sonde en échec, endpoint désactivé");
        } else {
            debug!(url = endpoint.url(), failures, error = %error, "[RPC] Sonde en échec");
        }
    }

    fn majority_inactive(&self) -> bool {
        let total = self.len();
        total > 0 && (total - self.active_count()) * 2 > total
    }

    /// Sonde les endpoints inactifs avec un backoff croissant, jusqu'à ce qu'une
    /// majorité redevienne active ou que `cancel` soit déclenché.
    pub async fn reconnect_inactive(&self, cancel: &CancellationToken) {
        let mut backoff = self.config.reconnect_initial_backoff;
        while self.majority_inactive() {
            let endpoints = self.endpoints.load_full();
            let inactive: Vec<_> = endpoints.iter().filter(|e| !e.is_active()).collect();
            warn!(inactive = inactive.len(), total = endpoints.len(), "[RPC] Majorité d'endpoints inactifs, reconnexion");
            futures::future::join_all(inactive.into_iter().map(|e| self.probe(e))).await;
            if !self.majority_inactive() {
                break;
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(self.config.reconnect_max_backoff);
        }
    }

    /// Lance la boucle de santé en tâche de fond.
    pub fn spawn_health_monitor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(pool.config.health_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!(endpoints = pool.len(), "[RPC] Surveillance de santé démarrée");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let active = pool.check_health().await;
                        debug!(active, total = pool.len(), "[RPC] Passe de santé terminée");
                        if pool.majority_inactive() {
                            pool.reconnect_inactive(&cancel).await;
                        }
                    }
                }
            }
            info!("[RPC] Surveillance de santé arrêtée");
        })
    }

    // --- MÉTHODES RPC ---

    pub async fn get_version(&self) -> Result<String, RpcError> {
        self.execute("getVersion", |c| async move { c.get_version().await }).await
    }

    pub async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<LatestBlockhash, RpcError> {
        self.execute("getLatestBlockhash", move |c| async move { c.get_latest_blockhash(commitment).await })
            .await
    }

    pub async fn get_account(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<Option<Account>, RpcError> {
        let pubkey = *pubkey;
        self.execute("getAccountInfo", move |c| async move { c.get_account(&pubkey, commitment).await })
            .await
    }

    /// Découpe la requête par paquets de 100 clés. L'ordre des résultats suit `pubkeys`.
    pub async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
        commitment: Commitment,
    ) -> Result<Vec<Option<Account>>, RpcError> {
        let mut accounts = Vec::with_capacity(pubkeys.len());
        for chunk in pubkeys.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let keys: Arc<[Pubkey]> = Arc::from(chunk);
            let batch = self
                .execute("getMultipleAccounts", move |c| {
                    let keys = keys.clone();
                    async move { c.get_multiple_accounts(&keys, commitment).await }
                })
                .await?;
            accounts.extend(batch);
        }
        Ok(accounts)
    }

    pub async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<ProgramAccountFilter>,
    ) -> Result<Vec<(Pubkey, Account)>, RpcError> {
        let program_id = *program_id;
        let filters: Arc<[ProgramAccountFilter]> = filters.into();
        self.execute("getProgramAccounts", move |c| {
            let filters = filters.clone();
            async move { c.get_program_accounts(&program_id, &filters).await }
        })
        .await
    }

    pub async fn get_balance(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<u64, RpcError> {
        let pubkey = *pubkey;
        self.execute("getBalance", move |c| async move { c.get_balance(&pubkey, commitment).await })
            .await
    }

    pub async fn get_token_account_balance(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<u64, RpcError> {
        let pubkey = *pubkey;
        self.execute("getTokenAccountBalance", move |c| async move {
            c.get_token_account_balance(&pubkey, commitment).await
        })
        .await
    }

    pub async fn send_transaction(
        &self,
        transaction: Arc<VersionedTransaction>,
        options: SendOptions,
    ) -> Result<Signature, RpcError> {
        self.execute("sendTransaction", move |c| {
            let transaction = transaction.clone();
            async move { c.send_transaction(&transaction, &options).await }
        })
        .await
    }

    pub async fn get_signature_statuses(&self, signatures: &[Signature]) -> Result<Vec<Option<SignatureStatus>>, RpcError> {
        let signatures: Arc<[Signature]> = Arc::from(signatures);
        self.execute("getSignatureStatuses", move |c| {
            let signatures = signatures.clone();
            async move { c.get_signature_statuses(&signatures).await }
        })
        .await
    }

    pub async fn simulate_transaction(
        &self,
        transaction: Arc<VersionedTransaction>,
        commitment: Commitment,
        deadline: Instant,
    ) -> Result<SimulationOutcome, RpcError> {
        self.execute_until("simulateTransaction", deadline, move |c| {
            let transaction = transaction.clone();
            async move { c.simulate_transaction(&transaction, commitment).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::CountingMetrics;
    use crate::testing::MockTransport;

    fn pool_of(mocks: &[Arc<MockTransport>], config: EndpointPoolConfig) -> RpcEndpointPool {
        let transports = mocks.iter().map(|m| m.clone() as Arc<dyn RpcTransport>).collect();
        RpcEndpointPool::new(transports, config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_failover_reaches_healthy_endpoint() {
        let a = Arc::new(MockTransport::new("http://a"));
        let b = Arc::new(MockTransport::new("http://b"));
        let c = Arc::new(MockTransport::new("http://c"));
        a.fail_next("getVersion", RpcError::RateLimited("429".into()));
        b.fail_next("getVersion", RpcError::Connection("connection refused".into()));
        let metrics = Arc::new(CountingMetrics::default());
        let pool = pool_of(&[a.clone(), b.clone(), c.clone()], EndpointPoolConfig::default())
            .with_metrics(metrics.clone());

        let version = pool.get_version().await.unwrap();
        assert_eq!(version, "mock-http://c");

        let stats = pool.stats();
        assert_eq!(stats.iter().map(|s| s.error_count).sum::<u64>(), 2);
        assert_eq!(stats.iter().map(|s| s.success_count).sum::<u64>(), 1);
        assert!(stats.iter().all(|s| s.active));
        assert_eq!(metrics.rpc_count("getVersion", RpcOutcome::Retryable), 2);
        assert_eq!(metrics.rpc_count("getVersion", RpcOutcome::Success), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_critical_error_deactivates_endpoint() {
        let a = Arc::new(MockTransport::new("http://a"));
        let b = Arc::new(MockTransport::new("http://b"));
        a.fail_next("getVersion", RpcError::Unauthorized);
        let pool = pool_of(&[a.clone(), b.clone()], EndpointPoolConfig::default());

        assert!(pool.get_version().await.is_ok());
        assert_eq!(pool.active_count(), 1);
        assert!(!pool.stats()[0].active);

        // Les appels suivants n'atteignent plus l'endpoint désactivé.
        for _ in 0..4 {
            pool.get_version().await.unwrap();
        }
        assert_eq!(a.call_count("getVersion"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_critical_yields_no_healthy_endpoints() {
        let a = Arc::new(MockTransport::new("http://a"));
        let b = Arc::new(MockTransport::new("http://b"));
        a.fail_always(RpcError::Forbidden);
        b.fail_always(RpcError::Forbidden);
        let pool = pool_of(&[a, b], EndpointPoolConfig::default());
        assert_eq!(pool.get_version().await.unwrap_err(), RpcError::NoHealthyEndpoints);
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failures_exhaust_attempts() {
        let a = Arc::new(MockTransport::new("http://a"));
        let b = Arc::new(MockTransport::new("http://b"));
        a.fail_always(RpcError::NodeUnhealthy("behind".into()));
        b.fail_always(RpcError::NodeUnhealthy("behind".into()));
        let pool = pool_of(&[a.clone(), b.clone()], EndpointPoolConfig::default());

        match pool.get_version().await.unwrap_err() {
            RpcError::AllAttemptsExhausted { attempts, last_error } => {
                assert_eq!(attempts, 4);
                assert!(last_error.is_retryable());
            }
            other => panic!("erreur inattendue : {other:?}"),
        }
        assert_eq!(a.call_count("getVersion") + b.call_count("getVersion"), 4);
        assert_eq!(pool.active_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_transaction_is_not_retried() {
        let a = Arc::new(MockTransport::new("http://a"));
        let b = Arc::new(MockTransport::new("http://b"));
        a.fail_next("getVersion", RpcError::TransactionRejected("custom program error: 0x1e".into()));
        let pool = pool_of(&[a, b.clone()], EndpointPoolConfig::default());
        assert!(matches!(pool.get_version().await, Err(RpcError::TransactionRejected(_))));
        assert_eq!(b.call_count("getVersion"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_bounds_slow_endpoint() {
        let a = Arc::new(MockTransport::new("http://a"));
        a.set_delay(Duration::from_secs(60));
        let config = EndpointPoolConfig { request_timeout: Duration::from_secs(2), ..Default::default() };
        let pool = pool_of(&[a], config);
        let started = Instant::now();
        assert_eq!(pool.get_version().await.unwrap_err(), RpcError::Timeout);
        assert!(started.elapsed() <= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_probes_deactivate_then_reactivate() {
        let a = Arc::new(MockTransport::new("http://a"));
        let b = Arc::new(MockTransport::new("http://b"));
        b.fail_always(RpcError::Connection("refused".into()));
        let pool = pool_of(&[a, b.clone()], EndpointPoolConfig::default());

        assert_eq!(pool.check_health().await, 2);
        assert_eq!(pool.check_health().await, 2);
        assert_eq!(pool.check_health().await, 1);

        b.clear_failures();
        assert_eq!(pool.check_health().await, 2);
        assert_eq!(pool.stats()[1].consecutive_failures, 0);
        assert_eq!(pool.stats()[1].probe_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_errors_do_not_count_as_probe_strikes() {
        let a = Arc::new(MockTransport::new("http://a"));
        for _ in 0..3 {
            a.fail_next("getVersion", RpcError::Timeout);
        }
        let pool = pool_of(&[a.clone()], EndpointPoolConfig::default());

        // Deux essais de requête ratés, puis une seule sonde ratée.
        assert!(pool.get_version().await.is_err());
        assert_eq!(pool.stats()[0].consecutive_failures, 2);
        assert_eq!(pool.check_health().await, 1);
        let stats = &pool.stats()[0];
        assert!(stats.active);
        assert_eq!(stats.probe_failures, 1);
        assert_eq!(stats.consecutive_failures, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_restores_majority() {
        let mocks: Vec<_> = (0..3).map(|i| Arc::new(MockTransport::new(&format!("http://{i}")))).collect();
        for m in &mocks {
            m.fail_always(RpcError::Connection("down".into()));
        }
        let pool = Arc::new(pool_of(&mocks, EndpointPoolConfig::default()));
        for _ in 0..3 {
            pool.check_health().await;
        }
        assert_eq!(pool.active_count(), 0);

        mocks[0].clear_failures();
        mocks[1].clear_failures();
        let cancel = CancellationToken::new();
        pool.reconnect_inactive(&cancel).await;
        assert_eq!(pool.active_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_endpoint_and_cancellation() {
        let a = Arc::new(MockTransport::new("http://a"));
        a.fail_always(RpcError::Unauthorized);
        let shutdown = CancellationToken::new();
        let pool = pool_of(&[a], EndpointPoolConfig::default()).with_shutdown(shutdown.clone());
        assert!(pool.get_version().await.is_err());

        pool.add_endpoint(Arc::new(MockTransport::new("http://b")));
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get_version().await.unwrap(), "mock-http://b");

        shutdown.cancel();
        assert_eq!(pool.get_version().await.unwrap_err(), RpcError::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_multiple_accounts_chunks_requests() {
        let a = Arc::new(MockTransport::new("http://a"));
        let pool = pool_of(&[a.clone()], EndpointPoolConfig::default());
        let keys: Vec<Pubkey> = (0..250).map(|_| Pubkey::new_unique()).collect();
        a.set_account(keys[200], Account { lamports: 9, ..Default::default() });
        let accounts = pool.get_multiple_accounts(&keys, Commitment::Confirmed).await.unwrap();
        assert_eq!(accounts.len(), 250);
        assert_eq!(accounts[200].as_ref().map(|a| a.lamports), Some(9));
        assert_eq!(a.call_count("getMultipleAccounts"), 3);
    }
}
