// DANS : src/data_pipeline/pool_resolver.rs

use super::api_connectors::{IndexError, IndexedPool, PoolIndex};
use super::onchain_scanner::{self, RawPoolData};
use crate::decoders::pool_state::now_millis;
use crate::decoders::raydium::amm_v4::{self, decode_market, decode_pool_account, detect_version, MarketAccounts};
use crate::decoders::spl_token_decoders::account::decode_account;
use crate::decoders::{DecodeError, Pool, PoolSource};
use crate::rpc::{Commitment, RpcEndpointPool, RpcError};
use crate::state::pool_cache::PoolCache;
use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Au-delà, les marchés les plus anciens sont oubliés.
pub const MAX_CACHED_MARKETS: usize = 512;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolverError {
    #[error("paire invalide : {0}")]
    InvalidPair(String),
    #[error("aucun pool trouvé pour {base}/{quote}")]
    PoolNotFound { base: Pubkey, quote: Pubkey },
    #[error("pool {0} inactif")]
    PoolInactive(Pubkey),
    #[error("pool {pool} sous le seuil de liquidité ({total} < {min})")]
    PoolUnderLiquidity { pool: Pubkey, total: u128, min: u128 },
    #[error("stage={stage}: {source}")]
    Decode {
        stage: &'static str,
        #[source]
        source: DecodeError,
    },
    #[error("stage={stage}: {source}")]
    Rpc {
        stage: &'static str,
        #[source]
        source: RpcError,
    },
    #[error("index indisponible : {0}")]
    IndexUnavailable(#[from] IndexError),
}

impl ResolverError {
    /// Seules les erreurs transitoires du transport méritent un nouvel essai.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolverError::Rpc { source, .. } if source.is_retryable())
    }

    fn rpc(stage: &'static str) -> impl FnOnce(RpcError) -> Self {
        move |source| ResolverError::Rpc { stage, source }
    }

    fn decode(stage: &'static str) -> impl FnOnce(DecodeError) -> Self {
        move |source| ResolverError::Decode { stage, source }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub program_id: Pubkey,
    /// Somme brute base + quote minimale pour qu'un candidat soit retenu.
    pub min_liquidity: u128,
    pub commitment: Commitment,
    /// Scan on-chain quand l'index est absent ou injoignable.
    pub scan_fallback: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            program_id: amm_v4::RAYDIUM_AMM_V4_PROGRAM_ID,
            min_liquidity: 1_000_000,
            commitment: Commitment::Confirmed,
            scan_fallback: true,
        }
    }
}

/// Source d'état de pool pour la surveillance (sniper). Implémentée par le résolveur.
#[async_trait]
pub trait PoolStateSource: Send + Sync {
    async fn fetch_pool(&self, pool_id: &Pubkey) -> Result<Pool, ResolverError>;
}

pub struct PoolResolver {
    rpc: Arc<RpcEndpointPool>,
    index: Option<Arc<dyn PoolIndex>>,
    cache: Arc<PoolCache>,
    /// Marchés OpenBook décodés, avec leur date de lecture. Même durée de vie
    /// que les entrées du cache de pools.
    markets: RwLock<HashMap<Pubkey, (MarketAccounts, Instant)>>,
    config: ResolverConfig,
}

impl PoolResolver {
    pub fn new(
        rpc: Arc<RpcEndpointPool>,
        index: Option<Arc<dyn PoolIndex>>,
        cache: Arc<PoolCache>,
        config: ResolverConfig,
    ) -> Self {
        Self { rpc, index, cache, markets: RwLock::new(HashMap::new()), config }
    }

    pub fn cache(&self) -> &Arc<PoolCache> {
        &self.cache
    }

    /// Résout le pool d'une paire, dans un ordre quelconque.
    #[instrument(skip_all, fields(token_a = %token_a, token_b = %token_b))]
    pub async fn resolve(&self, token_a: &Pubkey, token_b: &Pubkey) -> Result<Pool, ResolverError> {
        validate_pair(token_a, token_b)?;

        if let Some(pool) = self.cache.get_by_pair(token_a, token_b).await {
            debug!(pool = %pool.id, "[Resolver] Cache HIT");
            return Ok(pool);
        }

        let pool = match self.index_candidates(&[*token_a, *token_b]).await {
            Some(Ok(records)) if !records.is_empty() => {
                let pools = self.load_candidates(&records, |p| p.contains_pair(token_a, token_b)).await?;
                select_best(pools, token_a, token_b, self.config.min_liquidity)?
            }
            Some(Ok(_)) => {
                debug!("[Resolver] L'index ne connaît aucun pool, scan on-chain");
                self.resolve_by_scan(token_a, token_b).await?
            }
            Some(Err(e)) => {
                if !self.config.scan_fallback {
                    return Err(ResolverError::IndexUnavailable(e));
                }
                warn!(error = %e, "[Resolver] Index injoignable, repli sur le scan on-chain");
                self.resolve_by_scan(token_a, token_b).await?
            }
            None => self.resolve_by_scan(token_a, token_b).await?,
        };

        let source = if pool.from_index { PoolSource::Index } else { PoolSource::OnChain };
        self.cache.insert(pool.clone(), source).await;
        info!(pool = %pool.id, base_reserve = pool.state.base_reserve, quote_reserve = pool.state.quote_reserve, "[Resolver] Pool résolu");
        Ok(pool)
    }

    /// Comme `resolve`, mais un pool servi par le cache est relu on-chain :
    /// seules les données statiques vivent longtemps dans le cache.
    pub async fn resolve_live(&self, token_a: &Pubkey, token_b: &Pubkey) -> Result<Pool, ResolverError> {
        validate_pair(token_a, token_b)?;
        match self.cache.get_by_pair(token_a, token_b).await {
            Some(cached) => {
                let pool = self.fetch_pool(&cached.id).await?;
                check_viable(&pool, self.config.min_liquidity)?;
                Ok(pool)
            }
            None => self.resolve(token_a, token_b).await,
        }
    }

    /// Meilleur pool (le plus liquide) contenant `mint`.
    #[instrument(skip_all, fields(mint = %mint))]
    pub async fn best_pool_for_mint(&self, mint: &Pubkey) -> Result<Pool, ResolverError> {
        if *mint == Pubkey::default() {
            return Err(ResolverError::InvalidPair("mint nul".to_string()));
        }
        if let Some(pool) = self.cache.best_for_mint(mint).await {
            return Ok(pool);
        }

        let pools = match &self.index {
            Some(index) => {
                let (listed, launch) = tokio::join!(index.pools_by_token(mint), index.launch_record(mint));
                let mut records = match (listed, launch) {
                    (Err(e), Err(_)) if !self.config.scan_fallback => return Err(ResolverError::IndexUnavailable(e)),
                    (Err(e), Err(_)) => {
                        warn!(error = %e, "[Resolver] Index injoignable, repli sur le scan on-chain");
                        Vec::new()
                    }
                    (listed, launch) => {
                        let mut records = listed.unwrap_or_default();
                        records.extend(launch.ok().flatten());
                        records
                    }
                };
                dedupe_records(&mut records);
                if records.is_empty() {
                    self.scan_mint(mint).await?
                } else {
                    self.load_candidates(&records, |p| p.contains_mint(mint)).await?
                }
            }
            None => self.scan_mint(mint).await?,
        };

        let pool = pools
            .into_iter()
            .filter(|p| p.contains_mint(mint) && check_viable(p, self.config.min_liquidity).is_ok())
            .max_by_key(|p| p.state.total_liquidity())
            .ok_or(ResolverError::PoolNotFound { base: *mint, quote: Pubkey::default() })?;
        let source = if pool.from_index { PoolSource::Index } else { PoolSource::OnChain };
        self.cache.insert(pool.clone(), source).await;
        Ok(pool)
    }

    /// Lit, décode et hydrate un pool par son id, sans filtre de viabilité.
    /// Met à jour l'état en cache s'il y est.
    pub async fn fetch_pool(&self, pool_id: &Pubkey) -> Result<Pool, ResolverError> {
        let account = self
            .rpc
            .get_account(pool_id, self.config.commitment)
            .await
            .map_err(ResolverError::rpc("fetch"))?
            .ok_or(ResolverError::PoolNotFound { base: Pubkey::default(), quote: Pubkey::default() })?;
        detect_version(&account.owner).map_err(ResolverError::decode("fetch"))?;
        let pool = decode_pool_account(pool_id, &account.data).map_err(ResolverError::decode("fetch"))?;
        let mut pool = self
            .hydrate(vec![pool])
            .await?
            .pop()
            .ok_or(ResolverError::PoolNotFound { base: Pubkey::default(), quote: Pubkey::default() })?;
        if let Some(cached) = self.cache.get(pool_id).await {
            pool.from_index = cached.from_index;
            if pool.open_time_ms == 0 {
                pool.open_time_ms = cached.open_time_ms;
            }
            self.cache.update_state(pool_id, pool.state).await;
        }
        Ok(pool)
    }

    /// Comptes du marché OpenBook d'un pool, gardés en cache le temps du TTL des pools.
    pub async fn market_accounts(&self, pool: &Pool) -> Result<MarketAccounts, ResolverError> {
        let ttl = self.cache.ttl();
        if let Some((market, read_at)) = self.markets.read().await.get(&pool.market_id) {
            if read_at.elapsed() < ttl {
                return Ok(*market);
            }
        }
        let account = self
            .rpc
            .get_account(&pool.market_id, self.config.commitment)
            .await
            .map_err(ResolverError::rpc("market"))?
            .ok_or_else(|| ResolverError::Decode {
                stage: "market",
                source: DecodeError::invalid("market", format!("compte {} introuvable", pool.market_id)),
            })?;
        let market = decode_market(&pool.market_id, &account.owner, &account.data).map_err(ResolverError::decode("market"))?;
        let mut markets = self.markets.write().await;
        markets.retain(|_, (_, read_at)| read_at.elapsed() < ttl);
        if markets.len() >= MAX_CACHED_MARKETS {
            let oldest = markets.iter().min_by_key(|(_, (_, read_at))| *read_at).map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                markets.remove(&oldest);
            }
        }
        markets.insert(pool.market_id, (market, Instant::now()));
        Ok(market)
    }

    // --- ÉTAPES INTERNES ---

    /// Interroge l'index pour chaque mint en parallèle. `None` s'il n'y a pas d'index.
    /// Une seule réponse suffit ; l'erreur n'est remontée que si toutes échouent.
    async fn index_candidates(&self, mints: &[Pubkey]) -> Option<Result<Vec<IndexedPool>, IndexError>> {
        let index = self.index.as_ref()?;
        let responses = futures::future::join_all(mints.iter().map(|mint| index.pools_by_token(mint))).await;

        let mut records = Vec::new();
        let mut last_error = None;
        let mut any_ok = false;
        for response in responses {
            match response {
                Ok(mut list) => {
                    any_ok = true;
                    records.append(&mut list);
                }
                Err(e) => {
                    warn!(error = %e, "[Resolver] Requête d'index en échec");
                    last_error = Some(e);
                }
            }
        }
        if !any_ok {
            return last_error.map(Err);
        }
        dedupe_records(&mut records);
        Some(Ok(records))
    }

    /// Lit les pools listés par l'index. Seuls ceux qui passent `keep` sont hydratés.
    async fn load_candidates<F>(&self, records: &[IndexedPool], keep: F) -> Result<Vec<Pool>, ResolverError>
    where
        F: Fn(&Pool) -> bool,
    {
        let mut ids = Vec::with_capacity(records.len());
        let mut open_times = HashMap::new();
        for record in records {
            match record.pool_pubkey() {
                Ok(id) => {
                    if let Some(open_time) = record.open_time_ms {
                        open_times.insert(id, open_time);
                    }
                    ids.push(id);
                }
                Err(e) => debug!(error = %e, "[Resolver] Enregistrement d'index ignoré"),
            }
        }
        let accounts = self
            .rpc
            .get_multiple_accounts(&ids, self.config.commitment)
            .await
            .map_err(ResolverError::rpc("enrich"))?;

        let raw = ids
            .into_iter()
            .zip(accounts)
            .filter_map(|(address, account)| {
                let account = account?;
                // Le propriétaire doit être le programme AMM : sinon l'index pointe ailleurs.
                match detect_version(&account.owner) {
                    Ok(_) => Some(RawPoolData { address, data: account.data }),
                    Err(e) => {
                        debug!(pool = %address, error = %e, "[Resolver] Candidat écarté");
                        None
                    }
                }
            })
            .collect::<Vec<_>>();

        let mut pools = self.decode_and_hydrate(raw, "enrich", keep).await?;
        for pool in &mut pools {
            pool.from_index = true;
            if pool.open_time_ms == 0 {
                if let Some(open_time) = open_times.get(&pool.id) {
                    pool.open_time_ms = *open_time;
                    pool.apply_open_time(now_millis());
                }
            }
        }
        Ok(pools)
    }

    async fn resolve_by_scan(&self, token_a: &Pubkey, token_b: &Pubkey) -> Result<Pool, ResolverError> {
        let raw = onchain_scanner::find_pools_for_pair(&self.rpc, &self.config.program_id, token_a, token_b)
            .await
            .map_err(ResolverError::rpc("scan"))?;
        let pools = self.decode_and_hydrate(raw, "scan", |p| p.contains_pair(token_a, token_b)).await?;
        select_best(pools, token_a, token_b, self.config.min_liquidity)
    }

    async fn scan_mint(&self, mint: &Pubkey) -> Result<Vec<Pool>, ResolverError> {
        let raw = onchain_scanner::find_pools_for_mint(&self.rpc, &self.config.program_id, mint)
            .await
            .map_err(ResolverError::rpc("scan"))?;
        self.decode_and_hydrate(raw, "scan", |p| p.contains_mint(mint)).await
    }

    /// Décode les comptes bruts ; un candidat illisible est écarté, mais si aucun
    /// ne passe, l'erreur de décodage est remontée. Les pools hors de `keep` ne
    /// sont pas hydratés.
    async fn decode_and_hydrate<F>(&self, raw: Vec<RawPoolData>, stage: &'static str, keep: F) -> Result<Vec<Pool>, ResolverError>
    where
        F: Fn(&Pool) -> bool,
    {
        let mut first_error = None;
        let mut pools = Vec::with_capacity(raw.len());
        let mut seen = HashSet::new();
        for RawPoolData { address, data } in raw {
            if !seen.insert(address) {
                continue;
            }
            match decode_pool_account(&address, &data) {
                Ok(pool) => pools.push(pool),
                Err(e) => {
                    warn!(pool = %address, stage, error = %e, "[Resolver] Décodage impossible");
                    first_error.get_or_insert(ResolverError::Decode { stage, source: e });
                }
            }
        }
        if pools.is_empty() {
            if let Some(error) = first_error {
                return Err(error);
            }
            return Ok(pools);
        }
        pools.retain(|pool| keep(pool));
        self.hydrate(pools).await
    }

    /// Lit les vaults de chaque pool en un seul appel et en déduit les réserves.
    /// Un pool aux vaults illisibles est écarté ; l'erreur ne remonte que si
    /// aucun pool n'a pu être hydraté.
    async fn hydrate(&self, pools: Vec<Pool>) -> Result<Vec<Pool>, ResolverError> {
        if pools.is_empty() {
            return Ok(pools);
        }
        let vaults: Vec<Pubkey> = pools.iter().flat_map(|p| [p.base_vault, p.quote_vault]).collect();
        let accounts = self
            .rpc
            .get_multiple_accounts(&vaults, self.config.commitment)
            .await
            .map_err(ResolverError::rpc("hydrate"))?;
        let now = now_millis();
        let amount = |slot: Option<&Option<solana_sdk::account::Account>>, field: &'static str| {
            let account = slot
                .and_then(|a| a.as_ref())
                .ok_or_else(|| DecodeError::invalid(field, "vault introuvable"))?;
            decode_account(&account.data).map(|decoded| decoded.amount)
        };

        let mut hydrated = Vec::with_capacity(pools.len());
        let mut first_error = None;
        for (mut pool, pair) in pools.into_iter().zip(accounts.chunks(2)) {
            let balances = amount(pair.first(), "base_vault")
                .and_then(|base| amount(pair.get(1), "quote_vault").map(|quote| (base, quote)));
            match balances {
                Ok((base, quote)) => {
                    pool.apply_vault_balances(base, quote);
                    pool.apply_open_time(now);
                    hydrated.push(pool);
                }
                Err(e) => {
                    debug!(pool = %pool.id, error = %e, "[Resolver] Vaults illisibles, candidat écarté");
                    first_error.get_or_insert(ResolverError::Decode { stage: "hydrate", source: e });
                }
            }
        }
        match first_error {
            Some(error) if hydrated.is_empty() => Err(error),
            _ => Ok(hydrated),
        }
    }
}

#[async_trait]
impl PoolStateSource for PoolResolver {
    async fn fetch_pool(&self, pool_id: &Pubkey) -> Result<Pool, ResolverError> {
        PoolResolver::fetch_pool(self, pool_id).await
    }
}

fn validate_pair(token_a: &Pubkey, token_b: &Pubkey) -> Result<(), ResolverError> {
    if *token_a == Pubkey::default() || *token_b == Pubkey::default() {
        return Err(ResolverError::InvalidPair("mint nul".to_string()));
    }
    if token_a == token_b {
        return Err(ResolverError::InvalidPair(format!("{token_a} échangé contre lui-même")));
    }
    Ok(())
}

fn dedupe_records(records: &mut Vec<IndexedPool>) {
    let mut seen = HashSet::new();
    records.retain(|r| seen.insert(r.pool_id.clone()));
}

fn check_viable(pool: &Pool, min_liquidity: u128) -> Result<(), ResolverError> {
    if !pool.state.is_active() {
        return Err(ResolverError::PoolInactive(pool.id));
    }
    let total = pool.state.total_liquidity();
    if total < min_liquidity {
        return Err(ResolverError::PoolUnderLiquidity { pool: pool.id, total, min: min_liquidity });
    }
    Ok(())
}

/// Garde le candidat viable le plus liquide. Sans candidat viable, remonte la
/// raison du rejet du premier candidat de la paire.
fn select_best(pools: Vec<Pool>, token_a: &Pubkey, token_b: &Pubkey, min_liquidity: u128) -> Result<Pool, ResolverError> {
    let mut rejection = None;
    let mut best: Option<Pool> = None;
    for pool in pools.into_iter().filter(|p| p.contains_pair(token_a, token_b)) {
        match check_viable(&pool, min_liquidity) {
            Ok(()) => {
                if best.as_ref().is_none_or(|b| pool.state.total_liquidity() > b.state.total_liquidity()) {
                    best = Some(pool);
                }
            }
            Err(e) => {
                debug!(pool = %pool.id, error = %e, "[Resolver] Candidat non viable");
                rejection.get_or_insert(e);
            }
        }
    }
    best.ok_or_else(|| rejection.unwrap_or(ResolverError::PoolNotFound { base: *token_a, quote: *token_b }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::PoolStatus;
    use crate::rpc::{EndpointPoolConfig, RpcTransport};
    use crate::testing::{fixture_pool, install_pool, FakeIndex, MockTransport};
    use solana_sdk::account::Account;
    use std::time::Duration;

    struct Harness {
        mock: Arc<MockTransport>,
        index: Arc<FakeIndex>,
        resolver: PoolResolver,
    }

    fn harness(with_index: bool) -> Harness {
        let mock = Arc::new(MockTransport::new("http://mock"));
        let rpc = Arc::new(RpcEndpointPool::new(
            vec![mock.clone() as Arc<dyn RpcTransport>],
            EndpointPoolConfig::default(),
        ));
        let index = Arc::new(FakeIndex::default());
        let resolver = PoolResolver::new(
            rpc,
            with_index.then(|| index.clone() as Arc<dyn PoolIndex>),
            Arc::new(PoolCache::default()),
            ResolverConfig::default(),
        );
        Harness { mock, index, resolver }
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_picks_deepest_pool_and_caches_both_directions() {
        let h = harness(true);
        let small = fixture_pool(9, 6, 2_000_000_000, 3_000_000_000, 25, PoolStatus::Active);
        let mut deep = fixture_pool(9, 6, 900_000_000_000, 160_000_000_000, 25, PoolStatus::Active);
        deep.base_mint = small.base_mint;
        deep.quote_mint = small.quote_mint;
        install_pool(&h.mock, &small);
        install_pool(&h.mock, &deep);
        h.index.add(&small.base_mint, &small.id);
        h.index.add(&small.quote_mint, &deep.id);
        h.index.add(&small.quote_mint, &small.id);

        let pool = h.resolver.resolve(&small.base_mint, &small.quote_mint).await.unwrap();
        assert_eq!(pool.id, deep.id);
        assert_eq!(pool.state.base_reserve, 900_000_000_000);
        assert!(pool.from_index);

        let calls = h.mock.call_count("getMultipleAccounts");
        let flipped = h.resolver.resolve(&small.quote_mint, &small.base_mint).await.unwrap();
        assert_eq!(flipped, pool);
        assert_eq!(h.mock.call_count("getMultipleAccounts"), calls);
        let entry = h.resolver.cache().entry(&deep.id).await.unwrap();
        assert_eq!(entry.update_count, 1);
        assert_eq!(entry.source, PoolSource::Index);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_index_falls_back_to_scan() {
        let h = harness(true);
        h.index.fail_with(IndexError::Timeout);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        install_pool(&h.mock, &pool);

        let resolved = h.resolver.resolve(&pool.quote_mint, &pool.base_mint).await.unwrap();
        assert_eq!(resolved.id, pool.id);
        assert!(!resolved.from_index);
        assert_eq!(h.mock.call_count("getProgramAccounts"), 2);
        assert_eq!(h.resolver.cache().entry(&pool.id).await.unwrap().source, PoolSource::OnChain);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactive_and_thin_pools_are_rejected() {
        let h = harness(false);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Disabled);
        install_pool(&h.mock, &pool);
        assert_eq!(
            h.resolver.resolve(&pool.base_mint, &pool.quote_mint).await.unwrap_err(),
            ResolverError::PoolInactive(pool.id)
        );

        let thin = fixture_pool(9, 6, 1_000, 2_000, 25, PoolStatus::Active);
        install_pool(&h.mock, &thin);
        assert!(matches!(
            h.resolver.resolve(&thin.base_mint, &thin.quote_mint).await.unwrap_err(),
            ResolverError::PoolUnderLiquidity { total: 3_000, .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_open_time_counts_as_inactive() {
        let h = harness(false);
        let mut pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        pool.open_time_ms = now_millis() + 3_600_000;
        install_pool(&h.mock, &pool);
        assert_eq!(
            h.resolver.resolve(&pool.base_mint, &pool.quote_mint).await.unwrap_err(),
            ResolverError::PoolInactive(pool.id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_failure_carries_stage() {
        let h = harness(true);
        let id = Pubkey::new_unique();
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        h.mock.set_account(
            id,
            Account { owner: amm_v4::RAYDIUM_AMM_V4_PROGRAM_ID, data: vec![1; 100], lamports: 1, ..Default::default() },
        );
        h.index.add(&a, &id);
        let err = h.resolver.resolve(&a, &b).await.unwrap_err();
        assert!(err.to_string().starts_with("stage=enrich"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_pair_is_not_found() {
        let h = harness(true);
        let (a, b) = (Pubkey::new_unique(), Pubkey::new_unique());
        h.index.add(&a, &Pubkey::new_unique());
        assert_eq!(
            h.resolver.resolve(&a, &b).await.unwrap_err(),
            ResolverError::PoolNotFound { base: a, quote: b }
        );
        assert!(matches!(h.resolver.resolve(&a, &a).await, Err(ResolverError::InvalidPair(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_pool_for_mint_uses_launch_record() {
        let h = harness(true);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        install_pool(&h.mock, &pool);
        h.index.set_launch(&pool.base_mint, &pool.id, 1_700_000_000_000);

        let best = h.resolver.best_pool_for_mint(&pool.base_mint).await.unwrap();
        assert_eq!(best.id, pool.id);
        assert_eq!(h.resolver.cache().len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_pool_refreshes_cached_state() {
        let h = harness(false);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        install_pool(&h.mock, &pool);
        h.resolver.resolve(&pool.base_mint, &pool.quote_mint).await.unwrap();

        h.mock.set_token_amount(&pool.base_vault, 6_000_000_000);
        let live = h.resolver.resolve_live(&pool.base_mint, &pool.quote_mint).await.unwrap();
        assert_eq!(live.state.base_reserve, 6_000_000_000);
        let entry = h.resolver.cache().entry(&pool.id).await.unwrap();
        assert_eq!(entry.pool.state.base_reserve, 6_000_000_000);
        assert_eq!(entry.update_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_broken_unrelated_pool_does_not_block_resolution() {
        let h = harness(true);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        install_pool(&h.mock, &pool);
        // Un autre pool du même mint, dont les vaults n'existent pas.
        let mut broken = fixture_pool(9, 6, 1, 1, 25, PoolStatus::Active);
        broken.base_mint = pool.base_mint;
        h.mock.set_account(
            broken.id,
            Account {
                owner: amm_v4::RAYDIUM_AMM_V4_PROGRAM_ID,
                data: amm_v4::encode_pool_account(&broken),
                lamports: 1,
                ..Default::default()
            },
        );
        h.index.add(&pool.base_mint, &broken.id);
        h.index.add(&pool.base_mint, &pool.id);

        let best = h.resolver.best_pool_for_mint(&pool.base_mint).await.unwrap();
        assert_eq!(best.id, pool.id);
        let resolved = h.resolver.resolve(&pool.base_mint, &pool.quote_mint).await.unwrap();
        assert_eq!(resolved.id, pool.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_vaults_fail_a_direct_fetch() {
        let h = harness(false);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        h.mock.set_account(
            pool.id,
            Account {
                owner: amm_v4::RAYDIUM_AMM_V4_PROGRAM_ID,
                data: amm_v4::encode_pool_account(&pool),
                lamports: 1,
                ..Default::default()
            },
        );
        let err = h.resolver.fetch_pool(&pool.id).await.unwrap_err();
        assert!(err.to_string().starts_with("stage=hydrate"), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_cache_expires_with_pool_ttl() {
        let h = harness(false);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        install_pool(&h.mock, &pool);
        h.resolver.market_accounts(&pool).await.unwrap();
        tokio::time::advance(h.resolver.cache().ttl() + Duration::from_secs(1)).await;
        h.resolver.market_accounts(&pool).await.unwrap();
        assert_eq!(h.mock.call_count("getAccountInfo"), 2);
        assert_eq!(h.resolver.markets.read().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_accounts_are_decoded_once() {
        let h = harness(false);
        let pool = fixture_pool(9, 6, 5_000_000_000, 7_000_000_000, 25, PoolStatus::Active);
        install_pool(&h.mock, &pool);
        let market = h.resolver.market_accounts(&pool).await.unwrap();
        assert_eq!(market.market, pool.market_id);
        h.resolver.market_accounts(&pool).await.unwrap();
        assert_eq!(h.mock.call_count("getAccountInfo"), 1);
    }
}
