// DANS : src/state/pool_cache.rs

use crate::decoders::{Pool, PoolSource, PoolState};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const MIN_TTL: Duration = Duration::from_secs(60);
pub const MAX_TTL: Duration = Duration::from_secs(3_600);
pub const DEFAULT_TTL: Duration = Duration::from_secs(900);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, sweep_interval: DEFAULT_SWEEP_INTERVAL }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub pool: Pool,
    pub expire_at: Instant,
    pub last_update: Instant,
    pub update_count: u64,
    pub source: PoolSource,
}

impl CacheEntry {
    fn is_valid(&self, now: Instant) -> bool {
        now < self.expire_at
    }
}

/// Les deux index vivent sous le même verrou : une entrée et ses deux clés de
/// paire sont toujours modifiées ensemble.
#[derive(Default)]
struct Inner {
    by_id: HashMap<Pubkey, CacheEntry>,
    by_pair: HashMap<(Pubkey, Pubkey), Pubkey>,
}

impl Inner {
    fn remove(&mut self, id: &Pubkey) -> Option<CacheEntry> {
        let entry = self.by_id.remove(id)?;
        let (base, quote) = (entry.pool.base_mint, entry.pool.quote_mint);
        for key in [(base, quote), (quote, base)] {
            if self.by_pair.get(&key) == Some(id) {
                self.by_pair.remove(&key);
            }
        }
        Some(entry)
    }
}

/// Cache des pools résolus, indexé par id et par paire (dans les deux sens).
/// Toutes les lectures renvoient des copies.
pub struct PoolCache {
    inner: RwLock<Inner>,
    ttl_secs: AtomicU64,
}

impl Default for PoolCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl PoolCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ttl_secs: AtomicU64::new(clamp_ttl(ttl).as_secs()),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.load(Ordering::Relaxed))
    }

    /// Change le TTL des insertions futures. Retourne la valeur retenue après bornage.
    pub fn set_ttl(&self, ttl: Duration) -> Duration {
        let ttl = clamp_ttl(ttl);
        self.ttl_secs.store(ttl.as_secs(), Ordering::Relaxed);
        ttl
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: &Pubkey) -> Option<Pool> {
        self.entry(id).await.map(|entry| entry.pool)
    }

    pub async fn entry(&self, id: &Pubkey) -> Option<CacheEntry> {
        let inner = self.inner.read().await;
        inner
            .by_id
            .get(id)
            .filter(|entry| entry.is_valid(Instant::now()))
            .cloned()
    }

    /// Recherche par paire, dans un ordre quelconque.
    pub async fn get_by_pair(&self, a: &Pubkey, b: &Pubkey) -> Option<Pool> {
        let inner = self.inner.read().await;
        let id = inner.by_pair.get(&(*a, *b))?;
        inner
            .by_id
            .get(id)
            .filter(|entry| entry.is_valid(Instant::now()))
            .map(|entry| entry.pool.clone())
    }

    /// Insère ou remplace un pool. Une ré-insertion incrémente `update_count`
    /// et repousse l'expiration.
    pub async fn insert(&self, pool: Pool, source: PoolSource) -> CacheEntry {
        let now = Instant::now();
        let expire_at = now + self.ttl();
        let id = pool.id;
        let (base, quote) = (pool.base_mint, pool.quote_mint);

        let mut inner = self.inner.write().await;
        let update_count = inner.by_id.get(&id).map_or(1, |previous| previous.update_count + 1);
        // Si la paire pointait vers un autre pool, celui-ci est remplacé.
        if let Some(previous_id) = inner.by_pair.get(&(base, quote)).copied() {
            if previous_id != id {
                inner.remove(&previous_id);
            }
        }
        let entry = CacheEntry { pool, expire_at, last_update: now, update_count, source };
        inner.by_id.insert(id, entry.clone());
        inner.by_pair.insert((base, quote), id);
        inner.by_pair.insert((quote, base), id);
        entry
    }

    /// Met à jour la partie mutable d'un pool déjà en cache.
    pub async fn update_state(&self, id: &Pubkey, state: PoolState) -> bool {
        let mut inner = self.inner.write().await;
        match inner.by_id.get_mut(id) {
            Some(entry) => {
                entry.pool.state = state;
                entry.last_update = Instant::now();
                entry.update_count += 1;
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, id: &Pubkey) -> Option<Pool> {
        self.inner.write().await.remove(id).map(|entry| entry.pool)
    }

    /// Pool valide le plus liquide contenant `mint`.
    pub async fn best_for_mint(&self, mint: &Pubkey) -> Option<Pool> {
        let now = Instant::now();
        let inner = self.inner.read().await;
        inner
            .by_id
            .values()
            .filter(|entry| entry.is_valid(now) && entry.pool.contains_mint(mint) && entry.pool.state.is_active())
            .max_by_key(|entry| entry.pool.state.total_liquidity())
            .map(|entry| entry.pool.clone())
    }

    /// Retire les entrées expirées et leurs clés de paire. Retourne le nombre retiré.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.write().await;
        let expired: Vec<Pubkey> = inner
            .by_id
            .iter()
            .filter(|(_, entry)| !entry.is_valid(now))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            inner.remove(id);
        }
        expired.len()
    }

    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Le premier tick est immédiat.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.sweep().await;
                        if removed > 0 {
                            let remaining = self.len().await;
                            info!(removed, remaining, "[Cache] Entrées expirées retirées");
                        }
                    }
                }
            }
            debug!("[Cache] Balayage arrêté");
        })
    }
}

fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.clamp(MIN_TTL, MAX_TTL)
}
