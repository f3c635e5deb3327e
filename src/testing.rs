// src/testing.rs
//
// Doublures partagées par les tests : transport RPC en mémoire, index factice,
// pools et marchés de test.

use crate::data_pipeline::api_connectors::{IndexError, IndexedPool, PoolIndex};
use crate::data_pipeline::pool_resolver::{PoolStateSource, ResolverError};
use crate::decoders::raydium::amm_v4::openbook_market::{MarketStateLayout, MARKET_HEAD_PADDING};
use crate::decoders::raydium::amm_v4::{amm_authority, encode_pool_account, MarketAccounts, OPENBOOK_PROGRAM_ID, RAYDIUM_AMM_V4_PROGRAM_ID};
use crate::decoders::{Pool, PoolState, PoolStatus, PoolVersion, SwapDirection};
use crate::execution::{
    ExecutionError, ExecutionState, ExecutionStatus, SwapOutcome, SwapParams, SwapRequest, SwapService, TransactionSigner,
};
use crate::math::SwapQuote;
use crate::rpc::{
    Commitment, LatestBlockhash, ProgramAccountFilter, RpcError, RpcTransport, SendOptions, SignatureStatus,
    SimulationOutcome,
};
use async_trait::async_trait;
use bytemuck::{bytes_of, cast, Zeroable};
use solana_sdk::{account::Account, hash::Hash, pubkey::Pubkey, signature::Signature, transaction::VersionedTransaction};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MockState {
    accounts: HashMap<Pubkey, Account>,
    balances: HashMap<Pubkey, u64>,
    fail_next: HashMap<String, VecDeque<RpcError>>,
    fail_always: Option<RpcError>,
    delay: Option<Duration>,
    calls: HashMap<String, usize>,
    sent: Vec<VersionedTransaction>,
    sent_signatures: HashSet<Signature>,
    scripted_statuses: VecDeque<Option<SignatureStatus>>,
    default_status: Option<Option<SignatureStatus>>,
    simulation: Option<SimulationOutcome>,
}

/// Transport RPC en mémoire. Chaque appel est compté, même en échec.
pub struct MockTransport {
    url: String,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(url: &str) -> Self {
        Self { url: url.to_string(), state: Mutex::new(MockState::default()) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_account(&self, pubkey: Pubkey, account: Account) {
        self.lock().accounts.insert(pubkey, account);
    }

    pub fn set_token_account(&self, pubkey: Pubkey, data: Vec<u8>) {
        let account = Account { lamports: 2_039_280, data, owner: spl_token::id(), ..Default::default() };
        self.set_account(pubkey, account);
    }

    /// Réécrit le montant d'un compte de jeton existant.
    pub fn set_token_amount(&self, pubkey: &Pubkey, amount: u64) {
        let mut state = self.lock();
        let account = state.accounts.get_mut(pubkey).expect("compte de jeton inconnu du mock");
        account.data[64..72].copy_from_slice(&amount.to_le_bytes());
    }

    pub fn set_native_balance(&self, pubkey: &Pubkey, lamports: u64) {
        self.lock().balances.insert(*pubkey, lamports);
    }

    pub fn fail_next(&self, method: &str, error: RpcError) {
        self.lock().fail_next.entry(method.to_string()).or_default().push_back(error);
    }

    pub fn fail_always(&self, error: RpcError) {
        self.lock().fail_always = Some(error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.fail_always = None;
        state.fail_next.clear();
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or(0)
    }

    /// Une signature "envoyée" est confirmée par défaut.
    pub fn mark_sent(&self, signature: Signature) {
        self.lock().sent_signatures.insert(signature);
    }

    /// Statut renvoyé au prochain sondage, avant tout comportement par défaut.
    pub fn push_status(&self, status: Option<SignatureStatus>) {
        self.lock().scripted_statuses.push_back(status);
    }

    pub fn set_default_status(&self, status: Option<SignatureStatus>) {
        self.lock().default_status = Some(status);
    }

    pub fn sent_transactions(&self) -> Vec<VersionedTransaction> {
        self.lock().sent.clone()
    }

    pub fn set_simulation(&self, outcome: SimulationOutcome) {
        self.lock().simulation = Some(outcome);
    }

    /// Compte l'appel, applique le délai puis l'échec programmé s'il y en a un.
    async fn enter(&self, method: &str) -> Result<(), RpcError> {
        let (delay, failure) = {
            let mut state = self.lock();
            *state.calls.entry(method.to_string()).or_default() += 1;
            let scripted = state.fail_next.get_mut(method).and_then(VecDeque::pop_front);
            let failure = scripted.or_else(|| state.fail_always.clone());
            (state.delay, failure)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        failure.map_or(Ok(()), Err)
    }
}

fn confirmed_status() -> SignatureStatus {
    SignatureStatus { slot: 1, confirmations: Some(1), err: None, confirmation_status: Some(Commitment::Confirmed) }
}

#[async_trait]
impl RpcTransport for MockTransport {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_version(&self) -> Result<String, RpcError> {
        self.enter("getVersion").await?;
        Ok(format!("mock-{}", self.url))
    }

    async fn get_latest_blockhash(&self, _commitment: Commitment) -> Result<LatestBlockhash, RpcError> {
        self.enter("getLatestBlockhash").await?;
        Ok(LatestBlockhash { hash: Hash::new_unique(), last_valid_block_height: 1_000 })
    }

    async fn get_account(&self, pubkey: &Pubkey, _commitment: Commitment) -> Result<Option<Account>, RpcError> {
        self.enter("getAccountInfo").await?;
        Ok(self.lock().accounts.get(pubkey).cloned())
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
        _commitment: Commitment,
    ) -> Result<Vec<Option<Account>>, RpcError> {
        self.enter("getMultipleAccounts").await?;
        let state = self.lock();
        Ok(pubkeys.iter().map(|k| state.accounts.get(k).cloned()).collect())
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[ProgramAccountFilter],
    ) -> Result<Vec<(Pubkey, Account)>, RpcError> {
        self.enter("getProgramAccounts").await?;
        let state = self.lock();
        Ok(state
            .accounts
            .iter()
            .filter(|(_, a)| a.owner == *program_id && filters.iter().all(|f| f.matches(&a.data)))
            .map(|(k, a)| (*k, a.clone()))
            .collect())
    }

    async fn get_balance(&self, pubkey: &Pubkey, _commitment: Commitment) -> Result<u64, RpcError> {
        self.enter("getBalance").await?;
        Ok(self.lock().balances.get(pubkey).copied().unwrap_or(0))
    }

    async fn get_token_account_balance(&self, pubkey: &Pubkey, _commitment: Commitment) -> Result<u64, RpcError> {
        self.enter("getTokenAccountBalance").await?;
        let state = self.lock();
        let account = state
            .accounts
            .get(pubkey)
            .ok_or_else(|| RpcError::InvalidRequest(format!("compte {pubkey} introuvable")))?;
        let amount = account
            .data
            .get(64..72)
            .and_then(|b| <[u8; 8]>::try_from(b).ok())
            .ok_or_else(|| RpcError::InvalidResponse("compte de jeton trop court".to_string()))?;
        Ok(u64::from_le_bytes(amount))
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction, _options: &SendOptions) -> Result<Signature, RpcError> {
        self.enter("sendTransaction").await?;
        let signature = transaction.signatures[0];
        let mut state = self.lock();
        state.sent.push(transaction.clone());
        state.sent_signatures.insert(signature);
        Ok(signature)
    }

    async fn get_signature_statuses(&self, signatures: &[Signature]) -> Result<Vec<Option<SignatureStatus>>, RpcError> {
        self.enter("getSignatureStatuses").await?;
        let mut state = self.lock();
        let mut statuses = Vec::with_capacity(signatures.len());
        for signature in signatures {
            let status = match state.scripted_statuses.pop_front() {
                Some(scripted) => scripted,
                None => match &state.default_status {
                    Some(default) => default.clone(),
                    None => state.sent_signatures.contains(signature).then(confirmed_status),
                },
            };
            statuses.push(status);
        }
        Ok(statuses)
    }

    async fn simulate_transaction(
        &self,
        _transaction: &VersionedTransaction,
        _commitment: Commitment,
    ) -> Result<SimulationOutcome, RpcError> {
        self.enter("simulateTransaction").await?;
        Ok(self.lock().simulation.clone().unwrap_or_default())
    }
}

// --- INDEX FACTICE ---

#[derive(Default)]
pub struct FakeIndex {
    pools: Mutex<HashMap<Pubkey, Vec<IndexedPool>>>,
    launches: Mutex<HashMap<Pubkey, IndexedPool>>,
    failure: Mutex<Option<IndexError>>,
}

fn record(pool_id: &Pubkey, open_time_ms: Option<u64>) -> IndexedPool {
    IndexedPool {
        pool_id: pool_id.to_string(),
        market_id: None,
        lp_mint: None,
        token_symbol: None,
        token_name: None,
        open_time_ms,
        timestamp: None,
    }
}

impl FakeIndex {
    pub fn add(&self, mint: &Pubkey, pool_id: &Pubkey) {
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        pools.entry(*mint).or_default().push(record(pool_id, None));
    }

    pub fn set_launch(&self, mint: &Pubkey, pool_id: &Pubkey, open_time_ms: u64) {
        let mut launches = self.launches.lock().unwrap_or_else(|e| e.into_inner());
        launches.insert(*mint, record(pool_id, Some(open_time_ms)));
    }

    pub fn fail_with(&self, error: IndexError) {
        *self.failure.lock().unwrap_or_else(|e| e.into_inner()) = Some(error);
    }

    fn check(&self) -> Result<(), IndexError> {
        match self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PoolIndex for FakeIndex {
    async fn pools_by_token(&self, mint: &Pubkey) -> Result<Vec<IndexedPool>, IndexError> {
        self.check()?;
        let pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        Ok(pools.get(mint).cloned().unwrap_or_default())
    }

    async fn launch_record(&self, mint: &Pubkey) -> Result<Option<IndexedPool>, IndexError> {
        self.check()?;
        let launches = self.launches.lock().unwrap_or_else(|e| e.into_inner());
        Ok(launches.get(mint).cloned())
    }
}

// --- FIXTURES ---

/// Pool V4 ouvert (open_time 0) aux clés fraîches.
pub fn fixture_pool(
    base_decimals: u8,
    quote_decimals: u8,
    base_reserve: u64,
    quote_reserve: u64,
    fee_bps: u16,
    status: PoolStatus,
) -> Pool {
    Pool {
        id: Pubkey::new_unique(),
        authority: amm_authority(),
        base_mint: Pubkey::new_unique(),
        quote_mint: Pubkey::new_unique(),
        base_vault: Pubkey::new_unique(),
        quote_vault: Pubkey::new_unique(),
        lp_mint: Pubkey::new_unique(),
        open_orders: Pubkey::new_unique(),
        target_orders: Pubkey::new_unique(),
        market_id: Pubkey::new_unique(),
        market_program: OPENBOOK_PROGRAM_ID,
        base_decimals,
        quote_decimals,
        default_fee_bps: fee_bps,
        version: PoolVersion::V4,
        state: PoolState { base_reserve, quote_reserve, status },
        base_need_take_pnl: 0,
        quote_need_take_pnl: 0,
        open_time_ms: 0,
        from_index: false,
        observed_at_ms: 0,
    }
}

/// Premier nonce qui donne une adresse hors courbe pour le vault signer.
fn vault_signer_nonce(market: &Pubkey, program_id: &Pubkey) -> (u64, Pubkey) {
    (0u64..)
        .find_map(|nonce| {
            Pubkey::create_program_address(&[market.as_ref(), &nonce.to_le_bytes()], program_id)
                .ok()
                .map(|signer| (nonce, signer))
        })
        .expect("aucun nonce valide")
}

pub fn fixture_market(pool: &Pool) -> MarketAccounts {
    let (_, vault_signer) = vault_signer_nonce(&pool.market_id, &pool.market_program);
    MarketAccounts {
        market: pool.market_id,
        program_id: pool.market_program,
        bids: Pubkey::new_unique(),
        asks: Pubkey::new_unique(),
        event_queue: Pubkey::new_unique(),
        coin_vault: Pubkey::new_unique(),
        pc_vault: Pubkey::new_unique(),
        vault_signer,
        coin_lot_size: 1_000_000,
        pc_lot_size: 100,
    }
}

fn words(key: &Pubkey) -> [u64; 4] {
    cast::<[u8; 32], [u64; 4]>(key.to_bytes())
}

/// Compte de marché OpenBook complet ("serum" + état + "padding") et son nonce.
pub fn encode_market(market: &MarketAccounts) -> (Vec<u8>, u64) {
    let (nonce, _) = vault_signer_nonce(&market.market, &market.program_id);
    let mut state = MarketStateLayout::zeroed();
    state.account_flags = 3;
    state.own_address = words(&market.market);
    state.vault_signer_nonce = nonce;
    state.coin_vault = words(&market.coin_vault);
    state.pc_vault = words(&market.pc_vault);
    state.event_q = words(&market.event_queue);
    state.bids = words(&market.bids);
    state.asks = words(&market.asks);
    state.coin_lot_size = market.coin_lot_size;
    state.pc_lot_size = market.pc_lot_size;

    let mut data = Vec::with_capacity(MARKET_HEAD_PADDING + std::mem::size_of::<MarketStateLayout>() + 7);
    data.extend_from_slice(b"serum");
    data.extend_from_slice(bytes_of(&state));
    data.extend_from_slice(b"padding");
    (data, nonce)
}

/// Compte de jeton SPL initialisé (165 octets).
pub fn encode_token_account(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Vec<u8> {
    let mut data = vec![0u8; 165];
    data[0..32].copy_from_slice(mint.as_ref());
    data[32..64].copy_from_slice(owner.as_ref());
    data[64..72].copy_from_slice(&amount.to_le_bytes());
    data[108] = 1;
    data
}

/// Installe le pool, ses vaults (réserve + pnl dû) et son marché dans le mock.
pub fn install_pool(mock: &MockTransport, pool: &Pool) {
    mock.set_account(
        pool.id,
        Account {
            lamports: 6_124_800,
            data: encode_pool_account(pool),
            owner: RAYDIUM_AMM_V4_PROGRAM_ID,
            ..Default::default()
        },
    );
    mock.set_token_account(
        pool.base_vault,
        encode_token_account(&pool.base_mint, &pool.authority, pool.state.base_reserve + pool.base_need_take_pnl),
    );
    mock.set_token_account(
        pool.quote_vault,
        encode_token_account(&pool.quote_mint, &pool.authority, pool.state.quote_reserve + pool.quote_need_take_pnl),
    );
    let (market_data, _) = encode_market(&fixture_market(pool));
    mock.set_account(
        pool.market_id,
        Account { lamports: 1, data: market_data, owner: pool.market_program, ..Default::default() },
    );
}

// --- SERVICES FACTICES (sniper, dispatcher) ---

/// Un résultat de swap confirmé, sans passer par la chaîne.
pub fn fixture_outcome(pool: &Pool, state: ExecutionState, received: u64) -> SwapOutcome {
    let direction = SwapDirection::BaseToQuote;
    SwapOutcome {
        params: SwapParams {
            user_wallet: Pubkey::new_unique(),
            pool: pool.clone(),
            direction,
            amount_in: 1_000,
            min_amount_out: 1,
            source_token_account: Pubkey::new_unique(),
            destination_token_account: Pubkey::new_unique(),
            priority_fee_micro_lamports: 0,
            compute_unit_limit: 200_000,
            slippage_bps: 100,
            wait_confirmation: true,
            deadline: None,
        },
        quote: SwapQuote {
            direction,
            amount_in: 1_000,
            amount_out: received,
            min_amount_out: 1,
            fee_amount: 3,
            price_impact_pct: 0.1,
        },
        status: ExecutionStatus {
            signature: Signature::new_unique(),
            state,
            confirmations: Some(1),
            slot: Some(1),
            error_message: (state == ExecutionState::Failed).then(|| "InstructionError(3, Custom(30))".to_string()),
            observed_at_ms: 0,
        },
        attempts: 1,
        balance_before: 0,
        balance_after: state.is_landed().then_some(received),
        simulated_out: None,
    }
}

/// Service de swap scripté : chaque appel consomme le résultat suivant,
/// le dernier est rejoué indéfiniment.
pub struct FakeSwap {
    results: Mutex<VecDeque<Result<SwapOutcome, ExecutionError>>>,
    requests: Mutex<Vec<SwapRequest>>,
    balances: Mutex<HashMap<Pubkey, u64>>,
    delay: Mutex<Option<Duration>>,
    sent_on_cancel: Mutex<Option<SwapOutcome>>,
}

impl FakeSwap {
    pub fn new(results: Vec<Result<SwapOutcome, ExecutionError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
            balances: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            sent_on_cancel: Mutex::new(None),
        }
    }

    /// Simule une transaction déjà partie : annulé pendant le délai, le swap
    /// rend `outcome` (typiquement `Pending`) au lieu d'une erreur.
    pub fn sent_on_cancel(&self, outcome: SwapOutcome) {
        *self.sent_on_cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(outcome);
    }

    pub fn set_balance(&self, mint: &Pubkey, amount: u64) {
        self.balances.lock().unwrap_or_else(|e| e.into_inner()).insert(*mint, amount);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn requests(&self) -> Vec<SwapRequest> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl SwapService for FakeSwap {
    async fn execute_swap(
        &self,
        request: &SwapRequest,
        _signer: Arc<dyn TransactionSigner>,
        cancel: &CancellationToken,
    ) -> Result<SwapOutcome, ExecutionError> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let sent = self.sent_on_cancel.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    return sent.ok_or(ExecutionError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        let mut results = self.results.lock().unwrap_or_else(|e| e.into_inner());
        if results.len() > 1 {
            results.pop_front().expect("file non vide")
        } else {
            results.front().cloned().expect("FakeSwap sans résultat")
        }
    }

    async fn token_balance(&self, _owner: &Pubkey, mint: &Pubkey) -> Result<u64, ExecutionError> {
        Ok(self.balances.lock().unwrap_or_else(|e| e.into_inner()).get(mint).copied().unwrap_or(0))
    }
}

/// Source d'état scriptée pour le sniper : même logique de file que `FakeSwap`.
pub struct FakeSource {
    pools: Mutex<VecDeque<Result<Pool, ResolverError>>>,
    fetches: Mutex<usize>,
    delay: Mutex<Option<Duration>>,
}

impl FakeSource {
    pub fn new(pools: Vec<Result<Pool, ResolverError>>) -> Self {
        Self { pools: Mutex::new(pools.into()), fetches: Mutex::new(0), delay: Mutex::new(None) }
    }

    /// Chaque lecture dort `delay` avant de répondre, sans regarder l'annulation.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap_or_else(|e| e.into_inner()) = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl PoolStateSource for FakeSource {
    async fn fetch_pool(&self, _pool_id: &Pubkey) -> Result<Pool, ResolverError> {
        *self.fetches.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        let delay = *self.delay.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut pools = self.pools.lock().unwrap_or_else(|e| e.into_inner());
        if pools.len() > 1 {
            pools.pop_front().expect("file non vide")
        } else {
            pools.front().cloned().expect("FakeSource sans état")
        }
    }
}
