// src/decoders/pool_state.rs

use super::DecodeError;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolVersion {
    V3,
    V4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolStatus {
    Uninitialized,
    Initialized,
    Disabled,
    Active,
}

impl PoolStatus {
    /// Traduit le champ `status` brut d'un AmmInfo.
    /// 1 (Initialized côté programme) et 6 (SwapOnly) autorisent les swaps.
    /// 7 (WaitingTrade) attend `pool_open_time`.
    pub fn from_raw(raw: u64) -> Self {
        match raw {
            0 => PoolStatus::Uninitialized,
            1 | 6 => PoolStatus::Active,
            7 => PoolStatus::Initialized,
            _ => PoolStatus::Disabled,
        }
    }

    pub fn to_raw(self) -> u64 {
        match self {
            PoolStatus::Uninitialized => 0,
            PoolStatus::Active => 1,
            PoolStatus::Disabled => 2,
            PoolStatus::Initialized => 7,
        }
    }
}

/// D'où vient une entrée de cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolSource {
    Index,
    OnChain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapDirection {
    BaseToQuote,
    QuoteToBase,
}

impl SwapDirection {
    pub fn reverse(self) -> Self {
        match self {
            SwapDirection::BaseToQuote => SwapDirection::QuoteToBase,
            SwapDirection::QuoteToBase => SwapDirection::BaseToQuote,
        }
    }
}

/// Partie mutable d'un pool : réserves et statut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolState {
    pub base_reserve: u64,
    pub quote_reserve: u64,
    pub status: PoolStatus,
}

impl PoolState {
    pub fn is_active(&self) -> bool {
        self.status == PoolStatus::Active
    }

    pub fn total_liquidity(&self) -> u128 {
        self.base_reserve as u128 + self.quote_reserve as u128
    }
}

/// Un pool Raydium AMM V4 décodé, enrichi de ses réserves réelles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pool {
    pub id: Pubkey,
    pub authority: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub base_vault: Pubkey,
    pub quote_vault: Pubkey,
    pub lp_mint: Pubkey,
    pub open_orders: Pubkey,
    pub target_orders: Pubkey,
    pub market_id: Pubkey,
    pub market_program: Pubkey,
    pub base_decimals: u8,
    pub quote_decimals: u8,
    pub default_fee_bps: u16,
    pub version: PoolVersion,
    pub state: PoolState,
    // Montants dus au protocole, déduits des vaults pour obtenir les réserves.
    pub base_need_take_pnl: u64,
    pub quote_need_take_pnl: u64,
    pub open_time_ms: u64,
    pub from_index: bool,
    pub observed_at_ms: u64,
}

impl Pool {
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.default_fee_bps == 0 || self.default_fee_bps > 10_000 {
            return Err(DecodeError::invalid(
                "default_fee_bps",
                format!("{} hors de [1, 10000]", self.default_fee_bps),
            ));
        }
        if self.base_decimals > 32 || self.quote_decimals > 32 {
            return Err(DecodeError::invalid("decimals", "supérieur à 32"));
        }
        if self.base_mint == Pubkey::default() || self.quote_mint == Pubkey::default() {
            return Err(DecodeError::invalid("mint", "clé nulle"));
        }
        if self.base_mint == self.quote_mint {
            return Err(DecodeError::invalid("mint", "base et quote identiques"));
        }
        Ok(())
    }

    /// Vrai si le pool échange exactement ces deux mints, dans un ordre quelconque.
    pub fn contains_pair(&self, a: &Pubkey, b: &Pubkey) -> bool {
        (self.base_mint == *a && self.quote_mint == *b) || (self.base_mint == *b && self.quote_mint == *a)
    }

    pub fn contains_mint(&self, mint: &Pubkey) -> bool {
        self.base_mint == *mint || self.quote_mint == *mint
    }

    pub fn direction_for(&self, input_mint: &Pubkey) -> Option<SwapDirection> {
        if *input_mint == self.base_mint {
            Some(SwapDirection::BaseToQuote)
        } else if *input_mint == self.quote_mint {
            Some(SwapDirection::QuoteToBase)
        } else {
            None
        }
    }

    /// (mint d'entrée, mint de sortie)
    pub fn mints_for(&self, direction: SwapDirection) -> (Pubkey, Pubkey) {
        match direction {
            SwapDirection::BaseToQuote => (self.base_mint, self.quote_mint),
            SwapDirection::QuoteToBase => (self.quote_mint, self.base_mint),
        }
    }

    /// (réserve d'entrée, réserve de sortie, décimales d'entrée, décimales de sortie)
    pub fn reserves_for(&self, direction: SwapDirection) -> (u64, u64, u8, u8) {
        match direction {
            SwapDirection::BaseToQuote => (
                self.state.base_reserve,
                self.state.quote_reserve,
                self.base_decimals,
                self.quote_decimals,
            ),
            SwapDirection::QuoteToBase => (
                self.state.quote_reserve,
                self.state.base_reserve,
                self.quote_decimals,
                self.base_decimals,
            ),
        }
    }

    /// Applique les soldes bruts des vaults : réserve = vault - pnl dû.
    pub fn apply_vault_balances(&mut self, base_vault_amount: u64, quote_vault_amount: u64) {
        self.state.base_reserve = base_vault_amount.saturating_sub(self.base_need_take_pnl);
        self.state.quote_reserve = quote_vault_amount.saturating_sub(self.quote_need_take_pnl);
        self.observed_at_ms = now_millis();
    }

    /// Un pool actif dont l'ouverture est dans le futur n'accepte pas encore de swap.
    pub fn apply_open_time(&mut self, now_ms: u64) {
        if self.state.status == PoolStatus::Active && self.open_time_ms > now_ms {
            self.state.status = PoolStatus::Initialized;
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
