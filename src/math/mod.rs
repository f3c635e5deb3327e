// src/math/mod.rs

pub mod constant_product;
pub mod liquidity;
pub mod slippage;

pub use constant_product::{PricingEngine, SwapQuote};
pub use liquidity::LiquidityLimits;
pub use slippage::SlippagePolicy;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PricingError {
    #[error("montant d'entrée nul")]
    ZeroAmount,
    #[error("réserve nulle dans le pool")]
    ZeroReserves,
    #[error("le swap ne rapporterait rien")]
    ZeroOutput,
    #[error("impact de prix trop élevé : {impact_pct:.2}% > {max_pct:.2}%")]
    PriceImpactTooHigh { impact_pct: f64, max_pct: f64 },
    #[error("swap trop gros : {ratio:.4} de la réserve d'entrée (max {max_ratio})")]
    SwapTooLarge { ratio: f64, max_ratio: f64 },
    #[error("pool déséquilibré : ratio des réserves {ratio:.4}")]
    Imbalanced { ratio: f64 },
    #[error("liquidité insuffisante : {total} < {min}")]
    UnderLiquidity { total: u128, min: u128 },
    #[error("slippage hors limites : {0}")]
    SlippageOutOfRange(String),
    #[error("frais invalides : {0} bps")]
    InvalidFee(u16),
    #[error("dépassement arithmétique")]
    Overflow,
}

/// Montant brut -> montant "humain".
pub fn normalize(raw: u128, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}
