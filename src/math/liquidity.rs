// DANS: src/math/liquidity.rs

use super::PricingError;
use crate::decoders::{Pool, SwapDirection};

/// Garde-fous de liquidité appliqués avant de construire un swap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidityLimits {
    /// Somme brute base + quote minimale.
    pub min_total_liquidity: u128,
    /// Part maximale de la réserve d'entrée qu'un swap peut consommer.
    pub max_swap_ratio: f64,
    /// Bornes (min, max) de reserveIn / reserveOut. `None` : pas de contrôle.
    pub reserve_ratio_band: Option<(f64, f64)>,
}

impl Default for LiquidityLimits {
    fn default() -> Self {
        Self { min_total_liquidity: 1_000_000, max_swap_ratio: 0.1, reserve_ratio_band: None }
    }
}

impl LiquidityLimits {
    /// Limites complètes, avec le contrôle d'équilibre des réserves.
    pub fn strict() -> Self {
        Self { reserve_ratio_band: Some((0.2, 5.0)), ..Self::default() }
    }

    pub fn check(&self, pool: &Pool, direction: SwapDirection, amount_in: u64) -> Result<(), PricingError> {
        let (reserve_in, reserve_out, _, _) = pool.reserves_for(direction);
        if reserve_in == 0 || reserve_out == 0 {
            return Err(PricingError::ZeroReserves);
        }
        let total = pool.state.total_liquidity();
        if total < self.min_total_liquidity {
            return Err(PricingError::UnderLiquidity { total, min: self.min_total_liquidity });
        }
        let ratio = amount_in as f64 / reserve_in as f64;
        if ratio > self.max_swap_ratio {
            return Err(PricingError::SwapTooLarge { ratio, max_ratio: self.max_swap_ratio });
        }
        self.check_balance(reserve_in, reserve_out)
    }

    /// Contrôle de l'équilibre seul, utilisé par la surveillance du sniper.
    pub fn check_balance(&self, reserve_in: u64, reserve_out: u64) -> Result<(), PricingError> {
        if let Some((low, high)) = self.reserve_ratio_band {
            if reserve_out == 0 {
                return Err(PricingError::ZeroReserves);
            }
            let ratio = reserve_in as f64 / reserve_out as f64;
            if ratio < low || ratio > high {
                return Err(PricingError::Imbalanced { ratio });
            }
        }
        Ok(())
    }
}
