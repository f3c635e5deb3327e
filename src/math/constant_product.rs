// DANS: src/math/constant_product.rs

use super::{normalize, LiquidityLimits, PricingError, SlippagePolicy};
use crate::decoders::{Pool, SwapDirection};
use serde::Serialize;

const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SwapQuote {
    pub direction: SwapDirection,
    pub amount_in: u64,
    pub amount_out: u64,
    pub min_amount_out: u64,
    pub fee_amount: u64,
    pub price_impact_pct: f64,
}

/// Sortie d'un swap sur la courbe x·y = k, frais prélevés en entrée.
/// Retourne (amount_out, fee_amount). Arithmétique entière exacte en u128.
pub fn amount_out(amount_in: u64, reserve_in: u64, reserve_out: u64, fee_bps: u16) -> Result<(u64, u64), PricingError> {
    if fee_bps as u128 > BPS_DENOMINATOR {
        return Err(PricingError::InvalidFee(fee_bps));
    }
    if reserve_in == 0 || reserve_out == 0 {
        return Err(PricingError::ZeroReserves);
    }
    let amount_in = amount_in as u128;
    let net = amount_in * (BPS_DENOMINATOR - fee_bps as u128) / BPS_DENOMINATOR;
    let numerator = net.checked_mul(reserve_out as u128).ok_or(PricingError::Overflow)?;
    let denominator = (reserve_in as u128).checked_add(net).ok_or(PricingError::Overflow)?;
    let out = numerator / denominator;
    Ok((out as u64, (amount_in - net) as u64))
}

/// |prix avant − prix après| / prix avant · 100, prix normalisés par les décimales.
/// Les frais restent dans le pool : la réserve d'entrée après swap inclut tout `amount_in`.
pub fn price_impact_pct(
    amount_in: u64,
    amount_out: u64,
    reserve_in: u64,
    reserve_out: u64,
    decimals_in: u8,
    decimals_out: u8,
) -> f64 {
    let before = normalize(reserve_out as u128, decimals_out) / normalize(reserve_in as u128, decimals_in);
    let after_in = normalize(reserve_in as u128 + amount_in as u128, decimals_in);
    let after_out = normalize((reserve_out - amount_out.min(reserve_out)) as u128, decimals_out);
    let after = after_out / after_in;
    if before == 0.0 {
        return 100.0;
    }
    ((before - after).abs() / before) * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingEngine {
    pub max_price_impact_pct: f64,
    pub limits: LiquidityLimits,
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self { max_price_impact_pct: 10.0, limits: LiquidityLimits::default() }
    }
}

impl PricingEngine {
    pub fn new(max_price_impact_pct: f64, limits: LiquidityLimits) -> Self {
        Self { max_price_impact_pct, limits }
    }

    /// Calcule le quote puis applique les garde-fous, dans cet ordre :
    /// impact de prix, liquidité, slippage.
    pub fn quote(
        &self,
        pool: &Pool,
        direction: SwapDirection,
        amount_in: u64,
        slippage: &SlippagePolicy,
    ) -> Result<SwapQuote, PricingError> {
        if amount_in == 0 {
            return Err(PricingError::ZeroAmount);
        }
        let (reserve_in, reserve_out, decimals_in, decimals_out) = pool.reserves_for(direction);
        let (out, fee) = amount_out(amount_in, reserve_in, reserve_out, pool.default_fee_bps)?;
        if out == 0 {
            return Err(PricingError::ZeroOutput);
        }

        let impact = price_impact_pct(amount_in, out, reserve_in, reserve_out, decimals_in, decimals_out);
        if impact > self.max_price_impact_pct {
            return Err(PricingError::PriceImpactTooHigh { impact_pct: impact, max_pct: self.max_price_impact_pct });
        }
        self.limits.check(pool, direction, amount_in)?;

        let min_amount_out = slippage.min_amount_out(out)?;
        Ok(SwapQuote {
            direction,
            amount_in,
            amount_out: out,
            min_amount_out,
            fee_amount: fee,
            price_impact_pct: impact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoders::PoolStatus;
    use crate::testing::fixture_pool;
    use proptest::prelude::*;

    fn scenario_pool() -> Pool {
        fixture_pool(9, 6, 1_000 * 10u64.pow(9), 181_000 * 10u64.pow(6), 25, PoolStatus::Active)
    }

    #[test]
    fn test_happy_path_quote() {
        let pool = scenario_pool();
        let quote = PricingEngine::default()
            .quote(&pool, SwapDirection::BaseToQuote, 10u64.pow(9), &SlippagePolicy::Percent(1.0))
            .unwrap();
        let net: u128 = 997_500_000;
        let expected = net * 181_000_000_000 / (1_000_000_000_000 + net);
        assert_eq!(quote.amount_out as u128, expected);
        assert!((180_300_000..180_700_000).contains(&quote.amount_out));
        assert_eq!(quote.min_amount_out, (quote.amount_out as u128 * 99 / 100) as u64);
        assert_eq!(quote.fee_amount, 2_500_000);
        assert!(quote.price_impact_pct < 1.0);
    }

    #[test]
    fn test_half_slippage() {
        let pool = scenario_pool();
        let quote = PricingEngine::default()
            .quote(&pool, SwapDirection::BaseToQuote, 10u64.pow(9), &SlippagePolicy::Percent(50.0))
            .unwrap();
        assert_eq!(quote.min_amount_out, quote.amount_out / 2);
    }

    #[test]
    fn test_price_impact_guard_fires_before_size_cap() {
        let pool = fixture_pool(9, 6, 100 * 10u64.pow(9), 100 * 10u64.pow(6), 25, PoolStatus::Active);
        let err = PricingEngine::default()
            .quote(&pool, SwapDirection::BaseToQuote, 50 * 10u64.pow(9), &SlippagePolicy::Percent(1.0))
            .unwrap_err();
        match err {
            PricingError::PriceImpactTooHigh { impact_pct, .. } => assert!(impact_pct > 10.0),
            other => panic!("erreur inattendue : {other:?}"),
        }
    }

    #[test]
    fn test_boundaries() {
        let pool = scenario_pool();
        let engine = PricingEngine::default();
        assert_eq!(
            engine.quote(&pool, SwapDirection::BaseToQuote, 0, &SlippagePolicy::None),
            Err(PricingError::ZeroAmount)
        );
        let empty = fixture_pool(9, 6, 0, 181_000, 25, PoolStatus::Active);
        assert_eq!(
            engine.quote(&empty, SwapDirection::QuoteToBase, 10, &SlippagePolicy::None),
            Err(PricingError::ZeroReserves)
        );
        let quote = engine.quote(&pool, SwapDirection::QuoteToBase, 1_000_000, &SlippagePolicy::None).unwrap();
        assert_eq!(quote.min_amount_out, 1);
    }

    #[test]
    fn test_fixed_minimum_above_quote_is_refused() {
        let pool = scenario_pool();
        let err = PricingEngine::default()
            .quote(&pool, SwapDirection::BaseToQuote, 10u64.pow(9), &SlippagePolicy::Fixed(1e12))
            .unwrap_err();
        assert!(matches!(err, PricingError::SlippageOutOfRange(_)));
    }

    proptest! {
        #[test]
        fn prop_constant_product_holds(
            x in 1u64..=u64::MAX / 4,
            y in 1u64..=u64::MAX / 4,
            amount_in in 1u64..=u64::MAX / 4,
            fee_bps in 0u16..=10_000,
        ) {
            let (out, fee) = amount_out(amount_in, x, y, fee_bps).unwrap();
            prop_assert!(out < y);
            let net = amount_in as u128 - fee as u128;
            prop_assert!((x as u128) * (y as u128) <= (x as u128 + net) * (y as u128 - out as u128));
        }
    }
}
