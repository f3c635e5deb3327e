// DANS: src/math/slippage.rs

use super::PricingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PPM: u128 = 1_000_000;

/// Tolérance de slippage d'une tâche. Forme texte : `none`, `fixed:<montant>`, `<pourcentage>`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SlippagePolicy {
    /// `minAmountOut` absolu, en unités brutes de sortie.
    Fixed(f64),
    /// Pourcentage dans (0, 100].
    Percent(f64),
    None,
}

impl SlippagePolicy {
    pub fn min_amount_out(&self, amount_out: u64) -> Result<u64, PricingError> {
        match *self {
            SlippagePolicy::None => Ok(1),
            SlippagePolicy::Fixed(v) => {
                let floor = v.floor();
                if !floor.is_finite() || floor < 0.0 || floor > amount_out as f64 {
                    return Err(PricingError::SlippageOutOfRange(format!(
                        "minimum fixe {v} au-delà de la sortie attendue {amount_out}"
                    )));
                }
                Ok(floor as u64)
            }
            SlippagePolicy::Percent(p) => {
                check_percent(p)?;
                let tolerance_ppm = (p * 10_000.0).round() as u128;
                let keep_ppm = PPM.saturating_sub(tolerance_ppm);
                // Plancher exact : 100 % de tolérance donne bien 0.
                Ok((amount_out as u128 * keep_ppm / PPM) as u64)
            }
        }
    }

    /// Équivalent en points de base, pour les logs et les enregistrements de trade.
    pub fn bps(&self, amount_out: u64, min_amount_out: u64) -> u16 {
        match *self {
            SlippagePolicy::None => 10_000,
            SlippagePolicy::Percent(p) => (p * 100.0).round().clamp(0.0, 10_000.0) as u16,
            SlippagePolicy::Fixed(_) if amount_out > 0 => {
                let kept = min_amount_out as u128 * 10_000 / amount_out as u128;
                10_000u16.saturating_sub(kept as u16)
            }
            SlippagePolicy::Fixed(_) => 10_000,
        }
    }
}

fn check_percent(p: f64) -> Result<(), PricingError> {
    if p.is_finite() && p > 0.0 && p <= 100.0 {
        Ok(())
    } else {
        Err(PricingError::SlippageOutOfRange(format!("{p}% hors de (0, 100]")))
    }
}

impl FromStr for SlippagePolicy {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("none") {
            return Ok(SlippagePolicy::None);
        }
        if let Some(value) = s.strip_prefix("fixed:") {
            let v: f64 = value
                .trim()
                .parse()
                .map_err(|_| PricingError::SlippageOutOfRange(format!("montant fixe illisible : {value}")))?;
            if !v.is_finite() || v < 0.0 {
                return Err(PricingError::SlippageOutOfRange(format!("montant fixe négatif : {v}")));
            }
            return Ok(SlippagePolicy::Fixed(v));
        }
        let p: f64 = s
            .trim_end_matches('%')
            .trim()
            .parse()
            .map_err(|_| PricingError::SlippageOutOfRange(format!("type de slippage inconnu : {s}")))?;
        check_percent(p)?;
        Ok(SlippagePolicy::Percent(p))
    }
}

impl TryFrom<String> for SlippagePolicy {
    type Error = PricingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SlippagePolicy> for String {
    fn from(policy: SlippagePolicy) -> Self {
        policy.to_string()
    }
}

impl fmt::Display for SlippagePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlippagePolicy::None => f.write_str("none"),
            SlippagePolicy::Fixed(v) => write!(f, "fixed:{v}"),
            SlippagePolicy::Percent(p) => write!(f, "{p}"),
        }
    }
}
