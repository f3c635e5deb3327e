// src/decoders/mod.rs

pub mod compute_budget;
pub mod pool_state;
pub mod raydium;
pub mod spl_token_decoders;

pub use pool_state::{Pool, PoolSource, PoolState, PoolStatus, PoolVersion, SwapDirection};

use thiserror::Error;

/// Erreurs de (dé)codage des comptes et instructions on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("données trop courtes : {expected} octets attendus, {actual} reçus")]
    TooShort { expected: usize, actual: usize },

    #[error("version de pool non supportée : {0}")]
    UnsupportedVersion(String),

    #[error("champ `{field}` invalide : {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("instruction malformée : {0}")]
    MalformedInstruction(String),
}

impl DecodeError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::InvalidField { field, reason: reason.into() }
    }
}
