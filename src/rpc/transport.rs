// src/rpc/transport.rs

use super::errors::RpcError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::{
    account::Account,
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::VersionedTransaction,
};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn level(self) -> CommitmentLevel {
        match self {
            Commitment::Processed => CommitmentLevel::Processed,
            Commitment::Confirmed => CommitmentLevel::Confirmed,
            Commitment::Finalized => CommitmentLevel::Finalized,
        }
    }

    pub fn config(self) -> CommitmentConfig {
        CommitmentConfig { commitment: self.level() }
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(format!("niveau de commitment inconnu : {other}")),
        }
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Commitment::Processed => "processed",
            Commitment::Confirmed => "confirmed",
            Commitment::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatestBlockhash {
    pub hash: Hash,
    pub last_valid_block_height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    pub skip_preflight: bool,
    pub preflight_commitment: Commitment,
    /// Ré-émissions côté noeud. `Some(0)` : on gère nous-mêmes les ré-essais.
    pub max_node_retries: Option<usize>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self { skip_preflight: false, preflight_commitment: Commitment::Confirmed, max_node_retries: Some(0) }
    }
}

/// Statut d'une signature tel que renvoyé par getSignatureStatuses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    pub slot: u64,
    pub confirmations: Option<usize>,
    pub err: Option<String>,
    pub confirmation_status: Option<Commitment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

/// Filtre getProgramAccounts, indépendant du client sous-jacent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgramAccountFilter {
    DataSize(u64),
    Memcmp { offset: usize, bytes: Vec<u8> },
}

impl ProgramAccountFilter {
    pub fn matches(&self, data: &[u8]) -> bool {
        match self {
            ProgramAccountFilter::DataSize(size) => data.len() as u64 == *size,
            ProgramAccountFilter::Memcmp { offset, bytes } => data
                .get(*offset..offset + bytes.len())
                .is_some_and(|slice| slice == bytes.as_slice()),
        }
    }
}

/// Une connexion à un noeud RPC. Le pool d'endpoints ne connaît que ce trait,
/// ce qui permet de le tester sans réseau.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    fn url(&self) -> &str;

    async fn get_version(&self) -> Result<String, RpcError>;

    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<LatestBlockhash, RpcError>;

    async fn get_account(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<Option<Account>, RpcError>;

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
        commitment: Commitment,
    ) -> Result<Vec<Option<Account>>, RpcError>;

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[ProgramAccountFilter],
    ) -> Result<Vec<(Pubkey, Account)>, RpcError>;

    async fn get_balance(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<u64, RpcError>;

    async fn get_token_account_balance(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<u64, RpcError>;

    async fn send_transaction(&self, transaction: &VersionedTransaction, options: &SendOptions) -> Result<Signature, RpcError>;

    async fn get_signature_statuses(&self, signatures: &[Signature]) -> Result<Vec<Option<SignatureStatus>>, RpcError>;

    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        commitment: Commitment,
    ) -> Result<SimulationOutcome, RpcError>;
}
