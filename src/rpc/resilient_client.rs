// src/rpc/resilient_client.rs

use super::errors::RpcError;
use super::transport::{
    Commitment, LatestBlockhash, ProgramAccountFilter, RpcTransport, SendOptions, SignatureStatus,
    SimulationOutcome,
};
use async_trait::async_trait;
use solana_account_decoder::UiAccountEncoding;
use solana_client::{
    client_error::{ClientError, ClientErrorKind},
    nonblocking::rpc_client::RpcClient,
    rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig, RpcSendTransactionConfig, RpcSimulateTransactionConfig},
    rpc_filter::{Memcmp, RpcFilterType},
    rpc_request::RpcError as ClientRpcError,
};
use solana_sdk::{
    account::Account, commitment_config::CommitmentConfig, pubkey::Pubkey, signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use std::{sync::Arc, time::Duration};

/// Un endpoint Solana réel : le RpcClient non bloquant, et la traduction de
/// ses erreurs vers notre classification.
#[derive(Clone)]
pub struct SolanaRpcTransport {
    url: String,
    client: Arc<RpcClient>,
}

impl SolanaRpcTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let url = url.into();
        Self {
            client: Arc::new(RpcClient::new_with_timeout(url.clone(), timeout)),
            url,
        }
    }
}

/// Traduit une erreur du client Solana.
pub fn classify_client_error(error: &ClientError) -> RpcError {
    match &error.kind {
        ClientErrorKind::Reqwest(err) => {
            if err.is_timeout() {
                RpcError::Timeout
            } else if let Some(status) = err.status() {
                RpcError::from_http_status(status.as_u16(), &err.to_string())
            } else if err.is_connect() {
                match RpcError::from_message(&err.to_string()) {
                    dns @ RpcError::Dns(_) => dns,
                    _ => RpcError::Connection(err.to_string()),
                }
            } else {
                RpcError::from_message(&err.to_string())
            }
        }
        ClientErrorKind::Io(err) => match err.kind() {
            std::io::ErrorKind::TimedOut => RpcError::Timeout,
            _ => RpcError::Connection(err.to_string()),
        },
        ClientErrorKind::RpcError(rpc_error) => match rpc_error {
            ClientRpcError::RpcResponseError { code, message, .. } => RpcError::from_rpc_code(*code, message),
            ClientRpcError::ParseError(message) => RpcError::InvalidResponse(message.clone()),
            ClientRpcError::RpcRequestError(message) | ClientRpcError::ForUser(message) => {
                RpcError::from_message(message)
            }
        },
        ClientErrorKind::SerdeJson(err) => RpcError::InvalidResponse(err.to_string()),
        ClientErrorKind::TransactionError(TransactionError::BlockhashNotFound) => RpcError::StaleBlockhash,
        ClientErrorKind::TransactionError(err) => RpcError::TransactionRejected(format!("{err:?}")),
        ClientErrorKind::SigningError(err) => RpcError::InvalidRequest(err.to_string()),
        _ => RpcError::from_message(&error.to_string()),
    }
}

fn to_filter(filter: &ProgramAccountFilter) -> RpcFilterType {
    match filter {
        ProgramAccountFilter::DataSize(size) => RpcFilterType::DataSize(*size),
        ProgramAccountFilter::Memcmp { offset, bytes } => {
            RpcFilterType::Memcmp(Memcmp::new_base58_encoded(*offset, bytes))
        }
    }
}

#[async_trait]
impl RpcTransport for SolanaRpcTransport {
    fn url(&self) -> &str {
        &self.url
    }

    async fn get_version(&self) -> Result<String, RpcError> {
        let version = self.client.get_version().await.map_err(|e| classify_client_error(&e))?;
        Ok(version.solana_core)
    }

    async fn get_latest_blockhash(&self, commitment: Commitment) -> Result<LatestBlockhash, RpcError> {
        let (hash, last_valid_block_height) = self
            .client
            .get_latest_blockhash_with_commitment(commitment.config())
            .await
            .map_err(|e| classify_client_error(&e))?;
        Ok(LatestBlockhash { hash, last_valid_block_height })
    }

    async fn get_account(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<Option<Account>, RpcError> {
        let response = self
            .client
            .get_account_with_commitment(pubkey, commitment.config())
            .await
            .map_err(|e| classify_client_error(&e))?;
        Ok(response.value)
    }

    async fn get_multiple_accounts(
        &self,
        pubkeys: &[Pubkey],
        commitment: Commitment,
    ) -> Result<Vec<Option<Account>>, RpcError> {
        let response = self
            .client
            .get_multiple_accounts_with_commitment(pubkeys, commitment.config())
            .await
            .map_err(|e| classify_client_error(&e))?;
        if response.value.len() != pubkeys.len() {
            return Err(RpcError::InvalidResponse(format!(
                "getMultipleAccounts : {} comptes demandés, {} reçus",
                pubkeys.len(),
                response.value.len()
            )));
        }
        Ok(response.value)
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: &[ProgramAccountFilter],
    ) -> Result<Vec<(Pubkey, Account)>, RpcError> {
        let config = RpcProgramAccountsConfig {
            filters: Some(filters.iter().map(to_filter).collect()),
            account_config: RpcAccountInfoConfig {
                encoding: Some(UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            },
            with_context: Some(false),
            ..Default::default()
        };
        self.client
            .get_program_accounts_with_config(program_id, config)
            .await
            .map_err(|e| classify_client_error(&e))
    }

    async fn get_balance(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<u64, RpcError> {
        let response = self
            .client
            .get_balance_with_commitment(pubkey, commitment.config())
            .await
            .map_err(|e| classify_client_error(&e))?;
        Ok(response.value)
    }

    async fn get_token_account_balance(&self, pubkey: &Pubkey, commitment: Commitment) -> Result<u64, RpcError> {
        let response = self
            .client
            .get_token_account_balance_with_commitment(pubkey, commitment.config())
            .await
            .map_err(|e| classify_client_error(&e))?;
        response
            .value
            .amount
            .parse::<u64>()
            .map_err(|e| RpcError::InvalidResponse(format!("montant de jeton illisible : {e}")))
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction, options: &SendOptions) -> Result<Signature, RpcError> {
        let config = RpcSendTransactionConfig {
            skip_preflight: options.skip_preflight,
            preflight_commitment: Some(options.preflight_commitment.level()),
            max_retries: options.max_node_retries,
            ..Default::default()
        };
        self.client
            .send_transaction_with_config(transaction, config)
            .await
            .map_err(|e| classify_client_error(&e))
    }

    async fn get_signature_statuses(&self, signatures: &[Signature]) -> Result<Vec<Option<SignatureStatus>>, RpcError> {
        let response = self
            .client
            .get_signature_statuses(signatures)
            .await
            .map_err(|e| classify_client_error(&e))?;
        Ok(response
            .value
            .into_iter()
            .map(|status| {
                status.map(|s| {
                    let confirmation_status = if s.satisfies_commitment(CommitmentConfig::finalized()) {
                        Commitment::Finalized
                    } else if s.satisfies_commitment(CommitmentConfig::confirmed()) {
                        Commitment::Confirmed
                    } else {
                        Commitment::Processed
                    };
                    SignatureStatus {
                        slot: s.slot,
                        confirmations: s.confirmations,
                        err: s.err.as_ref().map(|e| format!("{e:?}")),
                        confirmation_status: Some(confirmation_status),
                    }
                })
            })
            .collect())
    }

    async fn simulate_transaction(
        &self,
        transaction: &VersionedTransaction,
        commitment: Commitment,
    ) -> Result<SimulationOutcome, RpcError> {
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            replace_recent_blockhash: true,
            commitment: Some(commitment.config()),
            ..Default::default()
        };
        let response = self
            .client
            .simulate_transaction_with_config(transaction, config)
            .await
            .map_err(|e| classify_client_error(&e))?;
        let result = response.value;
        Ok(SimulationOutcome {
            err: result.err.map(|e| format!("{e:?}")),
            logs: result.logs.unwrap_or_default(),
            units_consumed: result.units_consumed,
        })
    }
}
