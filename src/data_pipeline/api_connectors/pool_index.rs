// DANS : src/data_pipeline/api_connectors/pool_index.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    #[error("délai dépassé en interrogeant l'index")]
    Timeout,
    #[error("l'index a répondu HTTP {status}")]
    Http { status: u16 },
    #[error("transport HTTP : {0}")]
    Transport(String),
    #[error("réponse illisible : {0}")]
    Decode(String),
    #[error("pubkey invalide dans l'index : {0}")]
    InvalidPubkey(String),
}

impl IndexError {
    fn is_retryable(&self) -> bool {
        match self {
            IndexError::Timeout | IndexError::Transport(_) => true,
            IndexError::Http { status } => *status == 429 || *status >= 500,
            IndexError::Decode(_) | IndexError::InvalidPubkey(_) => false,
        }
    }
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            IndexError::Timeout
        } else if let Some(status) = err.status() {
            IndexError::Http { status: status.as_u16() }
        } else if err.is_decode() {
            IndexError::Decode(err.to_string())
        } else {
            IndexError::Transport(err.to_string())
        }
    }
}

/// Un enregistrement de l'index. Ce n'est qu'une piste : la vérité reste le compte on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPool {
    #[serde(rename = "poolID")]
    pub pool_id: String,
    #[serde(rename = "marketID", default)]
    pub market_id: Option<String>,
    #[serde(rename = "lpMint", default)]
    pub lp_mint: Option<String>,
    #[serde(rename = "tokenSymbol", default)]
    pub token_symbol: Option<String>,
    #[serde(rename = "tokenName", default)]
    pub token_name: Option<String>,
    #[serde(rename = "openTimeMs", default)]
    pub open_time_ms: Option<u64>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

impl IndexedPool {
    pub fn pool_pubkey(&self) -> Result<Pubkey, IndexError> {
        Pubkey::from_str(&self.pool_id).map_err(|_| IndexError::InvalidPubkey(self.pool_id.clone()))
    }
}

// L'index renvoie selon les versions un tableau nu ou un objet `{ "data": ... }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum IndexResponse {
    List(Vec<IndexedPool>),
    WrappedList { data: Vec<IndexedPool> },
    Single(IndexedPool),
    WrappedSingle { data: Option<IndexedPool> },
}

impl IndexResponse {
    fn into_records(self) -> Vec<IndexedPool> {
        match self {
            IndexResponse::List(list) | IndexResponse::WrappedList { data: list } => list,
            IndexResponse::Single(pool) => vec![pool],
            IndexResponse::WrappedSingle { data } => data.into_iter().collect(),
        }
    }
}

pub fn parse_index_response(body: &str) -> Result<Vec<IndexedPool>, IndexError> {
    serde_json::from_str::<IndexResponse>(body)
        .map(IndexResponse::into_records)
        .map_err(|e| IndexError::Decode(e.to_string()))
}

#[async_trait]
pub trait PoolIndex: Send + Sync {
    /// Pools connus contenant ce mint.
    async fn pools_by_token(&self, mint: &Pubkey) -> Result<Vec<IndexedPool>, IndexError>;

    /// Enregistrement de lancement du token (premier pool, heure d'ouverture).
    async fn launch_record(&self, mint: &Pubkey) -> Result<Option<IndexedPool>, IndexError>;
}

/// Client de l'index HTTP : `GET {base}/getPoolsByToken?token=` et `GET {base}/getBlockByToken?token=`.
pub struct HttpPoolIndex {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    initial_backoff: Duration,
}

impl HttpPoolIndex {
    pub fn new(base_url: impl Into<String>) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| IndexError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: 3,
            initial_backoff: Duration::from_millis(250),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    async fn fetch_once(&self, url: &str, mint: &Pubkey) -> Result<Vec<IndexedPool>, IndexError> {
        let response = self.client.get(url).query(&[("token", mint.to_string())]).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(IndexError::Http { status: status.as_u16() });
        }
        let body = response.text().await?;
        parse_index_response(&body)
    }

    async fn fetch(&self, endpoint: &str, mint: &Pubkey) -> Result<Vec<IndexedPool>, IndexError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut backoff = self.initial_backoff;
        let mut attempt = 0;
        loop {
            match self.fetch_once(&url, mint).await {
                Ok(records) => {
                    debug!(endpoint, mint = %mint, count = records.len(), "[Index] Réponse reçue");
                    return Ok(records);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(endpoint, mint = %mint, attempt, error = %e, "[Index] Échec transitoire, nouvel essai");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl PoolIndex for HttpPoolIndex {
    async fn pools_by_token(&self, mint: &Pubkey) -> Result<Vec<IndexedPool>, IndexError> {
        self.fetch("getPoolsByToken", mint).await
    }

    async fn launch_record(&self, mint: &Pubkey) -> Result<Option<IndexedPool>, IndexError> {
        Ok(self.fetch("getBlockByToken", mint).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_list() {
        let body = r#"[{"poolID":"58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2","marketID":"8BnEgHoWFysVcuFFX7QztDmzuH8r5ZFvyP3sYwn1XTh6","lpMint":"8HoQnePLqPj4M7PUDzfw8e3Ymdwgc7NLGnaTUapubyvu","tokenSymbol":"SOL","tokenName":"Wrapped SOL","openTimeMs":1650000000000,"timestamp":1650000000}]"#;
        let records = parse_index_response(body).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].open_time_ms, Some(1_650_000_000_000));
        assert_eq!(
            records[0].pool_pubkey().unwrap().to_string(),
            "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2"
        );
    }

    #[test]
    fn test_parse_wrapped_and_sparse_records() {
        let body = r#"{"data":[{"poolID":"abc"},{"poolID":"def","tokenSymbol":"BONK"}]}"#;
        let records = parse_index_response(body).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].pool_pubkey().is_err());
        assert_eq!(records[1].token_symbol.as_deref(), Some("BONK"));

        let single = parse_index_response(r#"{"data":null}"#).unwrap();
        assert!(single.is_empty());
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        assert!(matches!(parse_index_response("<html>"), Err(IndexError::Decode(_))));
    }

    #[test]
    fn test_retry_classification() {
        assert!(IndexError::Http { status: 503 }.is_retryable());
        assert!(IndexError::Http { status: 429 }.is_retryable());
        assert!(!IndexError::Http { status: 400 }.is_retryable());
        assert!(IndexError::Timeout.is_retryable());
    }
}
