// src/rpc/errors.rs

use thiserror::Error;

/// Classe d'une erreur : décide du ré-essai et de la désactivation d'un endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Réseau, limite de débit, noeud en retard : on tente ailleurs.
    Retryable,
    /// Requête ou configuration fautive : l'endpoint est mis hors service.
    Critical,
    /// Le cluster a refusé la transaction elle-même : aucun ré-essai.
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("délai dépassé")]
    Timeout,
    #[error("limite de débit atteinte : {0}")]
    RateLimited(String),
    #[error("connexion impossible : {0}")]
    Connection(String),
    #[error("échec de résolution DNS : {0}")]
    Dns(String),
    #[error("blockhash expiré ou introuvable")]
    StaleBlockhash,
    #[error("noeud indisponible : {0}")]
    NodeUnhealthy(String),
    #[error("requête invalide : {0}")]
    InvalidRequest(String),
    #[error("non autorisé (401)")]
    Unauthorized,
    #[error("accès interdit (403)")]
    Forbidden,
    #[error("réponse invalide : {0}")]
    InvalidResponse(String),
    #[error("transaction rejetée : {0}")]
    TransactionRejected(String),
    #[error("aucun endpoint RPC actif")]
    NoHealthyEndpoints,
    #[error("{attempts} tentative(s) épuisée(s), dernière erreur : {last_error}")]
    AllAttemptsExhausted { attempts: usize, last_error: Box<RpcError> },
    #[error("opération annulée")]
    Cancelled,
}

impl RpcError {
    pub fn class(&self) -> ErrorClass {
        match self {
            RpcError::Timeout
            | RpcError::RateLimited(_)
            | RpcError::Connection(_)
            | RpcError::Dns(_)
            | RpcError::StaleBlockhash
            | RpcError::NodeUnhealthy(_) => ErrorClass::Retryable,
            RpcError::InvalidRequest(_)
            | RpcError::Unauthorized
            | RpcError::Forbidden
            | RpcError::InvalidResponse(_)
            | RpcError::NoHealthyEndpoints => ErrorClass::Critical,
            RpcError::TransactionRejected(_) | RpcError::Cancelled => ErrorClass::Rejected,
            RpcError::AllAttemptsExhausted { last_error, .. } => last_error.class(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Classe un message d'erreur brut (corps HTTP, message JSON-RPC, erreur custom).
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("429") || lower.contains("too many requests") || lower.contains("rate limit") {
            RpcError::RateLimited(message.to_string())
        } else if lower.contains("blockhash not found") || lower.contains("block height exceeded") {
            RpcError::StaleBlockhash
        } else if lower.contains("timed out") || lower.contains("timeout") {
            RpcError::Timeout
        } else if lower.contains("dns error") || lower.contains("failed to lookup address") {
            RpcError::Dns(message.to_string())
        } else if lower.contains("connection refused")
            || lower.contains("connection reset")
            || lower.contains("broken pipe")
            || lower.contains("error trying to connect")
        {
            RpcError::Connection(message.to_string())
        } else if lower.contains("401") || lower.contains("unauthorized") {
            RpcError::Unauthorized
        } else if lower.contains("403") || lower.contains("forbidden") {
            RpcError::Forbidden
        } else if lower.contains("node is behind") || lower.contains("node is unhealthy") || lower.contains("503") {
            RpcError::NodeUnhealthy(message.to_string())
        } else {
            RpcError::InvalidResponse(message.to_string())
        }
    }

    /// Classe une erreur JSON-RPC d'après son code.
    pub fn from_rpc_code(code: i64, message: &str) -> Self {
        match code {
            // Échec du preflight : on distingue le blockhash périmé du vrai rejet.
            -32002 => {
                if message.to_ascii_lowercase().contains("blockhash not found") {
                    RpcError::StaleBlockhash
                } else {
                    RpcError::TransactionRejected(message.to_string())
                }
            }
            -32003 => RpcError::TransactionRejected(message.to_string()),
            -32004 | -32005 | -32007 | -32009 | -32014 | -32016 => RpcError::NodeUnhealthy(message.to_string()),
            -32600 | -32601 | -32602 => RpcError::InvalidRequest(message.to_string()),
            -32603 => RpcError::NodeUnhealthy(message.to_string()),
            429 | -32429 => RpcError::RateLimited(message.to_string()),
            _ => RpcError::from_message(message),
        }
    }

    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            429 => RpcError::RateLimited(body.to_string()),
            401 => RpcError::Unauthorized,
            403 => RpcError::Forbidden,
            408 | 504 => RpcError::Timeout,
            400 | 404 | 405 | 413 => RpcError::InvalidRequest(format!("HTTP {status} : {body}")),
            500..=599 => RpcError::NodeUnhealthy(format!("HTTP {status} : {body}")),
            _ => RpcError::InvalidResponse(format!("HTTP {status} : {body}")),
        }
    }
}
