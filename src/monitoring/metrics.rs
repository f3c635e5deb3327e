// DANS : src/monitoring/metrics.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcOutcome {
    Success,
    Retryable,
    Critical,
    Rejected,
}

impl fmt::Display for RpcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpcOutcome::Success => "success",
            RpcOutcome::Retryable => "retryable",
            RpcOutcome::Critical => "critical",
            RpcOutcome::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Point d'injection des métriques. Le coeur n'exporte rien lui-même : le
/// binaire choisit l'implémentation.
pub trait MetricsSink: Send + Sync {
    fn record_rpc(&self, method: &str, endpoint: &str, outcome: RpcOutcome, latency: Duration);

    fn record_swap(&self, outcome: &str, attempts: u32) {
        let _ = (outcome, attempts);
    }
}

pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_rpc(&self, _method: &str, _endpoint: &str, _outcome: RpcOutcome, _latency: Duration) {}
}

/// Compteurs en mémoire, par (méthode, issue) et par issue de swap.
#[derive(Default)]
pub struct CountingMetrics {
    rpc: Mutex<HashMap<(String, RpcOutcome), u64>>,
    rpc_latency: Mutex<HashMap<String, Duration>>,
    swaps: Mutex<HashMap<String, u64>>,
}

impl CountingMetrics {
    pub fn rpc_count(&self, method: &str, outcome: RpcOutcome) -> u64 {
        let rpc = self.rpc.lock().unwrap_or_else(|e| e.into_inner());
        rpc.get(&(method.to_string(), outcome)).copied().unwrap_or(0)
    }

    pub fn swap_count(&self, outcome: &str) -> u64 {
        let swaps = self.swaps.lock().unwrap_or_else(|e| e.into_inner());
        swaps.get(outcome).copied().unwrap_or(0)
    }

    /// Instantané trié : (méthode, issue, nombre, latence cumulée de la méthode).
    pub fn rpc_snapshot(&self) -> Vec<(String, RpcOutcome, u64, Duration)> {
        let rpc = self.rpc.lock().unwrap_or_else(|e| e.into_inner());
        let latency = self.rpc_latency.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<_> = rpc
            .iter()
            .map(|((method, outcome), count)| {
                (method.clone(), *outcome, *count, latency.get(method).copied().unwrap_or_default())
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.to_string().cmp(&b.1.to_string())));
        rows
    }
}

impl MetricsSink for CountingMetrics {
    fn record_rpc(&self, method: &str, _endpoint: &str, outcome: RpcOutcome, latency: Duration) {
        *self
            .rpc
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry((method.to_string(), outcome))
            .or_default() += 1;
        *self
            .rpc_latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(method.to_string())
            .or_default() += latency;
    }

    fn record_swap(&self, outcome: &str, _attempts: u32) {
        *self
            .swaps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(outcome.to_string())
            .or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counting_metrics_aggregates_by_method_and_outcome() {
        let metrics = CountingMetrics::default();
        metrics.record_rpc("getVersion", "a", RpcOutcome::Success, Duration::from_millis(5));
        metrics.record_rpc("getVersion", "b", RpcOutcome::Success, Duration::from_millis(7));
        metrics.record_rpc("getVersion", "b", RpcOutcome::Retryable, Duration::from_millis(1));
        metrics.record_swap("confirmed", 1);
        assert_eq!(metrics.rpc_count("getVersion", RpcOutcome::Success), 2);
        assert_eq!(metrics.rpc_count("getVersion", RpcOutcome::Critical), 0);
        assert_eq!(metrics.swap_count("confirmed"), 1);
        let snapshot = metrics.rpc_snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].3, Duration::from_millis(13));
    }
}
