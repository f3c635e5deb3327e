// src/strategies/mod.rs

// Ce qui pilote le swap executor : tâches utilisateur, sniping, répartition sur les workers.
pub mod dispatcher; // Pool de workers, autosell, journal de trades.
pub mod sniper;     // Surveillance d'un pool et tir dès qu'il devient tradable.
pub mod task;       // Descripteurs de tâches JSON -> `Task` validée.

pub use dispatcher::{DispatchSummary, DispatcherConfig, TaskDispatcher, TradeAction, TradeRecord, WalletBook};
pub use sniper::{Sniper, SniperConfig, SniperError, SniperState};
pub use task::{parse_tasks, Task, TaskDefaults, TaskError};
