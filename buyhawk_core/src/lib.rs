// Buyhawk Core Library
// Buy detection and distribution engine for a single watched SPL token

pub mod chain;
pub mod classifier;
pub mod countdown;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod executor;
pub mod http;
pub mod ledger;
pub mod models;
pub mod notifier;
pub mod price;
pub mod retry;
pub mod rpc;
pub mod settings;
pub mod stats;
pub mod storage;

pub mod native;

#[cfg(test)]
pub(crate) mod testutil;

// Re-exports
pub use chain::ChainReader;
pub use classifier::classify;
pub use countdown::{countdown_to, parse_end_date, Countdown};
pub use distribution::plan_distribution;
pub use engine::{EngineState, EngineStatus, PollEngine};
pub use error::CoreError;
pub use executor::{DisabledTransferExecutor, SplTransferExecutor, TransferExecutor};
pub use http::*;
pub use ledger::{BuyerRegistry, ProcessedLedger};
pub use models::*;
pub use notifier::{Notifier, TelegramNotifier};
pub use price::fetch_sol_price_usd;
pub use retry::RetryPolicy;
pub use rpc::*;
pub use settings::Settings;
pub use stats::{DayStats, Statistics, StatsSnapshot};
pub use storage::*;
