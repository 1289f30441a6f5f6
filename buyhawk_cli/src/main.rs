use buyhawk_core::{
    chain::ChainReader,
    engine::PollEngine,
    error::CoreError,
    executor::{DisabledTransferExecutor, SplTransferExecutor, TransferExecutor},
    http::HttpClient,
    ledger::{BuyerRegistry, ProcessedLedger},
    native::{FileStorage, NativeHttpClient, NativeRpcClient},
    notifier::{Notifier, TelegramNotifier},
    retry::RetryPolicy,
    rpc::RpcClient,
    settings::Settings,
    stats::Statistics,
    storage::StorageBackend,
};
use chrono::Utc;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), CoreError> {
    env_logger::init();
    // Print an unconditional startup line so users see the binary started
    // even when RUST_LOG is not set.
    println!(
        "buyhawk starting (pid {}), RUST_LOG={:?}",
        std::process::id(),
        std::env::var("RUST_LOG").ok()
    );

    let config_path =
        std::env::var("BUYHAWK_CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let settings = Arc::new(Settings::from_file(&config_path)?);
    settings.validate()?;
    info!(
        "Watching mint {} (${}) every {}s, up to {} transactions per sweep",
        settings.token_mint,
        settings.token_symbol,
        settings.check_interval_secs,
        settings.max_transactions_per_check
    );

    let retry = RetryPolicy::from_settings(&settings);
    let rpc: Arc<dyn RpcClient> = Arc::new(NativeRpcClient::new(settings.solana_rpc_url.clone()));
    let storage: Arc<dyn StorageBackend> =
        Arc::new(FileStorage::new(PathBuf::from(&settings.data_dir)));
    let http: Arc<dyn HttpClient> = Arc::new(NativeHttpClient::new());

    let chain = ChainReader::new(rpc.clone(), retry.clone());
    let executor: Box<dyn TransferExecutor> =
        match SplTransferExecutor::from_settings(rpc.clone(), &settings, retry.clone())? {
            Some(executor) => {
                info!("Distribution wallet: {}", executor.admin_pubkey());
                Box::new(executor)
            }
            None => {
                warn!("No wallet_private_key configured; distributions will be skipped");
                Box::new(DisabledTransferExecutor)
            }
        };
    let notifier: Arc<dyn Notifier> =
        Arc::new(TelegramNotifier::new(settings.clone(), retry.clone())?);

    let ledger = ProcessedLedger::load(storage.clone()).await?;
    let buyers = BuyerRegistry::load(storage.clone()).await?;
    let stats = Statistics::load(storage.clone(), settings.utc_offset_hours, Utc::now()).await?;
    info!("State loaded: {} processed signatures", ledger.len());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let (mut engine, mut status_rx) = PollEngine::new(
        settings, chain, executor, notifier, http, ledger, buyers, stats, shutdown_rx,
    );

    // Surface sweep progress for anything watching process health.
    tokio::spawn(async move {
        while status_rx.changed().await.is_ok() {
            let status = status_rx.borrow().clone();
            debug!(
                "engine state {:?}, sweeps completed {}, last sweep at {:?}",
                status.state, status.sweeps_completed, status.last_sweep_at
            );
        }
    });

    engine.run().await;
    info!("buyhawk stopped");
    Ok(())
}
