// Poll scheduler. One logical worker drives the sweep cycle:
// list signatures -> classify -> plan -> distribute -> notify -> commit.
// No state transition is left half-applied: a transaction is either fully
// committed (ledger + profile durable) or untouched and retried next sweep.
// Notifications are the one tolerated loss.

use crate::chain::ChainReader;
use crate::classifier::classify;
use crate::distribution::plan_distribution;
use crate::error::CoreError;
use crate::executor::TransferExecutor;
use crate::http::HttpClient;
use crate::ledger::{BuyerRegistry, ProcessedLedger};
use crate::models::{BuyerProfile, Classification, ClassifiedBuy, TransactionRecord, TransferLeg};
use crate::notifier::Notifier;
use crate::price::fetch_sol_price_usd;
use crate::settings::Settings;
use crate::stats::Statistics;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EngineState {
    Idle,
    Fetching,
    Classifying,
    Distributing,
    Notifying,
    Committing,
    ShuttingDown,
}

/// Published through a watch channel for external health consumers.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub sweeps_completed: u64,
}

#[derive(Debug, Default, PartialEq)]
struct SweepOutcome {
    listed: usize,
    fresh: usize,
    buys: usize,
    committed: usize,
}

pub struct PollEngine {
    settings: Arc<Settings>,
    chain: ChainReader,
    executor: Box<dyn TransferExecutor>,
    notifier: Arc<dyn Notifier>,
    http: Arc<dyn HttpClient>,
    ledger: ProcessedLedger,
    buyers: BuyerRegistry,
    stats: Statistics,
    shutdown: watch::Receiver<bool>,
    status: watch::Sender<EngineStatus>,
}

impl PollEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Arc<Settings>,
        chain: ChainReader,
        executor: Box<dyn TransferExecutor>,
        notifier: Arc<dyn Notifier>,
        http: Arc<dyn HttpClient>,
        ledger: ProcessedLedger,
        buyers: BuyerRegistry,
        stats: Statistics,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, watch::Receiver<EngineStatus>) {
        let (status, status_rx) = watch::channel(EngineStatus {
            state: EngineState::Idle,
            last_sweep_at: None,
            sweeps_completed: 0,
        });
        (
            Self {
                settings,
                chain,
                executor,
                notifier,
                http,
                ledger,
                buyers,
                stats,
                shutdown,
                status,
            },
            status_rx,
        )
    }

    /// Run until the shutdown signal fires. Sweep errors degrade to a
    /// warning and the next interval; they never escape this loop.
    pub async fn run(&mut self) {
        if let Err(e) = self.notifier.notify_startup().await {
            warn!("startup notification failed: {}", e);
        }

        loop {
            if self.is_shutdown() {
                break;
            }

            self.emit_daily_summary_if_due().await;

            match self.sweep().await {
                Ok(outcome) => debug!(
                    "sweep done: {} listed, {} fresh, {} buys, {} committed",
                    outcome.listed, outcome.fresh, outcome.buys, outcome.committed
                ),
                Err(e) => warn!("sweep aborted, retrying next interval: {}", e),
            }

            self.status.send_modify(|s| {
                s.state = EngineState::Idle;
                s.last_sweep_at = Some(Utc::now());
                s.sweeps_completed += 1;
            });

            if let Err(e) = self.notifier.refresh_countdown().await {
                debug!("countdown refresh failed: {}", e);
            }

            if self
                .sleep_interruptible(Duration::from_secs(self.settings.check_interval_secs))
                .await
            {
                break;
            }
        }

        self.set_state(EngineState::ShuttingDown);
        info!("engine stopped");
    }

    async fn sweep(&mut self) -> Result<SweepOutcome, CoreError> {
        self.set_state(EngineState::Fetching);
        let listed = self
            .chain
            .list_recent_signatures(
                &self.settings.token_mint,
                self.settings.max_transactions_per_check,
            )
            .await?;

        let mut outcome = SweepOutcome {
            listed: listed.len(),
            ..SweepOutcome::default()
        };

        // Oldest unprocessed first; listings arrive most recent first.
        let fresh: Vec<_> = listed
            .into_iter()
            .filter(|info| self.ledger.is_new(&info.signature))
            .collect();
        outcome.fresh = fresh.len();

        for (i, info) in fresh.iter().rev().enumerate() {
            if self.is_shutdown() {
                self.set_state(EngineState::ShuttingDown);
                break;
            }
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(self.settings.rate_limit_delay_ms)).await;
            }

            let transaction = match self.chain.fetch_transaction(&info.signature).await? {
                Some(tx) => tx,
                None => {
                    debug!(
                        "transaction {} not available yet, leaving for next sweep",
                        info.signature
                    );
                    continue;
                }
            };

            self.set_state(EngineState::Classifying);
            match classify(
                &transaction,
                &self.settings.token_mint,
                self.settings.tokens_per_sol,
            ) {
                Classification::Malformed(reason) => {
                    warn!("dropping malformed transaction {}: {}", info.signature, reason);
                    self.set_state(EngineState::Committing);
                    self.ledger.mark_processed(&info.signature).await?;
                    outcome.committed += 1;
                }
                Classification::NotABuy => {
                    debug!("{} is not a buy", info.signature);
                    self.set_state(EngineState::Committing);
                    self.ledger.mark_processed(&info.signature).await?;
                    outcome.committed += 1;
                }
                Classification::Buy(buy) => {
                    outcome.buys += 1;
                    if self.process_buy(&info.signature, buy).await? {
                        outcome.committed += 1;
                    }
                }
            }
        }

        Ok(outcome)
    }

    /// Handle one classified buy end to end. Returns whether the signature
    /// was committed; a false return leaves it untouched for the next sweep.
    async fn process_buy(&mut self, signature: &str, buy: ClassifiedBuy) -> Result<bool, CoreError> {
        let now = Utc::now();
        let timestamp = buy
            .block_time
            .and_then(|t| DateTime::from_timestamp(t, 0))
            .unwrap_or(now);

        // Plan from the current profile state; the registry is only touched
        // once the buy is known to qualify.
        let profile = self
            .buyers
            .profile(&buy.buyer_address)
            .cloned()
            .unwrap_or_else(|| BuyerProfile::new(&buy.buyer_address, now));
        let plan = plan_distribution(buy.sol_spent, &profile, &self.settings);

        let record = TransactionRecord {
            signature: signature.to_string(),
            buyer_address: buy.buyer_address.clone(),
            sol_spent: buy.sol_spent,
            tokens_received: buy.tokens_received,
            timestamp,
            processed: false,
        };

        if !plan.qualifies {
            info!(
                "buy {} of {} SOL is below the {} SOL minimum, skipping distribution",
                signature, buy.sol_spent, self.settings.minimum_buy_sol
            );
            if self.settings.notify_unqualified_buys {
                self.set_state(EngineState::Notifying);
                if let Err(e) = self.notifier.notify_buy(&record, &plan, &[], None).await {
                    warn!("notification failed (continuing): {}", e);
                }
            }
            self.set_state(EngineState::Committing);
            self.ledger.mark_processed(signature).await?;
            return Ok(true);
        }

        let (first_purchase, _) = self
            .buyers
            .observe_purchase(&buy.buyer_address, now)
            .await?;
        info!(
            "BUY DETECTED: {} SOL from {} (first purchase: {})",
            buy.sol_spent, buy.buyer_address, first_purchase
        );

        self.set_state(EngineState::Distributing);
        let results = self
            .executor
            .execute(signature, &buy.buyer_address, &plan, &mut self.ledger)
            .await;

        if results.iter().any(|r| r.needs_retry()) {
            warn!(
                "transfer legs for {} need retry, leaving the signature unprocessed",
                signature
            );
            return Ok(false);
        }

        // The airdrop grant must be durable before the signature commits so
        // a crash between the two cannot double-airdrop.
        let airdrop_confirmed = results
            .iter()
            .any(|r| r.leg == TransferLeg::Airdrop && r.is_confirmed());
        if airdrop_confirmed {
            self.buyers.grant_airdrop(&buy.buyer_address).await?;
        }

        self.set_state(EngineState::Notifying);
        let sol_price = fetch_sol_price_usd(self.http.as_ref(), &self.settings.price_api_url).await;
        if let Err(e) = self.notifier.notify_buy(&record, &plan, &results, sol_price).await {
            warn!("notification failed (continuing): {}", e);
        }

        let distributed = results
            .iter()
            .filter(|r| r.leg == TransferLeg::Base && r.is_confirmed())
            .map(|r| r.amount)
            .sum();
        if let Err(e) = self
            .stats
            .record_buy(buy.sol_spent, distributed, airdrop_confirmed, now)
            .await
        {
            warn!("stats update failed: {}", e);
        }

        self.set_state(EngineState::Committing);
        self.ledger.mark_processed(signature).await?;
        Ok(true)
    }

    async fn emit_daily_summary_if_due(&mut self) {
        match self.stats.maybe_roll_day(Utc::now()).await {
            Ok(Some((date, day))) => {
                let totals = self.stats.snapshot().total;
                if let Err(e) = self.notifier.notify_daily_summary(date, &day, &totals).await {
                    warn!("daily summary failed: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("daily stats rollover failed: {}", e),
        }
    }

    fn set_state(&self, state: EngineState) {
        self.status.send_modify(|s| s.state = state);
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleep, waking early on shutdown. Returns true when interrupted.
    async fn sleep_interruptible(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown.changed() => true,
        }
    }
}
