// Distribution executor. Builds, signs, and submits the SPL transfer legs
// (base distribution + optional airdrop) from the admin wallet.
//
// Safe to re-run: a leg's transaction signature is journaled in the ledger
// before broadcast, and any journaled attempt is resolved against chain
// state before a new transaction is submitted. A buyer is never paid twice
// for the same leg.

use crate::error::CoreError;
use crate::ledger::ProcessedLedger;
use crate::models::{DistributionPlan, TransferLeg, TransferResult, TransferStatus};
use crate::retry::RetryPolicy;
use crate::rpc::RpcClient;
use crate::settings::Settings;
use async_trait::async_trait;
use log::{debug, info, warn};
use solana_program::pubkey::Pubkey;
use solana_sdk::hash::Hash;
use solana_sdk::signature::{keypair_from_seed, Keypair};
use solana_sdk::signer::Signer;
use solana_sdk::transaction::Transaction;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use std::str::FromStr;
use std::sync::Arc;

#[async_trait]
pub trait TransferExecutor: Send + Sync {
    /// Execute every non-zero leg of the plan. Returns one result per leg;
    /// never panics and never raises past the caller.
    async fn execute(
        &self,
        buy_signature: &str,
        buyer_address: &str,
        plan: &DistributionPlan,
        ledger: &mut ProcessedLedger,
    ) -> Vec<TransferResult>;
}

pub struct SplTransferExecutor {
    rpc: Arc<dyn RpcClient>,
    admin: Keypair,
    mint: Pubkey,
    decimals: u8,
    retry: RetryPolicy,
}

impl SplTransferExecutor {
    /// Build from settings. Returns None when no wallet key is configured,
    /// in which case distribution runs disabled.
    pub fn from_settings(
        rpc: Arc<dyn RpcClient>,
        settings: &Settings,
        retry: RetryPolicy,
    ) -> Result<Option<Self>, CoreError> {
        let Some(bytes) = settings.admin_key_bytes()? else {
            return Ok(None);
        };
        let admin = match bytes.len() {
            64 => Keypair::from_bytes(&bytes)
                .map_err(|e| CoreError::InvalidKeypair(e.to_string()))?,
            32 => keypair_from_seed(&bytes)
                .map_err(|e| CoreError::InvalidKeypair(e.to_string()))?,
            n => {
                return Err(CoreError::InvalidKeypair(format!(
                    "expected 32 or 64 key bytes, got {}",
                    n
                )))
            }
        };
        let mint = Pubkey::from_str(&settings.token_mint)
            .map_err(|e| CoreError::Validation(format!("token_mint: {}", e)))?;
        Ok(Some(Self {
            rpc,
            admin,
            mint,
            decimals: settings.token_decimals,
            retry,
        }))
    }

    pub fn new(rpc: Arc<dyn RpcClient>, admin: Keypair, mint: Pubkey, decimals: u8, retry: RetryPolicy) -> Self {
        Self {
            rpc,
            admin,
            mint,
            decimals,
            retry,
        }
    }

    pub fn admin_pubkey(&self) -> Pubkey {
        self.admin.pubkey()
    }

    async fn execute_leg(
        &self,
        buy_signature: &str,
        buyer_address: &str,
        leg: TransferLeg,
        amount: u64,
        ledger: &mut ProcessedLedger,
    ) -> TransferResult {
        let journal_key = format!("{}:{}", buy_signature, leg.as_str());

        // Resolve a prior attempt with unknown outcome before paying again.
        if let Some(prev) = ledger.pending(&journal_key) {
            match self.rpc.get_signature_status(&prev).await {
                Ok(Some(true)) => {
                    info!(
                        "{} leg for {} already confirmed as {}, not resubmitting",
                        leg.as_str(),
                        buy_signature,
                        prev
                    );
                    return TransferResult {
                        leg,
                        amount,
                        status: TransferStatus::Confirmed { signature: prev },
                    };
                }
                Ok(Some(false)) => {
                    debug!("prior {} transfer {} failed on-chain, resubmitting", leg.as_str(), prev);
                }
                Ok(None) => {
                    debug!("prior {} transfer {} unknown to cluster, resubmitting", leg.as_str(), prev);
                }
                Err(e) => {
                    // Cannot prove the buyer was not already paid; hold off.
                    warn!("could not verify prior transfer {}: {}", prev, e);
                    return failed(leg, amount, format!("could not verify prior transfer {}: {}", prev, e), true);
                }
            }
        }

        let buyer = match Pubkey::from_str(buyer_address) {
            Ok(pk) => pk,
            Err(e) => return failed(leg, amount, format!("invalid destination {}: {}", buyer_address, e), false),
        };

        let Some(base_units) = amount.checked_mul(10u64.pow(self.decimals as u32)) else {
            return failed(leg, amount, format!("amount {} overflows at {} decimals", amount, self.decimals), false);
        };

        let admin_ata = get_associated_token_address(&self.admin.pubkey(), &self.mint);
        let admin_ata_str = admin_ata.to_string();
        match self
            .retry
            .run("get_token_account_balance", || {
                self.rpc.get_token_account_balance(&admin_ata_str)
            })
            .await
        {
            Ok(balance) if balance < base_units => {
                return failed(
                    leg,
                    amount,
                    format!("admin wallet holds {} base units, need {}", balance, base_units),
                    false,
                );
            }
            Ok(_) => {}
            Err(CoreError::InsufficientFunds(msg)) => return failed(leg, amount, msg, false),
            Err(e) => {
                let retryable = e.is_transient();
                return failed(leg, amount, format!("balance preflight failed: {}", e), retryable);
            }
        }

        let buyer_ata = get_associated_token_address(&buyer, &self.mint);
        let transfer_ix = match spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &admin_ata,
            &self.mint,
            &buyer_ata,
            &self.admin.pubkey(),
            &[],
            base_units,
            self.decimals,
        ) {
            Ok(ix) => ix,
            Err(e) => return failed(leg, amount, format!("failed to build transfer: {}", e), false),
        };
        let instructions = vec![
            create_associated_token_account_idempotent(
                &self.admin.pubkey(),
                &buyer,
                &self.mint,
                &spl_token::id(),
            ),
            transfer_ix,
        ];

        let blockhash = match self
            .retry
            .run("get_latest_blockhash", || self.rpc.get_latest_blockhash())
            .await
            .and_then(|s| {
                Hash::from_str(&s).map_err(|e| CoreError::Rpc(format!("bad blockhash {:?}: {}", s, e)))
            }) {
            Ok(hash) => hash,
            Err(e) => return failed(leg, amount, format!("no blockhash: {}", e), true),
        };

        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.admin.pubkey()),
            &[&self.admin],
            blockhash,
        );
        let tx_signature = tx.signatures[0].to_string();
        let bytes = match bincode::serialize(&tx) {
            Ok(bytes) => bytes,
            Err(e) => return failed(leg, amount, format!("failed to serialize transaction: {}", e), false),
        };

        // Journal before broadcast so an interrupted send is recoverable.
        if let Err(e) = ledger.record_pending(&journal_key, &tx_signature).await {
            return failed(leg, amount, format!("could not journal transfer: {}", e), true);
        }

        match self
            .retry
            .run("send_transaction", || self.rpc.send_transaction(&bytes))
            .await
        {
            Ok(signature) => {
                info!(
                    "{} leg for {}: sent {} {} tokens to {} ({})",
                    leg.as_str(),
                    buy_signature,
                    amount,
                    self.mint,
                    buyer_address,
                    signature
                );
                TransferResult {
                    leg,
                    amount,
                    status: TransferStatus::Confirmed { signature },
                }
            }
            Err(CoreError::InsufficientFunds(msg)) => failed(leg, amount, msg, false),
            Err(e) => {
                let retryable = e.is_transient();
                warn!("{} leg for {} failed: {}", leg.as_str(), buy_signature, e);
                failed(leg, amount, e.to_string(), retryable)
            }
        }
    }
}

fn failed(leg: TransferLeg, amount: u64, reason: String, retryable: bool) -> TransferResult {
    TransferResult {
        leg,
        amount,
        status: TransferStatus::Failed { reason, retryable },
    }
}

#[async_trait]
impl TransferExecutor for SplTransferExecutor {
    async fn execute(
        &self,
        buy_signature: &str,
        buyer_address: &str,
        plan: &DistributionPlan,
        ledger: &mut ProcessedLedger,
    ) -> Vec<TransferResult> {
        let legs = [
            (TransferLeg::Base, plan.base_amount),
            (TransferLeg::Airdrop, plan.airdrop_amount),
        ];
        let mut results = Vec::new();
        for (leg, amount) in legs {
            if amount == 0 {
                continue;
            }
            results.push(
                self.execute_leg(buy_signature, buyer_address, leg, amount, ledger)
                    .await,
            );
        }
        results
    }
}

/// Stand-in used when no wallet key is configured: every leg is skipped and
/// the skip is reported in the alert instead of a false success.
pub struct DisabledTransferExecutor;

#[async_trait]
impl TransferExecutor for DisabledTransferExecutor {
    async fn execute(
        &self,
        _buy_signature: &str,
        _buyer_address: &str,
        plan: &DistributionPlan,
        _ledger: &mut ProcessedLedger,
    ) -> Vec<TransferResult> {
        let legs = [
            (TransferLeg::Base, plan.base_amount),
            (TransferLeg::Airdrop, plan.airdrop_amount),
        ];
        legs.into_iter()
            .filter(|(_, amount)| *amount > 0)
            .map(|(leg, amount)| TransferResult {
                leg,
                amount,
                status: TransferStatus::Skipped {
                    reason: "distribution disabled (no wallet configured)".to_string(),
                },
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{MemoryStorage, MockRpc};
    use std::time::Duration;

    fn plan() -> DistributionPlan {
        DistributionPlan {
            qualifies: true,
            base_amount: 7000,
            airdrop_amount: 1000,
        }
    }

    fn executor(rpc: Arc<MockRpc>) -> SplTransferExecutor {
        SplTransferExecutor::new(
            rpc,
            Keypair::new(),
            Pubkey::new_unique(),
            6,
            RetryPolicy::new(2, Duration::from_millis(0), Duration::from_millis(0)),
        )
    }

    async fn ledger() -> ProcessedLedger {
        ProcessedLedger::load(Arc::new(MemoryStorage::new())).await.unwrap()
    }

    #[tokio::test]
    async fn sends_both_legs_and_journals_them() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_token_balance(100_000_000_000);
        let exec = executor(rpc.clone());
        let mut ledger = ledger().await;

        let buyer = Pubkey::new_unique().to_string();
        let results = exec.execute("buysig", &buyer, &plan(), &mut ledger).await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_confirmed()));
        assert_eq!(rpc.sent_count(), 2);
        assert!(ledger.pending("buysig:base").is_some());
        assert!(ledger.pending("buysig:airdrop").is_some());
    }

    #[tokio::test]
    async fn confirmed_prior_attempt_is_not_resubmitted() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_token_balance(100_000_000_000);
        rpc.set_status("prior-tx", Some(true));
        let exec = executor(rpc.clone());
        let mut ledger = ledger().await;
        ledger.record_pending("buysig:base", "prior-tx").await.unwrap();

        let buyer = Pubkey::new_unique().to_string();
        let results = exec.execute("buysig", &buyer, &plan(), &mut ledger).await;

        let base = results.iter().find(|r| r.leg == TransferLeg::Base).unwrap();
        assert_eq!(
            base.status,
            TransferStatus::Confirmed { signature: "prior-tx".to_string() }
        );
        // Only the airdrop leg was broadcast.
        assert_eq!(rpc.sent_count(), 1);
    }

    #[tokio::test]
    async fn unknown_prior_attempt_is_resubmitted() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_token_balance(100_000_000_000);
        rpc.set_status("prior-tx", None);
        let exec = executor(rpc.clone());
        let mut ledger = ledger().await;
        ledger.record_pending("buysig:base", "prior-tx").await.unwrap();

        let buyer = Pubkey::new_unique().to_string();
        let results = exec.execute("buysig", &buyer, &plan(), &mut ledger).await;
        assert!(results.iter().all(|r| r.is_confirmed()));
        assert_eq!(rpc.sent_count(), 2);
    }

    #[tokio::test]
    async fn insufficient_admin_balance_is_fatal_not_retryable() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_token_balance(10); // far below 7000 * 10^6
        let exec = executor(rpc.clone());
        let mut ledger = ledger().await;

        let buyer = Pubkey::new_unique().to_string();
        let results = exec.execute("buysig", &buyer, &plan(), &mut ledger).await;

        assert_eq!(rpc.sent_count(), 0);
        for result in &results {
            match &result.status {
                TransferStatus::Failed { retryable, .. } => assert!(!retryable),
                other => panic!("expected Failed, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn invalid_destination_is_fatal() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_token_balance(100_000_000_000);
        let exec = executor(rpc.clone());
        let mut ledger = ledger().await;

        let results = exec.execute("buysig", "definitely-not-a-pubkey", &plan(), &mut ledger).await;
        assert_eq!(rpc.sent_count(), 0);
        assert!(results
            .iter()
            .all(|r| matches!(r.status, TransferStatus::Failed { retryable: false, .. })));
    }

    #[tokio::test]
    async fn transient_send_failure_is_retryable() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_token_balance(100_000_000_000);
        rpc.set_fail_sends_transient(true);
        let exec = executor(rpc.clone());
        let mut ledger = ledger().await;

        let buyer = Pubkey::new_unique().to_string();
        let results = exec.execute("buysig", &buyer, &plan(), &mut ledger).await;
        assert!(results
            .iter()
            .all(|r| matches!(r.status, TransferStatus::Failed { retryable: true, .. })));
        // The attempts were journaled before the failing broadcasts.
        assert!(ledger.pending("buysig:base").is_some());
    }

    #[tokio::test]
    async fn disabled_executor_skips_all_legs() {
        let mut ledger = ledger().await;
        let results = DisabledTransferExecutor
            .execute("buysig", "buyer", &plan(), &mut ledger)
            .await;
        assert_eq!(results.len(), 2);
        assert!(results
            .iter()
            .all(|r| matches!(r.status, TransferStatus::Skipped { .. })));
    }

    #[tokio::test]
    async fn zero_airdrop_leg_is_omitted() {
        let rpc = Arc::new(MockRpc::new());
        rpc.set_token_balance(100_000_000_000);
        let exec = executor(rpc.clone());
        let mut ledger = ledger().await;

        let no_airdrop = DistributionPlan {
            qualifies: true,
            base_amount: 7000,
            airdrop_amount: 0,
        };
        let buyer = Pubkey::new_unique().to_string();
        let results = exec.execute("buysig", &buyer, &no_airdrop, &mut ledger).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].leg, TransferLeg::Base);
    }
}
