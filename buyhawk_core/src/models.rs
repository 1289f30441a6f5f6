use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A purchase transaction observed on-chain for the watched mint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub signature: String,
    pub buyer_address: String,
    pub sol_spent: f64,
    pub tokens_received: f64,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

/// Durable per-buyer state, keyed by wallet address.
///
/// Created on the first qualifying purchase from the address and persisted
/// so airdrop eligibility survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuyerProfile {
    pub buyer_address: String,
    pub first_seen: DateTime<Utc>,
    pub purchase_count: u64,
    pub airdrop_granted: bool,
}

impl BuyerProfile {
    /// Fresh profile for a buyer with no recorded purchases.
    pub fn new(buyer_address: &str, now: DateTime<Utc>) -> Self {
        Self {
            buyer_address: buyer_address.to_string(),
            first_seen: now,
            purchase_count: 0,
            airdrop_granted: false,
        }
    }
}

/// Outcome of classifying a fetched transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// A qualifying purchase of the watched token.
    Buy(ClassifiedBuy),
    /// Decodable, but not a purchase of the watched token.
    NotABuy,
    /// References the mint but cannot be decoded. Logged and dropped,
    /// never retried.
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedBuy {
    pub buyer_address: String,
    pub sol_spent: f64,
    pub tokens_received: f64,
    pub block_time: Option<i64>,
}

/// Per-transaction distribution decision. Ephemeral; recomputable from the
/// triggering transaction and the configuration snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionPlan {
    pub qualifies: bool,
    /// Whole tokens to send back to the buyer.
    pub base_amount: u64,
    /// One-time bonus tokens, zero when not eligible.
    pub airdrop_amount: u64,
}

impl DistributionPlan {
    pub fn empty() -> Self {
        Self {
            qualifies: false,
            base_amount: 0,
            airdrop_amount: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferLeg {
    Base,
    Airdrop,
}

impl TransferLeg {
    /// Stable identifier used in journal keys and status lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferLeg::Base => "base",
            TransferLeg::Airdrop => "airdrop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransferStatus {
    Confirmed {
        signature: String,
    },
    Failed {
        reason: String,
        /// Whether the transaction may be retried on a later sweep. Fatal
        /// failures (insufficient funds, bad destination) are terminal.
        retryable: bool,
    },
    Skipped {
        reason: String,
    },
}

/// Result of one transfer leg executed for a buyer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub leg: TransferLeg,
    pub amount: u64,
    pub status: TransferStatus,
}

impl TransferResult {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, TransferStatus::Confirmed { .. })
    }

    pub fn needs_retry(&self) -> bool {
        matches!(self.status, TransferStatus::Failed { retryable: true, .. })
    }
}
