// Durable engine state: the set of already-processed signatures, the
// pending-transfer journal used for idempotent retries, and the per-buyer
// profiles that gate airdrops.
//
// Every mutation persists before the in-memory view is considered updated;
// a persistence failure rolls the memory change back and surfaces the error
// so a signature is never remembered as processed on a lost write.

use crate::error::CoreError;
use crate::models::BuyerProfile;
use crate::storage::{keys, StorageBackend};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub struct ProcessedLedger {
    storage: Arc<dyn StorageBackend>,
    seen: HashSet<String>,
    pending: HashMap<String, String>,
}

impl ProcessedLedger {
    pub async fn load(storage: Arc<dyn StorageBackend>) -> Result<Self, CoreError> {
        let seen: HashSet<String> = match storage.load(keys::PROCESSED_SIGNATURES).await? {
            Some(json) => serde_json::from_str::<Vec<String>>(&json)?.into_iter().collect(),
            None => HashSet::new(),
        };
        let pending: HashMap<String, String> = match storage.load(keys::PENDING_TRANSFERS).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => HashMap::new(),
        };
        debug!(
            "Ledger loaded: {} processed signatures, {} pending transfers",
            seen.len(),
            pending.len()
        );
        Ok(Self {
            storage,
            seen,
            pending,
        })
    }

    pub fn is_new(&self, signature: &str) -> bool {
        !self.seen.contains(signature)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Mark a signature processed. Durable persistence happens before the
    /// in-memory set is allowed to keep the entry. Journal rows for the
    /// signature are dropped afterwards; losing that cleanup is harmless.
    pub async fn mark_processed(&mut self, signature: &str) -> Result<(), CoreError> {
        if !self.seen.insert(signature.to_string()) {
            return Ok(());
        }
        if let Err(e) = self.persist_seen().await {
            self.seen.remove(signature);
            return Err(e);
        }

        let prefix = format!("{}:", signature);
        let before = self.pending.len();
        self.pending.retain(|key, _| !key.starts_with(&prefix));
        if self.pending.len() != before {
            if let Err(e) = self.persist_pending().await {
                warn!("Failed to prune pending journal for {}: {}", signature, e);
            }
        }
        Ok(())
    }

    /// Journal a transfer leg's signature before broadcast, so an unknown
    /// outcome can be resolved against chain state instead of re-paying.
    pub async fn record_pending(&mut self, key: &str, tx_signature: &str) -> Result<(), CoreError> {
        let previous = self.pending.insert(key.to_string(), tx_signature.to_string());
        if let Err(e) = self.persist_pending().await {
            match previous {
                Some(old) => {
                    self.pending.insert(key.to_string(), old);
                }
                None => {
                    self.pending.remove(key);
                }
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn pending(&self, key: &str) -> Option<String> {
        self.pending.get(key).cloned()
    }

    async fn persist_seen(&self) -> Result<(), CoreError> {
        let mut signatures: Vec<&String> = self.seen.iter().collect();
        signatures.sort();
        let json = serde_json::to_string(&signatures)?;
        self.storage.save(keys::PROCESSED_SIGNATURES, &json).await
    }

    async fn persist_pending(&self) -> Result<(), CoreError> {
        let json = serde_json::to_string(&self.pending)?;
        self.storage.save(keys::PENDING_TRANSFERS, &json).await
    }
}

/// Durable per-buyer profiles. First-purchase detection and the one-airdrop
/// policy both read from here, so the map must survive restarts.
pub struct BuyerRegistry {
    storage: Arc<dyn StorageBackend>,
    profiles: HashMap<String, BuyerProfile>,
}

impl BuyerRegistry {
    pub async fn load(storage: Arc<dyn StorageBackend>) -> Result<Self, CoreError> {
        let profiles: HashMap<String, BuyerProfile> = match storage.load(keys::BUYER_PROFILES).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => HashMap::new(),
        };
        debug!("Buyer registry loaded: {} profiles", profiles.len());
        Ok(Self { storage, profiles })
    }

    /// Record a qualifying purchase. Returns whether this was the buyer's
    /// first observed purchase, along with the updated profile.
    pub async fn observe_purchase(
        &mut self,
        address: &str,
        now: DateTime<Utc>,
    ) -> Result<(bool, BuyerProfile), CoreError> {
        let first = !self.profiles.contains_key(address);
        let profile = self
            .profiles
            .entry(address.to_string())
            .or_insert_with(|| BuyerProfile::new(address, now));
        profile.purchase_count += 1;
        let snapshot = profile.clone();

        if let Err(e) = self.persist().await {
            if first {
                self.profiles.remove(address);
            } else if let Some(p) = self.profiles.get_mut(address) {
                p.purchase_count -= 1;
            }
            return Err(e);
        }
        Ok((first, snapshot))
    }

    /// Persist the airdrop grant. Must complete before the transaction is
    /// marked processed so a crash between the two cannot double-airdrop.
    pub async fn grant_airdrop(&mut self, address: &str) -> Result<(), CoreError> {
        let profile = self
            .profiles
            .get_mut(address)
            .ok_or_else(|| CoreError::NotFound(format!("no profile for buyer {}", address)))?;
        if profile.airdrop_granted {
            return Ok(());
        }
        profile.airdrop_granted = true;

        if let Err(e) = self.persist().await {
            if let Some(p) = self.profiles.get_mut(address) {
                p.airdrop_granted = false;
            }
            return Err(e);
        }
        Ok(())
    }

    pub fn profile(&self, address: &str) -> Option<&BuyerProfile> {
        self.profiles.get(address)
    }

    pub fn airdrop_granted(&self, address: &str) -> bool {
        self.profiles
            .get(address)
            .map(|p| p.airdrop_granted)
            .unwrap_or(false)
    }

    async fn persist(&self) -> Result<(), CoreError> {
        let json = serde_json::to_string(&self.profiles)?;
        self.storage.save(keys::BUYER_PROFILES, &json).await
    }
}
