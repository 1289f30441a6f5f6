// In-memory fakes shared by module tests.

use crate::error::CoreError;
use crate::rpc::{RpcClient, RpcResult, SignatureInfo};
use crate::storage::{StorageBackend, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use solana_sdk::transaction::Transaction;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Storage fake that records every save and can be told to fail, so tests
/// can observe ordering and rollback behavior.
#[derive(Default)]
pub struct MemoryStorage {
    docs: Mutex<HashMap<String, String>>,
    pub save_log: Mutex<Vec<String>>,
    pub fail_saves: Mutex<bool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        *self.fail_saves.lock().unwrap() = fail;
    }

    pub fn saves(&self) -> Vec<String> {
        self.save_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn save(&self, key: &str, json: &str) -> StorageResult<()> {
        if *self.fail_saves.lock().unwrap() {
            return Err(CoreError::Io("simulated storage failure".to_string()));
        }
        self.save_log.lock().unwrap().push(key.to_string());
        self.docs.lock().unwrap().insert(key.to_string(), json.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.docs.lock().unwrap().get(key).cloned())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.docs.lock().unwrap().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.docs.lock().unwrap().contains_key(key))
    }
}

/// Scriptable RPC fake: signature listings and transactions are seeded by
/// the test, broadcasts are recorded, statuses come from a lookup table.
#[derive(Default)]
pub struct MockRpc {
    signatures: Mutex<Vec<SignatureInfo>>,
    transactions: Mutex<HashMap<String, Value>>,
    sent: Mutex<Vec<String>>,
    token_balance: AtomicU64,
    statuses: Mutex<HashMap<String, Option<bool>>>,
    fail_sends_transient: AtomicBool,
    fail_listings_transient: AtomicBool,
}

impl MockRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_signature(&self, signature: &str, slot: u64) {
        // Listings are most recent first; new entries go to the front.
        self.signatures.lock().unwrap().insert(
            0,
            SignatureInfo {
                signature: signature.to_string(),
                slot,
                block_time: Some(1_700_000_000),
                err: false,
            },
        );
    }

    pub fn push_failed_signature(&self, signature: &str, slot: u64) {
        self.signatures.lock().unwrap().insert(
            0,
            SignatureInfo {
                signature: signature.to_string(),
                slot,
                block_time: Some(1_700_000_000),
                err: true,
            },
        );
    }

    pub fn set_transaction(&self, signature: &str, tx: Value) {
        self.transactions.lock().unwrap().insert(signature.to_string(), tx);
    }

    pub fn set_token_balance(&self, balance: u64) {
        self.token_balance.store(balance, Ordering::SeqCst);
    }

    pub fn set_status(&self, signature: &str, status: Option<bool>) {
        self.statuses.lock().unwrap().insert(signature.to_string(), status);
    }

    pub fn set_fail_sends_transient(&self, fail: bool) {
        self.fail_sends_transient.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_listings_transient(&self, fail: bool) {
        self.fail_listings_transient.store(fail, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl RpcClient for MockRpc {
    async fn get_signatures_for_address(
        &self,
        _address: &str,
        limit: usize,
    ) -> RpcResult<Vec<SignatureInfo>> {
        if self.fail_listings_transient.load(Ordering::SeqCst) {
            return Err(CoreError::Rpc("simulated listing failure".to_string()));
        }
        let all = self.signatures.lock().unwrap();
        Ok(all.iter().take(limit).cloned().collect())
    }

    async fn get_transaction(&self, signature: &str) -> RpcResult<Option<Value>> {
        Ok(self.transactions.lock().unwrap().get(signature).cloned())
    }

    async fn get_latest_blockhash(&self) -> RpcResult<String> {
        Ok(solana_sdk::hash::Hash::new_unique().to_string())
    }

    async fn send_transaction(&self, transaction: &[u8]) -> RpcResult<String> {
        if self.fail_sends_transient.load(Ordering::SeqCst) {
            return Err(CoreError::Rpc("simulated broadcast failure".to_string()));
        }
        let tx: Transaction = bincode::deserialize(transaction)
            .map_err(|e| CoreError::Malformed(e.to_string()))?;
        let signature = tx.signatures[0].to_string();
        self.sent.lock().unwrap().push(signature.clone());
        Ok(signature)
    }

    async fn get_signature_status(&self, signature: &str) -> RpcResult<Option<bool>> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .unwrap_or(None))
    }

    async fn get_token_account_balance(&self, _pubkey: &str) -> RpcResult<u64> {
        Ok(self.token_balance.load(Ordering::SeqCst))
    }
}
