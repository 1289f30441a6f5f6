// RPC client abstraction - the engine talks to the chain through this seam
// so sweep logic can be exercised against in-memory fakes.

use crate::error::CoreError;
use async_trait::async_trait;
use serde_json::Value;

/// Result type for RPC operations
pub type RpcResult<T> = Result<T, CoreError>;

/// One entry from a signature listing, most recent first.
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    /// True when the transaction landed with an error.
    pub err: bool,
}

#[async_trait]
pub trait RpcClient: Send + Sync {
    /// List recent transaction signatures for an address, most recent first,
    /// at most `limit` entries.
    async fn get_signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> RpcResult<Vec<SignatureInfo>>;

    /// Fetch full transaction detail as JSON, or None when the chain does
    /// not know the signature.
    async fn get_transaction(&self, signature: &str) -> RpcResult<Option<Value>>;

    /// Latest blockhash for transaction assembly.
    async fn get_latest_blockhash(&self) -> RpcResult<String>;

    /// Broadcast a bincode-serialized transaction, returning its signature.
    async fn send_transaction(&self, transaction: &[u8]) -> RpcResult<String>;

    /// Some(true) = confirmed ok, Some(false) = landed with an error,
    /// None = unknown to the cluster.
    async fn get_signature_status(&self, signature: &str) -> RpcResult<Option<bool>>;

    /// Token balance of an SPL token account, in base units.
    async fn get_token_account_balance(&self, pubkey: &str) -> RpcResult<u64>;
}
