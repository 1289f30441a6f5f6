// Chain reader: the read-only side of the engine. Lists recent signatures
// for the watched mint and fetches transaction detail, retrying transient
// RPC failures under the shared policy.

use crate::error::CoreError;
use crate::retry::RetryPolicy;
use crate::rpc::{RpcClient, SignatureInfo};
use log::debug;
use serde_json::Value;
use std::sync::Arc;

pub struct ChainReader {
    rpc: Arc<dyn RpcClient>,
    retry: RetryPolicy,
}

impl ChainReader {
    pub fn new(rpc: Arc<dyn RpcClient>, retry: RetryPolicy) -> Self {
        Self { rpc, retry }
    }

    /// Recent signatures for the address, most recent first, failed
    /// transactions dropped. Length is bounded by `limit`.
    pub async fn list_recent_signatures(
        &self,
        address: &str,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, CoreError> {
        let infos = self
            .retry
            .run("get_signatures_for_address", || {
                self.rpc.get_signatures_for_address(address, limit)
            })
            .await?;

        let total = infos.len();
        let ok: Vec<SignatureInfo> = infos.into_iter().filter(|s| !s.err).collect();
        debug!(
            "Listed {} signatures for {} ({} failed ones dropped)",
            ok.len(),
            address,
            total - ok.len()
        );
        Ok(ok)
    }

    /// Full transaction detail, or None when the chain does not know the
    /// signature (yet). Transient failures are retried; exhaustion surfaces
    /// the last error to the caller.
    pub async fn fetch_transaction(&self, signature: &str) -> Result<Option<Value>, CoreError> {
        self.retry
            .run("get_transaction", || self.rpc.get_transaction(signature))
            .await
    }
}
