// Native RPC client wrapping solana_client::RpcClient.
// The blocking client runs inside spawn_blocking so the poll loop stays async.

use crate::error::CoreError;
use crate::rpc::{RpcClient as RpcClientTrait, RpcResult, SignatureInfo};
use async_trait::async_trait;
use log::debug;
use serde_json::json;
use solana_client::client_error::ClientError;
use solana_client::rpc_client::{GetConfirmedSignaturesForAddress2Config, RpcClient as SolanaRpcClient};
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::UiTransactionEncoding;
use std::str::FromStr;
use std::sync::Arc;

pub struct NativeRpcClient {
    client: Arc<SolanaRpcClient>,
}

impl NativeRpcClient {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Arc::new(SolanaRpcClient::new(endpoint)),
        }
    }

    pub fn from_arc(client: Arc<SolanaRpcClient>) -> Self {
        Self { client }
    }
}

/// Map a client error to the transient/permanent split the retry policy
/// understands. HTTP 429 and transport failures are retryable; everything
/// the cluster actively rejected is not.
fn classify_error(context: &str, err: ClientError) -> CoreError {
    let msg = err.to_string();
    if msg.contains("429") || msg.contains("Too many requests") || msg.contains("rate limit") {
        CoreError::RateLimited(format!("{}: {}", context, msg))
    } else if msg.contains("insufficient funds") || msg.contains("insufficient lamports") {
        CoreError::InsufficientFunds(format!("{}: {}", context, msg))
    } else {
        CoreError::Rpc(format!("{}: {}", context, msg))
    }
}

#[async_trait]
impl RpcClientTrait for NativeRpcClient {
    async fn get_signatures_for_address(
        &self,
        address: &str,
        limit: usize,
    ) -> RpcResult<Vec<SignatureInfo>> {
        debug!("Native RPC: get_signatures_for_address for {} (limit {})", address, limit);

        let address = Pubkey::from_str(address)
            .map_err(|e| CoreError::Malformed(format!("Invalid address: {}", e)))?;

        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(limit),
            commitment: Some(CommitmentConfig::confirmed()),
        };

        let client = self.client.clone();
        let statuses = tokio::task::spawn_blocking(move || {
            client.get_signatures_for_address_with_config(&address, config)
        })
        .await
        .map_err(|e| CoreError::Rpc(format!("Task join error: {}", e)))?
        .map_err(|e| classify_error("get_signatures_for_address", e))?;

        Ok(statuses
            .into_iter()
            .map(|s| SignatureInfo {
                signature: s.signature,
                slot: s.slot,
                block_time: s.block_time,
                err: s.err.is_some(),
            })
            .collect())
    }

    async fn get_transaction(&self, signature: &str) -> RpcResult<Option<serde_json::Value>> {
        debug!("Native RPC: get_transaction for {}", signature);

        let signature = Signature::from_str(signature)
            .map_err(|e| CoreError::Malformed(format!("Invalid signature: {}", e)))?;

        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Json),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };

        let client = self.client.clone();
        let fetched = tokio::task::spawn_blocking(move || {
            client.get_transaction_with_config(&signature, config)
        })
        .await
        .map_err(|e| CoreError::Rpc(format!("Task join error: {}", e)))?;

        match fetched {
            Ok(tx) => {
                // Re-shape to the wire format the classifier reads:
                // `transaction.message.accountKeys` and `meta` at top level.
                Ok(Some(json!({
                    "slot": tx.slot,
                    "blockTime": tx.block_time,
                    "transaction": serde_json::to_value(&tx.transaction.transaction)?,
                    "meta": serde_json::to_value(&tx.transaction.meta)?,
                })))
            }
            Err(e) => {
                // The cluster reports unknown signatures as an error; surface
                // those as None and keep real transport failures retryable.
                let msg = e.to_string();
                if msg.contains("not found") || msg.contains("NotFound") {
                    Ok(None)
                } else {
                    Err(classify_error("get_transaction", e))
                }
            }
        }
    }

    async fn get_latest_blockhash(&self) -> RpcResult<String> {
        debug!("Native RPC: get_latest_blockhash");

        let client = self.client.clone();
        let blockhash = tokio::task::spawn_blocking(move || client.get_latest_blockhash())
            .await
            .map_err(|e| CoreError::Rpc(format!("Task join error: {}", e)))?
            .map_err(|e| classify_error("get_latest_blockhash", e))?;

        Ok(blockhash.to_string())
    }

    async fn send_transaction(&self, transaction: &[u8]) -> RpcResult<String> {
        debug!("Native RPC: send_transaction ({} bytes)", transaction.len());

        let tx: Transaction = bincode::deserialize(transaction)
            .map_err(|e| CoreError::Malformed(format!("Failed to deserialize transaction: {}", e)))?;

        let client = self.client.clone();
        let signature = tokio::task::spawn_blocking(move || client.send_and_confirm_transaction(&tx))
            .await
            .map_err(|e| CoreError::Rpc(format!("Task join error: {}", e)))?
            .map_err(|e| classify_error("send_transaction", e))?;

        Ok(signature.to_string())
    }

    async fn get_signature_status(&self, signature: &str) -> RpcResult<Option<bool>> {
        debug!("Native RPC: get_signature_status for {}", signature);

        let signature = Signature::from_str(signature)
            .map_err(|e| CoreError::Malformed(format!("Invalid signature: {}", e)))?;

        let client = self.client.clone();
        let response = tokio::task::spawn_blocking(move || {
            client.get_signature_statuses(&[signature])
        })
        .await
        .map_err(|e| CoreError::Rpc(format!("Task join error: {}", e)))?
        .map_err(|e| classify_error("get_signature_statuses", e))?;

        Ok(response
            .value
            .into_iter()
            .next()
            .flatten()
            .map(|status| status.err.is_none()))
    }

    async fn get_token_account_balance(&self, pubkey: &str) -> RpcResult<u64> {
        debug!("Native RPC: get_token_account_balance for {}", pubkey);

        let pubkey = Pubkey::from_str(pubkey)
            .map_err(|e| CoreError::Malformed(format!("Invalid pubkey: {}", e)))?;

        let client = self.client.clone();
        let balance = tokio::task::spawn_blocking(move || client.get_token_account_balance(&pubkey))
            .await
            .map_err(|e| CoreError::Rpc(format!("Task join error: {}", e)))?
            .map_err(|e| classify_error("get_token_account_balance", e))?;

        balance
            .amount
            .parse::<u64>()
            .map_err(|e| CoreError::Malformed(format!("Failed to parse token balance: {}", e)))
    }
}
