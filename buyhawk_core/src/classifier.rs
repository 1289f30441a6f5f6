// Transaction classification - decides whether a fetched transaction is a
// qualifying buy of the watched mint and extracts buyer, SOL spent, and
// tokens received from the balance metadata.

use crate::error::CoreError;
use crate::models::{Classification, ClassifiedBuy};
use log::debug;
use serde_json::Value;

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// Classify a transaction fetched from RPC.
///
/// A transaction qualifies as a buy iff the fee payer's native balance
/// decreased and the watched mint's token balances show a credit. Structural
/// problems (missing account keys, missing balance metadata, undecodable
/// amounts on entries for the mint) are `Malformed` and are never retried.
/// Zero or negative derived SOL spend is `NotABuy`.
pub fn classify(transaction_json: &Value, mint: &str, tokens_per_sol: f64) -> Classification {
    let account_keys = match normalize_account_keys(transaction_json) {
        Ok(keys) => keys,
        Err(e) => return Classification::Malformed(e.to_string()),
    };
    let buyer = match account_keys.first() {
        Some(key) => key.clone(),
        None => return Classification::Malformed("empty accountKeys".to_string()),
    };

    let meta = match transaction_json.get("meta") {
        Some(meta) if !meta.is_null() => meta,
        _ => return Classification::Malformed("missing transaction meta".to_string()),
    };

    let pre_balances = match lamport_array(meta, "preBalances") {
        Some(balances) => balances,
        None => return Classification::Malformed("missing preBalances".to_string()),
    };
    let post_balances = match lamport_array(meta, "postBalances") {
        Some(balances) => balances,
        None => return Classification::Malformed("missing postBalances".to_string()),
    };
    if pre_balances.is_empty() || post_balances.is_empty() {
        return Classification::Malformed("empty balance arrays".to_string());
    }

    // Fee payer is the first account; its lamport delta is the SOL spent.
    let sol_spent = (pre_balances[0] as i128 - post_balances[0] as i128) as f64 / LAMPORTS_PER_SOL;
    if sol_spent <= 0.0 {
        return Classification::NotABuy;
    }

    let pre_tokens = token_entries(meta, "preTokenBalances", mint);
    let post_tokens = token_entries(meta, "postTokenBalances", mint);
    if pre_tokens.is_empty() && post_tokens.is_empty() {
        // The watched mint is not involved at all.
        return Classification::NotABuy;
    }

    let decodable = pre_tokens.iter().chain(post_tokens.iter()).any(|e| e.amount.is_some());
    if !decodable {
        return Classification::Malformed(format!(
            "token balances for mint {} present but not decodable",
            mint
        ));
    }

    // Prefer the owner-matched credit; fall back to the largest post-only
    // balance, then to an estimate from the configured rate.
    let mut tokens_received = largest_owner_delta(&pre_tokens, &post_tokens);
    if tokens_received <= 0.0 {
        tokens_received = post_tokens
            .iter()
            .filter_map(|e| e.amount)
            .fold(0.0f64, f64::max);
        if tokens_received > 0.0 {
            debug!("Using post-only token amount {} for buyer {}", tokens_received, buyer);
        }
    }
    if tokens_received <= 0.0 {
        tokens_received = sol_spent * tokens_per_sol;
        debug!(
            "Estimating token amount {} from {} SOL spent",
            tokens_received, sol_spent
        );
    }

    let block_time = transaction_json.get("blockTime").and_then(|t| t.as_i64());

    Classification::Buy(ClassifiedBuy {
        buyer_address: buyer,
        sol_spent,
        tokens_received,
        block_time,
    })
}

struct TokenEntry {
    owner: Option<String>,
    amount: Option<f64>,
}

/// Account keys arrive either as plain strings (json encoding) or as
/// objects with a `pubkey` field (jsonParsed encoding).
fn normalize_account_keys(transaction_json: &Value) -> Result<Vec<String>, CoreError> {
    let keys = transaction_json
        .get("transaction")
        .and_then(|t| t.get("message"))
        .and_then(|m| m.get("accountKeys"))
        .and_then(|v| v.as_array())
        .ok_or_else(|| CoreError::Malformed("missing accountKeys".to_string()))?;

    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        if let Some(s) = key.as_str() {
            out.push(s.to_string());
        } else if let Some(pubkey) = key.get("pubkey").and_then(|p| p.as_str()) {
            out.push(pubkey.to_string());
        } else {
            return Err(CoreError::Malformed("unrecognized account key shape".to_string()));
        }
    }
    Ok(out)
}

fn lamport_array(meta: &Value, field: &str) -> Option<Vec<u64>> {
    meta.get(field)
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|b| b.as_u64()).collect())
}

fn token_entries(meta: &Value, field: &str, mint: &str) -> Vec<TokenEntry> {
    meta.get(field)
        .and_then(|v| v.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter(|e| e.get("mint").and_then(|m| m.as_str()) == Some(mint))
                .map(|e| TokenEntry {
                    owner: e.get("owner").and_then(|o| o.as_str()).map(|s| s.to_string()),
                    amount: decode_ui_amount(e),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Token amount in UI units. `uiAmount` may be null for drained accounts,
/// so fall back to the raw amount string scaled by the entry's decimals.
fn decode_ui_amount(entry: &Value) -> Option<f64> {
    let ui = entry.get("uiTokenAmount")?;
    if let Some(amount) = ui.get("uiAmount").and_then(|a| a.as_f64()) {
        return Some(amount);
    }
    let raw = ui.get("amount").and_then(|a| a.as_str())?.parse::<f64>().ok()?;
    let decimals = ui.get("decimals").and_then(|d| d.as_u64())? as i32;
    Some(raw / 10f64.powi(decimals))
}

fn largest_owner_delta(pre: &[TokenEntry], post: &[TokenEntry]) -> f64 {
    let mut best = 0.0f64;
    for p in pre {
        let (Some(owner), Some(pre_amount)) = (&p.owner, p.amount) else {
            continue;
        };
        for q in post {
            if q.owner.as_ref() == Some(owner) {
                if let Some(post_amount) = q.amount {
                    best = best.max(post_amount - pre_amount);
                }
            }
        }
    }
    // Accounts created by the purchase have no pre entry at all.
    for q in post {
        let (Some(owner), Some(post_amount)) = (&q.owner, q.amount) else {
            continue;
        };
        if !pre.iter().any(|p| p.owner.as_ref() == Some(owner)) {
            best = best.max(post_amount);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINT: &str = "MintPubkey1111111111111111111111111111111111";

    fn buy_fixture(pre_lamports: u64, post_lamports: u64) -> Value {
        json!({
            "blockTime": 1_700_000_000,
            "transaction": {
                "message": {
                    "accountKeys": ["BuyerWallet", "PoolAccount", "TokenProgram"]
                }
            },
            "meta": {
                "preBalances": [pre_lamports, 50, 1],
                "postBalances": [post_lamports, 50, 1],
                "preTokenBalances": [
                    {
                        "accountIndex": 1,
                        "mint": MINT,
                        "owner": "BuyerWallet",
                        "uiTokenAmount": {"uiAmount": 100.0, "amount": "100000000", "decimals": 6}
                    }
                ],
                "postTokenBalances": [
                    {
                        "accountIndex": 1,
                        "mint": MINT,
                        "owner": "BuyerWallet",
                        "uiTokenAmount": {"uiAmount": 7100.0, "amount": "7100000000", "decimals": 6}
                    }
                ]
            }
        })
    }

    #[test]
    fn qualifying_buy_extracts_amounts() {
        let tx = buy_fixture(2_000_000_000, 1_000_000_000);
        match classify(&tx, MINT, 7000.0) {
            Classification::Buy(buy) => {
                assert_eq!(buy.buyer_address, "BuyerWallet");
                assert!((buy.sol_spent - 1.0).abs() < 1e-9);
                assert!((buy.tokens_received - 7000.0).abs() < 1e-9);
                assert_eq!(buy.block_time, Some(1_700_000_000));
            }
            other => panic!("expected Buy, got {:?}", other),
        }
    }

    #[test]
    fn sol_gained_is_not_a_buy() {
        let tx = buy_fixture(1_000_000_000, 2_000_000_000);
        assert_eq!(classify(&tx, MINT, 7000.0), Classification::NotABuy);
    }

    #[test]
    fn unrelated_mint_is_not_a_buy() {
        let tx = buy_fixture(2_000_000_000, 1_000_000_000);
        assert_eq!(
            classify(&tx, "OtherMint111111111111111111111111111111111", 7000.0),
            Classification::NotABuy
        );
    }

    #[test]
    fn missing_meta_is_malformed() {
        let tx = json!({
            "transaction": {"message": {"accountKeys": ["BuyerWallet"]}}
        });
        assert!(matches!(classify(&tx, MINT, 7000.0), Classification::Malformed(_)));
    }

    #[test]
    fn missing_account_keys_is_malformed() {
        let tx = json!({
            "transaction": {"message": {}},
            "meta": {"preBalances": [1], "postBalances": [0]}
        });
        assert!(matches!(classify(&tx, MINT, 7000.0), Classification::Malformed(_)));
    }

    #[test]
    fn undecodable_token_amounts_are_malformed() {
        let tx = json!({
            "transaction": {"message": {"accountKeys": ["BuyerWallet"]}},
            "meta": {
                "preBalances": [2_000_000_000u64],
                "postBalances": [1_000_000_000u64],
                "preTokenBalances": [],
                "postTokenBalances": [
                    {"accountIndex": 1, "mint": MINT, "owner": "BuyerWallet", "uiTokenAmount": {}}
                ]
            }
        });
        assert!(matches!(classify(&tx, MINT, 7000.0), Classification::Malformed(_)));
    }

    #[test]
    fn parsed_object_account_keys_are_accepted() {
        let mut tx = buy_fixture(2_000_000_000, 1_000_000_000);
        tx["transaction"]["message"]["accountKeys"] = json!([
            {"pubkey": "BuyerWallet", "signer": true, "writable": true},
            {"pubkey": "PoolAccount", "signer": false, "writable": true}
        ]);
        match classify(&tx, MINT, 7000.0) {
            Classification::Buy(buy) => assert_eq!(buy.buyer_address, "BuyerWallet"),
            other => panic!("expected Buy, got {:?}", other),
        }
    }

    #[test]
    fn post_only_balance_counts_as_credit() {
        let mut tx = buy_fixture(2_000_000_000, 1_500_000_000);
        tx["meta"]["preTokenBalances"] = json!([]);
        match classify(&tx, MINT, 7000.0) {
            Classification::Buy(buy) => assert!((buy.tokens_received - 7100.0).abs() < 1e-9),
            other => panic!("expected Buy, got {:?}", other),
        }
    }

    #[test]
    fn null_ui_amount_falls_back_to_raw_amount() {
        let mut tx = buy_fixture(2_000_000_000, 1_000_000_000);
        tx["meta"]["postTokenBalances"][0]["uiTokenAmount"] =
            json!({"uiAmount": null, "amount": "7100000000", "decimals": 6});
        match classify(&tx, MINT, 7000.0) {
            Classification::Buy(buy) => assert!((buy.tokens_received - 7000.0).abs() < 1e-9),
            other => panic!("expected Buy, got {:?}", other),
        }
    }

    #[test]
    fn unchanged_balance_keeps_post_amount() {
        let mut tx = buy_fixture(2_500_000_000, 2_000_000_000);
        // Mint referenced and decodable, but no positive delta: the held
        // post amount is reported rather than an estimate.
        tx["meta"]["postTokenBalances"][0]["uiTokenAmount"] =
            json!({"uiAmount": 100.0, "amount": "100000000", "decimals": 6});
        match classify(&tx, MINT, 7000.0) {
            Classification::Buy(buy) => {
                assert!((buy.sol_spent - 0.5).abs() < 1e-9);
                assert!((buy.tokens_received - 100.0).abs() < 1e-9);
            }
            other => panic!("expected Buy, got {:?}", other),
        }
    }

    #[test]
    fn zero_credit_estimates_from_rate() {
        let mut tx = buy_fixture(2_500_000_000, 2_000_000_000);
        tx["meta"]["preTokenBalances"][0]["uiTokenAmount"] =
            json!({"uiAmount": 0.0, "amount": "0", "decimals": 6});
        tx["meta"]["postTokenBalances"][0]["uiTokenAmount"] =
            json!({"uiAmount": 0.0, "amount": "0", "decimals": 6});
        match classify(&tx, MINT, 7000.0) {
            Classification::Buy(buy) => {
                assert!((buy.sol_spent - 0.5).abs() < 1e-9);
                assert!((buy.tokens_received - 3500.0).abs() < 1e-6);
            }
            other => panic!("expected Buy, got {:?}", other),
        }
    }
}
