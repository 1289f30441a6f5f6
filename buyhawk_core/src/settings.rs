use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use solana_program::pubkey::Pubkey;
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub solana_rpc_url: String,
    pub token_mint: String,
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,
    #[serde(default = "default_token_decimals")]
    pub token_decimals: u8,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,
    #[serde(default)]
    pub wallet_private_key: Option<String>,
    #[serde(default = "default_tokens_per_sol")]
    pub tokens_per_sol: f64,
    #[serde(default = "default_minimum_buy_sol")]
    pub minimum_buy_sol: f64,
    #[serde(default = "default_distribution_ratio")]
    pub distribution_ratio: f64,
    #[serde(default = "default_min_distribution")]
    pub min_distribution: u64,
    #[serde(default = "default_max_distribution")]
    pub max_distribution: u64,
    #[serde(default = "default_airdrop_amount")]
    pub airdrop_amount: u64,
    #[serde(default = "default_one_airdrop_per_user")]
    pub one_airdrop_per_user: bool,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_max_transactions_per_check")]
    pub max_transactions_per_check: usize,
    #[serde(default = "default_rate_limit_delay_ms")]
    pub rate_limit_delay_ms: u64,
    #[serde(default)]
    pub notify_unqualified_buys: bool,
    #[serde(default = "default_buy_button_link")]
    pub buy_button_link: String,
    #[serde(default)]
    pub alert_image_url: Option<String>,
    #[serde(default = "default_presale_end_date")]
    pub presale_end_date: String,
    #[serde(default)]
    pub utc_offset_hours: i8,
    #[serde(default = "default_price_api_url")]
    pub price_api_url: String,
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Settings {
    pub fn from_file(path: &str) -> Result<Self, CoreError> {
        let builder = config::Config::builder().add_source(config::File::with_name(path));
        let cfg = builder.build()?;
        Ok(cfg.try_deserialize()?)
    }

    /// Validate ranges and constraints. Called once at startup; a failure
    /// here is fatal before any cycle runs.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.solana_rpc_url.is_empty() {
            return Err(CoreError::Validation("solana_rpc_url must not be empty".to_string()));
        }
        Pubkey::from_str(&self.token_mint)
            .map_err(|e| CoreError::Validation(format!("token_mint is not a valid pubkey: {}", e)))?;
        if self.telegram_bot_token.is_empty() {
            return Err(CoreError::Validation("telegram_bot_token must not be empty".to_string()));
        }
        if self.telegram_chat_id.is_empty() {
            return Err(CoreError::Validation("telegram_chat_id must not be empty".to_string()));
        }
        if self.tokens_per_sol <= 0.0 {
            return Err(CoreError::Validation("tokens_per_sol must be > 0".to_string()));
        }
        if self.minimum_buy_sol < 0.0 {
            return Err(CoreError::Validation("minimum_buy_sol must be >= 0".to_string()));
        }
        if self.distribution_ratio <= 0.0 || self.distribution_ratio > 1.0 {
            return Err(CoreError::Validation("distribution_ratio must be in (0, 1]".to_string()));
        }
        if self.max_distribution < self.min_distribution {
            return Err(CoreError::Validation(
                "max_distribution must be >= min_distribution".to_string(),
            ));
        }
        if self.check_interval_secs == 0 {
            return Err(CoreError::Validation("check_interval_secs must be > 0".to_string()));
        }
        if self.max_transactions_per_check == 0 {
            return Err(CoreError::Validation(
                "max_transactions_per_check must be > 0".to_string(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(CoreError::Validation("retry_max_attempts must be > 0".to_string()));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(CoreError::Validation(
                "retry_max_delay_ms must be >= retry_base_delay_ms".to_string(),
            ));
        }
        crate::countdown::parse_end_date(&self.presale_end_date, self.utc_offset_hours)?;
        Ok(())
    }

    /// Decoded admin key bytes, or None when distribution is disabled.
    pub fn admin_key_bytes(&self) -> Result<Option<Vec<u8>>, CoreError> {
        match &self.wallet_private_key {
            Some(raw) => parse_private_key_string(raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Parse a private key string in the formats operators actually paste:
/// - Base58 (standard Solana export, ~88 chars)
/// - JSON array string like "[1,2,3,...]"
/// - Comma-separated bytes like "1,2,3,..."
pub fn parse_private_key_string(s: &str) -> Result<Vec<u8>, CoreError> {
    let trimmed = s.trim();

    if trimmed.is_empty() {
        return Err(CoreError::InvalidKeypair("private key is empty".to_string()));
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<u8>>(trimmed)
            .map_err(|e| CoreError::InvalidKeypair(format!("JSON parse failed: {}", e)));
    }

    if trimmed.contains(',') {
        let parts: Result<Vec<u8>, _> = trimmed.split(',').map(|p| p.trim().parse::<u8>()).collect();
        return parts.map_err(|e| CoreError::InvalidKeypair(format!("CSV parse failed: {}", e)));
    }

    bs58::decode(trimmed)
        .into_vec()
        .map_err(|e| CoreError::InvalidKeypair(format!("Base58 decode failed: {}", e)))
}

fn default_token_symbol() -> String {
    "TOKEN".to_string()
}
fn default_token_decimals() -> u8 {
    6
}
fn default_tokens_per_sol() -> f64 {
    7000.0
}
fn default_minimum_buy_sol() -> f64 {
    0.2
}
fn default_distribution_ratio() -> f64 {
    1.0
}
fn default_min_distribution() -> u64 {
    1400
}
fn default_max_distribution() -> u64 {
    1_000_000
}
fn default_airdrop_amount() -> u64 {
    1000
}
fn default_one_airdrop_per_user() -> bool {
    true
}
fn default_check_interval_secs() -> u64 {
    60
}
fn default_max_transactions_per_check() -> usize {
    20
}
fn default_rate_limit_delay_ms() -> u64 {
    2000
}
fn default_buy_button_link() -> String {
    "https://raydium.io/swap/".to_string()
}
fn default_presale_end_date() -> String {
    "2025-09-06 23:59:59".to_string()
}
fn default_price_api_url() -> String {
    "https://api.coingecko.com/api/v3/simple/price?ids=solana&vs_currencies=usd".to_string()
}
fn default_retry_max_attempts() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    500
}
fn default_retry_max_delay_ms() -> u64 {
    10_000
}
fn default_data_dir() -> String {
    "data".to_string()
}
