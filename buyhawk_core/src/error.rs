use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API rejected request: {0}")]
    Api(String),

    #[error("Malformed transaction data: {0}")]
    Malformed(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Invalid destination account: {0}")]
    InvalidAccount(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl CoreError {
    /// Whether another attempt under the retry policy may succeed.
    /// Everything else is permanent for the current transaction.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::Rpc(_) | CoreError::RateLimited(_) | CoreError::Http(_)
        )
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Io(err.to_string())
    }
}

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}
