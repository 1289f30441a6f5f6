// HTTP fetch abstraction - keeps the price oracle testable without a network.

use crate::error::CoreError;
use async_trait::async_trait;

pub type HttpResult<T> = Result<T, CoreError>;

#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET the url and return the body as text.
    async fn fetch_text(&self, url: &str) -> HttpResult<String>;
}
