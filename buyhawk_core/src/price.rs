// Best-effort SOL/USD lookup. A failed or nonsensical response degrades to
// omitting the USD line in alerts; it never blocks a cycle.

use crate::http::HttpClient;
use log::{debug, warn};
use serde_json::Value;

pub async fn fetch_sol_price_usd<H: HttpClient + ?Sized>(http: &H, url: &str) -> Option<f64> {
    let body = match http.fetch_text(url).await {
        Ok(body) => body,
        Err(e) => {
            warn!("SOL price lookup failed: {}", e);
            return None;
        }
    };

    let parsed: Value = match serde_json::from_str(&body) {
        Ok(value) => value,
        Err(e) => {
            warn!("SOL price response was not JSON: {}", e);
            return None;
        }
    };

    let price = parsed
        .get("solana")
        .and_then(|s| s.get("usd"))
        .and_then(|u| u.as_f64())
        .filter(|p| *p > 0.0);

    match price {
        Some(p) => debug!("SOL price fetched: ${}", p),
        None => warn!("SOL price response missing solana.usd"),
    }
    price
}
