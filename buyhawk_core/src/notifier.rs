// Buy alerts and summaries over the Telegram Bot API.
//
// Delivery retries transient failures (HTTP 429/5xx) under the shared
// policy; a permanent rejection (bad chat, bot removed) is surfaced to the
// caller, which logs it and moves on. Losing a notification is acceptable,
// losing dedup state is not.

use crate::countdown::{countdown_to, parse_end_date, Countdown};
use crate::error::CoreError;
use crate::models::{DistributionPlan, TransactionRecord, TransferLeg, TransferResult, TransferStatus};
use crate::retry::RetryPolicy;
use crate::settings::Settings;
use crate::stats::DayStats;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_buy(
        &self,
        record: &TransactionRecord,
        plan: &DistributionPlan,
        results: &[TransferResult],
        sol_price_usd: Option<f64>,
    ) -> Result<(), CoreError>;

    async fn notify_startup(&self) -> Result<(), CoreError>;

    async fn notify_daily_summary(
        &self,
        date: NaiveDate,
        day: &DayStats,
        totals: &DayStats,
    ) -> Result<(), CoreError>;

    /// Best-effort countdown refresh between sweeps. Default: nothing.
    async fn refresh_countdown(&self) -> Result<(), CoreError> {
        Ok(())
    }
}

pub struct TelegramNotifier {
    http: reqwest::Client,
    api_base: String,
    settings: Arc<Settings>,
    presale_end: DateTime<Utc>,
    retry: RetryPolicy,
    /// Message id of the pinned startup/countdown post, edited in place.
    countdown_message_id: Mutex<Option<i64>>,
}

impl TelegramNotifier {
    pub fn new(settings: Arc<Settings>, retry: RetryPolicy) -> Result<Self, CoreError> {
        let presale_end = parse_end_date(&settings.presale_end_date, settings.utc_offset_hours)?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_base: format!("https://api.telegram.org/bot{}", settings.telegram_bot_token),
            settings,
            presale_end,
            retry,
            countdown_message_id: Mutex::new(None),
        })
    }

    fn countdown(&self) -> Countdown {
        countdown_to(self.presale_end, Utc::now())
    }

    fn buy_keyboard(&self) -> Value {
        json!({
            "inline_keyboard": [[{
                "text": format!("🛒 BUY ${}", self.settings.token_symbol),
                "url": self.settings.buy_button_link,
            }]]
        })
    }

    /// One Bot API call, no retry. Transient HTTP failures map to
    /// retryable errors; an `ok: false` body is a permanent rejection.
    async fn call_once(&self, method: &str, payload: &Value) -> Result<Value, CoreError> {
        let url = format!("{}/{}", self.api_base, method);
        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| CoreError::Http(format!("{} failed: {}", method, e)))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(CoreError::RateLimited(format!("{}: Telegram throttled", method)));
        }
        if status.is_server_error() {
            return Err(CoreError::Http(format!("{}: HTTP {}", method, status.as_u16())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| CoreError::Http(format!("{}: bad response body: {}", method, e)))?;

        if body.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            let description = body
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("unknown error");
            return Err(CoreError::Api(format!("{}: {}", method, description)));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Value, CoreError> {
        self.retry.run(method, || self.call_once(method, &payload)).await
    }

    /// Post an HTML message; buy alerts carry the configured image as a
    /// photo caption when one is set. Returns the message id.
    async fn send_html(&self, text: &str, with_image: bool) -> Result<i64, CoreError> {
        let result = match (&self.settings.alert_image_url, with_image) {
            (Some(image), true) => {
                self.call(
                    "sendPhoto",
                    json!({
                        "chat_id": self.settings.telegram_chat_id,
                        "photo": image,
                        "caption": text,
                        "parse_mode": "HTML",
                        "reply_markup": self.buy_keyboard(),
                    }),
                )
                .await?
            }
            _ => {
                self.call(
                    "sendMessage",
                    json!({
                        "chat_id": self.settings.telegram_chat_id,
                        "text": text,
                        "parse_mode": "HTML",
                        "disable_web_page_preview": true,
                        "reply_markup": self.buy_keyboard(),
                    }),
                )
                .await?
            }
        };
        result
            .get("message_id")
            .and_then(|id| id.as_i64())
            .ok_or_else(|| CoreError::Api("response carried no message_id".to_string()))
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify_buy(
        &self,
        record: &TransactionRecord,
        plan: &DistributionPlan,
        results: &[TransferResult],
        sol_price_usd: Option<f64>,
    ) -> Result<(), CoreError> {
        let text = build_buy_alert(
            record,
            plan,
            results,
            sol_price_usd,
            self.countdown(),
            &self.settings,
        );
        self.send_html(&text, true).await?;
        info!(
            "Buy alert sent: {} SOL from {}",
            record.sol_spent,
            format_address(&record.buyer_address)
        );
        Ok(())
    }

    async fn notify_startup(&self) -> Result<(), CoreError> {
        let text = build_startup_message(&self.settings, self.countdown());
        let message_id = self.send_html(&text, false).await?;
        *self.countdown_message_id.lock().unwrap() = Some(message_id);
        info!("Startup message posted (message_id {})", message_id);
        Ok(())
    }

    async fn notify_daily_summary(
        &self,
        date: NaiveDate,
        day: &DayStats,
        totals: &DayStats,
    ) -> Result<(), CoreError> {
        let text = build_daily_summary(date, day, totals, &self.settings, self.countdown());
        self.send_html(&text, false).await?;
        info!("Daily summary sent for {}", date);
        Ok(())
    }

    async fn refresh_countdown(&self) -> Result<(), CoreError> {
        let message_id = match *self.countdown_message_id.lock().unwrap() {
            Some(id) => id,
            None => return Ok(()),
        };
        let countdown = self.countdown();

        if countdown.ended {
            // The pinned countdown is stale once the presale closes.
            let result = self
                .call(
                    "deleteMessage",
                    json!({
                        "chat_id": self.settings.telegram_chat_id,
                        "message_id": message_id,
                    }),
                )
                .await;
            if let Err(e) = result {
                debug!("countdown delete skipped: {}", e);
            }
            *self.countdown_message_id.lock().unwrap() = None;
            return Ok(());
        }

        let text = build_startup_message(&self.settings, countdown);
        let result = self
            .call(
                "editMessageText",
                json!({
                    "chat_id": self.settings.telegram_chat_id,
                    "message_id": message_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }),
            )
            .await;
        if let Err(e) = result {
            // "message is not modified" and friends; not worth surfacing.
            debug!("countdown edit skipped: {}", e);
        }
        Ok(())
    }
}

pub fn format_address(address: &str) -> String {
    if address.len() > 8 {
        format!("{}...{}", &address[..4], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

pub fn buy_rank(sol_spent: f64) -> &'static str {
    if sol_spent >= 10.0 {
        "🐋 WHALE"
    } else if sol_spent >= 5.0 {
        "🦈 SHARK"
    } else if sol_spent >= 1.0 {
        "🐟 FISH"
    } else {
        "🦐 SHRIMP"
    }
}

pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn countdown_section(countdown: Countdown) -> String {
    if countdown.ended {
        "⏰ <b>Presale Status:</b>\n🔴 <b>PRESALE ENDED</b>\n".to_string()
    } else {
        format!(
            "⏰ <b>Presale Ends In:</b>\n📅 <b>{} days</b> 🕐 <b>{} hours</b> ⏱️ <b>{} minutes</b>\n",
            countdown.days, countdown.hours, countdown.minutes
        )
    }
}

fn transfer_status_line(status: &TransferStatus) -> String {
    match status {
        TransferStatus::Confirmed { signature } => format!(
            "• Status: ✅ <b>SENT</b> (<a href='https://solscan.io/tx/{}'>tx</a>)",
            signature
        ),
        TransferStatus::Failed { reason, .. } => {
            format!("• Status: ❌ <b>FAILED</b> — {}", reason)
        }
        TransferStatus::Skipped { reason } => {
            format!("• Status: ⚠️ <b>SKIPPED</b> — {}", reason)
        }
    }
}

pub fn build_buy_alert(
    record: &TransactionRecord,
    plan: &DistributionPlan,
    results: &[TransferResult],
    sol_price_usd: Option<f64>,
    countdown: Countdown,
    settings: &Settings,
) -> String {
    let symbol = &settings.token_symbol;
    let mut message = format!(
        "🎉 <b>New <a href='https://solscan.io/token/{}'>${}</a> Buy</b>\n\n",
        settings.token_mint, symbol
    );

    match sol_price_usd {
        Some(price) => {
            message.push_str(&format!(
                "💰 <b>Spent:</b> {:.4} SOL (${:.2})\n",
                record.sol_spent,
                record.sol_spent * price
            ));
        }
        None => {
            message.push_str(&format!("💰 <b>Spent:</b> {:.4} SOL\n", record.sol_spent));
        }
    }
    message.push_str(&format!("🏷️ <b>Rank:</b> {}\n", buy_rank(record.sol_spent)));
    message.push_str(&format!(
        "🎁 <b>Bought:</b> {} ${}\n",
        group_thousands(record.tokens_received.round() as u64),
        symbol
    ));
    message.push_str(&format!(
        "🔗 <a href='https://solscan.io/tx/{}'>Signature</a> | 👛 <a href='https://solscan.io/account/{}'>Wallet</a>\n\n",
        record.signature, record.buyer_address
    ));

    message.push_str("🎁 <b>TOKEN DISTRIBUTION:</b>\n");
    if !plan.qualifies {
        message.push_str(&format!(
            "• Status: ⏭️ below minimum buy ({} SOL)\n",
            settings.minimum_buy_sol
        ));
    } else {
        let base = results.iter().find(|r| r.leg == TransferLeg::Base);
        match base {
            Some(result) => {
                message.push_str(&format!(
                    "• Tokens: {} ${}\n{}\n",
                    group_thousands(result.amount),
                    symbol,
                    transfer_status_line(&result.status)
                ));
            }
            None => {
                message.push_str(&format!(
                    "• Tokens: {} ${}\n",
                    group_thousands(plan.base_amount),
                    symbol
                ));
            }
        }

        if let Some(result) = results.iter().find(|r| r.leg == TransferLeg::Airdrop) {
            message.push_str("\n🎉 <b>FIRST-BUYER AIRDROP:</b>\n");
            message.push_str(&format!(
                "• Amount: {} ${}\n{}\n",
                group_thousands(result.amount),
                symbol,
                transfer_status_line(&result.status)
            ));
        }
    }
    message.push('\n');
    message.push_str(&countdown_section(countdown));
    message
}

pub fn build_startup_message(settings: &Settings, countdown: Countdown) -> String {
    let mut message = format!(
        "🦅 <b>${} Buy Watch</b>\n\n\
         🪙 <b>Token:</b> <code>{}</code>\n\
         💰 <b>Symbol:</b> ${}\n\
         🔄 <b>Monitoring:</b> <b>ACTIVE</b>\n\n",
        settings.token_symbol, settings.token_mint, settings.token_symbol
    );
    message.push_str(&countdown_section(countdown));
    message.push_str(&format!(
        "\n🎁 Rate: 1 SOL = {} ${} | Minimum buy: {} SOL | First-buyer airdrop: {} ${}\n",
        group_thousands(settings.tokens_per_sol.round() as u64),
        settings.token_symbol,
        settings.minimum_buy_sol,
        group_thousands(settings.airdrop_amount),
        settings.token_symbol
    ));
    message
}

pub fn build_daily_summary(
    date: NaiveDate,
    day: &DayStats,
    totals: &DayStats,
    settings: &Settings,
    countdown: Countdown,
) -> String {
    let symbol = &settings.token_symbol;
    let average_buy = if day.buys > 0 {
        day.volume_sol / day.buys as f64
    } else {
        0.0
    };
    let airdrop_rate = if day.buys > 0 {
        day.airdrops as f64 / day.buys as f64 * 100.0
    } else {
        0.0
    };

    let mut message = format!("📊 <b>DAILY SUMMARY</b> — {}\n\n", date);
    message.push_str(&format!(
        "📈 <b>Today:</b>\n\
         • Buys: {}\n\
         • Volume: {:.2} SOL\n\
         • Distributed: {} ${}\n\
         • Airdrops: {}\n\
         • Average Buy: {:.2} SOL\n\
         • Airdrop Rate: {:.1}%\n\n",
        day.buys,
        day.volume_sol,
        group_thousands(day.distributed),
        symbol,
        day.airdrops,
        average_buy,
        airdrop_rate
    ));
    message.push_str(&format!(
        "🏆 <b>All-Time:</b>\n\
         • Buys: {}\n\
         • Volume: {:.2} SOL\n\
         • Distributed: {} ${}\n\
         • Airdrops: {}\n\n",
        totals.buys,
        totals.volume_sol,
        group_thousands(totals.distributed),
        symbol,
        totals.airdrops
    ));
    message.push_str(&countdown_section(countdown));
    message
}
