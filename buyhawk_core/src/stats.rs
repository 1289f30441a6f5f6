// Owned, injectable statistics. Daily counters reset at local midnight in
// the configured UTC offset; totals run for the life of the stored state.

use crate::error::CoreError;
use crate::storage::{keys, StorageBackend};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayStats {
    pub buys: u64,
    pub volume_sol: f64,
    pub distributed: u64,
    pub airdrops: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StatsState {
    date: NaiveDate,
    day: DayStats,
    total: DayStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub date: NaiveDate,
    pub day: DayStats,
    pub total: DayStats,
}

pub struct Statistics {
    storage: Arc<dyn StorageBackend>,
    state: StatsState,
    utc_offset_hours: i8,
}

impl Statistics {
    pub async fn load(
        storage: Arc<dyn StorageBackend>,
        utc_offset_hours: i8,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        let state: StatsState = match storage.load(keys::STATS).await? {
            Some(json) => serde_json::from_str(&json)?,
            None => StatsState {
                date: local_date(now, utc_offset_hours),
                day: DayStats::default(),
                total: DayStats::default(),
            },
        };
        Ok(Self {
            storage,
            state,
            utc_offset_hours,
        })
    }

    /// Record a processed qualifying buy.
    pub async fn record_buy(
        &mut self,
        sol_spent: f64,
        distributed: u64,
        airdrop: bool,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        // A buy landing right after midnight still rolls the day first.
        self.roll_if_new_day(now);

        for stats in [&mut self.state.day, &mut self.state.total] {
            stats.buys += 1;
            stats.volume_sol += sol_spent;
            stats.distributed += distributed;
            if airdrop {
                stats.airdrops += 1;
            }
        }
        self.persist().await
    }

    /// Roll the daily window if the local date changed. Returns the finished
    /// day when it saw activity, so the caller can emit a summary.
    pub async fn maybe_roll_day(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<(NaiveDate, DayStats)>, CoreError> {
        let finished = self.roll_if_new_day(now);
        if finished.is_some() {
            self.persist().await?;
        }
        Ok(finished.filter(|(_, day)| day.buys > 0))
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            date: self.state.date,
            day: self.state.day.clone(),
            total: self.state.total.clone(),
        }
    }

    fn roll_if_new_day(&mut self, now: DateTime<Utc>) -> Option<(NaiveDate, DayStats)> {
        let today = local_date(now, self.utc_offset_hours);
        if today == self.state.date {
            return None;
        }
        debug!("Rolling daily stats from {} to {}", self.state.date, today);
        let finished = (self.state.date, std::mem::take(&mut self.state.day));
        self.state.date = today;
        Some(finished)
    }

    async fn persist(&self) -> Result<(), CoreError> {
        let json = serde_json::to_string(&self.state)?;
        self.storage.save(keys::STATS, &json).await
    }
}

fn local_date(now: DateTime<Utc>, utc_offset_hours: i8) -> NaiveDate {
    (now + Duration::hours(utc_offset_hours as i64)).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MemoryStorage;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn record_accumulates_day_and_total() {
        let storage = Arc::new(MemoryStorage::new());
        let now = at(2025, 9, 1, 12);
        let mut stats = Statistics::load(storage, 0, now).await.unwrap();

        stats.record_buy(1.0, 7000, true, now).await.unwrap();
        stats.record_buy(0.5, 3500, false, now).await.unwrap();

        let snap = stats.snapshot();
        assert_eq!(snap.day.buys, 2);
        assert!((snap.day.volume_sol - 1.5).abs() < 1e-9);
        assert_eq!(snap.day.distributed, 10_500);
        assert_eq!(snap.day.airdrops, 1);
        assert_eq!(snap.total, snap.day);
    }

    #[tokio::test]
    async fn day_rolls_at_local_midnight() {
        let storage = Arc::new(MemoryStorage::new());
        let day1 = at(2025, 9, 1, 12);
        let mut stats = Statistics::load(storage, 0, day1).await.unwrap();
        stats.record_buy(1.0, 7000, false, day1).await.unwrap();

        let day2 = at(2025, 9, 2, 0);
        let finished = stats.maybe_roll_day(day2).await.unwrap();
        let (date, day) = finished.expect("finished day with activity");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 9, 1).unwrap());
        assert_eq!(day.buys, 1);

        let snap = stats.snapshot();
        assert_eq!(snap.day.buys, 0);
        assert_eq!(snap.total.buys, 1);
    }

    #[tokio::test]
    async fn quiet_day_rolls_without_summary() {
        let storage = Arc::new(MemoryStorage::new());
        let day1 = at(2025, 9, 1, 12);
        let mut stats = Statistics::load(storage, 0, day1).await.unwrap();

        let finished = stats.maybe_roll_day(at(2025, 9, 2, 1)).await.unwrap();
        assert!(finished.is_none());
        assert_eq!(stats.snapshot().date, NaiveDate::from_ymd_opt(2025, 9, 2).unwrap());
    }

    #[tokio::test]
    async fn offset_shifts_the_boundary() {
        let storage = Arc::new(MemoryStorage::new());
        // 23:00 UTC at +2 is already the next local day.
        let now = at(2025, 9, 1, 23);
        let stats = Statistics::load(storage, 2, now).await.unwrap();
        assert_eq!(stats.snapshot().date, NaiveDate::from_ymd_opt(2025, 9, 2).unwrap());
    }

    #[tokio::test]
    async fn durable_across_reload() {
        let storage = Arc::new(MemoryStorage::new());
        let now = at(2025, 9, 1, 12);
        {
            let mut stats = Statistics::load(storage.clone(), 0, now).await.unwrap();
            stats.record_buy(2.0, 14_000, true, now).await.unwrap();
        }
        let reloaded = Statistics::load(storage, 0, now).await.unwrap();
        assert_eq!(reloaded.snapshot().total.buys, 1);
        assert_eq!(reloaded.snapshot().day.distributed, 14_000);
    }
}
