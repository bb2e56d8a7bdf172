//! Recurring execution schedules
//!
//! The wizard records one schedule per profile and can work out when it is
//! next due. Triggering runs is left to whoever polls [`TaskScheduler::due`].

use crate::core::error::{Result, WizardError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Months, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
}

impl FromStr for Frequency {
    type Err = WizardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(WizardError::validation(
                "Schedule.Frequency",
                format!("unknown frequency '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub profile: String,
    pub frequency: Frequency,
    /// Every `interval` days, weeks or months
    pub interval: u32,
    /// Time of day, UTC
    pub time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

impl ScheduleEntry {
    /// Validate raw request values
    pub fn parse(profile: &str, frequency: &str, interval: u32, time: &str) -> Result<Self> {
        let frequency = frequency.parse::<Frequency>()?;
        if interval == 0 {
            return Err(WizardError::validation(
                "Schedule.Interval",
                "interval must be at least 1",
            ));
        }
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M").map_err(|_| {
            WizardError::validation("Schedule.Time", format!("expected HH:MM, got '{}'", time))
        })?;

        Ok(Self {
            profile: profile.to_string(),
            frequency,
            interval,
            time,
            created_at: Utc::now(),
        })
    }

    fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self.frequency {
            Frequency::Daily => from + Duration::days(self.interval as i64),
            Frequency::Weekly => from + Duration::weeks(self.interval as i64),
            Frequency::Monthly => from
                .checked_add_months(Months::new(self.interval))
                .unwrap_or(from + Duration::days(30 * self.interval as i64)),
        }
    }

    /// First occurrence strictly after `now`, counting from the creation day
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut next = self.created_at.date_naive().and_time(self.time).and_utc();
        if next <= self.created_at {
            next = self.advance(next);
        }
        while next <= now {
            next = self.advance(next);
        }
        next
    }
}

/// Registers recurring runs
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Add or replace the profile's schedule
    async fn create(&self, entry: ScheduleEntry) -> Result<ScheduleEntry>;

    /// Drop the profile's schedule; `false` when there was none
    async fn remove(&self, profile: &str) -> Result<bool>;

    async fn get(&self, profile: &str) -> Option<ScheduleEntry>;

    async fn list(&self) -> Vec<ScheduleEntry>;

    /// Profiles whose next occurrence after `since` is at or before `now`
    async fn due(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Vec<String> {
        self.list()
            .await
            .into_iter()
            .filter(|entry| entry.next_run_after(since) <= now)
            .map(|entry| entry.profile)
            .collect()
    }
}

#[derive(Default)]
pub struct InMemoryScheduler {
    entries: RwLock<BTreeMap<String, ScheduleEntry>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskScheduler for InMemoryScheduler {
    async fn create(&self, entry: ScheduleEntry) -> Result<ScheduleEntry> {
        info!(
            profile = %entry.profile,
            frequency = ?entry.frequency,
            interval = entry.interval,
            time = %entry.time,
            "Schedule registered"
        );
        self.entries
            .write()
            .await
            .insert(entry.profile.clone(), entry.clone());
        Ok(entry)
    }

    async fn remove(&self, profile: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(profile).is_some())
    }

    async fn get(&self, profile: &str) -> Option<ScheduleEntry> {
        self.entries.read().await.get(profile).cloned()
    }

    async fn list(&self) -> Vec<ScheduleEntry> {
        self.entries.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(frequency: &str, interval: u32, time: &str) -> ScheduleEntry {
        let mut entry = ScheduleEntry::parse("Foo", frequency, interval, time).unwrap();
        entry.created_at = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        entry
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let err = ScheduleEntry::parse("Foo", "hourly", 1, "03:00").unwrap_err();
        assert_eq!(err.field(), Some("Schedule.Frequency"));

        let err = ScheduleEntry::parse("Foo", "daily", 0, "03:00").unwrap_err();
        assert_eq!(err.field(), Some("Schedule.Interval"));

        let err = ScheduleEntry::parse("Foo", "daily", 1, "3am").unwrap_err();
        assert_eq!(err.field(), Some("Schedule.Time"));

        assert!(ScheduleEntry::parse("Foo", " Weekly ", 2, "23:59").is_ok());
    }

    #[test]
    fn test_next_run_daily() {
        let e = entry("daily", 1, "03:00");
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(e.next_run_after(now), Utc.with_ymd_and_hms(2024, 2, 1, 3, 0, 0).unwrap());

        let e = entry("daily", 1, "18:30");
        assert_eq!(e.next_run_after(now), Utc.with_ymd_and_hms(2024, 1, 31, 18, 30, 0).unwrap());
    }

    #[test]
    fn test_next_run_interval() {
        let e = entry("weekly", 2, "03:00");
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 0, 0, 0).unwrap();
        assert_eq!(e.next_run_after(now), Utc.with_ymd_and_hms(2024, 2, 14, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_next_run_monthly_clamps_day() {
        let e = entry("monthly", 1, "03:00");
        let now = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(e.next_run_after(now), Utc.with_ymd_and_hms(2024, 2, 29, 3, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_in_memory_scheduler() {
        let scheduler = InMemoryScheduler::new();
        scheduler.create(entry("daily", 1, "03:00")).await.unwrap();
        scheduler.create(entry("weekly", 1, "04:00")).await.unwrap();

        let stored = scheduler.get("Foo").await.unwrap();
        assert_eq!(stored.frequency, Frequency::Weekly);
        assert_eq!(scheduler.list().await.len(), 1);

        assert!(scheduler.remove("Foo").await.unwrap());
        assert!(!scheduler.remove("Foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_due() {
        let scheduler = InMemoryScheduler::new();
        scheduler.create(entry("daily", 1, "03:00")).await.unwrap();

        let since = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 2, 1, 2, 59, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2024, 2, 1, 3, 0, 0).unwrap();
        assert!(scheduler.due(since, before).await.is_empty());
        assert_eq!(scheduler.due(since, after).await, vec!["Foo".to_string()]);
    }
}
