//! Next-run computation for scheduled backups

use chrono::{DateTime, Datelike, Duration, Local, NaiveTime, TimeZone, Weekday};

use crate::config::settings::ScheduleSettings;
use crate::error::{VaultError, VaultResult};

/// Parsed schedule settings
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub daily_at: NaiveTime,
    pub weekly_day: Weekday,
    pub weekly_at: NaiveTime,
    pub health_every: Duration,
    pub overdue_after: Duration,
}

impl Schedule {
    pub fn from_settings(settings: &ScheduleSettings) -> VaultResult<Self> {
        Ok(Self {
            daily_at: settings.daily_time()?,
            weekly_day: settings.weekday()?,
            weekly_at: settings.weekly_time()?,
            health_every: Duration::minutes(i64::from(settings.health_interval_minutes.max(1))),
            overdue_after: Duration::hours(i64::from(settings.overdue_after_hours)),
        })
    }
}

/// First occurrence of `at` strictly after `now`
pub fn next_daily(now: DateTime<Local>, at: NaiveTime) -> VaultResult<DateTime<Local>> {
    let today = localize(now.date_naive().and_time(at));
    match today {
        Some(candidate) if candidate > now => Ok(candidate),
        _ => localize((now + Duration::days(1)).date_naive().and_time(at))
            .ok_or_else(|| VaultError::Scheduler("Failed to compute daily schedule time".into())),
    }
}

/// First `weekday` at `at` strictly after `now`
pub fn next_weekly(
    now: DateTime<Local>,
    weekday: Weekday,
    at: NaiveTime,
) -> VaultResult<DateTime<Local>> {
    let now_weekday = i64::from(now.weekday().number_from_monday());
    let target_weekday = i64::from(weekday.number_from_monday());
    let mut days_ahead = target_weekday - now_weekday;
    if days_ahead < 0 {
        days_ahead += 7;
    }

    let naive = (now.date_naive() + Duration::days(days_ahead)).and_time(at);
    let candidate = localize(naive)
        .ok_or_else(|| VaultError::Scheduler("Failed to compute weekly schedule time".into()))?;

    if candidate <= now {
        return Ok(candidate + Duration::days(7));
    }
    Ok(candidate)
}

/// Pick the first occurrence of an ambiguous local time; skip over a DST gap
fn localize(naive: chrono::NaiveDateTime) -> Option<DateTime<Local>> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(naive + Duration::hours(1))).earliest())
}
