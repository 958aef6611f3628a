//! UTC day arithmetic and daily scheduling helpers.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::time::Duration;
use tokio::sync::watch;

pub const SECONDS_PER_DAY: i64 = 86_400;

/// Unix-second bounds of a UTC day, `[start, end)`.
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = day_start(date);
    (start, start + SECONDS_PER_DAY)
}

/// Unix seconds at 00:00 UTC of `date`.
pub fn day_start(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .unwrap_or_default()
}

/// The UTC day before `now`.
pub fn previous_day(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    today.pred_opt().unwrap_or(today)
}

/// The most recent Sunday on or before `today`.
pub fn last_sunday(today: NaiveDate) -> NaiveDate {
    today - ChronoDuration::days(i64::from(today.weekday().num_days_from_sunday()))
}

/// Whole days from `launch` to `date` (negative before launch).
pub fn days_since(launch: NaiveDate, date: NaiveDate) -> i64 {
    (date - launch).num_days()
}

/// Next UTC instant at `hour:00:00` strictly after `now`.
pub fn next_daily_run(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let hour = hour.min(23);
    let today = now.date_naive();

    [today, today + ChronoDuration::days(1)]
        .into_iter()
        .filter_map(|day| day.and_hms_opt(hour, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .find(|candidate| *candidate > now)
        .unwrap_or(now + ChronoDuration::days(1))
}

/// Sleep for `duration` unless shutdown is signalled first.
///
/// Returns true when the caller should stop. A dropped sender counts as a
/// shutdown request.
pub async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }

    tokio::select! {
        _ = tokio::time::sleep(duration) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// How long to wait from `now` until `next`.
pub fn until(now: DateTime<Utc>, next: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}
