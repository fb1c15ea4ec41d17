//! Exchange-local calendar arithmetic
//!
//! Everything here is pure over `(instant, offset)` except `sleep_or_cancel`.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use tokio_util::sync::CancellationToken;

/// Local wall-clock time of day
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTime {
    pub hour: u32,
    pub minute: u32,
}

impl LocalTime {
    pub const fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }

    fn minutes(self) -> u32 {
        self.hour * 60 + self.minute
    }

    fn on(self, date: NaiveDate) -> NaiveDateTime {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN);
        date.and_time(time)
    }
}

fn to_utc(local: NaiveDateTime, offset: FixedOffset) -> DateTime<Utc> {
    (local - Duration::seconds(i64::from(offset.local_minus_utc()))).and_utc()
}

fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Activity before `cutoff_hour` local belongs to the previous day's session
pub fn trade_date_for(instant: DateTime<Utc>, offset: FixedOffset, cutoff_hour: u32) -> NaiveDate {
    let local = instant.with_timezone(&offset);
    let date = local.date_naive();
    if local.hour() < cutoff_hour {
        date.pred_opt().unwrap_or(date)
    } else {
        date
    }
}

/// Inclusive UTC bounds of a trade date: `[D cutoff:00, D+1 cutoff:00 - 1s]`
pub fn trade_date_bounds(
    date: NaiveDate,
    offset: FixedOffset,
    cutoff_hour: u32,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = to_utc(LocalTime::new(cutoff_hour, 0).on(date), offset);
    let end = start + Duration::days(1) - Duration::seconds(1);
    (start, end)
}

/// First occurrence of `at` local strictly after `now`
pub fn next_run_at(now: DateTime<Utc>, offset: FixedOffset, at: LocalTime) -> DateTime<Utc> {
    let candidate = to_utc(at.on(local_date(now, offset)), offset);
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

/// Hard stop for a daily loop that began at `start`
pub fn stop_deadline(start: DateTime<Utc>, offset: FixedOffset, stop: LocalTime) -> DateTime<Utc> {
    next_run_at(start, offset, stop)
}

/// Whether `now` falls in `[start, stop)` local. A window with `stop <= start`
/// wraps midnight, so 23:00 → 04:30 contains both 23:30 and 02:00.
pub fn within_run_window(
    now: DateTime<Utc>,
    offset: FixedOffset,
    start: LocalTime,
    stop: LocalTime,
) -> bool {
    let local = now.with_timezone(&offset);
    let t = local.hour() * 60 + local.minute();
    let (s, e) = (start.minutes(), stop.minutes());
    if s < e {
        t >= s && t < e
    } else if s > e {
        t >= s || t < e
    } else {
        false
    }
}

/// Window summarised by the daily build: previous day `start_hour:00` to today `end` local
pub fn daily_metrics_window(
    now: DateTime<Utc>,
    offset: FixedOffset,
    start_hour: u32,
    end: LocalTime,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = local_date(now, offset);
    let yesterday = today.pred_opt().unwrap_or(today);
    (
        to_utc(LocalTime::new(start_hour, 0).on(yesterday), offset),
        to_utc(end.on(today), offset),
    )
}

/// Returns `false` if the token fired before the sleep completed
pub async fn sleep_or_cancel(token: &CancellationToken, duration: std::time::Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bangkok() -> FixedOffset {
        FixedOffset::east_opt(7 * 3600).unwrap()
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        bangkok()
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_trade_date_cutoff() {
        assert_eq!(trade_date_for(local(2024, 3, 5, 3, 59), bangkok(), 4), date(2024, 3, 4));
        assert_eq!(trade_date_for(local(2024, 3, 5, 4, 0), bangkok(), 4), date(2024, 3, 5));
        assert_eq!(trade_date_for(local(2024, 3, 4, 21, 30), bangkok(), 4), date(2024, 3, 4));
    }

    #[test]
    fn test_trade_date_bounds_cover_overnight_session() {
        let (start, end) = trade_date_bounds(date(2024, 3, 4), bangkok(), 4);
        assert_eq!(start, local(2024, 3, 4, 4, 0));
        assert_eq!(end, local(2024, 3, 5, 4, 0) - Duration::seconds(1));

        let late = local(2024, 3, 5, 2, 15);
        assert!(late >= start && late <= end);
        assert_eq!(trade_date_for(late, bangkok(), 4), date(2024, 3, 4));
    }

    #[test]
    fn test_next_run_and_stop_deadline() {
        let at = LocalTime::new(0, 16);
        assert_eq!(next_run_at(local(2024, 3, 4, 23, 0), bangkok(), at), local(2024, 3, 5, 0, 16));
        assert_eq!(next_run_at(local(2024, 3, 5, 0, 16), bangkok(), at), local(2024, 3, 6, 0, 16));

        let stop = LocalTime::new(4, 30);
        assert_eq!(
            stop_deadline(local(2024, 3, 5, 0, 16), bangkok(), stop),
            local(2024, 3, 5, 4, 30)
        );
        assert_eq!(
            stop_deadline(local(2024, 3, 4, 21, 0), bangkok(), stop),
            local(2024, 3, 5, 4, 30)
        );
    }

    #[test]
    fn test_run_window_wraps_midnight() {
        let start = LocalTime::new(0, 16);
        let stop = LocalTime::new(4, 30);
        assert!(within_run_window(local(2024, 3, 5, 2, 0), bangkok(), start, stop));
        assert!(!within_run_window(local(2024, 3, 5, 4, 30), bangkok(), start, stop));
        assert!(!within_run_window(local(2024, 3, 5, 12, 0), bangkok(), start, stop));

        let evening = LocalTime::new(20, 0);
        assert!(within_run_window(local(2024, 3, 4, 23, 0), bangkok(), evening, stop));
        assert!(within_run_window(local(2024, 3, 5, 1, 0), bangkok(), evening, stop));
        assert!(!within_run_window(local(2024, 3, 5, 10, 0), bangkok(), evening, stop));
    }

    #[test]
    fn test_daily_metrics_window() {
        let (start, end) =
            daily_metrics_window(local(2024, 3, 5, 3, 10), bangkok(), 20, LocalTime::new(4, 30));
        assert_eq!(start, local(2024, 3, 4, 20, 0));
        assert_eq!(end, local(2024, 3, 5, 4, 30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_or_cancel() {
        let token = CancellationToken::new();
        assert!(sleep_or_cancel(&token, std::time::Duration::from_secs(30)).await);

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            canceller.cancel();
        });
        assert!(!sleep_or_cancel(&token, std::time::Duration::from_secs(3600)).await);
    }
}
