//! Calendar-day windows in the server's local time.
//!
//! Both the admission quota and the statistics replies reason about "today",
//! where the day boundary is local midnight of the process clock.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use nostr_sdk::Timestamp;

const LAST_SECOND_OF_DAY: i64 = 86_399;

/// `[beginning_of_day, end_of_day]` for one local calendar day.
///
/// The end is inclusive at 23:59:59, matching how relays treat `until`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DailyWindow {
    day: NaiveDate,
    begin: i64,
    end: i64,
}

impl DailyWindow {
    /// The window containing the current instant of the local clock.
    pub fn today() -> Self {
        Self::containing(&Local::now())
    }

    pub fn containing<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        let tz = instant.timezone();
        let day = instant.date_naive();
        let midnight = day.and_time(NaiveTime::MIN);

        Self {
            day,
            begin: resolve_local(&tz, midnight),
            end: resolve_local(&tz, midnight + Duration::seconds(LAST_SECOND_OF_DAY)),
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn begin(&self) -> Timestamp {
        Timestamp::from(self.begin.max(0) as u64)
    }

    pub fn end(&self) -> Timestamp {
        Timestamp::from(self.end.max(0) as u64)
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        let ts = ts.as_u64() as i64;
        ts >= self.begin && ts <= self.end
    }
}

/// Whole days between the local midnights of two instants.
pub fn days_between<Tz: TimeZone>(later: &DateTime<Tz>, earlier: &DateTime<Tz>) -> i64 {
    (later.date_naive() - earlier.date_naive()).num_days()
}

/// Convert an event timestamp into the given zone.
/// `None` when the timestamp lies outside chrono's representable range.
pub fn in_zone<Tz: TimeZone>(tz: &Tz, ts: Timestamp) -> Option<DateTime<Tz>> {
    let secs = i64::try_from(ts.as_u64()).ok()?;
    tz.timestamp_opt(secs, 0).single()
}

// Midnight can fall inside a DST gap in a handful of zones; in that case the
// day starts at the first representable instant after it.
fn resolve_local<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> i64 {
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|t| t.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_window_bounds_in_utc() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let window = DailyWindow::containing(&instant);

        let begin = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap();
        assert_eq!(window.begin().as_u64() as i64, begin.timestamp());
        assert_eq!(window.end().as_u64() as i64, end.timestamp());
        assert_eq!(window.day(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
    }

    #[test]
    fn test_window_follows_offset_not_utc() {
        // 23:30 at UTC+2 is still the 10th locally but 21:30 UTC
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let instant = tz.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        let window = DailyWindow::containing(&instant);

        assert_eq!(window.day(), NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        let utc_begin = Utc.with_ymd_and_hms(2024, 3, 9, 22, 0, 0).unwrap();
        assert_eq!(window.begin().as_u64() as i64, utc_begin.timestamp());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let instant = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let window = DailyWindow::containing(&instant);

        assert!(window.contains(window.begin()));
        assert!(window.contains(window.end()));
        assert!(!window.contains(Timestamp::from(window.end().as_u64() + 1)));
        assert!(!window.contains(Timestamp::from(window.begin().as_u64() - 1)));
    }

    #[test]
    fn test_days_between_uses_midnights() {
        let late = Utc.with_ymd_and_hms(2024, 3, 10, 0, 5, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2024, 3, 9, 23, 55, 0).unwrap();
        assert_eq!(days_between(&late, &early), 1);

        let same_day = Utc.with_ymd_and_hms(2024, 3, 10, 23, 0, 0).unwrap();
        assert_eq!(days_between(&same_day, &late), 0);

        let month_ago = Utc.with_ymd_and_hms(2024, 2, 9, 12, 0, 0).unwrap();
        assert_eq!(days_between(&late, &month_ago), 30);
    }
}
