//! Period windows over UTC calendar days and months.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use super::types::BudgetPeriod;

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UsageWindow {
    /// The UTC calendar day `date`.
    pub fn day(date: NaiveDate) -> Self {
        let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// The UTC calendar month, or `None` for an invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some(Self {
            start: Self::day(first).start,
            end: Self::day(next).start,
        })
    }

    /// The window of `period` containing `now`.
    pub fn containing(period: BudgetPeriod, now: DateTime<Utc>) -> Self {
        let today = now.date_naive();
        match period {
            BudgetPeriod::Daily => Self::day(today),
            BudgetPeriod::Monthly => {
                Self::month(today.year(), today.month()).unwrap_or_else(|| Self::day(today))
            }
        }
    }

    /// Window covering the last `days_back` days up to `now`. Saturates at
    /// the earliest representable instant.
    pub fn trailing_days(days_back: u32, now: DateTime<Utc>) -> Self {
        let start = Duration::try_days(i64::from(days_back))
            .and_then(|span| now.checked_sub_signed(span))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Self { start, end: now }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }

    /// Whole days left before the window ends, the day of `now` included.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> u32 {
        if now >= self.end {
            return 0;
        }
        let last_day = (self.end - Duration::days(1)).date_naive();
        ((last_day - now.date_naive()).num_days() + 1).max(0) as u32
    }
}
