//! Exchange session calendar: where the daily hard cutoff falls.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use zdte_core::CacheConfig;

/// Daily auto-expire instant, expressed in exchange-local time.
#[derive(Debug, Clone, Copy)]
pub struct SessionCalendar {
    tz: Tz,
    close: NaiveTime,
}

impl SessionCalendar {
    pub fn new(tz: Tz, close: NaiveTime) -> Self {
        Self { tz, close }
    }

    /// Builds the calendar from `cache.auto_expire_at` / `cache.exchange_timezone`.
    ///
    /// # Errors
    ///
    /// Returns an error if either setting does not parse.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Ok(Self::new(config.exchange_tz()?, config.auto_expire_time()?))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close
    }

    /// Exchange-local calendar date of `instant`.
    pub fn exchange_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Cutoff instant for the given exchange date.
    pub fn close_on(&self, date: NaiveDate) -> DateTime<Utc> {
        let local = date.and_time(self.close);
        match self.tz.from_local_datetime(&local).earliest() {
            Some(at) => at.with_timezone(&Utc),
            // Close time falls in a DST gap; treat the wall-clock value as UTC.
            None => Utc.from_utc_datetime(&local),
        }
    }

    /// Most recent cutoff that is not in the future relative to `now`.
    pub fn last_close_at_or_before(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.exchange_date(now);
        let close = self.close_on(today);
        if close <= now {
            return close;
        }
        self.close_on(today.pred_opt().unwrap_or(today))
    }

    /// True when the observation was taken at or after its own session's cutoff.
    pub fn is_after_close(&self, observed_at: DateTime<Utc>) -> bool {
        observed_at >= self.close_on(self.exchange_date(observed_at))
    }

    /// True when a cutoff instant lies in `(observed_at, now]`.
    pub fn crossed_close(&self, observed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        observed_at < self.last_close_at_or_before(now)
    }
}
