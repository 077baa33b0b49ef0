//! Business timezone and clock
//!
//! Every "today", due date and scheduled time-of-day is interpreted in a
//! single configured IANA zone. The zone is resolved once at startup and
//! passed around as a [`BusinessTimezone`]; nothing below hard-codes it.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Zone used when `BUSINESS_TIMEZONE` is not set
pub const DEFAULT_BUSINESS_TIMEZONE: &str = "America/Sao_Paulo";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid business timezone '{0}'")]
pub struct InvalidTimezone(pub String);

/// The fixed local timezone all billing dates are interpreted in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusinessTimezone {
    tz: Tz,
}

impl BusinessTimezone {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Resolve an IANA zone name such as `America/Sao_Paulo`
    pub fn from_name(name: &str) -> Result<Self, InvalidTimezone> {
        name.trim()
            .parse::<Tz>()
            .map(Self::new)
            .map_err(|_| InvalidTimezone(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.tz.name()
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Local calendar date of an absolute instant
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.tz).date_naive()
    }

    /// Convert a local wall-clock date and time into an absolute instant.
    ///
    /// Returns `None` when the wall-clock time does not exist in the zone
    /// (a DST gap). Ambiguous times (DST fold) resolve to the earlier instant.
    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
        let local = NaiveDateTime::new(date, time);
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl Default for BusinessTimezone {
    fn default() -> Self {
        Self::new(chrono_tz::America::Sao_Paulo)
    }
}

impl fmt::Display for BusinessTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current local date in the business timezone
    fn today(&self, tz: &BusinessTimezone) -> NaiveDate {
        tz.local_date(self.now())
    }
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant, for tests and replays
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(now)),
        }
    }

    /// Clock pinned to noon of `date` in the given zone
    pub fn at_local_noon(tz: &BusinessTimezone, date: NaiveDate) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        let now = tz
            .to_utc(date, noon)
            .unwrap_or_else(|| date.and_time(noon).and_utc());
        Self::new(now)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_resolves_iana_names() {
        let tz = BusinessTimezone::from_name("America/Sao_Paulo").unwrap();
        assert_eq!(tz.name(), "America/Sao_Paulo");
        assert_eq!(tz, BusinessTimezone::default());
    }

    #[test]
    fn test_rejects_unknown_zone() {
        let err = BusinessTimezone::from_name("Mars/Olympus_Mons").unwrap_err();
        assert_eq!(err.to_string(), "invalid business timezone 'Mars/Olympus_Mons'");
    }

    #[test]
    fn test_sao_paulo_morning_to_utc() {
        let tz = BusinessTimezone::default();
        let utc = tz.to_utc(date(2024, 3, 7), time(9, 0, 0)).unwrap();
        assert_eq!(utc.to_rfc3339(), "2024-03-07T12:00:00+00:00");
    }

    #[test]
    fn test_local_date_is_not_utc_date() {
        // 01:30 UTC is still the previous evening in Sao Paulo
        let tz = BusinessTimezone::default();
        let instant = Utc.with_ymd_and_hms(2024, 3, 8, 1, 30, 0).unwrap();
        assert_eq!(tz.local_date(instant), date(2024, 3, 7));
    }

    #[test]
    fn test_dst_gap_has_no_instant() {
        // Sao Paulo skipped 00:00-00:59 on 2018-11-04 when DST started
        let tz = BusinessTimezone::default();
        assert!(tz.to_utc(date(2018, 11, 4), time(0, 30, 0)).is_none());
    }

    #[test]
    fn test_dst_fold_picks_earliest() {
        // 23:30 happened twice on 2019-02-16 when DST ended
        let tz = BusinessTimezone::default();
        let utc = tz.to_utc(date(2019, 2, 16), time(23, 30, 0)).unwrap();
        assert_eq!(utc.to_rfc3339(), "2019-02-17T01:30:00+00:00");
    }

    #[test]
    fn test_fixed_clock_today_and_advance() {
        let tz = BusinessTimezone::default();
        let clock = FixedClock::at_local_noon(&tz, date(2024, 3, 10));
        assert_eq!(clock.today(&tz), date(2024, 3, 10));

        clock.advance(chrono::Duration::hours(12));
        assert_eq!(clock.today(&tz), date(2024, 3, 11));
    }
}
