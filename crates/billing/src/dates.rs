//! Calendar date and time-of-day parsing
//!
//! Billing dates are plain calendar dates (`YYYY-MM-DD`) with no time or
//! offset. They are never routed through a UTC-midnight timestamp, which
//! would shift them by a day west of Greenwich.

use chrono::{Days, NaiveDate, NaiveTime};

use crate::error::{BillingError, BillingResult};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a billing date such as `2024-03-10`
pub fn parse_billing_date(raw: &str) -> BillingResult<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BillingError::InvalidDate("empty date".to_string()));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|e| BillingError::InvalidDate(format!("'{}': {}", trimmed, e)))
}

/// Parse a local time-of-day, `HH:MM:SS` or `HH:MM`
pub fn parse_scheduled_time(raw: &str) -> BillingResult<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|e| BillingError::InvalidDate(format!("time '{}': {}", trimmed, e)))
}

/// Shift a calendar date by a signed number of days.
///
/// Returns `None` only when the result leaves chrono's supported range.
pub fn shift_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    let magnitude = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    }
}
