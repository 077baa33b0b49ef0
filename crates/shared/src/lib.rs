// Test code patterns:
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Acerto Certo shared types
//!
//! Domain enums, the business timezone/clock pair and database helpers used
//! by the billing, API and worker crates.

pub mod db;
pub mod timezone;
pub mod types;

pub use db::{create_pool, create_pool_with, run_migrations};
pub use timezone::{
    BusinessTimezone, Clock, FixedClock, InvalidTimezone, SystemClock, DEFAULT_BUSINESS_TIMEZONE,
};
pub use types::{BillingStatus, EntityKind, EntryType, NotificationStatus, UnknownVariant};
