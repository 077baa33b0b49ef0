// Billing crate clippy configuration
#![allow(clippy::result_large_err)] // BillingError carries owned context strings
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Acerto Certo Billing Core
//!
//! Subscription lifecycle for two parallel entity families: **clients**,
//! billed by a tenant, and **subscribers**, billed by the platform.
//!
//! ## Features
//!
//! - **Billing State Engine**: status and billing-date transitions for
//!   create, update, renew, set-due-today and explicit status changes
//! - **Eligibility Filter**: turns an automation rule into timezone-correct
//!   scheduled notifications
//! - **Ledger**: append-only credits and debits with dashboard aggregates
//! - **Recompute Sweep**: brings stored statuses in line with today's date
//! - **Invariants**: read-only SQL consistency checks
//!
//! All "today" computations use the injected [`acerto_shared::Clock`] in the
//! configured [`acerto_shared::BusinessTimezone`].

pub mod automation;
pub mod dates;
pub mod entity;
pub mod error;
pub mod invariants;
pub mod ledger;
pub mod lifecycle;
pub mod pg_store;
pub mod service;
pub mod store;

#[cfg(test)]
mod edge_case_tests;

// Automation
pub use automation::{
    schedule_notifications_for_rule, send_instant, target_instant, AutomationRule, RuleInput,
    SchedulePlan, ScheduledNotification, SkipReason, SkippedTarget, SCHEDULE_GRACE_SECONDS,
};

// Entities
pub use entity::{BillableEntity, Plan, Scope};

// Error
pub use error::{BillingError, BillingResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Ledger
pub use ledger::{FinancialEntry, LedgerSummary, StatusBreakdown, MAX_ENTRY_CENTS};

// Lifecycle
pub use lifecycle::{
    BillingDay, EntityChanges, NewEntity, PaymentDecision, Transition,
};

// Service
pub use service::{AdjustmentInput, BillingService, PlanInput, RuleSchedule, SweepReport};

// Persistence
pub use pg_store::PgBillingStore;
pub use store::{BillingStore, InMemoryBillingStore};
