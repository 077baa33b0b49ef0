//! Billing Invariants Module
//!
//! Runnable consistency checks over stored statuses, dates and scheduled
//! notifications. The worker runs them after each recompute sweep; admins
//! can run them on demand.
//!
//! ## Design Principles
//!
//! 1. **Executable**: each invariant is a single SQL query
//! 2. **Explanatory**: violations carry enough context to debug
//! 3. **Non-destructive**: checks only read, never write
//!
//! "Today" is the business date of the injected clock, bound as a
//! parameter so the database session timezone never matters.

use std::collections::HashSet;
use std::sync::Arc;

use acerto_shared::{BusinessTimezone, Clock};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::ledger::MAX_ENTRY_CENTS;

const OVERDUE_HAS_PAST_DATE: &str = "overdue_has_past_date";
const FREE_PLAN_NEVER_OVERDUE: &str = "free_plan_never_overdue";
const STALE_ACTIVE_PAST_DUE: &str = "stale_active_past_due";
const PENDING_NOTIFICATION_FOR_INACTIVE: &str = "pending_notification_for_inactive";
const LEDGER_VALUE_IN_RANGE: &str = "ledger_value_in_range";

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Affected rows: entities, or ledger entries for ledger checks
    pub entity_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - money is being recorded incorrectly
    Critical,
    /// High - stored status contradicts the billing rules
    High,
    /// Medium - a notification may go to the wrong person
    Medium,
    /// Low - expected lag, informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    pub checked_at: DateTime<Utc>,
    /// Business date the checks were evaluated against
    pub business_date: NaiveDate,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    /// True when no violation of severity Medium or above was found
    pub healthy: bool,
}

impl InvariantCheckSummary {
    fn from_violations(
        checked_at: DateTime<Utc>,
        business_date: NaiveDate,
        checks_run: usize,
        violations: Vec<InvariantViolation>,
    ) -> Self {
        let checks_failed = violations
            .iter()
            .map(|v| v.invariant.as_str())
            .collect::<HashSet<_>>()
            .len();
        let healthy = violations
            .iter()
            .all(|v| v.severity == ViolationSeverity::Low);

        Self {
            checked_at,
            business_date,
            checks_run,
            checks_passed: checks_run.saturating_sub(checks_failed),
            checks_failed,
            healthy,
            violations,
        }
    }
}

/// Row type for status/date violations across clients and subscribers
#[derive(Debug, sqlx::FromRow)]
struct EntityStatusRow {
    entity_id: Uuid,
    kind: String,
    owner_id: Option<Uuid>,
    name: String,
    next_billing_date: Option<NaiveDate>,
}

/// Row type for free-plan overdue violation
#[derive(Debug, sqlx::FromRow)]
struct FreeOverdueRow {
    entity_id: Uuid,
    name: String,
    plan_name: String,
}

/// Row type for pending notifications addressed to inactive entities
#[derive(Debug, sqlx::FromRow)]
struct PendingInactiveRow {
    notification_id: Uuid,
    rule_id: Uuid,
    recipient_id: Uuid,
    recipient_name_snapshot: String,
    send_at: DateTime<Utc>,
}

/// Row type for ledger values above the accepted cap
#[derive(Debug, sqlx::FromRow)]
struct OversizedEntryRow {
    entry_id: Uuid,
    owner_id: Option<Uuid>,
    description: String,
    value_cents: i64,
}

/// Service for running billing invariant checks
pub struct InvariantChecker {
    pool: PgPool,
    tz: BusinessTimezone,
    clock: Arc<dyn Clock>,
}

impl InvariantChecker {
    pub fn new(pool: PgPool, tz: BusinessTimezone, clock: Arc<dyn Clock>) -> Self {
        Self { pool, tz, clock }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = self.clock.now();
        let today = self.tz.local_date(now);
        let mut violations = Vec::new();

        violations.extend(self.check_overdue_has_past_date(today).await?);
        violations.extend(self.check_free_plan_never_overdue().await?);
        violations.extend(self.check_stale_active_past_due(today).await?);
        violations.extend(self.check_pending_notification_for_inactive().await?);
        violations.extend(self.check_ledger_value_in_range().await?);

        let summary = InvariantCheckSummary::from_violations(
            now,
            today,
            Self::available_checks().len(),
            violations,
        );

        if summary.healthy {
            tracing::info!(
                checks_run = summary.checks_run,
                violations = summary.violations.len(),
                "Billing invariants hold"
            );
        } else {
            tracing::warn!(
                checks_failed = summary.checks_failed,
                violations = summary.violations.len(),
                "Billing invariant violations found"
            );
        }
        Ok(summary)
    }

    /// Invariant 1: overdue implies a billing date before today
    ///
    /// An overdue row with a current or future date (or none at all) was
    /// left behind by a write that skipped status derivation.
    async fn check_overdue_has_past_date(
        &self,
        today: NaiveDate,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<EntityStatusRow> = sqlx::query_as(
            r#"
            SELECT id AS entity_id, 'client' AS kind, owner_id, name, next_billing_date
            FROM clients
            WHERE status = 'overdue'
              AND (next_billing_date IS NULL OR next_billing_date >= $1)
            UNION ALL
            SELECT id AS entity_id, 'subscriber' AS kind, owner_id, name, next_billing_date
            FROM subscribers
            WHERE status = 'overdue'
              AND (next_billing_date IS NULL OR next_billing_date >= $1)
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: OVERDUE_HAS_PAST_DATE.to_string(),
                entity_ids: vec![row.entity_id],
                description: format!(
                    "{} '{}' is overdue but its billing date is {}",
                    row.kind,
                    row.name,
                    row.next_billing_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "missing".to_string())
                ),
                context: serde_json::json!({
                    "kind": row.kind,
                    "owner_id": row.owner_id,
                    "next_billing_date": row.next_billing_date,
                    "business_date": today,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 2: subscribers on a free plan are never overdue
    async fn check_free_plan_never_overdue(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<FreeOverdueRow> = sqlx::query_as(
            r#"
            SELECT s.id AS entity_id, s.name, p.name AS plan_name
            FROM subscribers s
            JOIN subscriber_plans p ON p.id = s.plan_id
            WHERE s.status = 'overdue'
              AND p.is_free
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: FREE_PLAN_NEVER_OVERDUE.to_string(),
                entity_ids: vec![row.entity_id],
                description: format!(
                    "Subscriber '{}' on free plan '{}' is marked overdue",
                    row.name, row.plan_name
                ),
                context: serde_json::json!({
                    "plan_name": row.plan_name,
                }),
                severity: ViolationSeverity::High,
            })
            .collect())
    }

    /// Invariant 3: active rows with a past date
    ///
    /// Expected for a short while after an explicit status change, until the
    /// next recompute sweep. Informational only.
    async fn check_stale_active_past_due(
        &self,
        today: NaiveDate,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<EntityStatusRow> = sqlx::query_as(
            r#"
            SELECT id AS entity_id, 'client' AS kind, owner_id, name, next_billing_date
            FROM clients
            WHERE status = 'active'
              AND next_billing_date < $1
            UNION ALL
            SELECT s.id AS entity_id, 'subscriber' AS kind, s.owner_id, s.name, s.next_billing_date
            FROM subscribers s
            LEFT JOIN subscriber_plans p ON p.id = s.plan_id
            WHERE s.status = 'active'
              AND s.next_billing_date < $1
              AND NOT COALESCE(p.is_free, FALSE)
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: STALE_ACTIVE_PAST_DUE.to_string(),
                entity_ids: vec![row.entity_id],
                description: format!(
                    "{} '{}' is active with a past billing date",
                    row.kind, row.name
                ),
                context: serde_json::json!({
                    "kind": row.kind,
                    "owner_id": row.owner_id,
                    "next_billing_date": row.next_billing_date,
                    "business_date": today,
                }),
                severity: ViolationSeverity::Low,
            })
            .collect())
    }

    /// Invariant 4: no pending notification is addressed to an inactive entity
    ///
    /// Status changes do not reschedule rules, so a row scheduled while the
    /// recipient was active survives until the rule is next saved.
    async fn check_pending_notification_for_inactive(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<PendingInactiveRow> = sqlx::query_as(
            r#"
            SELECT
                n.id AS notification_id,
                n.rule_id,
                n.recipient_id,
                n.recipient_name_snapshot,
                n.send_at
            FROM scheduled_notifications n
            JOIN automation_rules r ON r.id = n.rule_id
            LEFT JOIN clients c ON r.kind = 'client' AND c.id = n.recipient_id
            LEFT JOIN subscribers s ON r.kind = 'subscriber' AND s.id = n.recipient_id
            WHERE n.status = 'pending'
              AND COALESCE(c.status, s.status) = 'inactive'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: PENDING_NOTIFICATION_FOR_INACTIVE.to_string(),
                entity_ids: vec![row.recipient_id],
                description: format!(
                    "Pending notification for '{}' but the recipient is inactive",
                    row.recipient_name_snapshot
                ),
                context: serde_json::json!({
                    "notification_id": row.notification_id,
                    "rule_id": row.rule_id,
                    "send_at": row.send_at,
                }),
                severity: ViolationSeverity::Medium,
            })
            .collect())
    }

    /// Invariant 5: every ledger value is within the accepted cap
    ///
    /// Rows above it break the dashboard totals for their owner.
    async fn check_ledger_value_in_range(&self) -> BillingResult<Vec<InvariantViolation>> {
        let rows: Vec<OversizedEntryRow> = sqlx::query_as(
            r#"
            SELECT id AS entry_id, owner_id, description, value_cents
            FROM financial_entries
            WHERE value_cents > $1
            "#,
        )
        .bind(MAX_ENTRY_CENTS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| InvariantViolation {
                invariant: LEDGER_VALUE_IN_RANGE.to_string(),
                entity_ids: vec![row.entry_id],
                description: format!(
                    "Ledger entry '{}' records {} cents, above the {} cent cap",
                    row.description, row.value_cents, MAX_ENTRY_CENTS
                ),
                context: serde_json::json!({
                    "owner_id": row.owner_id,
                    "value_cents": row.value_cents,
                }),
                severity: ViolationSeverity::Critical,
            })
            .collect())
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        let today = self.tz.local_date(self.clock.now());
        match name {
            OVERDUE_HAS_PAST_DATE => self.check_overdue_has_past_date(today).await,
            FREE_PLAN_NEVER_OVERDUE => self.check_free_plan_never_overdue().await,
            STALE_ACTIVE_PAST_DUE => self.check_stale_active_past_due(today).await,
            PENDING_NOTIFICATION_FOR_INACTIVE => {
                self.check_pending_notification_for_inactive().await
            }
            LEDGER_VALUE_IN_RANGE => self.check_ledger_value_in_range().await,
            other => Err(BillingError::InvalidInput(format!(
                "unknown invariant check '{}'",
                other
            ))),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        vec![
            OVERDUE_HAS_PAST_DATE,
            FREE_PLAN_NEVER_OVERDUE,
            STALE_ACTIVE_PAST_DUE,
            PENDING_NOTIFICATION_FOR_INACTIVE,
            LEDGER_VALUE_IN_RANGE,
        ]
    }
}
