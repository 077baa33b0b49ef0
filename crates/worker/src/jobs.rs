//! Job bodies run by the scheduler

use acerto_billing::{BillingService, InvariantChecker, SweepReport};
use acerto_shared::EntityKind;
use tracing::{error, info, warn};

/// Combined result of sweeping both entity families
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepTotals {
    pub clients: SweepReport,
    pub subscribers: SweepReport,
}

/// Recompute stored statuses for clients, then subscribers.
///
/// A failure on one family is logged and does not stop the other.
pub async fn run_status_sweep(billing: &BillingService) -> SweepTotals {
    let mut totals = SweepTotals::default();

    for kind in [EntityKind::Client, EntityKind::Subscriber] {
        match billing.sweep_statuses(kind).await {
            Ok(report) => {
                info!(
                    kind = %kind,
                    examined = report.examined,
                    marked_overdue = report.marked_overdue,
                    restored_active = report.restored_active,
                    superseded = report.superseded,
                    "Status sweep complete"
                );
                match kind {
                    EntityKind::Client => totals.clients = report,
                    EntityKind::Subscriber => totals.subscribers = report,
                }
            }
            Err(e) => error!(kind = %kind, error = %e, "Status sweep failed"),
        }
    }

    totals
}

/// Run every invariant check and log what it found
pub async fn run_invariant_checks(checker: &InvariantChecker) {
    match checker.run_all_checks().await {
        Ok(summary) if summary.violations.is_empty() => {
            info!(
                checks_run = summary.checks_run,
                business_date = %summary.business_date,
                "Invariant checks passed"
            );
        }
        Ok(summary) => {
            for violation in &summary.violations {
                warn!(
                    invariant = %violation.invariant,
                    severity = %violation.severity,
                    entities = violation.entity_ids.len(),
                    "{}",
                    violation.description
                );
            }
            if summary.healthy {
                info!(
                    checks_failed = summary.checks_failed,
                    "Invariant checks found low-severity drift"
                );
            } else {
                error!(
                    checks_failed = summary.checks_failed,
                    violations = summary.violations.len(),
                    "Invariant checks failed"
                );
            }
        }
        Err(e) => error!(error = %e, "Invariant checks could not run"),
    }
}
