//! Billing service
//!
//! Orchestrates the pure engine in [`crate::lifecycle`] and
//! [`crate::automation`] against a [`BillingStore`]: resolves plans, reads
//! "today" from the injected clock in the business timezone, persists the
//! result and appends any ledger entry the operation produced.

use std::sync::Arc;

use acerto_shared::{BillingStatus, BusinessTimezone, Clock, EntityKind, EntryType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::automation::{
    schedule_notifications_for_rule, AutomationRule, RuleInput, ScheduledNotification,
    SkippedTarget,
};
use crate::entity::{BillableEntity, Plan, Scope};
use crate::error::{BillingError, BillingResult};
use crate::ledger::{FinancialEntry, LedgerSummary, StatusBreakdown, MAX_ENTRY_CENTS};
use crate::lifecycle::{self, BillingDay, EntityChanges, NewEntity, Transition};
use crate::store::BillingStore;

/// Plan fields as submitted by a user
#[derive(Debug, Clone, Deserialize)]
pub struct PlanInput {
    pub name: String,
    pub value_cents: i64,
    pub period_days: i32,
    /// Ignored for client plans
    #[serde(default)]
    pub is_free: bool,
}

/// Manual ledger adjustment
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentInput {
    pub entry_type: EntryType,
    pub description: String,
    pub value_cents: i64,
}

/// Outcome of (re)computing a rule's pending notifications
#[derive(Debug, Clone, Serialize)]
pub struct RuleSchedule {
    pub rule: AutomationRule,
    /// Pending rows removed before the fresh set was inserted
    pub replaced: u64,
    pub scheduled: Vec<ScheduledNotification>,
    pub skipped: Vec<SkippedTarget>,
}

/// Result of one status recompute pass over an entity family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub marked_overdue: usize,
    pub restored_active: usize,
    /// Rows that changed between listing and writing and were left alone
    pub superseded: usize,
}

impl SweepReport {
    pub fn changed(&self) -> usize {
        self.marked_overdue + self.restored_active
    }
}

/// Billing operations for tenants (clients) and the platform (subscribers)
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn BillingStore>,
    clock: Arc<dyn Clock>,
    tz: BusinessTimezone,
}

impl BillingService {
    pub fn new(store: Arc<dyn BillingStore>, clock: Arc<dyn Clock>, tz: BusinessTimezone) -> Self {
        Self { store, clock, tz }
    }

    pub fn timezone(&self) -> &BusinessTimezone {
        &self.tz
    }

    pub fn store(&self) -> &Arc<dyn BillingStore> {
        &self.store
    }

    /// Current instant and business date
    pub fn billing_day(&self) -> BillingDay {
        BillingDay::from_clock(self.clock.as_ref(), &self.tz)
    }

    // ---------------------------------------------------------------------
    // Plans
    // ---------------------------------------------------------------------

    pub async fn create_plan(&self, scope: Scope, input: PlanInput) -> BillingResult<Plan> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(BillingError::InvalidInput("plan name is required".to_string()));
        }
        if input.value_cents < 0 {
            return Err(BillingError::InvalidInput(format!(
                "plan value cannot be negative, got {} cents",
                input.value_cents
            )));
        }
        if input.value_cents > MAX_ENTRY_CENTS {
            return Err(BillingError::InvalidInput(format!(
                "plan value exceeds {} cents, got {}",
                MAX_ENTRY_CENTS, input.value_cents
            )));
        }
        if input.period_days < 0 {
            return Err(BillingError::InvalidInput(format!(
                "plan period cannot be negative, got {} days",
                input.period_days
            )));
        }

        let plan = Plan {
            id: Uuid::new_v4(),
            kind: scope.kind(),
            owner_id: scope.owner_id(),
            name: name.to_string(),
            value_cents: input.value_cents,
            period_days: input.period_days,
            is_free: scope.kind() == EntityKind::Subscriber && input.is_free,
        };
        self.store.insert_plan(&plan).await?;

        tracing::info!(
            plan_id = %plan.id,
            kind = %plan.kind,
            value_cents = plan.value_cents,
            period_days = plan.period_days,
            "Created plan"
        );
        Ok(plan)
    }

    pub async fn list_plans(&self, scope: Scope) -> BillingResult<Vec<Plan>> {
        self.store.list_plans(scope).await
    }

    // ---------------------------------------------------------------------
    // Entities
    // ---------------------------------------------------------------------

    pub async fn list_entities(&self, scope: Scope) -> BillingResult<Vec<BillableEntity>> {
        self.store.list_entities(scope).await
    }

    pub async fn get_entity(&self, scope: Scope, id: Uuid) -> BillingResult<BillableEntity> {
        self.store
            .read_entity(scope, id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("{} {}", scope.kind(), id)))
    }

    /// Create a client or subscriber, recording the first payment if asked
    pub async fn create_entity(&self, scope: Scope, draft: NewEntity) -> BillingResult<Transition> {
        let plan = self.store.find_plan(scope, draft.plan_id).await?;
        let transition = lifecycle::create(scope, draft, plan.as_ref(), self.billing_day())?;

        self.store.insert_entity(&transition.entity).await?;
        self.append_entry(transition.entry.as_ref()).await?;

        tracing::info!(
            entity_id = %transition.entity.id,
            kind = %transition.entity.kind,
            status = %transition.entity.status,
            payment = ?transition.payment,
            "Created billable entity"
        );
        Ok(transition)
    }

    pub async fn update_entity(
        &self,
        scope: Scope,
        id: Uuid,
        changes: EntityChanges,
    ) -> BillingResult<BillableEntity> {
        let entity = self.get_entity(scope, id).await?;
        let new_plan = match changes.plan_id.filter(|p| Some(*p) != entity.plan_id) {
            Some(plan_id) => self.store.find_plan(scope, plan_id).await?,
            None => None,
        };

        let next = lifecycle::apply_update(&entity, changes, new_plan.as_ref(), self.billing_day())?;
        self.store.write_entity(&next).await?;

        if next.status != entity.status {
            tracing::info!(
                entity_id = %next.id,
                from = %entity.status,
                to = %next.status,
                "Entity status changed by update"
            );
        }
        Ok(next)
    }

    /// Advance one plan period and record the renewal payment
    pub async fn renew(&self, scope: Scope, id: Uuid) -> BillingResult<Transition> {
        let entity = self.get_entity(scope, id).await?;
        let plan = match entity.plan_id {
            Some(plan_id) => self.store.find_plan(scope, plan_id).await?,
            None => None,
        };

        let transition = lifecycle::renew(&entity, plan.as_ref(), self.billing_day())?;
        self.store.write_entity(&transition.entity).await?;
        self.append_entry(transition.entry.as_ref()).await?;

        tracing::info!(
            entity_id = %id,
            next_billing_date = ?transition.entity.next_billing_date,
            payment = ?transition.payment,
            "Renewed billable entity"
        );
        Ok(transition)
    }

    pub async fn set_due_today(&self, scope: Scope, id: Uuid) -> BillingResult<BillableEntity> {
        let entity = self.get_entity(scope, id).await?;
        let next = lifecycle::set_due_today(&entity, self.billing_day());
        self.store.write_entity(&next).await?;

        tracing::info!(entity_id = %id, next_billing_date = ?next.next_billing_date, "Billing date set to today");
        Ok(next)
    }

    pub async fn change_status(
        &self,
        scope: Scope,
        id: Uuid,
        requested: BillingStatus,
    ) -> BillingResult<BillableEntity> {
        let entity = self.get_entity(scope, id).await?;
        let next = lifecycle::change_status(&entity, requested, self.billing_day())?;
        self.store.write_entity(&next).await?;

        tracing::info!(entity_id = %id, from = %entity.status, to = %next.status, "Entity status set");
        Ok(next)
    }

    pub async fn delete_entity(&self, scope: Scope, id: Uuid) -> BillingResult<()> {
        if !self.store.delete_entity(scope, id).await? {
            return Err(BillingError::NotFound(format!("{} {}", scope.kind(), id)));
        }
        tracing::info!(entity_id = %id, kind = %scope.kind(), "Deleted billable entity");
        Ok(())
    }

    async fn append_entry(&self, entry: Option<&FinancialEntry>) -> BillingResult<()> {
        if let Some(entry) = entry {
            self.store.append_financial_entry(entry).await?;
            tracing::info!(
                entry_id = %entry.id,
                entry_type = %entry.entry_type,
                value_cents = entry.value_cents,
                "Recorded ledger entry"
            );
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Ledger
    // ---------------------------------------------------------------------

    pub async fn record_adjustment(
        &self,
        scope: Scope,
        input: AdjustmentInput,
    ) -> BillingResult<FinancialEntry> {
        let entry = FinancialEntry::new(
            scope,
            input.entry_type,
            input.description.trim(),
            input.value_cents,
            self.clock.now(),
        )?;
        self.append_entry(Some(&entry)).await?;
        Ok(entry)
    }

    pub async fn list_entries(&self, scope: Scope) -> BillingResult<Vec<FinancialEntry>> {
        self.store.list_financial_entries(scope).await
    }

    pub async fn ledger_summary(&self, scope: Scope) -> BillingResult<LedgerSummary> {
        let entries = self.store.list_financial_entries(scope).await?;
        LedgerSummary::from_entries(&entries)
    }

    pub async fn status_breakdown(&self, scope: Scope) -> BillingResult<StatusBreakdown> {
        let entities = self.store.list_entities(scope).await?;
        Ok(StatusBreakdown::from_entities(&entities))
    }

    // ---------------------------------------------------------------------
    // Automation rules
    // ---------------------------------------------------------------------

    pub async fn list_rules(&self, scope: Scope) -> BillingResult<Vec<AutomationRule>> {
        self.store.list_rules(scope).await
    }

    pub async fn get_rule(&self, scope: Scope, id: Uuid) -> BillingResult<AutomationRule> {
        self.store
            .find_rule(scope, id)
            .await?
            .ok_or_else(|| BillingError::NotFound(format!("automation rule {}", id)))
    }

    pub async fn create_rule(&self, scope: Scope, input: RuleInput) -> BillingResult<RuleSchedule> {
        let rule = input.into_rule(scope, self.clock.now())?;
        self.store.insert_rule(&rule).await?;
        tracing::info!(rule_id = %rule.id, targets = rule.target_ids.len(), "Created automation rule");
        self.reschedule_rule(rule).await
    }

    pub async fn update_rule(
        &self,
        scope: Scope,
        id: Uuid,
        input: RuleInput,
    ) -> BillingResult<RuleSchedule> {
        let existing = self.get_rule(scope, id).await?;
        let rule = input.apply_to(&existing, self.clock.now())?;
        self.store.update_rule(&rule).await?;
        tracing::info!(rule_id = %rule.id, targets = rule.target_ids.len(), "Updated automation rule");
        self.reschedule_rule(rule).await
    }

    /// Delete a rule and every notification it scheduled
    pub async fn delete_rule(&self, scope: Scope, id: Uuid) -> BillingResult<()> {
        let rule = self.get_rule(scope, id).await?;
        let removed = self.store.delete_notifications_for_rule(rule.id).await?;
        if !self.store.delete_rule(scope, rule.id).await? {
            return Err(BillingError::NotFound(format!("automation rule {}", id)));
        }
        tracing::info!(rule_id = %id, notifications_removed = removed, "Deleted automation rule");
        Ok(())
    }

    pub async fn list_rule_notifications(
        &self,
        scope: Scope,
        id: Uuid,
    ) -> BillingResult<Vec<ScheduledNotification>> {
        let rule = self.get_rule(scope, id).await?;
        self.store.list_notifications_for_rule(rule.id).await
    }

    /// Replace the rule's pending notifications with a freshly filtered set.
    ///
    /// Rows already sent or failed are kept. Re-running on unchanged data
    /// yields the same set, so a partial insert is repaired by calling this
    /// again.
    pub async fn reschedule_rule(&self, rule: AutomationRule) -> BillingResult<RuleSchedule> {
        let replaced = self.store.delete_pending_notifications(rule.id).await?;
        let entities = self.store.list_entities(rule.scope()).await?;
        let plan = schedule_notifications_for_rule(&rule, &entities, &self.tz, self.clock.now());

        self.store
            .insert_scheduled_notifications(&plan.notifications)
            .await?;

        tracing::info!(
            rule_id = %rule.id,
            replaced,
            scheduled = plan.notifications.len(),
            skipped = plan.skipped.len(),
            "Rescheduled automation rule"
        );

        Ok(RuleSchedule {
            rule,
            replaced,
            scheduled: plan.notifications,
            skipped: plan.skipped,
        })
    }

    // ---------------------------------------------------------------------
    // Status recompute sweep
    // ---------------------------------------------------------------------

    /// Bring every stored status of `kind` in line with today's date.
    ///
    /// Only rows whose status changes are written, and only the status
    /// column, guarded on the status and next billing date read at listing
    /// time. A row renewed or edited in between is left for the next run, as
    /// is a failed write.
    pub async fn sweep_statuses(&self, kind: EntityKind) -> BillingResult<SweepReport> {
        let day = self.billing_day();
        let entities = self.store.list_entities_of_kind(kind).await?;
        let mut report = SweepReport {
            examined: entities.len(),
            ..SweepReport::default()
        };

        for entity in entities {
            let status = lifecycle::recompute_status(&entity, day.today);
            if status == entity.status {
                continue;
            }

            match self
                .store
                .update_status_if_unchanged(&entity, status, day.now)
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    report.superseded += 1;
                    tracing::debug!(entity_id = %entity.id, "Entity changed during sweep, left as is");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(entity_id = %entity.id, error = %e, "Failed to write recomputed status");
                    continue;
                }
            }

            match status {
                BillingStatus::Overdue => report.marked_overdue += 1,
                _ => report.restored_active += 1,
            }
            tracing::debug!(
                entity_id = %entity.id,
                from = %entity.status,
                to = %status,
                "Recomputed status"
            );
        }

        tracing::info!(
            kind = %kind,
            today = %day.today,
            examined = report.examined,
            marked_overdue = report.marked_overdue,
            restored_active = report.restored_active,
            superseded = report.superseded,
            "Status sweep complete"
        );
        Ok(report)
    }
}
