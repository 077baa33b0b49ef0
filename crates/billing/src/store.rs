//! Persistence gateway
//!
//! [`BillingStore`] is everything the billing service needs from storage.
//! [`PgBillingStore`](crate::pg_store::PgBillingStore) backs it with Postgres;
//! [`InMemoryBillingStore`] keeps everything in process for tests and local
//! runs.
//!
//! Writes are single-row and last-write-wins. `write_entity` never rewrites
//! an entity's `due_date`. The recompute sweep uses
//! `update_status_if_unchanged` instead, so it cannot undo a concurrent
//! renewal or status change.

use std::collections::HashMap;

use acerto_shared::{BillingStatus, EntityKind, NotificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::automation::{AutomationRule, ScheduledNotification};
use crate::entity::{BillableEntity, Plan, Scope};
use crate::error::{BillingError, BillingResult};
use crate::ledger::FinancialEntry;

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn insert_plan(&self, plan: &Plan) -> BillingResult<()>;
    async fn find_plan(&self, scope: Scope, plan_id: Uuid) -> BillingResult<Option<Plan>>;
    async fn list_plans(&self, scope: Scope) -> BillingResult<Vec<Plan>>;

    async fn read_entity(&self, scope: Scope, id: Uuid) -> BillingResult<Option<BillableEntity>>;
    async fn list_entities(&self, scope: Scope) -> BillingResult<Vec<BillableEntity>>;
    /// Every entity of a family across all owners, for the recompute sweep
    async fn list_entities_of_kind(&self, kind: EntityKind) -> BillingResult<Vec<BillableEntity>>;
    async fn insert_entity(&self, entity: &BillableEntity) -> BillingResult<()>;
    async fn write_entity(&self, entity: &BillableEntity) -> BillingResult<()>;
    /// Set only status and `updated_at`, and only while the stored row still
    /// has the `observed` status and next billing date. Returns whether the
    /// row changed.
    async fn update_status_if_unchanged(
        &self,
        observed: &BillableEntity,
        status: BillingStatus,
        at: DateTime<Utc>,
    ) -> BillingResult<bool>;
    async fn delete_entity(&self, scope: Scope, id: Uuid) -> BillingResult<bool>;

    async fn append_financial_entry(&self, entry: &FinancialEntry) -> BillingResult<()>;
    async fn list_financial_entries(&self, scope: Scope) -> BillingResult<Vec<FinancialEntry>>;

    async fn insert_rule(&self, rule: &AutomationRule) -> BillingResult<()>;
    async fn find_rule(&self, scope: Scope, id: Uuid) -> BillingResult<Option<AutomationRule>>;
    async fn list_rules(&self, scope: Scope) -> BillingResult<Vec<AutomationRule>>;
    async fn update_rule(&self, rule: &AutomationRule) -> BillingResult<()>;
    async fn delete_rule(&self, scope: Scope, id: Uuid) -> BillingResult<bool>;

    /// Insert a batch; an empty batch is a successful no-op
    async fn insert_scheduled_notifications(
        &self,
        rows: &[ScheduledNotification],
    ) -> BillingResult<()>;
    /// Remove the rule's rows the sender has not picked up yet
    async fn delete_pending_notifications(&self, rule_id: Uuid) -> BillingResult<u64>;
    async fn delete_notifications_for_rule(&self, rule_id: Uuid) -> BillingResult<u64>;
    async fn list_notifications_for_rule(
        &self,
        rule_id: Uuid,
    ) -> BillingResult<Vec<ScheduledNotification>>;
}

fn plan_in_scope(plan: &Plan, scope: Scope) -> bool {
    plan.kind == scope.kind() && plan.owner_id == scope.owner_id()
}

fn entity_in_scope(entity: &BillableEntity, scope: Scope) -> bool {
    entity.kind == scope.kind() && entity.owner_id == scope.owner_id()
}

fn rule_in_scope(rule: &AutomationRule, scope: Scope) -> bool {
    rule.kind == scope.kind() && rule.owner_id == scope.owner_id()
}

#[derive(Debug, Default)]
struct MemoryState {
    plans: HashMap<Uuid, Plan>,
    entities: HashMap<Uuid, BillableEntity>,
    entries: Vec<FinancialEntry>,
    rules: HashMap<Uuid, AutomationRule>,
    notifications: Vec<ScheduledNotification>,
}

/// In-process store
#[derive(Debug, Default)]
pub struct InMemoryBillingStore {
    state: RwLock<MemoryState>,
}

impl InMemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a row as handled by the external sender
    pub async fn set_notification_status(&self, id: Uuid, status: NotificationStatus) {
        let mut state = self.state.write().await;
        if let Some(row) = state.notifications.iter_mut().find(|n| n.id == id) {
            row.status = status;
        }
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn insert_plan(&self, plan: &Plan) -> BillingResult<()> {
        self.state.write().await.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn find_plan(&self, scope: Scope, plan_id: Uuid) -> BillingResult<Option<Plan>> {
        let state = self.state.read().await;
        Ok(state
            .plans
            .get(&plan_id)
            .filter(|p| plan_in_scope(p, scope))
            .cloned())
    }

    async fn list_plans(&self, scope: Scope) -> BillingResult<Vec<Plan>> {
        let state = self.state.read().await;
        let mut plans: Vec<Plan> = state
            .plans
            .values()
            .filter(|p| plan_in_scope(p, scope))
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plans)
    }

    async fn read_entity(&self, scope: Scope, id: Uuid) -> BillingResult<Option<BillableEntity>> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .get(&id)
            .filter(|e| entity_in_scope(e, scope))
            .map(|e| with_plan_flag(e, &state.plans)))
    }

    async fn list_entities(&self, scope: Scope) -> BillingResult<Vec<BillableEntity>> {
        let state = self.state.read().await;
        let mut entities: Vec<BillableEntity> = state
            .entities
            .values()
            .filter(|e| entity_in_scope(e, scope))
            .map(|e| with_plan_flag(e, &state.plans))
            .collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entities)
    }

    async fn list_entities_of_kind(&self, kind: EntityKind) -> BillingResult<Vec<BillableEntity>> {
        let state = self.state.read().await;
        Ok(state
            .entities
            .values()
            .filter(|e| e.kind == kind)
            .map(|e| with_plan_flag(e, &state.plans))
            .collect())
    }

    async fn insert_entity(&self, entity: &BillableEntity) -> BillingResult<()> {
        let mut state = self.state.write().await;
        if state.entities.contains_key(&entity.id) {
            return Err(BillingError::InvalidInput(format!(
                "{} {} already exists",
                entity.kind, entity.id
            )));
        }
        state.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    async fn write_entity(&self, entity: &BillableEntity) -> BillingResult<()> {
        let mut state = self.state.write().await;
        let existing = state
            .entities
            .get_mut(&entity.id)
            .ok_or_else(|| BillingError::NotFound(format!("{} {}", entity.kind, entity.id)))?;
        let due_date = existing.due_date;
        *existing = entity.clone();
        existing.due_date = due_date;
        Ok(())
    }

    async fn update_status_if_unchanged(
        &self,
        observed: &BillableEntity,
        status: BillingStatus,
        at: DateTime<Utc>,
    ) -> BillingResult<bool> {
        let mut state = self.state.write().await;
        match state.entities.get_mut(&observed.id) {
            Some(current)
                if current.status == observed.status
                    && current.next_billing_date == observed.next_billing_date =>
            {
                current.status = status;
                current.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_entity(&self, scope: Scope, id: Uuid) -> BillingResult<bool> {
        let mut state = self.state.write().await;
        let in_scope = state
            .entities
            .get(&id)
            .is_some_and(|e| entity_in_scope(e, scope));
        if in_scope {
            state.entities.remove(&id);
        }
        Ok(in_scope)
    }

    async fn append_financial_entry(&self, entry: &FinancialEntry) -> BillingResult<()> {
        self.state.write().await.entries.push(entry.clone());
        Ok(())
    }

    async fn list_financial_entries(&self, scope: Scope) -> BillingResult<Vec<FinancialEntry>> {
        let state = self.state.read().await;
        let mut entries: Vec<FinancialEntry> = state
            .entries
            .iter()
            .filter(|e| e.owner_id == scope.owner_id())
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn insert_rule(&self, rule: &AutomationRule) -> BillingResult<()> {
        self.state.write().await.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn find_rule(&self, scope: Scope, id: Uuid) -> BillingResult<Option<AutomationRule>> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .get(&id)
            .filter(|r| rule_in_scope(r, scope))
            .cloned())
    }

    async fn list_rules(&self, scope: Scope) -> BillingResult<Vec<AutomationRule>> {
        let state = self.state.read().await;
        let mut rules: Vec<AutomationRule> = state
            .rules
            .values()
            .filter(|r| rule_in_scope(r, scope))
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(rules)
    }

    async fn update_rule(&self, rule: &AutomationRule) -> BillingResult<()> {
        let mut state = self.state.write().await;
        let existing = state
            .rules
            .get_mut(&rule.id)
            .ok_or_else(|| BillingError::NotFound(format!("automation rule {}", rule.id)))?;
        *existing = rule.clone();
        Ok(())
    }

    async fn delete_rule(&self, scope: Scope, id: Uuid) -> BillingResult<bool> {
        let mut state = self.state.write().await;
        let in_scope = state.rules.get(&id).is_some_and(|r| rule_in_scope(r, scope));
        if in_scope {
            state.rules.remove(&id);
            state.notifications.retain(|n| n.rule_id != id);
        }
        Ok(in_scope)
    }

    async fn insert_scheduled_notifications(
        &self,
        rows: &[ScheduledNotification],
    ) -> BillingResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        self.state
            .write()
            .await
            .notifications
            .extend(rows.iter().cloned());
        Ok(())
    }

    async fn delete_pending_notifications(&self, rule_id: Uuid) -> BillingResult<u64> {
        let mut state = self.state.write().await;
        let before = state.notifications.len();
        state
            .notifications
            .retain(|n| !(n.rule_id == rule_id && n.status == NotificationStatus::Pending));
        Ok((before - state.notifications.len()) as u64)
    }

    async fn delete_notifications_for_rule(&self, rule_id: Uuid) -> BillingResult<u64> {
        let mut state = self.state.write().await;
        let before = state.notifications.len();
        state.notifications.retain(|n| n.rule_id != rule_id);
        Ok((before - state.notifications.len()) as u64)
    }

    async fn list_notifications_for_rule(
        &self,
        rule_id: Uuid,
    ) -> BillingResult<Vec<ScheduledNotification>> {
        let state = self.state.read().await;
        let mut rows: Vec<ScheduledNotification> = state
            .notifications
            .iter()
            .filter(|n| n.rule_id == rule_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.send_at_utc.cmp(&b.send_at_utc));
        Ok(rows)
    }
}

/// Refresh the denormalised free-plan flag from the current plan
fn with_plan_flag(entity: &BillableEntity, plans: &HashMap<Uuid, Plan>) -> BillableEntity {
    let mut entity = entity.clone();
    entity.plan_is_free = entity
        .plan_id
        .and_then(|id| plans.get(&id))
        .is_some_and(|p| p.is_free);
    entity
}
