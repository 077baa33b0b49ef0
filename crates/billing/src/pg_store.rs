//! Postgres-backed persistence gateway

use acerto_shared::{BillingStatus, EntityKind, NotificationStatus};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::automation::{AutomationRule, ScheduledNotification};
use crate::entity::{BillableEntity, Plan, Scope};
use crate::error::{BillingError, BillingResult};
use crate::ledger::FinancialEntry;
use crate::store::BillingStore;

/// Postgres caps bind parameters per statement; 9 columns per row
const NOTIFICATION_INSERT_CHUNK: usize = 1_000;

/// Row type for client/subscriber reads
#[derive(Debug, sqlx::FromRow)]
struct EntityRow {
    id: Uuid,
    owner_id: Option<Uuid>,
    name: String,
    contact_handle: String,
    email: Option<String>,
    plan_id: Option<Uuid>,
    plan_is_free: bool,
    price_cents: i64,
    next_billing_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EntityRow {
    fn into_entity(self, kind: EntityKind) -> BillingResult<BillableEntity> {
        Ok(BillableEntity {
            id: self.id,
            kind,
            owner_id: self.owner_id,
            name: self.name,
            contact_handle: self.contact_handle,
            email: self.email,
            plan_id: self.plan_id,
            plan_is_free: self.plan_is_free,
            price_cents: self.price_cents,
            next_billing_date: self.next_billing_date,
            due_date: self.due_date,
            status: self.status.parse()?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Row type for plan reads
#[derive(Debug, sqlx::FromRow)]
struct PlanRow {
    id: Uuid,
    owner_id: Option<Uuid>,
    name: String,
    value_cents: i64,
    period_days: i32,
    is_free: bool,
}

impl PlanRow {
    fn into_plan(self, kind: EntityKind) -> Plan {
        Plan {
            id: self.id,
            kind,
            owner_id: self.owner_id,
            name: self.name,
            value_cents: self.value_cents,
            period_days: self.period_days,
            is_free: self.is_free,
        }
    }
}

/// Row type for ledger reads
#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: Uuid,
    owner_id: Option<Uuid>,
    description: String,
    value_cents: i64,
    entry_type: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for FinancialEntry {
    type Error = BillingError;

    fn try_from(row: EntryRow) -> BillingResult<Self> {
        Ok(FinancialEntry {
            id: row.id,
            owner_id: row.owner_id,
            description: row.description,
            value_cents: row.value_cents,
            entry_type: row.entry_type.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Row type for automation rule reads
#[derive(Debug, sqlx::FromRow)]
struct RuleRow {
    id: Uuid,
    kind: String,
    owner_id: Option<Uuid>,
    template_id: Uuid,
    scheduled_time: NaiveTime,
    days_offset: i32,
    target_ids: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for AutomationRule {
    type Error = BillingError;

    fn try_from(row: RuleRow) -> BillingResult<Self> {
        Ok(AutomationRule {
            id: row.id,
            kind: row.kind.parse()?,
            owner_id: row.owner_id,
            template_id: row.template_id,
            scheduled_time: row.scheduled_time,
            days_offset: row.days_offset,
            target_ids: row.target_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Row type for scheduled notification reads
#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    rule_id: Uuid,
    owner_id: Option<Uuid>,
    recipient_id: Uuid,
    recipient_name_snapshot: String,
    template_id: Uuid,
    send_at: DateTime<Utc>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for ScheduledNotification {
    type Error = BillingError;

    fn try_from(row: NotificationRow) -> BillingResult<Self> {
        Ok(ScheduledNotification {
            id: row.id,
            rule_id: row.rule_id,
            owner_id: row.owner_id,
            recipient_id: row.recipient_id,
            recipient_name_snapshot: row.recipient_name_snapshot,
            template_id: row.template_id,
            send_at_utc: row.send_at,
            status: row.status.parse::<NotificationStatus>()?,
            created_at: row.created_at,
        })
    }
}

/// SELECT list for entities of `kind`; `plan_is_free` comes from the plan join
fn entity_select(kind: EntityKind) -> String {
    let plan_flag = match kind {
        EntityKind::Client => "FALSE AS plan_is_free",
        EntityKind::Subscriber => "COALESCE(p.is_free, FALSE) AS plan_is_free",
    };
    format!(
        r#"
        SELECT
            e.id, e.owner_id, e.name, e.contact_handle, e.email, e.plan_id,
            {plan_flag},
            e.price_cents, e.next_billing_date, e.due_date, e.status,
            e.created_at, e.updated_at
        FROM {entities} e
        LEFT JOIN {plans} p ON p.id = e.plan_id
        "#,
        plan_flag = plan_flag,
        entities = kind.entity_table(),
        plans = kind.plan_table(),
    )
}

fn plan_select(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Client => {
            "SELECT id, owner_id, name, value_cents, period_days, FALSE AS is_free FROM plans WHERE owner_id IS NOT DISTINCT FROM $1"
        }
        EntityKind::Subscriber => {
            "SELECT id, NULL::uuid AS owner_id, name, value_cents, period_days, is_free FROM subscriber_plans WHERE $1::uuid IS NULL"
        }
    }
}

/// Postgres store
#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn insert_plan(&self, plan: &Plan) -> BillingResult<()> {
        match plan.kind {
            EntityKind::Client => {
                let owner_id = plan.owner_id.ok_or_else(|| {
                    BillingError::InvalidInput("client plans need an owner".to_string())
                })?;
                sqlx::query(
                    "INSERT INTO plans (id, owner_id, name, value_cents, period_days) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(plan.id)
                .bind(owner_id)
                .bind(&plan.name)
                .bind(plan.value_cents)
                .bind(plan.period_days)
                .execute(&self.pool)
                .await?;
            }
            EntityKind::Subscriber => {
                sqlx::query(
                    "INSERT INTO subscriber_plans (id, name, value_cents, period_days, is_free) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(plan.id)
                .bind(&plan.name)
                .bind(plan.value_cents)
                .bind(plan.period_days)
                .bind(plan.is_free)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn find_plan(&self, scope: Scope, plan_id: Uuid) -> BillingResult<Option<Plan>> {
        let sql = format!("{} AND id = $2", plan_select(scope.kind()));
        let row: Option<PlanRow> = sqlx::query_as(&sql)
            .bind(scope.owner_id())
            .bind(plan_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.into_plan(scope.kind())))
    }

    async fn list_plans(&self, scope: Scope) -> BillingResult<Vec<Plan>> {
        let sql = format!("{} ORDER BY name", plan_select(scope.kind()));
        let rows: Vec<PlanRow> = sqlx::query_as(&sql)
            .bind(scope.owner_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.into_plan(scope.kind())).collect())
    }

    async fn read_entity(&self, scope: Scope, id: Uuid) -> BillingResult<Option<BillableEntity>> {
        let kind = scope.kind();
        let sql = format!(
            "{} WHERE e.id = $1 AND e.owner_id IS NOT DISTINCT FROM $2",
            entity_select(kind)
        );
        let row: Option<EntityRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(scope.owner_id())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.into_entity(kind)).transpose()
    }

    async fn list_entities(&self, scope: Scope) -> BillingResult<Vec<BillableEntity>> {
        let kind = scope.kind();
        let sql = format!(
            "{} WHERE e.owner_id IS NOT DISTINCT FROM $1 ORDER BY e.name",
            entity_select(kind)
        );
        let rows: Vec<EntityRow> = sqlx::query_as(&sql)
            .bind(scope.owner_id())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.into_entity(kind)).collect()
    }

    async fn list_entities_of_kind(&self, kind: EntityKind) -> BillingResult<Vec<BillableEntity>> {
        let rows: Vec<EntityRow> = sqlx::query_as(&entity_select(kind))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.into_entity(kind)).collect()
    }

    async fn insert_entity(&self, entity: &BillableEntity) -> BillingResult<()> {
        let sql = format!(
            r#"
            INSERT INTO {} (
                id, owner_id, name, contact_handle, email, plan_id, price_cents,
                next_billing_date, due_date, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
            entity.kind.entity_table()
        );
        sqlx::query(&sql)
            .bind(entity.id)
            .bind(entity.owner_id)
            .bind(&entity.name)
            .bind(&entity.contact_handle)
            .bind(&entity.email)
            .bind(entity.plan_id)
            .bind(entity.price_cents)
            .bind(entity.next_billing_date)
            .bind(entity.due_date)
            .bind(entity.status.as_str())
            .bind(entity.created_at)
            .bind(entity.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn write_entity(&self, entity: &BillableEntity) -> BillingResult<()> {
        // due_date is write-once and deliberately absent here
        let sql = format!(
            r#"
            UPDATE {}
            SET name = $2,
                contact_handle = $3,
                email = $4,
                plan_id = $5,
                price_cents = $6,
                next_billing_date = $7,
                status = $8,
                updated_at = $9
            WHERE id = $1
            "#,
            entity.kind.entity_table()
        );
        let result = sqlx::query(&sql)
            .bind(entity.id)
            .bind(&entity.name)
            .bind(&entity.contact_handle)
            .bind(&entity.email)
            .bind(entity.plan_id)
            .bind(entity.price_cents)
            .bind(entity.next_billing_date)
            .bind(entity.status.as_str())
            .bind(entity.updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!(
                "{} {}",
                entity.kind, entity.id
            )));
        }
        Ok(())
    }

    async fn update_status_if_unchanged(
        &self,
        observed: &BillableEntity,
        status: BillingStatus,
        at: DateTime<Utc>,
    ) -> BillingResult<bool> {
        let sql = format!(
            r#"
            UPDATE {}
            SET status = $2,
                updated_at = $3
            WHERE id = $1
              AND status = $4
              AND next_billing_date IS NOT DISTINCT FROM $5
            "#,
            observed.kind.entity_table()
        );
        let result = sqlx::query(&sql)
            .bind(observed.id)
            .bind(status.as_str())
            .bind(at)
            .bind(observed.status.as_str())
            .bind(observed.next_billing_date)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_entity(&self, scope: Scope, id: Uuid) -> BillingResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE id = $1 AND owner_id IS NOT DISTINCT FROM $2",
            scope.kind().entity_table()
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(scope.owner_id())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_financial_entry(&self, entry: &FinancialEntry) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO financial_entries (id, owner_id, description, value_cents, entry_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.owner_id)
        .bind(&entry.description)
        .bind(entry.value_cents)
        .bind(entry.entry_type.as_str())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_financial_entries(&self, scope: Scope) -> BillingResult<Vec<FinancialEntry>> {
        let rows: Vec<EntryRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, description, value_cents, entry_type, created_at
            FROM financial_entries
            WHERE owner_id IS NOT DISTINCT FROM $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(scope.owner_id())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(FinancialEntry::try_from).collect()
    }

    async fn insert_rule(&self, rule: &AutomationRule) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_rules (
                id, kind, owner_id, template_id, scheduled_time, days_offset,
                target_ids, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(rule.id)
        .bind(rule.kind.as_str())
        .bind(rule.owner_id)
        .bind(rule.template_id)
        .bind(rule.scheduled_time)
        .bind(rule.days_offset)
        .bind(&rule.target_ids)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_rule(&self, scope: Scope, id: Uuid) -> BillingResult<Option<AutomationRule>> {
        let row: Option<RuleRow> = sqlx::query_as(
            r#"
            SELECT id, kind, owner_id, template_id, scheduled_time, days_offset,
                   target_ids, created_at, updated_at
            FROM automation_rules
            WHERE id = $1 AND kind = $2 AND owner_id IS NOT DISTINCT FROM $3
            "#,
        )
        .bind(id)
        .bind(scope.kind().as_str())
        .bind(scope.owner_id())
        .fetch_optional(&self.pool)
        .await?;
        row.map(AutomationRule::try_from).transpose()
    }

    async fn list_rules(&self, scope: Scope) -> BillingResult<Vec<AutomationRule>> {
        let rows: Vec<RuleRow> = sqlx::query_as(
            r#"
            SELECT id, kind, owner_id, template_id, scheduled_time, days_offset,
                   target_ids, created_at, updated_at
            FROM automation_rules
            WHERE kind = $1 AND owner_id IS NOT DISTINCT FROM $2
            ORDER BY created_at
            "#,
        )
        .bind(scope.kind().as_str())
        .bind(scope.owner_id())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AutomationRule::try_from).collect()
    }

    async fn update_rule(&self, rule: &AutomationRule) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE automation_rules
            SET template_id = $2,
                scheduled_time = $3,
                days_offset = $4,
                target_ids = $5,
                updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(rule.id)
        .bind(rule.template_id)
        .bind(rule.scheduled_time)
        .bind(rule.days_offset)
        .bind(&rule.target_ids)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!("automation rule {}", rule.id)));
        }
        Ok(())
    }

    async fn delete_rule(&self, scope: Scope, id: Uuid) -> BillingResult<bool> {
        // scheduled_notifications rows go with it (ON DELETE CASCADE)
        let result = sqlx::query(
            "DELETE FROM automation_rules WHERE id = $1 AND kind = $2 AND owner_id IS NOT DISTINCT FROM $3",
        )
        .bind(id)
        .bind(scope.kind().as_str())
        .bind(scope.owner_id())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_scheduled_notifications(
        &self,
        rows: &[ScheduledNotification],
    ) -> BillingResult<()> {
        for chunk in rows.chunks(NOTIFICATION_INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO scheduled_notifications (id, rule_id, owner_id, recipient_id, recipient_name_snapshot, template_id, send_at, status, created_at) ",
            );
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.rule_id)
                    .push_bind(row.owner_id)
                    .push_bind(row.recipient_id)
                    .push_bind(row.recipient_name_snapshot.clone())
                    .push_bind(row.template_id)
                    .push_bind(row.send_at_utc)
                    .push_bind(row.status.as_str())
                    .push_bind(row.created_at);
            });
            builder.build().execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn delete_pending_notifications(&self, rule_id: Uuid) -> BillingResult<u64> {
        let result = sqlx::query(
            "DELETE FROM scheduled_notifications WHERE rule_id = $1 AND status = 'pending'",
        )
        .bind(rule_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_notifications_for_rule(&self, rule_id: Uuid) -> BillingResult<u64> {
        let result = sqlx::query("DELETE FROM scheduled_notifications WHERE rule_id = $1")
            .bind(rule_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_notifications_for_rule(
        &self,
        rule_id: Uuid,
    ) -> BillingResult<Vec<ScheduledNotification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            r#"
            SELECT id, rule_id, owner_id, recipient_id, recipient_name_snapshot,
                   template_id, send_at, status, created_at
            FROM scheduled_notifications
            WHERE rule_id = $1
            ORDER BY send_at
            "#,
        )
        .bind(rule_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(ScheduledNotification::try_from)
            .collect()
    }
}
