//! Billing State Engine
//!
//! Pure decision logic for the subscription lifecycle of clients and
//! subscribers: given an entity and an operation it computes the next
//! `status`, the next billing date and the ledger entry (if any) the
//! operation produces. Nothing here performs I/O; the caller supplies
//! "today" through [`BillingDay`] and persists the result.
//!
//! ## Status rules
//!
//! | Operation        | Date                      | Status                                   |
//! |------------------|---------------------------|------------------------------------------|
//! | create           | as given                  | overdue if date < today (not free), else active |
//! | update (date)    | as given                  | overdue if date < today (not free), else prior inactive kept, else active |
//! | renew            | date + plan period        | active                                   |
//! | due today        | today                     | active                                   |
//! | status change    | unchanged                 | exactly the requested active/inactive    |
//! | recompute sweep  | unchanged                 | inactive kept, else derived from date    |

use acerto_shared::{BillingStatus, BusinessTimezone, Clock};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates::{parse_billing_date, shift_days};
use crate::entity::{BillableEntity, Plan, Scope};
use crate::error::{BillingError, BillingResult};
use crate::ledger::{FinancialEntry, MAX_ENTRY_CENTS};

/// The instant an operation runs at, with its local business date
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingDay {
    pub today: NaiveDate,
    pub now: DateTime<Utc>,
}

impl BillingDay {
    pub fn new(today: NaiveDate, now: DateTime<Utc>) -> Self {
        Self { today, now }
    }

    pub fn from_clock(clock: &dyn Clock, tz: &BusinessTimezone) -> Self {
        let now = clock.now();
        Self {
            today: tz.local_date(now),
            now,
        }
    }
}

/// Status implied by a billing date alone
pub fn derive_status(
    next_billing_date: Option<NaiveDate>,
    today: NaiveDate,
    plan_is_free: bool,
) -> BillingStatus {
    match next_billing_date {
        Some(date) if date < today && !plan_is_free => BillingStatus::Overdue,
        _ => BillingStatus::Active,
    }
}

/// Status after a date-touching change, honouring sticky `inactive`.
///
/// A date in the past always wins; otherwise an inactive entity stays
/// inactive and everything else becomes active.
pub fn resolve_status(
    prior: BillingStatus,
    next_billing_date: Option<NaiveDate>,
    today: NaiveDate,
    plan_is_free: bool,
) -> BillingStatus {
    match derive_status(next_billing_date, today, plan_is_free) {
        BillingStatus::Overdue => BillingStatus::Overdue,
        _ if prior == BillingStatus::Inactive => BillingStatus::Inactive,
        _ => BillingStatus::Active,
    }
}

/// Status the background sweep should store for `entity` today.
///
/// Unlike a date edit, the sweep never lifts an entity out of `inactive`.
pub fn recompute_status(entity: &BillableEntity, today: NaiveDate) -> BillingStatus {
    match entity.status {
        BillingStatus::Inactive => BillingStatus::Inactive,
        _ => derive_status(entity.next_billing_date, today, entity.plan_is_free),
    }
}

/// Input for creating a client or subscriber
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEntity {
    pub name: String,
    pub contact_handle: String,
    #[serde(default)]
    pub email: Option<String>,
    pub plan_id: Uuid,
    /// Calendar date, `YYYY-MM-DD`
    pub next_billing_date: String,
    /// Price override; defaults to the plan's current value
    #[serde(default)]
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub mark_as_paid: bool,
}

/// Field edits; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityChanges {
    pub name: Option<String>,
    pub contact_handle: Option<String>,
    /// An empty string clears the email
    pub email: Option<String>,
    pub plan_id: Option<Uuid>,
    pub price_cents: Option<i64>,
    pub next_billing_date: Option<String>,
}

/// What happened to a "mark as paid" request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDecision {
    NotRequested,
    Recorded,
    /// Overdue entities cannot be created as paid; nothing was recorded
    RejectedOverdue,
    /// Zero-priced entity; nothing to record
    NothingToRecord,
}

/// Result of an operation that may also produce a ledger entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub entity: BillableEntity,
    pub entry: Option<FinancialEntry>,
    pub payment: PaymentDecision,
}

fn resolve_plan<'a>(scope: Scope, plan: Option<&'a Plan>, plan_id: Uuid) -> BillingResult<&'a Plan> {
    let plan = plan
        .filter(|p| p.id == plan_id)
        .ok_or_else(|| BillingError::InvalidPlanReference(format!("plan {} not found", plan_id)))?;
    if plan.kind != scope.kind() {
        return Err(BillingError::InvalidPlanReference(format!(
            "plan {} is a {} plan",
            plan_id, plan.kind
        )));
    }
    Ok(plan)
}

fn require_text(field: &str, value: &str) -> BillingResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BillingError::InvalidInput(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn check_price(price_cents: i64) -> BillingResult<i64> {
    if price_cents < 0 {
        return Err(BillingError::InvalidInput(format!(
            "price cannot be negative, got {} cents",
            price_cents
        )));
    }
    if price_cents > MAX_ENTRY_CENTS {
        return Err(BillingError::InvalidInput(format!(
            "price exceeds {} cents, got {}",
            MAX_ENTRY_CENTS, price_cents
        )));
    }
    Ok(price_cents)
}

fn normalize_email(email: Option<String>) -> Option<String> {
    email
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
}

/// Create a new entity in `scope` on `plan`
pub fn create(
    scope: Scope,
    draft: NewEntity,
    plan: Option<&Plan>,
    day: BillingDay,
) -> BillingResult<Transition> {
    let next_billing_date = parse_billing_date(&draft.next_billing_date)?;
    let plan = resolve_plan(scope, plan, draft.plan_id)?;
    let name = require_text("name", &draft.name)?;
    let contact_handle = require_text("contact handle", &draft.contact_handle)?;
    let price_cents = check_price(draft.price_cents.unwrap_or(plan.value_cents))?;

    let status = derive_status(Some(next_billing_date), day.today, plan.is_free);

    let entity = BillableEntity {
        id: Uuid::new_v4(),
        kind: scope.kind(),
        owner_id: scope.owner_id(),
        name,
        contact_handle,
        email: normalize_email(draft.email),
        plan_id: Some(plan.id),
        plan_is_free: plan.is_free,
        price_cents,
        next_billing_date: Some(next_billing_date),
        due_date: Some(next_billing_date),
        status,
        created_at: day.now,
        updated_at: day.now,
    };

    let (entry, payment) = if !draft.mark_as_paid {
        (None, PaymentDecision::NotRequested)
    } else if status == BillingStatus::Overdue {
        tracing::warn!(
            entity_id = %entity.id,
            next_billing_date = %next_billing_date,
            "Ignoring mark-as-paid for an overdue entity"
        );
        (None, PaymentDecision::RejectedOverdue)
    } else {
        let description = format!("Payment - {}", entity.name);
        match FinancialEntry::payment(&entity, description, day.now) {
            Some(entry) => (Some(entry), PaymentDecision::Recorded),
            None => (None, PaymentDecision::NothingToRecord),
        }
    };

    Ok(Transition {
        entity,
        entry,
        payment,
    })
}

/// Apply field edits.
///
/// `new_plan` must be the plan named by `changes.plan_id` when that differs
/// from the entity's current plan. `due_date` is never touched.
pub fn apply_update(
    entity: &BillableEntity,
    changes: EntityChanges,
    new_plan: Option<&Plan>,
    day: BillingDay,
) -> BillingResult<BillableEntity> {
    let mut next = entity.clone();

    if let Some(name) = changes.name {
        next.name = require_text("name", &name)?;
    }
    if let Some(contact_handle) = changes.contact_handle {
        next.contact_handle = require_text("contact handle", &contact_handle)?;
    }
    if changes.email.is_some() {
        next.email = normalize_email(changes.email);
    }

    let mut plan_changed = false;
    if let Some(plan_id) = changes.plan_id.filter(|id| Some(*id) != entity.plan_id) {
        let plan = resolve_plan(entity.scope(), new_plan, plan_id)?;
        next.plan_id = Some(plan.id);
        next.plan_is_free = plan.is_free;
        next.price_cents = plan.value_cents;
        plan_changed = true;
    }
    if let Some(price_cents) = changes.price_cents {
        next.price_cents = check_price(price_cents)?;
    }

    let mut date_changed = false;
    if let Some(raw) = changes.next_billing_date {
        let date = parse_billing_date(&raw)?;
        date_changed = entity.next_billing_date != Some(date);
        next.next_billing_date = Some(date);
    }

    if date_changed || (plan_changed && next.plan_is_free != entity.plan_is_free) {
        next.status = resolve_status(
            entity.status,
            next.next_billing_date,
            day.today,
            next.plan_is_free,
        );
    }

    next.updated_at = day.now;
    Ok(next)
}

/// Advance the billing date by one plan period and record the payment
pub fn renew(
    entity: &BillableEntity,
    plan: Option<&Plan>,
    day: BillingDay,
) -> BillingResult<Transition> {
    let plan_id = entity.plan_id.ok_or_else(|| {
        BillingError::InvalidPlanReference(format!("{} {} has no plan", entity.kind, entity.id))
    })?;
    let plan = resolve_plan(entity.scope(), plan, plan_id)?;
    let period = plan.period().ok_or_else(|| {
        BillingError::InvalidPlanReference(format!(
            "plan {} has no billing period ({} days)",
            plan.id, plan.period_days
        ))
    })?;

    let base = entity.next_billing_date.unwrap_or(day.today);
    let next_billing_date = shift_days(base, i64::from(period)).ok_or_else(|| {
        BillingError::InvalidDate(format!("{} + {} days is out of range", base, period))
    })?;

    let mut next = entity.clone();
    next.next_billing_date = Some(next_billing_date);
    next.status = BillingStatus::Active;
    next.updated_at = day.now;

    let description = format!("Renewal - {}", next.name);
    let entry = FinancialEntry::payment(&next, description, day.now);
    let payment = if entry.is_some() {
        PaymentDecision::Recorded
    } else {
        PaymentDecision::NothingToRecord
    };

    Ok(Transition {
        entity: next,
        entry,
        payment,
    })
}

/// Move the billing date to today and reactivate
pub fn set_due_today(entity: &BillableEntity, day: BillingDay) -> BillableEntity {
    let mut next = entity.clone();
    next.next_billing_date = Some(day.today);
    next.status = BillingStatus::Active;
    next.updated_at = day.now;
    next
}

/// Explicitly set `active` or `inactive`.
///
/// The requested status is stored as-is even when the billing date is
/// already past; the recompute sweep reconciles it later.
pub fn change_status(
    entity: &BillableEntity,
    requested: BillingStatus,
    day: BillingDay,
) -> BillingResult<BillableEntity> {
    if requested == BillingStatus::Overdue {
        return Err(BillingError::StatusNotAssignable(requested));
    }
    let mut next = entity.clone();
    next.status = requested;
    next.updated_at = day.now;
    Ok(next)
}
