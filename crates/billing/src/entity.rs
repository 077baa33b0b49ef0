//! Billable entities and plans

use acerto_shared::{BillingStatus, EntityKind};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A plan an entity is billed on.
///
/// Client plans are never free; only subscriber plans carry the flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub kind: EntityKind,
    /// Tenant owning the plan (None for platform plans)
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub value_cents: i64,
    pub period_days: i32,
    pub is_free: bool,
}

impl Plan {
    /// Billing period, if the plan has a usable one
    pub fn period(&self) -> Option<u32> {
        u32::try_from(self.period_days).ok().filter(|days| *days > 0)
    }
}

/// Who an entity or ledger row belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    /// A tenant and its clients
    Tenant(Uuid),
    /// The platform and its subscribers
    Platform,
}

impl Scope {
    pub fn owner_id(&self) -> Option<Uuid> {
        match self {
            Scope::Tenant(id) => Some(*id),
            Scope::Platform => None,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Scope::Tenant(_) => EntityKind::Client,
            Scope::Platform => EntityKind::Subscriber,
        }
    }
}

/// A client (billed by a tenant) or a subscriber (billed by the platform)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableEntity {
    pub id: Uuid,
    pub kind: EntityKind,
    pub owner_id: Option<Uuid>,
    pub name: String,
    pub contact_handle: String,
    pub email: Option<String>,
    pub plan_id: Option<Uuid>,
    /// Whether the current plan is free, resolved when the row is read
    pub plan_is_free: bool,
    /// Price snapshot taken when the plan was assigned
    pub price_cents: i64,
    pub next_billing_date: Option<NaiveDate>,
    /// Billing date at creation; never rewritten
    pub due_date: Option<NaiveDate>,
    pub status: BillingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillableEntity {
    pub fn scope(&self) -> Scope {
        match (self.kind, self.owner_id) {
            (EntityKind::Client, Some(owner)) => Scope::Tenant(owner),
            _ => Scope::Platform,
        }
    }

    /// Whether the billing date lies strictly before `today`
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.next_billing_date.is_some_and(|date| date < today)
    }
}
