//! Shared domain enums
//!
//! These are stored as lowercase text columns and serialized the same way
//! over the API, so `as_str` and `FromStr` must stay in sync with serde.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Billing status of a client or subscriber.
///
/// Precedence when a status is (re)computed from a billing date:
///
/// 1. `Overdue`, derived from a billing date strictly before today
///    (never for free plans)
/// 2. `Inactive`, sticky: survives date changes until an explicit
///    reactivation, renewal or due-today transition
/// 3. `Active`, the derived default
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingStatus {
    Active,
    Overdue,
    Inactive,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Active => "active",
            BillingStatus::Overdue => "overdue",
            BillingStatus::Inactive => "inactive",
        }
    }

    /// Whether entities in this status receive automated notifications
    pub fn is_notifiable(&self) -> bool {
        matches!(self, BillingStatus::Active | BillingStatus::Overdue)
    }
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BillingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(BillingStatus::Active),
            "overdue" => Ok(BillingStatus::Overdue),
            "inactive" => Ok(BillingStatus::Inactive),
            other => Err(UnknownVariant::new("billing status", other)),
        }
    }
}

/// Which family a billable entity belongs to.
///
/// Clients are billed by a tenant, subscribers by the platform itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Client,
    Subscriber,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Client => "client",
            EntityKind::Subscriber => "subscriber",
        }
    }

    /// Table holding entities of this kind
    pub fn entity_table(&self) -> &'static str {
        match self {
            EntityKind::Client => "clients",
            EntityKind::Subscriber => "subscribers",
        }
    }

    /// Table holding plans for this kind
    pub fn plan_table(&self) -> &'static str {
        match self {
            EntityKind::Client => "plans",
            EntityKind::Subscriber => "subscriber_plans",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(EntityKind::Client),
            "subscriber" => Ok(EntityKind::Subscriber),
            other => Err(UnknownVariant::new("entity kind", other)),
        }
    }
}

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Credit,
    Debit,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Credit => "credit",
            EntryType::Debit => "debit",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(EntryType::Credit),
            "debit" => Ok(EntryType::Debit),
            other => Err(UnknownVariant::new("entry type", other)),
        }
    }
}

/// Delivery status of a scheduled notification.
///
/// Only `Pending` is ever written by this codebase; the external sender
/// moves rows to `Sent` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NotificationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NotificationStatus::Pending),
            "sent" => Ok(NotificationStatus::Sent),
            "failed" => Ok(NotificationStatus::Failed),
            other => Err(UnknownVariant::new("notification status", other)),
        }
    }
}

/// A stored text value that does not name any known variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {what}: '{value}'")]
pub struct UnknownVariant {
    pub what: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}
