//! Financial ledger
//!
//! Append-only credit/debit rows plus the aggregations shown on the
//! financial dashboards (totals, balance, status breakdown).

use acerto_shared::{BillingStatus, EntryType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{BillableEntity, Scope};
use crate::error::{BillingError, BillingResult};

/// Largest single ledger value or price accepted, in cents
pub const MAX_ENTRY_CENTS: i64 = 100_000_000_000;

/// One ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialEntry {
    pub id: Uuid,
    /// Tenant owning the row (None for the platform ledger)
    pub owner_id: Option<Uuid>,
    pub description: String,
    pub value_cents: i64,
    pub entry_type: EntryType,
    pub created_at: DateTime<Utc>,
}

impl FinancialEntry {
    /// Build a validated entry; values must be in `1..=MAX_ENTRY_CENTS`
    pub fn new(
        scope: Scope,
        entry_type: EntryType,
        description: impl Into<String>,
        value_cents: i64,
        created_at: DateTime<Utc>,
    ) -> BillingResult<Self> {
        if value_cents <= 0 {
            return Err(BillingError::InvalidInput(format!(
                "ledger value must be positive, got {} cents",
                value_cents
            )));
        }
        if value_cents > MAX_ENTRY_CENTS {
            return Err(BillingError::InvalidInput(format!(
                "ledger value exceeds {} cents, got {}",
                MAX_ENTRY_CENTS, value_cents
            )));
        }
        let description = description.into();
        if description.trim().is_empty() {
            return Err(BillingError::InvalidInput(
                "ledger description is required".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            owner_id: scope.owner_id(),
            description,
            value_cents,
            entry_type,
            created_at,
        })
    }

    /// Credit for a payment received from `entity`.
    ///
    /// Returns `None` for zero-priced entities, which have nothing to record.
    pub(crate) fn payment(
        entity: &BillableEntity,
        description: String,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        Self::new(
            entity.scope(),
            EntryType::Credit,
            description,
            entity.price_cents,
            at,
        )
        .ok()
    }

    /// Signed contribution to the balance
    pub fn signed_cents(&self) -> i64 {
        match self.entry_type {
            EntryType::Credit => self.value_cents,
            EntryType::Debit => -self.value_cents,
        }
    }
}

/// Totals over a set of ledger rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub total_credits_cents: i64,
    pub total_debits_cents: i64,
    pub balance_cents: i64,
    pub entry_count: usize,
}

impl LedgerSummary {
    /// Totals over `entries`; fails instead of wrapping when a sum leaves
    /// the `i64` range.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a FinancialEntry>,
    ) -> BillingResult<Self> {
        let mut summary = Self::default();
        for entry in entries {
            let total = match entry.entry_type {
                EntryType::Credit => &mut summary.total_credits_cents,
                EntryType::Debit => &mut summary.total_debits_cents,
            };
            *total = total
                .checked_add(entry.value_cents)
                .ok_or_else(|| overflow(entry.entry_type))?;
            summary.entry_count += 1;
        }
        summary.balance_cents = summary
            .total_credits_cents
            .checked_sub(summary.total_debits_cents)
            .ok_or_else(|| BillingError::InvalidInput("ledger balance overflows".to_string()))?;
        Ok(summary)
    }
}

fn overflow(entry_type: EntryType) -> BillingError {
    BillingError::InvalidInput(format!("ledger {} total overflows", entry_type))
}

/// Entity counts per status for the dashboard cards
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusBreakdown {
    pub total: usize,
    pub active: usize,
    pub overdue: usize,
    pub inactive: usize,
    /// Share of overdue entities, one decimal place
    pub overdue_percent: f64,
}

impl StatusBreakdown {
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a BillableEntity>) -> Self {
        let mut breakdown = Self::default();
        for entity in entities {
            breakdown.total += 1;
            match entity.status {
                BillingStatus::Active => breakdown.active += 1,
                BillingStatus::Overdue => breakdown.overdue += 1,
                BillingStatus::Inactive => breakdown.inactive += 1,
            }
        }
        if breakdown.total > 0 {
            let percent = breakdown.overdue as f64 * 100.0 / breakdown.total as f64;
            breakdown.overdue_percent = (percent * 10.0).round() / 10.0;
        }
        breakdown
    }
}
