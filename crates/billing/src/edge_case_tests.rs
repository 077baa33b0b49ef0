// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Billing Core
//!
//! Cross-cutting boundary conditions:
//! - Local midnight and the business date (BILL-D01 to BILL-D04)
//! - Status precedence across operations (BILL-S01 to BILL-S06)
//! - Notification scheduling through the service (BILL-N01 to BILL-N05)
//! - Ledger effects (BILL-L01 to BILL-L03)

#[cfg(test)]
mod support {
    use std::sync::Arc;

    use acerto_shared::{BusinessTimezone, FixedClock};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use uuid::Uuid;

    use crate::entity::{Plan, Scope};
    use crate::lifecycle::NewEntity;
    use crate::service::{BillingService, PlanInput};
    use crate::store::InMemoryBillingStore;

    pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    pub struct Harness {
        pub service: BillingService,
        pub store: Arc<InMemoryBillingStore>,
        pub clock: Arc<FixedClock>,
        pub tenant: Scope,
    }

    pub fn harness_at(now: DateTime<Utc>) -> Harness {
        let store = Arc::new(InMemoryBillingStore::new());
        let clock = Arc::new(FixedClock::new(now));
        let service = BillingService::new(store.clone(), clock.clone(), BusinessTimezone::default());
        Harness {
            service,
            store,
            clock,
            tenant: Scope::Tenant(Uuid::new_v4()),
        }
    }

    pub async fn plan(h: &Harness, scope: Scope, value_cents: i64, period_days: i32, is_free: bool) -> Plan {
        h.service
            .create_plan(
                scope,
                PlanInput {
                    name: format!("Plano {}d", period_days),
                    value_cents,
                    period_days,
                    is_free,
                },
            )
            .await
            .unwrap()
    }

    pub fn draft(plan: &Plan, name: &str, next_billing_date: &str, mark_as_paid: bool) -> NewEntity {
        NewEntity {
            name: name.to_string(),
            contact_handle: "@cliente".to_string(),
            email: Some("cliente@example.com".to_string()),
            plan_id: plan.id,
            next_billing_date: next_billing_date.to_string(),
            price_cents: None,
            mark_as_paid,
        }
    }
}

#[cfg(test)]
mod business_date_tests {
    use super::support::*;
    use acerto_shared::BillingStatus;

    // =========================================================================
    // BILL-D01: 23:59 local on the due date - still today, not overdue
    // =========================================================================
    #[tokio::test]
    async fn test_due_date_is_active_until_local_midnight() {
        // 02:59 UTC on the 11th is 23:59 on the 10th in Sao Paulo
        let h = harness_at(utc(2024, 3, 11, 2, 59));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;

        let created = h
            .service
            .create_entity(h.tenant, draft(&plan, "Ana", "2024-03-10", false))
            .await
            .unwrap();
        assert_eq!(created.entity.status, BillingStatus::Active);
    }

    // =========================================================================
    // BILL-D02: 00:00 local the day after - overdue although UTC date matches
    // =========================================================================
    #[tokio::test]
    async fn test_local_midnight_flips_to_overdue() {
        // 03:00 UTC on the 11th is 00:00 on the 11th in Sao Paulo
        let h = harness_at(utc(2024, 3, 11, 3, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;

        let created = h
            .service
            .create_entity(h.tenant, draft(&plan, "Ana", "2024-03-10", false))
            .await
            .unwrap();
        assert_eq!(created.entity.status, BillingStatus::Overdue);
    }

    // =========================================================================
    // BILL-D03: Sweep run across local midnight marks the entity overdue
    // =========================================================================
    #[tokio::test]
    async fn test_sweep_after_midnight_marks_overdue() {
        let h = harness_at(utc(2024, 3, 11, 2, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let created = h
            .service
            .create_entity(h.tenant, draft(&plan, "Ana", "2024-03-10", false))
            .await
            .unwrap();

        let before = h.service.sweep_statuses(acerto_shared::EntityKind::Client).await.unwrap();
        assert_eq!(before.changed(), 0);

        h.clock.advance(chrono::Duration::hours(2));
        let after = h.service.sweep_statuses(acerto_shared::EntityKind::Client).await.unwrap();
        assert_eq!(after.marked_overdue, 1);

        let stored = h.service.get_entity(h.tenant, created.entity.id).await.unwrap();
        assert_eq!(stored.status, BillingStatus::Overdue);
    }

    // =========================================================================
    // BILL-D04: Set-Due-Today uses the local date, not the UTC date
    // =========================================================================
    #[tokio::test]
    async fn test_due_today_uses_local_date() {
        let h = harness_at(utc(2024, 3, 11, 1, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let created = h
            .service
            .create_entity(h.tenant, draft(&plan, "Ana", "2024-02-01", false))
            .await
            .unwrap();

        let due = h.service.set_due_today(h.tenant, created.entity.id).await.unwrap();
        assert_eq!(due.next_billing_date, Some(date(2024, 3, 10)));
        assert_eq!(due.status, BillingStatus::Active);
    }
}

#[cfg(test)]
mod status_precedence_tests {
    use super::support::*;
    use crate::error::BillingError;
    use crate::entity::Scope;
    use crate::lifecycle::EntityChanges;
    use acerto_shared::BillingStatus;

    // =========================================================================
    // BILL-S01: Inactive + future date edit - stays inactive
    // =========================================================================
    #[tokio::test]
    async fn test_future_date_edit_keeps_inactive() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Bia", "2024-03-15", false))
            .await
            .unwrap()
            .entity
            .id;
        h.service
            .change_status(h.tenant, id, BillingStatus::Inactive)
            .await
            .unwrap();

        let updated = h
            .service
            .update_entity(
                h.tenant,
                id,
                EntityChanges {
                    next_billing_date: Some("2024-04-15".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BillingStatus::Inactive);
    }

    // =========================================================================
    // BILL-S02: Inactive + past date edit - overdue wins
    // =========================================================================
    #[tokio::test]
    async fn test_past_date_edit_overrides_inactive() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Bia", "2024-03-15", false))
            .await
            .unwrap()
            .entity
            .id;
        h.service
            .change_status(h.tenant, id, BillingStatus::Inactive)
            .await
            .unwrap();

        let updated = h
            .service
            .update_entity(
                h.tenant,
                id,
                EntityChanges {
                    next_billing_date: Some("2024-03-01".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BillingStatus::Overdue);
    }

    // =========================================================================
    // BILL-S03: Renew twice - two periods, active both times, due_date frozen
    // =========================================================================
    #[tokio::test]
    async fn test_renew_twice_from_inactive() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let plan = plan(&h, h.tenant, 9_900, 15, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Caio", "2024-01-31", false))
            .await
            .unwrap()
            .entity
            .id;
        h.service
            .change_status(h.tenant, id, BillingStatus::Inactive)
            .await
            .unwrap();

        let first = h.service.renew(h.tenant, id).await.unwrap();
        assert_eq!(first.entity.status, BillingStatus::Active);
        let second = h.service.renew(h.tenant, id).await.unwrap();
        assert_eq!(second.entity.status, BillingStatus::Active);

        // calendar arithmetic across February of a leap year
        assert_eq!(second.entity.next_billing_date, Some(date(2024, 3, 1)));
        assert_eq!(second.entity.due_date, Some(date(2024, 1, 31)));
    }

    // =========================================================================
    // BILL-S04: Free subscriber far in the past - never overdue, sweep agrees
    // =========================================================================
    #[tokio::test]
    async fn test_free_subscriber_never_overdue() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let free = plan(&h, Scope::Platform, 0, 30, true).await;
        let created = h
            .service
            .create_entity(Scope::Platform, draft(&free, "Parceiro", "2020-01-01", true))
            .await
            .unwrap();
        assert_eq!(created.entity.status, BillingStatus::Active);
        assert!(created.entry.is_none());

        let report = h
            .service
            .sweep_statuses(acerto_shared::EntityKind::Subscriber)
            .await
            .unwrap();
        assert_eq!(report.changed(), 0);
    }

    // =========================================================================
    // BILL-S05: Moving an overdue subscriber onto a free plan clears overdue
    // =========================================================================
    #[tokio::test]
    async fn test_plan_change_to_free_clears_overdue() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let paid = plan(&h, Scope::Platform, 4_900, 30, false).await;
        let free = plan(&h, Scope::Platform, 0, 30, true).await;
        let id = h
            .service
            .create_entity(Scope::Platform, draft(&paid, "Loja", "2024-03-01", false))
            .await
            .unwrap()
            .entity
            .id;

        let updated = h
            .service
            .update_entity(
                Scope::Platform,
                id,
                EntityChanges {
                    plan_id: Some(free.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, BillingStatus::Active);
        assert_eq!(updated.price_cents, 0);
    }

    // =========================================================================
    // BILL-S06: Overdue can never be assigned directly
    // =========================================================================
    #[tokio::test]
    async fn test_overdue_not_assignable() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Davi", "2024-03-20", false))
            .await
            .unwrap()
            .entity
            .id;

        let err = h
            .service
            .change_status(h.tenant, id, BillingStatus::Overdue)
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::StatusNotAssignable(BillingStatus::Overdue)));

        let stored = h.service.get_entity(h.tenant, id).await.unwrap();
        assert_eq!(stored.status, BillingStatus::Active);
    }
}

#[cfg(test)]
mod scheduling_tests {
    use super::support::*;
    use crate::automation::{RuleInput, SkipReason};
    use crate::store::BillingStore;
    use acerto_shared::BillingStatus;
    use uuid::Uuid;

    fn rule(time: &str, days_offset: i32, targets: Vec<Uuid>) -> RuleInput {
        RuleInput {
            template_id: Uuid::new_v4(),
            scheduled_time: time.to_string(),
            days_offset,
            target_ids: targets,
        }
    }

    // =========================================================================
    // BILL-N01: Three days before 2024-03-10 at 09:00 -> 2024-03-07T12:00Z
    // =========================================================================
    #[tokio::test]
    async fn test_reference_send_instant() {
        let h = harness_at(utc(2024, 3, 1, 12, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Eva", "2024-03-10", false))
            .await
            .unwrap()
            .entity
            .id;

        let schedule = h
            .service
            .create_rule(h.tenant, rule("09:00:00", -3, vec![id]))
            .await
            .unwrap();
        assert_eq!(schedule.scheduled.len(), 1);
        assert_eq!(schedule.scheduled[0].send_at_utc, utc(2024, 3, 7, 12, 0));
        assert_eq!(schedule.scheduled[0].recipient_name_snapshot, "Eva");
    }

    // =========================================================================
    // BILL-N02: Target 59s in the past is kept, 61s in the past is dropped
    // =========================================================================
    #[tokio::test]
    async fn test_grace_window_boundary() {
        // 2024-03-07 09:00 local is 12:00 UTC
        let h = harness_at(utc(2024, 3, 7, 12, 0) + chrono::Duration::seconds(59));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Eva", "2024-03-10", false))
            .await
            .unwrap()
            .entity
            .id;

        let kept = h
            .service
            .create_rule(h.tenant, rule("09:00", -3, vec![id]))
            .await
            .unwrap();
        assert_eq!(kept.scheduled.len(), 1);

        h.clock.advance(chrono::Duration::seconds(2));
        let dropped = h.service.reschedule_rule(kept.rule).await.unwrap();
        assert!(dropped.scheduled.is_empty());
        assert_eq!(dropped.skipped[0].reason, SkipReason::InPast);
    }

    // =========================================================================
    // BILL-N03: Inactive target listed explicitly - still excluded
    // =========================================================================
    #[tokio::test]
    async fn test_listed_inactive_target_excluded() {
        let h = harness_at(utc(2024, 3, 1, 12, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Gil", "2024-03-20", false))
            .await
            .unwrap()
            .entity
            .id;
        h.service
            .change_status(h.tenant, id, BillingStatus::Inactive)
            .await
            .unwrap();

        let schedule = h
            .service
            .create_rule(h.tenant, rule("10:00", 0, vec![id]))
            .await
            .unwrap();
        assert!(schedule.scheduled.is_empty());
        assert_eq!(schedule.skipped[0].reason, SkipReason::Inactive);
    }

    // =========================================================================
    // BILL-N04: Another tenant's client id in target_ids is ignored
    // =========================================================================
    #[tokio::test]
    async fn test_foreign_target_ignored() {
        let h = harness_at(utc(2024, 3, 1, 12, 0));
        let other = crate::entity::Scope::Tenant(Uuid::new_v4());
        let foreign_plan = plan(&h, other, 5_000, 30, false).await;
        let foreign = h
            .service
            .create_entity(other, draft(&foreign_plan, "Hugo", "2024-03-20", false))
            .await
            .unwrap()
            .entity
            .id;

        let schedule = h
            .service
            .create_rule(h.tenant, rule("10:00", 0, vec![foreign]))
            .await
            .unwrap();
        assert!(schedule.scheduled.is_empty());
        assert!(schedule.skipped.is_empty());
    }

    // =========================================================================
    // BILL-N05: Empty target list - nothing scheduled, no error
    // =========================================================================
    #[tokio::test]
    async fn test_empty_targets_is_noop() {
        let h = harness_at(utc(2024, 3, 1, 12, 0));
        let schedule = h
            .service
            .create_rule(h.tenant, rule("10:00", 0, vec![]))
            .await
            .unwrap();
        assert!(schedule.scheduled.is_empty());
        let rows = h
            .store
            .list_notifications_for_rule(schedule.rule.id)
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}

#[cfg(test)]
mod ledger_tests {
    use super::support::*;
    use crate::lifecycle::PaymentDecision;
    use acerto_shared::EntryType;

    // =========================================================================
    // BILL-L01: Paid on creation with a price override - credit uses override
    // =========================================================================
    #[tokio::test]
    async fn test_paid_creation_uses_price_snapshot() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let mut input = draft(&plan, "Ivo", "2024-03-10", true);
        input.price_cents = Some(3_500);

        let created = h.service.create_entity(h.tenant, input).await.unwrap();
        assert_eq!(created.payment, PaymentDecision::Recorded);

        let entries = h.service.list_entries(h.tenant).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value_cents, 3_500);
        assert_eq!(entries[0].entry_type, EntryType::Credit);
    }

    // =========================================================================
    // BILL-L02: Renewal after a price change records the new price
    // =========================================================================
    #[tokio::test]
    async fn test_renewal_records_current_price() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let plan = plan(&h, h.tenant, 5_000, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Ivo", "2024-03-10", false))
            .await
            .unwrap()
            .entity
            .id;
        h.service
            .update_entity(
                h.tenant,
                id,
                crate::lifecycle::EntityChanges {
                    price_cents: Some(6_000),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let renewed = h.service.renew(h.tenant, id).await.unwrap();
        assert_eq!(renewed.entry.unwrap().value_cents, 6_000);
    }

    // =========================================================================
    // BILL-L03: Renewing a zero-priced entity records nothing
    // =========================================================================
    #[tokio::test]
    async fn test_zero_price_renewal_records_nothing() {
        let h = harness_at(utc(2024, 3, 10, 15, 0));
        let plan = plan(&h, h.tenant, 0, 30, false).await;
        let id = h
            .service
            .create_entity(h.tenant, draft(&plan, "Ivo", "2024-03-10", false))
            .await
            .unwrap()
            .entity
            .id;

        let renewed = h.service.renew(h.tenant, id).await.unwrap();
        assert_eq!(renewed.payment, PaymentDecision::NothingToRecord);
        assert!(h.service.list_entries(h.tenant).await.unwrap().is_empty());
    }

    // =========================================================================
    // BILL-L04: Totals past the i64 range fail instead of wrapping
    // =========================================================================
    #[tokio::test]
    async fn test_summary_overflow_is_reported() {
        use crate::error::BillingError;
        use crate::ledger::{FinancialEntry, MAX_ENTRY_CENTS};
        use acerto_shared::Clock;
        use crate::service::AdjustmentInput;
        use crate::store::BillingStore;

        let h = harness_at(utc(2024, 3, 10, 15, 0));

        let err = h
            .service
            .record_adjustment(
                h.tenant,
                AdjustmentInput {
                    entry_type: EntryType::Credit,
                    description: "Aporte".to_string(),
                    value_cents: MAX_ENTRY_CENTS + 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)));

        // A legacy row written before the cap existed
        let mut legacy =
            FinancialEntry::new(h.tenant, EntryType::Credit, "Legado", 1, h.clock.now()).unwrap();
        legacy.value_cents = i64::MAX;
        h.store.append_financial_entry(&legacy).await.unwrap();
        h.service
            .record_adjustment(
                h.tenant,
                AdjustmentInput {
                    entry_type: EntryType::Credit,
                    description: "Aporte".to_string(),
                    value_cents: 1,
                },
            )
            .await
            .unwrap();

        let err = h.service.ledger_summary(h.tenant).await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)));
    }
}
