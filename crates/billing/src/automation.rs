//! Automation rules and the notification eligibility filter
//!
//! A rule says "send template T at local time H, N days relative to each
//! target's billing date". Whenever a rule or its target list changes, the
//! whole set of pending notifications for it is recomputed from scratch by
//! [`schedule_notifications_for_rule`]; the filter itself is pure and
//! idempotent for identical inputs.

use std::collections::HashSet;

use acerto_shared::{BillingStatus, BusinessTimezone, EntityKind, NotificationStatus};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dates::{parse_scheduled_time, shift_days};
use crate::entity::{BillableEntity, Scope};
use crate::error::{BillingError, BillingResult};

/// Targets computed further in the past than this are dropped
pub const SCHEDULE_GRACE_SECONDS: i64 = 60;

/// A stored automation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRule {
    pub id: Uuid,
    pub kind: EntityKind,
    pub owner_id: Option<Uuid>,
    pub template_id: Uuid,
    /// Local time-of-day in the business timezone
    pub scheduled_time: NaiveTime,
    /// Days relative to the billing date; negative means before
    pub days_offset: i32,
    /// Explicit allow-list of entity ids
    pub target_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AutomationRule {
    pub fn scope(&self) -> Scope {
        match (self.kind, self.owner_id) {
            (EntityKind::Client, Some(owner)) => Scope::Tenant(owner),
            _ => Scope::Platform,
        }
    }
}

/// Rule fields as submitted by a user
#[derive(Debug, Clone, Deserialize)]
pub struct RuleInput {
    pub template_id: Uuid,
    /// `HH:MM:SS` or `HH:MM`
    pub scheduled_time: String,
    pub days_offset: i32,
    #[serde(default)]
    pub target_ids: Vec<Uuid>,
}

impl RuleInput {
    /// Validate into a new rule owned by `scope`
    pub fn into_rule(self, scope: Scope, now: DateTime<Utc>) -> BillingResult<AutomationRule> {
        let scheduled_time = parse_scheduled_time(&self.scheduled_time)?;
        Ok(AutomationRule {
            id: Uuid::new_v4(),
            kind: scope.kind(),
            owner_id: scope.owner_id(),
            template_id: self.template_id,
            scheduled_time,
            days_offset: self.days_offset,
            target_ids: dedup_targets(self.target_ids),
            created_at: now,
            updated_at: now,
        })
    }

    /// Validate and apply onto an existing rule, keeping its identity
    pub fn apply_to(
        self,
        rule: &AutomationRule,
        now: DateTime<Utc>,
    ) -> BillingResult<AutomationRule> {
        let scheduled_time = parse_scheduled_time(&self.scheduled_time)?;
        Ok(AutomationRule {
            template_id: self.template_id,
            scheduled_time,
            days_offset: self.days_offset,
            target_ids: dedup_targets(self.target_ids),
            updated_at: now,
            ..rule.clone()
        })
    }
}

fn dedup_targets(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// A row handed to the external sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub owner_id: Option<Uuid>,
    pub recipient_id: Uuid,
    /// Recipient name at scheduling time; kept if the recipient is deleted
    pub recipient_name_snapshot: String,
    pub template_id: Uuid,
    pub send_at_utc: DateTime<Utc>,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
}

/// Why a targeted entity received no notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    MissingBillingDate,
    /// Target instant is more than the grace window in the past
    InPast,
    /// The local target time has no instant in the business timezone
    TimezoneConversion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedTarget {
    pub entity_id: Uuid,
    pub reason: SkipReason,
}

/// Output of one filter run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulePlan {
    pub notifications: Vec<ScheduledNotification>,
    pub skipped: Vec<SkippedTarget>,
}

/// Local `time` on `date + days_offset` in `tz`, as UTC
pub fn target_instant(
    tz: &BusinessTimezone,
    date: NaiveDate,
    days_offset: i32,
    time: NaiveTime,
) -> BillingResult<DateTime<Utc>> {
    let target_date = shift_days(date, i64::from(days_offset)).ok_or_else(|| {
        BillingError::TimezoneConversion(format!("{} {:+} days is out of range", date, days_offset))
    })?;
    tz.to_utc(target_date, time).ok_or_else(|| {
        BillingError::TimezoneConversion(format!("{} {} does not exist in {}", target_date, time, tz))
    })
}

/// Instant a rule fires for `entity`, or why it cannot.
///
/// `target = next_billing_date + days_offset` at the rule's local time,
/// converted from the business timezone to UTC.
pub fn send_instant(
    rule: &AutomationRule,
    entity: &BillableEntity,
    tz: &BusinessTimezone,
) -> Result<DateTime<Utc>, SkipReason> {
    let billing_date = entity
        .next_billing_date
        .ok_or(SkipReason::MissingBillingDate)?;
    target_instant(tz, billing_date, rule.days_offset, rule.scheduled_time).map_err(|e| {
        tracing::warn!(
            rule_id = %rule.id,
            entity_id = %entity.id,
            error = %e,
            "No valid instant for notification target, skipping"
        );
        SkipReason::TimezoneConversion
    })
}

/// Compute the fresh set of notifications for `rule`.
///
/// Only entities listed in `rule.target_ids` and currently `active` or
/// `overdue` are considered. A bad row is skipped and logged; it never
/// aborts the batch.
pub fn schedule_notifications_for_rule(
    rule: &AutomationRule,
    entities: &[BillableEntity],
    tz: &BusinessTimezone,
    now: DateTime<Utc>,
) -> SchedulePlan {
    let targets: HashSet<Uuid> = rule.target_ids.iter().copied().collect();
    let cutoff = now - Duration::seconds(SCHEDULE_GRACE_SECONDS);
    let mut plan = SchedulePlan::default();

    for entity in entities.iter().filter(|e| targets.contains(&e.id)) {
        if entity.kind != rule.kind || entity.owner_id != rule.owner_id {
            continue;
        }

        let outcome = if entity.status == BillingStatus::Inactive {
            Err(SkipReason::Inactive)
        } else {
            send_instant(rule, entity, tz).and_then(|send_at| {
                if send_at >= cutoff {
                    Ok(send_at)
                } else {
                    Err(SkipReason::InPast)
                }
            })
        };

        match outcome {
            Ok(send_at_utc) => plan.notifications.push(ScheduledNotification {
                id: Uuid::new_v4(),
                rule_id: rule.id,
                owner_id: rule.owner_id,
                recipient_id: entity.id,
                recipient_name_snapshot: entity.name.clone(),
                template_id: rule.template_id,
                send_at_utc,
                status: NotificationStatus::Pending,
                created_at: now,
            }),
            Err(reason) => {
                tracing::debug!(
                    rule_id = %rule.id,
                    entity_id = %entity.id,
                    reason = ?reason,
                    "Notification target skipped"
                );
                plan.skipped.push(SkippedTarget {
                    entity_id: entity.id,
                    reason,
                });
            }
        }
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn entity(owner: Uuid, name: &str, next: Option<NaiveDate>, status: BillingStatus) -> BillableEntity {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        BillableEntity {
            id: Uuid::new_v4(),
            kind: EntityKind::Client,
            owner_id: Some(owner),
            name: name.to_string(),
            contact_handle: "+5511999990000".to_string(),
            email: None,
            plan_id: Some(Uuid::new_v4()),
            plan_is_free: false,
            price_cents: 5_000,
            next_billing_date: next,
            due_date: next,
            status,
            created_at: at,
            updated_at: at,
        }
    }

    fn rule(owner: Uuid, days_offset: i32, time: &str, targets: &[&BillableEntity]) -> AutomationRule {
        RuleInput {
            template_id: Uuid::new_v4(),
            scheduled_time: time.to_string(),
            days_offset,
            target_ids: targets.iter().map(|e| e.id).collect(),
        }
        .into_rule(Scope::Tenant(owner), Utc::now())
        .unwrap()
    }

    #[test]
    fn test_sao_paulo_reference_example() {
        let owner = Uuid::new_v4();
        let maria = entity(owner, "Maria", Some(date(2024, 3, 10)), BillingStatus::Active);
        let rule = rule(owner, -3, "09:00:00", &[&maria]);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let plan = schedule_notifications_for_rule(
            &rule,
            std::slice::from_ref(&maria),
            &BusinessTimezone::default(),
            now,
        );

        assert_eq!(plan.notifications.len(), 1);
        let row = &plan.notifications[0];
        assert_eq!(row.send_at_utc.to_rfc3339(), "2024-03-07T12:00:00+00:00");
        assert_eq!(row.recipient_id, maria.id);
        assert_eq!(row.recipient_name_snapshot, "Maria");
        assert_eq!(row.template_id, rule.template_id);
        assert_eq!(row.status, NotificationStatus::Pending);
    }

    #[test]
    fn test_inactive_targets_are_excluded() {
        let owner = Uuid::new_v4();
        let inactive = entity(owner, "Inativo", Some(date(2024, 3, 10)), BillingStatus::Inactive);
        let overdue = entity(owner, "Atrasado", Some(date(2024, 3, 10)), BillingStatus::Overdue);
        let rule = rule(owner, 5, "10:00", &[&inactive, &overdue]);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let plan = schedule_notifications_for_rule(
            &rule,
            &[inactive.clone(), overdue.clone()],
            &BusinessTimezone::default(),
            now,
        );

        assert_eq!(plan.notifications.len(), 1);
        assert_eq!(plan.notifications[0].recipient_id, overdue.id);
        assert_eq!(
            plan.skipped,
            vec![SkippedTarget {
                entity_id: inactive.id,
                reason: SkipReason::Inactive
            }]
        );
    }

    #[test]
    fn test_unlisted_entities_are_ignored() {
        let owner = Uuid::new_v4();
        let listed = entity(owner, "Listado", Some(date(2024, 3, 10)), BillingStatus::Active);
        let other = entity(owner, "Outro", Some(date(2024, 3, 10)), BillingStatus::Active);
        let rule = rule(owner, 0, "08:00", &[&listed]);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let plan = schedule_notifications_for_rule(
            &rule,
            &[listed.clone(), other],
            &BusinessTimezone::default(),
            now,
        );
        assert_eq!(plan.notifications.len(), 1);
        assert!(plan.skipped.is_empty());
    }

    #[test]
    fn test_grace_window_boundary() {
        let owner = Uuid::new_v4();
        let target = entity(owner, "Joao", Some(date(2024, 3, 10)), BillingStatus::Active);
        let rule = rule(owner, 0, "09:00:00", &[&target]);
        let tz = BusinessTimezone::default();
        let send_at = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();

        let just_inside = send_at + Duration::seconds(SCHEDULE_GRACE_SECONDS);
        let plan = schedule_notifications_for_rule(&rule, std::slice::from_ref(&target), &tz, just_inside);
        assert_eq!(plan.notifications.len(), 1);

        let just_outside = just_inside + Duration::seconds(1);
        let plan = schedule_notifications_for_rule(&rule, std::slice::from_ref(&target), &tz, just_outside);
        assert!(plan.notifications.is_empty());
        assert_eq!(plan.skipped[0].reason, SkipReason::InPast);
    }

    #[test]
    fn test_missing_date_is_skipped() {
        let owner = Uuid::new_v4();
        let undated = entity(owner, "Sem data", None, BillingStatus::Active);
        let rule = rule(owner, 0, "09:00", &[&undated]);
        let plan = schedule_notifications_for_rule(
            &rule,
            std::slice::from_ref(&undated),
            &BusinessTimezone::default(),
            Utc::now(),
        );
        assert_eq!(plan.skipped[0].reason, SkipReason::MissingBillingDate);
    }

    #[test]
    fn test_dst_gap_skips_only_that_entity() {
        let owner = Uuid::new_v4();
        // 00:30 on 2018-11-04 never happened in Sao Paulo
        let gap = entity(owner, "Gap", Some(date(2018, 11, 4)), BillingStatus::Active);
        let fine = entity(owner, "Fine", Some(date(2018, 11, 5)), BillingStatus::Active);
        let rule = rule(owner, 0, "00:30", &[&gap, &fine]);
        let now = Utc.with_ymd_and_hms(2018, 10, 1, 0, 0, 0).unwrap();

        let plan = schedule_notifications_for_rule(
            &rule,
            &[gap.clone(), fine.clone()],
            &BusinessTimezone::default(),
            now,
        );
        assert_eq!(plan.notifications.len(), 1);
        assert_eq!(plan.notifications[0].recipient_id, fine.id);
        assert_eq!(plan.skipped[0].entity_id, gap.id);
        assert_eq!(plan.skipped[0].reason, SkipReason::TimezoneConversion);
    }

    #[test]
    fn test_target_instant_reports_conversion_failures() {
        let tz = BusinessTimezone::default();
        let half_past = NaiveTime::from_hms_opt(0, 30, 0).unwrap();

        let err = target_instant(&tz, date(2018, 11, 4), 0, half_past).unwrap_err();
        assert!(matches!(err, BillingError::TimezoneConversion(_)));
        assert_eq!(err.code(), "timezone_conversion_failure");

        let err = target_instant(&tz, NaiveDate::MAX, 1, half_past).unwrap_err();
        assert!(matches!(err, BillingError::TimezoneConversion(_)));

        // 2018-11-04 minus one day is a normal -03:00 evening
        let ok = target_instant(&tz, date(2018, 11, 4), -1, half_past).unwrap();
        assert_eq!(ok, Utc.with_ymd_and_hms(2018, 11, 3, 3, 30, 0).unwrap());
    }

    #[test]
    fn test_other_tenants_rows_are_ignored() {
        let owner = Uuid::new_v4();
        let foreign = entity(Uuid::new_v4(), "Outro tenant", Some(date(2030, 1, 1)), BillingStatus::Active);
        let rule = rule(owner, 0, "09:00", &[&foreign]);
        let plan = schedule_notifications_for_rule(
            &rule,
            std::slice::from_ref(&foreign),
            &BusinessTimezone::default(),
            Utc::now(),
        );
        assert!(plan.notifications.is_empty());
    }

    #[test]
    fn test_rerun_is_idempotent_in_shape() {
        let owner = Uuid::new_v4();
        let a = entity(owner, "A", Some(date(2030, 5, 1)), BillingStatus::Active);
        let b = entity(owner, "B", Some(date(2030, 6, 1)), BillingStatus::Overdue);
        let rule = rule(owner, -1, "18:45:00", &[&a, &b]);
        let tz = BusinessTimezone::default();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let rows = [a, b];

        let first = schedule_notifications_for_rule(&rule, &rows, &tz, now);
        let second = schedule_notifications_for_rule(&rule, &rows, &tz, now);
        let key = |p: &SchedulePlan| {
            p.notifications
                .iter()
                .map(|n| (n.recipient_id, n.send_at_utc))
                .collect::<Vec<_>>()
        };
        assert_eq!(key(&first), key(&second));
        assert_eq!(first.notifications.len(), 2);
    }

    #[test]
    fn test_rule_input_validates_time_and_dedups_targets() {
        let id = Uuid::new_v4();
        let input = RuleInput {
            template_id: Uuid::new_v4(),
            scheduled_time: "07:15".to_string(),
            days_offset: 2,
            target_ids: vec![id, id],
        };
        let rule = input.into_rule(Scope::Platform, Utc::now()).unwrap();
        assert_eq!(rule.target_ids, vec![id]);
        assert_eq!(rule.kind, EntityKind::Subscriber);
        assert_eq!(rule.scheduled_time, NaiveTime::from_hms_opt(7, 15, 0).unwrap());

        let bad = RuleInput {
            template_id: Uuid::new_v4(),
            scheduled_time: "7 horas".to_string(),
            days_offset: 0,
            target_ids: vec![],
        };
        assert!(matches!(
            bad.into_rule(Scope::Platform, Utc::now()),
            Err(crate::error::BillingError::InvalidDate(_))
        ));
    }

    #[test]
    fn test_apply_to_keeps_identity() {
        let owner = Uuid::new_v4();
        let original = rule(owner, 0, "09:00", &[]);
        let updated = RuleInput {
            template_id: Uuid::new_v4(),
            scheduled_time: "10:30:00".to_string(),
            days_offset: -2,
            target_ids: vec![Uuid::new_v4()],
        }
        .apply_to(&original, Utc::now())
        .unwrap();
        assert_eq!(updated.id, original.id);
        assert_eq!(updated.owner_id, original.owner_id);
        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(updated.days_offset, -2);
    }
}
