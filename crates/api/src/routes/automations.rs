//! Automation rule routes
//!
//! Saving a rule answers with the freshly computed schedule, including the
//! targets that were skipped and why.

use acerto_billing::{AutomationRule, RuleInput, RuleSchedule, ScheduledNotification, Scope};
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{error::ApiResult, extract::{ApiJson, ApiPath}, state::AppState};

pub async fn list_rules(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
) -> ApiResult<Json<Vec<AutomationRule>>> {
    Ok(Json(state.billing.list_rules(scope).await?))
}

pub async fn create_rule(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiJson(input): ApiJson<RuleInput>,
) -> ApiResult<(StatusCode, Json<RuleSchedule>)> {
    let schedule = state.billing.create_rule(scope, input).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(input): ApiJson<RuleInput>,
) -> ApiResult<Json<RuleSchedule>> {
    Ok(Json(state.billing.update_rule(scope, id, input).await?))
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.billing.delete_rule(scope, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_rule_notifications(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Vec<ScheduledNotification>>> {
    Ok(Json(state.billing.list_rule_notifications(scope, id).await?))
}
