//! Plan routes

use acerto_billing::{Plan, PlanInput, Scope};
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};

use crate::{error::ApiResult, extract::ApiJson, state::AppState};

pub async fn list_plans(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
) -> ApiResult<Json<Vec<Plan>>> {
    Ok(Json(state.billing.list_plans(scope).await?))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiJson(input): ApiJson<PlanInput>,
) -> ApiResult<(StatusCode, Json<Plan>)> {
    let plan = state.billing.create_plan(scope, input).await?;
    Ok((StatusCode::CREATED, Json(plan)))
}
