//! Client and subscriber routes
//!
//! The same handlers serve `/clients` for tenants and `/admin/subscribers`
//! for platform admins; the [`Scope`] inserted by the auth layer decides
//! which family and owner they act on.

use acerto_billing::{BillableEntity, EntityChanges, NewEntity, Scope, Transition};
use acerto_shared::BillingStatus;
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiResult, extract::{ApiJson, ApiPath}, state::AppState};

#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub status: BillingStatus,
}

pub async fn list_entities(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
) -> ApiResult<Json<Vec<BillableEntity>>> {
    Ok(Json(state.billing.list_entities(scope).await?))
}

pub async fn create_entity(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiJson(draft): ApiJson<NewEntity>,
) -> ApiResult<(StatusCode, Json<Transition>)> {
    let transition = state.billing.create_entity(scope, draft).await?;
    Ok((StatusCode::CREATED, Json(transition)))
}

pub async fn get_entity(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<BillableEntity>> {
    Ok(Json(state.billing.get_entity(scope, id).await?))
}

pub async fn update_entity(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(changes): ApiJson<EntityChanges>,
) -> ApiResult<Json<BillableEntity>> {
    Ok(Json(state.billing.update_entity(scope, id, changes).await?))
}

pub async fn delete_entity(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<StatusCode> {
    state.billing.delete_entity(scope, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn renew(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<Transition>> {
    Ok(Json(state.billing.renew(scope, id).await?))
}

pub async fn set_due_today(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<BillableEntity>> {
    Ok(Json(state.billing.set_due_today(scope, id).await?))
}

pub async fn change_status(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<StatusChangeRequest>,
) -> ApiResult<Json<BillableEntity>> {
    Ok(Json(
        state.billing.change_status(scope, id, req.status).await?,
    ))
}
