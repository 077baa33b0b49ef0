//! Platform maintenance routes
//!
//! On-demand versions of the worker's jobs, for admins.

use acerto_billing::{InvariantCheckSummary, InvariantViolation, SweepReport};
use acerto_shared::EntityKind;
use axum::{
    extract::State,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    extract::ApiQuery,
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct InvariantQuery {
    /// Run only this check
    pub check: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum InvariantRunResponse {
    Summary(InvariantCheckSummary),
    Single {
        check: String,
        violations: Vec<InvariantViolation>,
    },
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub clients: SweepReport,
    pub subscribers: SweepReport,
}

pub async fn run_invariants(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<InvariantQuery>,
) -> ApiResult<Json<InvariantRunResponse>> {
    let checker = state
        .invariants
        .as_ref()
        .ok_or_else(|| ApiError::Unavailable("invariant checks need a database".to_string()))?;

    let response = match query.check {
        Some(check) => {
            let violations = checker.run_check(&check).await?;
            InvariantRunResponse::Single { check, violations }
        }
        None => InvariantRunResponse::Summary(checker.run_all_checks().await?),
    };
    Ok(Json(response))
}

pub async fn run_sweep(State(state): State<AppState>) -> ApiResult<Json<SweepResponse>> {
    let clients = state.billing.sweep_statuses(EntityKind::Client).await?;
    let subscribers = state.billing.sweep_statuses(EntityKind::Subscriber).await?;
    Ok(Json(SweepResponse {
        clients,
        subscribers,
    }))
}
