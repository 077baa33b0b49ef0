//! Financial ledger routes

use acerto_billing::{AdjustmentInput, FinancialEntry, LedgerSummary, Scope, StatusBreakdown};
use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::{error::ApiResult, extract::ApiJson, state::AppState};

/// Dashboard payload: money totals plus the status mix behind them
#[derive(Debug, Serialize)]
pub struct FinanceSummaryResponse {
    pub ledger: LedgerSummary,
    pub statuses: StatusBreakdown,
}

pub async fn list_entries(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
) -> ApiResult<Json<Vec<FinancialEntry>>> {
    Ok(Json(state.billing.list_entries(scope).await?))
}

pub async fn create_entry(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
    ApiJson(input): ApiJson<AdjustmentInput>,
) -> ApiResult<(StatusCode, Json<FinancialEntry>)> {
    let entry = state.billing.record_adjustment(scope, input).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(scope): Extension<Scope>,
) -> ApiResult<Json<FinanceSummaryResponse>> {
    let ledger = state.billing.ledger_summary(scope).await?;
    let statuses = state.billing.status_breakdown(scope).await?;
    Ok(Json(FinanceSummaryResponse { ledger, statuses }))
}
