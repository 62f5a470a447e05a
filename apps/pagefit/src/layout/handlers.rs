//! Axum route handlers for the Layout API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::generation::pipeline::{enforce_budget, BudgetReport};
use crate::layout::estimator::{estimate, EstimationResult};
use crate::layout::policy::BudgetPolicy;
use crate::layout::ranking::RelevanceContext;
use crate::models::snapshot::ContentSnapshot;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EstimateRequest {
    #[serde(default)]
    pub snapshot: ContentSnapshot,
    pub policy: Option<BudgetPolicy>,
}

#[derive(Debug, Deserialize)]
pub struct EnforceRequest {
    #[serde(default)]
    pub snapshot: ContentSnapshot,
    pub policy: Option<BudgetPolicy>,
    #[serde(default)]
    pub relevance: RelevanceContext,
}

#[derive(Debug, Serialize)]
pub struct EnforceResponse {
    pub snapshot: ContentSnapshot,
    pub report: BudgetReport,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/layout/estimate
///
/// Estimates rendered length without changing anything.
pub async fn handle_estimate(
    State(state): State<AppState>,
    Json(request): Json<EstimateRequest>,
) -> Result<Json<EstimationResult>, AppError> {
    let policy = state.resolve_policy(request.policy)?;
    Ok(Json(estimate(&request.snapshot, &policy)))
}

/// POST /api/v1/layout/enforce
///
/// Trims and, if needed, adaptively reduces a caller-supplied snapshot. Nothing is stored.
pub async fn handle_enforce(
    State(state): State<AppState>,
    Json(request): Json<EnforceRequest>,
) -> Result<Json<EnforceResponse>, AppError> {
    let policy = state.resolve_policy(request.policy)?;
    let options = state.reduce_options(request.relevance);

    let outcome = enforce_budget(request.snapshot, &policy, state.ranker.as_ref(), &options).await?;

    Ok(Json(EnforceResponse {
        snapshot: outcome.snapshot,
        report: outcome.report,
    }))
}
