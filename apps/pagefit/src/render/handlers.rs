//! Axum route handlers for the Render API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::snapshot::ContentSnapshot;
use crate::render::{assemble, repair, repair_with_report, AssemblyOptions};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssembleRequest {
    #[serde(default)]
    pub snapshot: ContentSnapshot,
    /// Overrides the configured template for this call.
    pub template: Option<String>,
    #[serde(default)]
    pub options: AssemblyOptions,
    /// Run the repair pass on the assembled markup (default true).
    #[serde(default = "default_true")]
    pub repair: bool,
}

#[derive(Debug, Serialize)]
pub struct AssembleResponse {
    pub markup: String,
    pub applied_rules: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct RepairRequest {
    pub markup: String,
    /// Report which rules fired (default true). When false only the markup is returned.
    #[serde(default = "default_true")]
    pub include_rules: bool,
}

#[derive(Debug, Serialize)]
pub struct RepairResponse {
    pub markup: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_rules: Option<Vec<&'static str>>,
}

fn default_true() -> bool {
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/render/assemble
///
/// Renders a snapshot through the request template (or the configured one).
pub async fn handle_assemble(
    State(state): State<AppState>,
    Json(request): Json<AssembleRequest>,
) -> Result<Json<AssembleResponse>, AppError> {
    let template = request
        .template
        .as_deref()
        .unwrap_or(state.template.as_str());

    let markup = assemble(&request.snapshot, template, &request.options)?;

    if !request.repair {
        return Ok(Json(AssembleResponse {
            markup,
            applied_rules: Vec::new(),
        }));
    }

    let report = repair_with_report(&markup);
    Ok(Json(AssembleResponse {
        markup: report.markup,
        applied_rules: report.applied_rules,
    }))
}

/// POST /api/v1/render/repair
///
/// Runs the repair pass standalone on caller-supplied markup.
pub async fn handle_repair(
    Json(request): Json<RepairRequest>,
) -> Result<Json<RepairResponse>, AppError> {
    if request.markup.trim().is_empty() {
        return Err(AppError::Validation("markup cannot be empty".to_string()));
    }

    if !request.include_rules {
        return Ok(Json(RepairResponse {
            markup: repair(&request.markup),
            applied_rules: None,
        }));
    }

    let report = repair_with_report(&request.markup);
    Ok(Json(RepairResponse {
        markup: report.markup,
        applied_rules: Some(report.applied_rules),
    }))
}
