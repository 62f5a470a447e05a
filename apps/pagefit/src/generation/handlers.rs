//! Axum route handlers for the Document API.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::pipeline::{generate_document, BudgetReport, CompileSummary, GenerateOptions};
use crate::layout::policy::BudgetPolicy;
use crate::layout::ranking::RelevanceContext;
use crate::models::snapshot::ContentSnapshot;
use crate::render::AssemblyOptions;
use crate::state::AppState;
use crate::store::{load_snapshot, write_back, RunCache, SectionName};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GenerateRequest {
    pub policy: Option<BudgetPolicy>,
    pub relevance: RelevanceContext,
    pub options: AssemblyOptions,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub document_id: Uuid,
    pub markup: String,
    pub applied_rules: Vec<&'static str>,
    pub report: BudgetReport,
    pub compile: Option<CompileSummary>,
    /// Sections the run changed and persisted.
    pub written_sections: Vec<SectionName>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/documents/:document_id/generate
///
/// Loads the document's stored sections, enforces the budget, renders, and writes back
/// only what changed. Runs for the same document are serialized.
pub async fn handle_generate(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, AppError> {
    let policy = state.resolve_policy(request.policy)?;

    let _guard = state.locks.acquire(document_id).await;

    let mut cache = RunCache::new();
    let before = load_snapshot(state.store.as_ref(), &mut cache, document_id).await?;
    if before == ContentSnapshot::default() {
        return Err(AppError::NotFound(format!(
            "No content blocks stored for document {document_id}"
        )));
    }

    let options = GenerateOptions {
        assembly: request.options,
        reduce: state.reduce_options(request.relevance),
    };

    let document = generate_document(
        before.clone(),
        state.template.as_str(),
        &policy,
        state.ranker.as_ref(),
        state.compiler.as_deref(),
        &options,
    )
    .await?;

    let written_sections = write_back(
        state.store.as_ref(),
        &mut cache,
        document_id,
        &before,
        &document.snapshot,
    )
    .await?;

    info!(
        %document_id,
        target_met = document.report.target_met,
        written = written_sections.len(),
        "Document generated"
    );

    Ok(Json(GenerateResponse {
        document_id,
        markup: document.markup,
        applied_rules: document.applied_rules,
        report: document.report,
        compile: document.compile,
        written_sections,
    }))
}
