pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers as generation;
use crate::layout::handlers as layout;
use crate::render::handlers as render;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Layout API
        .route("/api/v1/layout/estimate", post(layout::handle_estimate))
        .route("/api/v1/layout/enforce", post(layout::handle_enforce))
        // Render API
        .route("/api/v1/render/assemble", post(render::handle_assemble))
        .route("/api/v1/render/repair", post(render::handle_repair))
        // Document API
        .route(
            "/api/v1/documents/:document_id/generate",
            post(generation::handle_generate),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::config::Config;
    use crate::layout::policy::BudgetPolicy;
    use crate::layout::KeywordContentRanker;
    use crate::render::DEFAULT_TEMPLATE;
    use crate::store::{DocumentLocks, FsBlockStore};

    fn make_state(content_dir: &Path) -> AppState {
        let config = Config {
            port: 0,
            rust_log: "info".to_string(),
            database_url: None,
            content_dir: PathBuf::from(content_dir),
            template_path: None,
            anthropic_api_key: None,
            target_pages: 2.0,
            lines_per_page: 45,
            max_adaptive_iterations: 5,
            ranker_timeout_secs: 5,
            enforcement_timeout_secs: None,
        };
        AppState {
            policy: config.policy(),
            store: Arc::new(FsBlockStore::new(content_dir)),
            ranker: Arc::new(KeywordContentRanker),
            compiler: None,
            template: Arc::new(DEFAULT_TEMPLATE.to_string()),
            locks: DocumentLocks::new(),
            config,
        }
    }

    async fn post_json(state: AppState, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    // ── layout ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_estimate_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) =
            post_json(make_state(dir.path()), "/api/v1/layout/estimate", json!({})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["estimated_lines"], 14);
    }

    #[tokio::test]
    async fn test_invalid_policy_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = post_json(
            make_state(dir.path()),
            "/api/v1/layout/estimate",
            json!({"snapshot": {}, "policy": {"target_pages": 0}}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_enforce_trims_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let experiences: Vec<Value> = (0..6)
            .map(|i| json!({"title": format!("Role {i}"), "bullets": vec![words(12); 5]}))
            .collect();
        let (status, body) = post_json(
            make_state(dir.path()),
            "/api/v1/layout/enforce",
            json!({"snapshot": {"summary": words(200), "experiences": experiences}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["target_met"], true);
        assert_eq!(body["snapshot"]["experiences"].as_array().unwrap().len(), 4);
        assert!(!body["report"]["log"].as_array().unwrap().is_empty());
    }

    // ── render ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_assemble_empty_snapshot_strips_markers() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) =
            post_json(make_state(dir.path()), "/api/v1/render/assemble", json!({})).await;

        assert_eq!(status, StatusCode::OK);
        let markup = body["markup"].as_str().unwrap();
        assert!(markup.contains("\\makecvtitle"));
        assert!(!markup.contains("% === AUTO:"));
    }

    #[tokio::test]
    async fn test_repair_rejects_empty_markup() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _) = post_json(
            make_state(dir.path()),
            "/api/v1/render/repair",
            json!({"markup": "  "}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_repair_without_rules_returns_markup_only() {
        let dir = tempfile::tempdir().unwrap();
        let markup = "\\begin{document}\n---\nBody\n\\end{document}\n";
        let (status, body) = post_json(
            make_state(dir.path()),
            "/api/v1/render/repair",
            json!({"markup": markup, "include_rules": false}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("applied_rules").is_none());
        let repaired = body["markup"].as_str().unwrap();
        assert!(!repaired.contains("---"));
        assert!(repaired.contains("\\compactresumelayout"));
    }

    #[tokio::test]
    async fn test_repair_reports_rules_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let markup = "\\begin{document}\n---\nBody\n\\end{document}\n";
        let (status, body) = post_json(
            make_state(dir.path()),
            "/api/v1/render/repair",
            json!({"markup": markup}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["applied_rules"][0], "separator-lines");
    }

    #[tokio::test]
    async fn test_estimate_accepts_null_sections() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = post_json(
            make_state(dir.path()),
            "/api/v1/layout/estimate",
            json!({"snapshot": {"experiences": null, "education": {}, "contact": null}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["estimated_lines"], 14);
    }

    // ── documents ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_generate_unknown_document_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("/api/v1/documents/{}/generate", Uuid::new_v4());
        let (status, body) = post_json(make_state(dir.path()), &uri, json!({})).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_generate_writes_back_trimmed_sections() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let doc_dir = dir.path().join(id.to_string());
        std::fs::create_dir_all(&doc_dir).unwrap();

        let experiences: Vec<Value> = (0..6)
            .map(|i| json!({"role": format!("Role {i}"), "description": vec![words(12); 5]}))
            .collect();
        std::fs::write(
            doc_dir.join("experiences.json"),
            json!({ "selected_experiences": experiences }).to_string(),
        )
        .unwrap();
        std::fs::write(doc_dir.join("summary.json"), format!("\"{}\"", words(200))).unwrap();
        std::fs::write(
            doc_dir.join("contact.json"),
            json!({"name": "Ada Lovelace", "email": "ada@example.com", "phone": "5551234567"})
                .to_string(),
        )
        .unwrap();

        let uri = format!("/api/v1/documents/{id}/generate");
        let (status, body) = post_json(make_state(dir.path()), &uri, json!({})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["written_sections"], json!(["summary", "experiences"]));
        assert!(body["markup"].as_str().unwrap().contains("\\name{Ada}{Lovelace}"));
        assert!(!doc_dir.join("skills.json").exists());

        let stored: Value =
            serde_json::from_str(&std::fs::read_to_string(doc_dir.join("experiences.json")).unwrap())
                .unwrap();
        assert_eq!(stored["experiences"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_default_policy_comes_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let state = make_state(dir.path());
        assert_eq!(state.resolve_policy(None).unwrap(), BudgetPolicy::default());
    }
}
