use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::generation::pipeline::PipelineError;
use crate::render::AssemblyError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Compiler rejected the document: {diagnostic}")]
    CompileRejected {
        diagnostic: String,
        last_good_markup: Option<String>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Assembly(e) => AppError::Assembly(e),
            PipelineError::CompileRejected {
                diagnostic,
                last_good_markup,
                ..
            } => AppError::CompileRejected {
                diagnostic,
                last_good_markup,
            },
            PipelineError::Task(e) => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut extra: Option<(&str, Value)> = None;
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Assembly(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ASSEMBLY_ERROR",
                e.to_string(),
            ),
            AppError::CompileRejected {
                diagnostic,
                last_good_markup,
            } => {
                tracing::warn!("Compile rejected: {diagnostic}");
                extra = Some(("last_good_markup", json!(last_good_markup)));
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "COMPILE_REJECTED",
                    diagnostic.clone(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let (Some((key, value)), Some(map)) = (extra, error.as_object_mut()) {
            map.insert(key.to_string(), value);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("doc".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(AssemblyError::TemplateMissing).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::from(StoreError::Io(std::io::Error::other("disk")))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_pipeline_rejection_drops_rejected_markup() {
        let err = AppError::from(PipelineError::CompileRejected {
            diagnostic: "! Emergency stop.".to_string(),
            last_good_markup: Some("good".to_string()),
            rejected_markup: "bad".to_string(),
        });
        match err {
            AppError::CompileRejected {
                diagnostic,
                last_good_markup,
            } => {
                assert_eq!(diagnostic, "! Emergency stop.");
                assert_eq!(last_good_markup.as_deref(), Some("good"));
            }
            other => panic!("expected CompileRejected, got {other:?}"),
        }
    }
}
