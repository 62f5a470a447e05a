use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::errors::AppError;
use crate::generation::compiler::DocumentCompiler;
use crate::layout::policy::BudgetPolicy;
use crate::layout::ranking::{ContentRanker, RelevanceContext};
use crate::layout::reducer::ReduceOptions;
use crate::store::{BlockStore, DocumentLocks};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Section store. `PgBlockStore` when DATABASE_URL is set, else `FsBlockStore`.
    pub store: Arc<dyn BlockStore>,
    /// Pluggable ranker. Default: KeywordContentRanker; LlmContentRanker with an API key.
    pub ranker: Arc<dyn ContentRanker>,
    /// External typesetting compiler, when the embedding process provides one.
    pub compiler: Option<Arc<dyn DocumentCompiler>>,
    pub policy: BudgetPolicy,
    pub template: Arc<String>,
    pub locks: DocumentLocks,
}

impl AppState {
    /// The request's policy if it sent one, else the configured default.
    pub fn resolve_policy(&self, requested: Option<BudgetPolicy>) -> Result<BudgetPolicy, AppError> {
        let policy = requested.unwrap_or_else(|| self.policy.clone());
        policy.validate().map_err(AppError::Validation)?;
        Ok(policy)
    }

    pub fn reduce_options(&self, relevance: RelevanceContext) -> ReduceOptions {
        ReduceOptions {
            relevance,
            deadline: self
                .config
                .enforcement_timeout_secs
                .map(|secs| tokio::time::Instant::now() + Duration::from_secs(secs)),
            ranker_timeout: Duration::from_secs(self.config.ranker_timeout_secs),
            calibration_lines: 0,
        }
    }
}
