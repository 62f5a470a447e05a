//! Typesetting compiler seam. The process that actually runs the engine lives outside this
//! crate; the pipeline only needs a page count back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompileReport {
    /// Pages in the produced artifact, if the compiler could tell.
    pub page_count: Option<u32>,
    pub log: String,
}

#[derive(Debug, Error)]
pub enum CompileError {
    /// The engine refused the markup. Carries the engine's diagnostic.
    #[error("Compiler rejected markup: {diagnostic}")]
    Rejected { diagnostic: String },

    #[error("Compiler unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DocumentCompiler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn compile(&self, markup: &str) -> Result<CompileReport, CompileError>;
}
