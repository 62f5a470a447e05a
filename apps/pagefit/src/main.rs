mod config;
mod db;
mod errors;
mod generation;
mod layout;
mod llm_client;
mod models;
mod render;
mod routes;
mod state;
mod store;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::create_pool;
use crate::layout::policy::BudgetPolicy;
use crate::layout::ranking::ContentRanker;
use crate::layout::{KeywordContentRanker, LlmContentRanker};
use crate::llm_client::LlmClient;
use crate::render::DEFAULT_TEMPLATE;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{BlockStore, DocumentLocks, FsBlockStore, PgBlockStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on unparseable values)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting pagefit v{}", env!("CARGO_PKG_VERSION"));

    let policy: BudgetPolicy = config.policy();
    policy
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid budget settings in environment")?;
    info!(
        target_pages = policy.target_pages,
        lines_per_page = policy.lines_per_page,
        max_adaptive_iterations = policy.max_adaptive_iterations,
        "Budget policy loaded"
    );

    let store = build_store(&config).await?;
    info!("Block store initialized ({})", store.name());

    let ranker = build_ranker(&config)?;
    info!("Content ranker initialized ({})", ranker.name());

    let template = load_template(&config).await?;

    // Build app state
    let state = AppState {
        config: config.clone(),
        store,
        ranker,
        compiler: None,
        policy,
        template: Arc::new(template),
        locks: DocumentLocks::new(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Postgres when DATABASE_URL is set, otherwise one JSON file per section under CONTENT_DIR.
async fn build_store(config: &Config) -> Result<Arc<dyn BlockStore>> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            let store = PgBlockStore::new(pool);
            store
                .ensure_schema()
                .await
                .context("Failed to create content_blocks table")?;
            Ok(Arc::new(store))
        }
        None => {
            tokio::fs::create_dir_all(&config.content_dir)
                .await
                .with_context(|| {
                    format!("Cannot create CONTENT_DIR {}", config.content_dir.display())
                })?;
            Ok(Arc::new(FsBlockStore::new(config.content_dir.clone())))
        }
    }
}

fn build_ranker(config: &Config) -> Result<Arc<dyn ContentRanker>> {
    match &config.anthropic_api_key {
        Some(key) => {
            let llm = LlmClient::new(key.clone()).context("Failed to build LLM client")?;
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Ok(Arc::new(LlmContentRanker(llm)))
        }
        None => Ok(Arc::new(KeywordContentRanker)),
    }
}

async fn load_template(config: &Config) -> Result<String> {
    match &config.template_path {
        Some(path) => {
            let template = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Cannot read TEMPLATE_PATH {}", path.display()))?;
            info!(path = %path.display(), "Loaded document template");
            Ok(template)
        }
        None => {
            info!("Using built-in document template");
            Ok(DEFAULT_TEMPLATE.to_string())
        }
    }
}
