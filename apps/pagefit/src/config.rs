use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::layout::policy::BudgetPolicy;

/// Application configuration loaded from environment variables.
/// Everything has a default; startup fails only on values that do not parse.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    /// Postgres block store when set, filesystem store under `content_dir` otherwise.
    pub database_url: Option<String>,
    pub content_dir: PathBuf,
    /// Built-in template when unset.
    pub template_path: Option<PathBuf>,
    /// LLM ranker when set, keyword ranker otherwise.
    pub anthropic_api_key: Option<String>,
    pub target_pages: f32,
    pub lines_per_page: u32,
    pub max_adaptive_iterations: u32,
    pub ranker_timeout_secs: u64,
    /// Wall-clock cap on one adaptive reduction loop.
    pub enforcement_timeout_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: optional_env("DATABASE_URL"),
            content_dir: optional_env("CONTENT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./content")),
            template_path: optional_env("TEMPLATE_PATH").map(PathBuf::from),
            anthropic_api_key: optional_env("ANTHROPIC_API_KEY"),
            target_pages: parse_env("TARGET_PAGES", 2.0)?,
            lines_per_page: parse_env("LINES_PER_PAGE", 45)?,
            max_adaptive_iterations: parse_env("MAX_ADAPTIVE_ITERATIONS", 5)?,
            ranker_timeout_secs: parse_env("RANKER_TIMEOUT_SECS", 30)?,
            enforcement_timeout_secs: optional_env("ENFORCEMENT_TIMEOUT_SECS")
                .map(|raw| parse_value("ENFORCEMENT_TIMEOUT_SECS", &raw))
                .transpose()?,
        })
    }

    /// Default budget policy for requests that do not send their own.
    pub fn policy(&self) -> BudgetPolicy {
        BudgetPolicy {
            target_pages: self.target_pages,
            lines_per_page: self.lines_per_page,
            max_adaptive_iterations: self.max_adaptive_iterations,
            ..Default::default()
        }
    }
}

/// Unset and blank variables are both treated as absent.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_config() -> Config {
        Config {
            port: 8080,
            rust_log: "info".to_string(),
            database_url: None,
            content_dir: PathBuf::from("./content"),
            template_path: None,
            anthropic_api_key: None,
            target_pages: 1.0,
            lines_per_page: 50,
            max_adaptive_iterations: 3,
            ranker_timeout_secs: 30,
            enforcement_timeout_secs: None,
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u32>("LINES_PER_PAGE", " 48 ").unwrap(), 48);
        assert_eq!(parse_value::<f32>("TARGET_PAGES", "1.5").unwrap(), 1.5);

        let err = parse_value::<u16>("PORT", "eighty").unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_policy_carries_configured_budget() {
        let policy = make_config().policy();
        assert_eq!(policy.target_pages, 1.0);
        assert_eq!(policy.lines_per_page, 50);
        assert_eq!(policy.max_adaptive_iterations, 3);
        assert_eq!(policy.max_experiences, BudgetPolicy::default().max_experiences);
    }
}
