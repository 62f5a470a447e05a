//! Content ranking: pluggable, trait-based importance ranking for adaptive reduction.
//!
//! Default: `KeywordContentRanker` (pure-Rust, deterministic, no network).
//! Optional: `LlmContentRanker` (semantic ranking through `LlmClient`), selected at startup
//! when an API key is configured.
//!
//! `AppState` holds an `Arc<dyn ContentRanker>`. A ranker error is never fatal: the reducer
//! switches to its local fallback ordering.

use std::cmp::Reverse;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::candidates::{BulletSection, ItemRef, RemovalCandidate};
use crate::layout::estimator::breakdown;
use crate::layout::prompts::{RANK_PROMPT_TEMPLATE, RANK_SYSTEM};
use crate::layout::reducer::MIN_MEASURABLE_SAVINGS;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::snapshot::ContentSnapshot;

/// Most candidates a ranker returns per call.
pub const MAX_CANDIDATES: usize = 12;

// ────────────────────────────────────────────────────────────────────────────
// Input / error types
// ────────────────────────────────────────────────────────────────────────────

/// Job-relevance signals supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelevanceContext {
    pub keywords: Vec<String>,
    pub target_role: Option<String>,
}

/// Everything a ranker is told about the current round.
#[derive(Debug, Clone, Serialize)]
pub struct RankingContext {
    pub relevance: RelevanceContext,
    pub estimated_pages: f32,
    pub target_pages: f32,
    pub lines_needed: u32,
}

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Ranking capability unavailable: {0}")]
    Unavailable(String),

    #[error("Ranking call timed out after {0}s")]
    Timeout(u64),

    #[error("LLM ranking failed: {0}")]
    Llm(#[from] LlmError),
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Ranks snapshot items for removal, least important first.
///
/// Carried in `AppState` as `Arc<dyn ContentRanker>`.
#[async_trait]
pub trait ContentRanker: Send + Sync {
    /// Backend name for logs and reports.
    fn name(&self) -> &'static str;

    async fn rank(
        &self,
        snapshot: &ContentSnapshot,
        context: &RankingContext,
    ) -> Result<Vec<RemovalCandidate>, RankingError>;
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordContentRanker: default implementation
// ────────────────────────────────────────────────────────────────────────────

/// Ranks by keyword relevance, then by removal cost, then by position.
///
/// Algorithm:
/// 1. Every skill, bullet, project and experience becomes a candidate. The first bullet of
///    an entry and the only remaining experience are never proposed.
/// 2. Candidates whose removal would not lower the estimate are dropped (a skill inside
///    the flat skills block saves nothing), and the rest carry their measured savings.
/// 3. Relevance = number of context keywords found in the item text (case-insensitive).
/// 4. Sort ascending by (relevance, kind: skill < bullet < project < experience,
///    later position first).
pub struct KeywordContentRanker;

#[async_trait]
impl ContentRanker for KeywordContentRanker {
    fn name(&self) -> &'static str {
        "keyword"
    }

    async fn rank(
        &self,
        snapshot: &ContentSnapshot,
        context: &RankingContext,
    ) -> Result<Vec<RemovalCandidate>, RankingError> {
        Ok(rank_by_keywords(snapshot, &context.relevance))
    }
}

struct Scored {
    relevance: usize,
    kind: u8,
    position: usize,
    candidate: RemovalCandidate,
}

pub(crate) fn rank_by_keywords(
    snapshot: &ContentSnapshot,
    relevance: &RelevanceContext,
) -> Vec<RemovalCandidate> {
    let keywords: Vec<String> = relevance
        .keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect();
    let score = |text: &str| {
        let text = text.to_lowercase();
        keywords.iter().filter(|k| text.contains(k.as_str())).count()
    };

    let mut scored = Vec::new();

    for (index, skill) in snapshot.skills.iter().enumerate() {
        scored.push(Scored {
            relevance: score(skill),
            kind: 0,
            position: index,
            candidate: RemovalCandidate::new(ItemRef::Skill { index }, "low keyword relevance", 1),
        });
    }

    for (entry, exp) in snapshot.experiences.iter().enumerate() {
        for (bullet, text) in exp.bullets.iter().enumerate().skip(1) {
            scored.push(Scored {
                relevance: score(text),
                kind: 1,
                position: entry * 100 + bullet,
                candidate: RemovalCandidate::new(
                    ItemRef::Bullet {
                        section: BulletSection::Experience,
                        entry,
                        bullet,
                    },
                    "bullet with low keyword relevance",
                    2,
                ),
            });
        }
    }

    for (entry, project) in snapshot.projects.iter().enumerate() {
        for (bullet, text) in project.bullets.iter().enumerate().skip(1) {
            scored.push(Scored {
                relevance: score(text),
                kind: 1,
                position: entry * 100 + bullet,
                candidate: RemovalCandidate::new(
                    ItemRef::Bullet {
                        section: BulletSection::Project,
                        entry,
                        bullet,
                    },
                    "project bullet with low keyword relevance",
                    1,
                ),
            });
        }
    }

    for (index, project) in snapshot.projects.iter().enumerate() {
        let text = format!(
            "{} {} {}",
            project.name,
            project.description.as_deref().unwrap_or(""),
            project.bullets.join(" ")
        );
        scored.push(Scored {
            relevance: score(&text),
            kind: 2,
            position: index,
            candidate: RemovalCandidate::new(ItemRef::Project { index }, "least relevant project", 6),
        });
    }

    if snapshot.experiences.len() > 1 {
        for (index, exp) in snapshot.experiences.iter().enumerate() {
            let text = format!("{} {} {}", exp.title, exp.organization, exp.bullets.join(" "));
            scored.push(Scored {
                relevance: score(&text),
                kind: 3,
                position: index,
                candidate: RemovalCandidate::new(
                    ItemRef::Experience { index },
                    "least relevant experience",
                    8,
                ),
            });
        }
    }

    let base_lines = breakdown(snapshot).total();
    scored.retain_mut(|s| {
        let mut trial = snapshot.clone();
        if s.candidate.item.remove_from(&mut trial).is_none() {
            return false;
        }
        let savings = base_lines - breakdown(&trial).total();
        s.candidate.estimated_savings_lines = savings.ceil() as u32;
        savings >= MIN_MEASURABLE_SAVINGS
    });

    scored.sort_by_key(|s| (s.relevance, s.kind, Reverse(s.position)));
    scored
        .into_iter()
        .take(MAX_CANDIDATES)
        .map(|s| s.candidate)
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// LlmContentRanker: semantic ranking via the LLM client
// ────────────────────────────────────────────────────────────────────────────

/// Asks the model for removal suggestions. Invalid references in the reply are tolerated:
/// the reducer skips anything that does not resolve.
pub struct LlmContentRanker(pub LlmClient);

#[derive(Debug, Deserialize)]
struct RankingResponse {
    #[serde(default)]
    removal_suggestions: Vec<RemovalCandidate>,
}

#[async_trait]
impl ContentRanker for LlmContentRanker {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn rank(
        &self,
        snapshot: &ContentSnapshot,
        context: &RankingContext,
    ) -> Result<Vec<RemovalCandidate>, RankingError> {
        let prompt = build_rank_prompt(snapshot, context);
        let response: RankingResponse = match self.0.call_json(&prompt, RANK_SYSTEM).await {
            Ok(response) => response,
            Err(LlmError::RateLimited { retries }) => {
                return Err(RankingError::Unavailable(format!(
                    "rate limited after {retries} retries"
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let mut candidates = response.removal_suggestions;
        candidates.truncate(MAX_CANDIDATES);
        Ok(candidates)
    }
}

pub(crate) fn build_rank_prompt(snapshot: &ContentSnapshot, context: &RankingContext) -> String {
    let keywords = if context.relevance.keywords.is_empty() {
        "none specified".to_string()
    } else {
        context.relevance.keywords.join(", ")
    };

    let experiences: Vec<String> = snapshot
        .experiences
        .iter()
        .enumerate()
        .map(|(i, exp)| {
            let bullets: Vec<String> = exp
                .bullets
                .iter()
                .enumerate()
                .map(|(b, text)| format!("    [{b}] {text}"))
                .collect();
            format!("  {i}: {} at {}\n{}", exp.title, exp.organization, bullets.join("\n"))
        })
        .collect();

    let projects: Vec<String> = snapshot
        .projects
        .iter()
        .enumerate()
        .map(|(i, project)| {
            let bullets: Vec<String> = project
                .bullets
                .iter()
                .enumerate()
                .map(|(b, text)| format!("    [{b}] {text}"))
                .collect();
            format!("  {i}: {}\n{}", project.name, bullets.join("\n"))
        })
        .collect();

    let skills: Vec<String> = snapshot
        .skills
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{i}:{s}"))
        .collect();

    RANK_PROMPT_TEMPLATE
        .replace("{estimated_pages}", &format!("{:.2}", context.estimated_pages))
        .replace("{target_pages}", &format!("{:.2}", context.target_pages))
        .replace("{lines_needed}", &context.lines_needed.to_string())
        .replace(
            "{target_role}",
            context.relevance.target_role.as_deref().unwrap_or("unspecified"),
        )
        .replace("{keywords}", &keywords)
        .replace("{summary_words}", &snapshot.summary_word_count().to_string())
        .replace("{experiences}", &or_none(experiences.join("\n")))
        .replace("{projects}", &or_none(projects.join("\n")))
        .replace("{skills}", &or_none(skills.join(", ")))
}

fn or_none(text: String) -> String {
    if text.trim().is_empty() {
        "none".to_string()
    } else {
        text
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
