//! Budget policy: numeric caps and target page count governing reduction.
//!
//! Defaults assume a moderncv résumé at 11pt on US letter, where roughly 45 estimator
//! lines fill one page. Every field is serde-defaulted so callers can send partial policies.

use serde::{Deserialize, Serialize};

/// Caps and targets for one enforcement run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetPolicy {
    pub target_pages: f32,
    pub lines_per_page: u32,

    // Standard caps (trimmer rules 1–7)
    pub max_experiences: usize,
    pub max_experience_bullets: usize,
    pub max_projects: usize,
    pub max_project_bullets: usize,
    pub max_skills: usize,
    pub max_summary_words: usize,
    pub max_education_entries: usize,

    // Aggressive terminal pass (trimmer rule 8)
    pub aggressive_max_experiences: usize,
    pub aggressive_max_bullets: usize,
    pub aggressive_max_projects: usize,
    pub aggressive_max_skills: usize,
    pub aggressive_max_summary_words: usize,
    pub aggressive_max_education_entries: usize,
    pub aggressive_max_bullet_words: usize,

    // Adaptive reducer
    pub max_adaptive_iterations: u32,
    /// Rounds needing more than this many lines remove several candidates at once.
    pub multi_removal_threshold_lines: u32,
    pub max_removals_per_round: usize,
    /// The reducer only runs when the trimmed snapshot is over budget by more than this.
    pub adaptive_trigger_lines: u32,

    // Fallback floors used when the ranker is unavailable
    pub fallback_min_skills: usize,
    pub fallback_min_bullets: usize,
    pub fallback_min_summary_words: usize,
    pub fallback_summary_words_step: usize,

    /// Recompile attempts after the compiled artifact overshoots the target.
    pub max_compile_rounds: u32,
}

impl Default for BudgetPolicy {
    fn default() -> Self {
        Self {
            target_pages: 2.0,
            lines_per_page: 45,

            max_experiences: 4,
            max_experience_bullets: 3,
            max_projects: 3,
            max_project_bullets: 2,
            max_skills: 16,
            max_summary_words: 100,
            max_education_entries: 2,

            aggressive_max_experiences: 2,
            aggressive_max_bullets: 1,
            aggressive_max_projects: 0,
            aggressive_max_skills: 10,
            aggressive_max_summary_words: 50,
            aggressive_max_education_entries: 1,
            aggressive_max_bullet_words: 30,

            max_adaptive_iterations: 5,
            multi_removal_threshold_lines: 10,
            max_removals_per_round: 3,
            adaptive_trigger_lines: 0,

            fallback_min_skills: 5,
            fallback_min_bullets: 2,
            fallback_min_summary_words: 50,
            fallback_summary_words_step: 20,

            max_compile_rounds: 2,
        }
    }
}

impl BudgetPolicy {
    /// Target expressed in estimator lines.
    pub fn target_lines(&self) -> f32 {
        self.target_pages * self.lines_per_page as f32
    }

    /// Rejects policies the estimator cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.target_pages.is_finite() && self.target_pages > 0.0) {
            return Err(format!(
                "target_pages must be a positive number, got {}",
                self.target_pages
            ));
        }
        if self.lines_per_page == 0 {
            return Err("lines_per_page must be greater than zero".to_string());
        }
        if self.max_removals_per_round == 0 {
            return Err("max_removals_per_round must be at least 1".to_string());
        }
        Ok(())
    }
}
