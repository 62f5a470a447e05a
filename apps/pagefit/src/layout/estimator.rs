//! Renderer-free page estimator.
//!
//! Maps a content snapshot to an approximate line count without running the typesetter.
//! The weights are conservative: they model moderncv's fixed per-entry overhead plus a
//! words-per-line divisor for wrapped text. List items wrap at roughly 10 words per line,
//! project bullets (narrower, inline) at 15, and summary prose at 8.
//!
//! Pure and deterministic. Never fails: missing lists are simply empty.

use serde::{Deserialize, Serialize};

use crate::layout::policy::BudgetPolicy;
use crate::models::snapshot::{ContentSnapshot, ProjectEntry};

// ────────────────────────────────────────────────────────────────────────────
// Weights
// ────────────────────────────────────────────────────────────────────────────

/// Name, contact table and vertical padding. Present even for an empty snapshot.
pub const HEADER_BASELINE_LINES: f32 = 14.0;
const SECTION_HEADER_LINES: f32 = 3.0;

const SUMMARY_WORDS_PER_LINE: f32 = 8.0;
const SUMMARY_MIN_LINES: f32 = 2.0;

const EXPERIENCE_OVERHEAD_LINES: f32 = 6.0;
const EXPERIENCE_WORDS_PER_LINE: f32 = 10.0;

const PROJECT_OVERHEAD_LINES: f32 = 3.0;
const PROJECT_WORDS_PER_LINE: f32 = 15.0;

/// Up to this many skills fit the fixed block below.
const SKILLS_WRAP_THRESHOLD: usize = 15;
const SKILLS_BASE_LINES: f32 = 8.0;
const SKILLS_WRAPPED_BASE_LINES: f32 = 12.0;
const SKILLS_PER_EXTRA_LINE: f32 = 5.0;

const EDUCATION_ENTRY_LINES: f32 = 5.0;

// ────────────────────────────────────────────────────────────────────────────
// Output types
// ────────────────────────────────────────────────────────────────────────────

/// Estimated cost of each section, in fractional lines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SectionBreakdown {
    pub header: f32,
    pub summary: f32,
    pub experience: f32,
    pub projects: f32,
    pub skills: f32,
    pub education: f32,
    pub section_headers: f32,
}

impl SectionBreakdown {
    pub fn total(&self) -> f32 {
        self.header
            + self.summary
            + self.experience
            + self.projects
            + self.skills
            + self.education
            + self.section_headers
    }
}

/// Result of one estimation. Always recomputed after a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    pub estimated_lines: u32,
    pub estimated_pages: f32,
    pub breakdown: SectionBreakdown,
}

impl EstimationResult {
    pub fn within_budget(&self, policy: &BudgetPolicy) -> bool {
        self.estimated_pages <= policy.target_pages
    }

    /// Lines that still have to go for the estimate to meet the target (0 when within).
    pub fn over_budget_lines(&self, policy: &BudgetPolicy) -> u32 {
        let over = self.estimated_lines as f32 - policy.target_lines();
        if over > 0.0 {
            over.ceil() as u32
        } else {
            0
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Core functions
// ────────────────────────────────────────────────────────────────────────────

/// Estimates the rendered length of `snapshot` under `policy.lines_per_page`.
pub fn estimate(snapshot: &ContentSnapshot, policy: &BudgetPolicy) -> EstimationResult {
    let breakdown = breakdown(snapshot);
    let estimated_lines = breakdown.total() as u32;
    let estimated_pages = estimated_lines as f32 / policy.lines_per_page.max(1) as f32;

    EstimationResult {
        estimated_lines,
        estimated_pages,
        breakdown,
    }
}

/// Per-section line costs for `snapshot`.
pub fn breakdown(snapshot: &ContentSnapshot) -> SectionBreakdown {
    let mut visible_sections = 0u32;

    let summary_words = snapshot.summary_word_count();
    let summary = if summary_words > 0 {
        SECTION_HEADER_LINES + (summary_words as f32 / SUMMARY_WORDS_PER_LINE).max(SUMMARY_MIN_LINES)
    } else {
        0.0
    };

    let experience: f32 = snapshot
        .experiences
        .iter()
        .map(|exp| {
            EXPERIENCE_OVERHEAD_LINES
                + exp.bullets.iter().map(|b| experience_bullet_lines(b)).sum::<f32>()
        })
        .sum();
    if !snapshot.experiences.is_empty() {
        visible_sections += 1;
    }

    let projects: f32 = snapshot.projects.iter().map(project_lines).sum();
    if !snapshot.projects.is_empty() {
        visible_sections += 1;
    }

    let skills = skills_lines(snapshot.skills.len());
    if !snapshot.skills.is_empty() {
        visible_sections += 1;
    }

    let education = snapshot.education.len() as f32 * EDUCATION_ENTRY_LINES;
    if !snapshot.education.is_empty() {
        visible_sections += 1;
    }

    SectionBreakdown {
        header: HEADER_BASELINE_LINES,
        summary,
        experience,
        projects,
        skills,
        education,
        section_headers: visible_sections as f32 * SECTION_HEADER_LINES,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn experience_bullet_lines(bullet: &str) -> f32 {
    (word_count(bullet) as f32 / EXPERIENCE_WORDS_PER_LINE + 1.0).max(1.0)
}

fn project_text_lines(text: &str) -> f32 {
    (word_count(text) as f32 / PROJECT_WORDS_PER_LINE + 0.5).max(0.5)
}

fn project_lines(project: &ProjectEntry) -> f32 {
    let body = if !project.bullets.is_empty() {
        project.bullets.iter().map(|b| project_text_lines(b)).sum()
    } else {
        match project.description.as_deref() {
            Some(desc) if !desc.trim().is_empty() => project_text_lines(desc),
            _ => 0.0,
        }
    };
    PROJECT_OVERHEAD_LINES + body
}

fn skills_lines(count: usize) -> f32 {
    match count {
        0 => 0.0,
        n if n <= SKILLS_WRAP_THRESHOLD => SKILLS_BASE_LINES,
        n => SKILLS_WRAPPED_BASE_LINES + (n - SKILLS_WRAP_THRESHOLD) as f32 / SKILLS_PER_EXTRA_LINE,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::{EducationEntry, ExperienceEntry};

    fn make_policy() -> BudgetPolicy {
        BudgetPolicy::default()
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_empty_snapshot_returns_header_baseline() {
        let result = estimate(&ContentSnapshot::default(), &make_policy());
        assert_eq!(result.estimated_lines, 14);
        assert!(result.estimated_pages > 0.0);
    }

    #[test]
    fn test_summary_has_minimum_cost() {
        let snapshot = ContentSnapshot {
            summary: "Short summary.".to_string(),
            ..Default::default()
        };
        // 14 baseline + 3 header + max(2, 2/8)
        assert_eq!(estimate(&snapshot, &make_policy()).estimated_lines, 19);
    }

    #[test]
    fn test_experience_cost_grows_with_bullets() {
        let one = ContentSnapshot {
            experiences: vec![ExperienceEntry {
                bullets: vec![words(12)],
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut two = one.clone();
        two.experiences[0].bullets.push(words(12));

        let a = estimate(&one, &make_policy()).estimated_lines;
        let b = estimate(&two, &make_policy()).estimated_lines;
        // 12-word bullet = 12/10 + 1 = 2.2 lines
        assert_eq!(a, (14.0 + 3.0 + 6.0 + 2.2_f32) as u32);
        assert!(b > a, "adding a bullet must add lines ({a} -> {b})");
    }

    #[test]
    fn test_project_without_bullets_uses_description() {
        let snapshot = ContentSnapshot {
            projects: vec![ProjectEntry {
                name: "pagefit".to_string(),
                description: Some(words(30)),
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = estimate(&snapshot, &make_policy());
        // 3 overhead + 30/15 + 0.5 = 5.5
        assert!((result.breakdown.projects - 5.5).abs() < 1e-4);
    }

    #[test]
    fn test_skills_cost_is_sublinear_above_threshold() {
        assert_eq!(skills_lines(0), 0.0);
        assert_eq!(skills_lines(1), 8.0);
        assert_eq!(skills_lines(15), 8.0);
        assert_eq!(skills_lines(20), 13.0);
        assert!(skills_lines(40) - skills_lines(20) < 20.0);
    }

    #[test]
    fn test_section_headers_counted_per_visible_section() {
        let snapshot = ContentSnapshot {
            skills: vec!["Rust".to_string()],
            education: vec![EducationEntry::default()],
            ..Default::default()
        };
        let result = estimate(&snapshot, &make_policy());
        assert_eq!(result.breakdown.section_headers, 6.0);
        assert_eq!(result.estimated_lines, 14 + 8 + 5 + 6);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let snapshot = ContentSnapshot {
            summary: words(120),
            skills: (0..22).map(|i| format!("skill{i}")).collect(),
            ..Default::default()
        };
        let policy = make_policy();
        assert_eq!(estimate(&snapshot, &policy), estimate(&snapshot, &policy));
    }

    #[test]
    fn test_over_budget_lines() {
        let policy = BudgetPolicy {
            target_pages: 1.0,
            lines_per_page: 20,
            ..Default::default()
        };
        let snapshot = ContentSnapshot {
            summary: words(80),
            ..Default::default()
        };
        // 14 + 3 + 10 = 27 lines → 7 over a 20-line target
        let result = estimate(&snapshot, &policy);
        assert_eq!(result.estimated_lines, 27);
        assert_eq!(result.over_budget_lines(&policy), 7);
        assert!(!result.within_budget(&policy));
    }
}
