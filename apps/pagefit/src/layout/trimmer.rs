//! Deterministic Trimmer: fixed-priority truncation rules.
//!
//! # Architecture
//! - `STANDARD_RULES` is an ordered, non-reorderable list. After each rule that changes the
//!   snapshot, the estimator runs again and trimming stops once the target is met.
//! - If all seven rules leave the snapshot over budget, `apply_aggressive_pass` applies the
//!   tight caps in one idempotent step. Still over budget afterwards → a `BudgetOverrun` log
//!   entry, returned as a non-fatal outcome.
//! - No rule reorders content. Entry drops pick survivors by `priority` (absent = lowest
//!   tier, ties by original position) and keep them in original order.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::layout::audit::{ItemType, ReductionLogEntry};
use crate::layout::estimator::{estimate, EstimationResult};
use crate::layout::policy::BudgetPolicy;
use crate::models::snapshot::ContentSnapshot;

// ────────────────────────────────────────────────────────────────────────────
// Output types
// ────────────────────────────────────────────────────────────────────────────

/// Counts of what the trimmer removed, per category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimSummary {
    pub summary_words_removed: usize,
    pub experience_bullets_removed: usize,
    pub project_bullets_removed: usize,
    pub experiences_removed: usize,
    pub projects_removed: usize,
    pub skills_removed: usize,
    pub education_removed: usize,
    pub bullets_shortened: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimOutcome {
    pub snapshot: ContentSnapshot,
    pub log: Vec<ReductionLogEntry>,
    pub before: EstimationResult,
    pub after: EstimationResult,
    pub target_met: bool,
    pub aggressive_applied: bool,
    pub summary: TrimSummary,
}

/// What a rule changed, for the audit log.
struct RuleChange {
    item_type: ItemType,
    description: String,
    reason: String,
}

type TrimRule = fn(&mut ContentSnapshot, &BudgetPolicy, &mut TrimSummary) -> Option<RuleChange>;

/// Rules 1–7, in the order they must run.
const STANDARD_RULES: [TrimRule; 7] = [
    trim_summary,
    cap_experience_bullets,
    cap_project_bullets,
    drop_excess_experiences,
    drop_excess_projects,
    cap_skills,
    cap_education,
];

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

/// Trims `snapshot` until it fits `policy.target_pages` or the aggressive pass is spent.
pub fn trim(snapshot: ContentSnapshot, policy: &BudgetPolicy) -> TrimOutcome {
    let before = estimate(&snapshot, policy);
    let mut outcome = TrimOutcome {
        after: before.clone(),
        before,
        snapshot,
        log: Vec::new(),
        target_met: false,
        aggressive_applied: false,
        summary: TrimSummary::default(),
    };

    if outcome.before.within_budget(policy) {
        outcome.target_met = true;
        return outcome;
    }

    for rule in STANDARD_RULES {
        if apply_rule(&mut outcome, policy, rule) && outcome.after.within_budget(policy) {
            outcome.target_met = true;
            break;
        }
    }

    if !outcome.target_met {
        apply_aggressive_pass(&mut outcome, policy);
        outcome.aggressive_applied = true;
        outcome.target_met = outcome.after.within_budget(policy);

        if !outcome.target_met {
            warn!(
                estimated_pages = outcome.after.estimated_pages,
                target_pages = policy.target_pages,
                "Deterministic trimming exhausted: snapshot still over budget"
            );
            outcome.log.push(ReductionLogEntry::new(
                0,
                ItemType::BudgetOverrun,
                format!(
                    "Estimated {:.2} pages after aggressive pass (target {:.2})",
                    outcome.after.estimated_pages, policy.target_pages
                ),
                "aggressive pass could not reach the target",
                0,
            ));
        }
    }

    info!(
        before_lines = outcome.before.estimated_lines,
        after_lines = outcome.after.estimated_lines,
        target_met = outcome.target_met,
        aggressive = outcome.aggressive_applied,
        "Deterministic trimming complete"
    );

    outcome
}

/// Returns true if the rule changed the snapshot.
fn apply_rule(outcome: &mut TrimOutcome, policy: &BudgetPolicy, rule: TrimRule) -> bool {
    let Some(change) = rule(&mut outcome.snapshot, policy, &mut outcome.summary) else {
        return false;
    };
    let after = estimate(&outcome.snapshot, policy);
    let savings = outcome.after.estimated_lines.saturating_sub(after.estimated_lines);

    debug!(
        rule = ?change.item_type,
        savings_lines = savings,
        estimated_pages = after.estimated_pages,
        "Trim rule applied"
    );

    outcome.log.push(ReductionLogEntry::new(
        0,
        change.item_type,
        change.description,
        change.reason,
        savings,
    ));
    outcome.after = after;
    true
}

// ────────────────────────────────────────────────────────────────────────────
// Aggressive pass
// ────────────────────────────────────────────────────────────────────────────

/// Applies the tight caps in one step. Idempotent: a second call changes nothing.
fn apply_aggressive_pass(outcome: &mut TrimOutcome, policy: &BudgetPolicy) {
    let tight = BudgetPolicy {
        max_summary_words: policy.aggressive_max_summary_words,
        max_experience_bullets: policy.aggressive_max_bullets,
        max_project_bullets: policy.aggressive_max_bullets,
        max_experiences: policy.aggressive_max_experiences,
        max_projects: policy.aggressive_max_projects,
        max_skills: policy.aggressive_max_skills,
        max_education_entries: policy.aggressive_max_education_entries,
        ..policy.clone()
    };

    let aggressive_rules: [TrimRule; 8] = [
        trim_summary,
        drop_excess_experiences,
        drop_excess_projects,
        cap_experience_bullets,
        cap_project_bullets,
        shorten_bullets,
        cap_skills,
        cap_education,
    ];

    let mut changes = Vec::new();
    for rule in aggressive_rules {
        if let Some(mut change) = rule(&mut outcome.snapshot, &tight, &mut outcome.summary) {
            change.reason = format!("aggressive pass: {}", change.reason);
            changes.push(change);
        }
    }

    let after = estimate(&outcome.snapshot, policy);
    let total_savings = outcome.after.estimated_lines.saturating_sub(after.estimated_lines);

    // Savings are measured for the pass as a whole and attributed to its first change.
    for (i, change) in changes.into_iter().enumerate() {
        outcome.log.push(ReductionLogEntry::new(
            0,
            change.item_type,
            change.description,
            change.reason,
            if i == 0 { total_savings } else { 0 },
        ));
    }
    outcome.after = after;
}

// ────────────────────────────────────────────────────────────────────────────
// Rules
// ────────────────────────────────────────────────────────────────────────────

fn trim_summary(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let before = snapshot.summary_word_count();
    let truncated = truncate_words(&snapshot.summary, policy.max_summary_words)?;
    snapshot.summary = truncated;
    summary.summary_words_removed += before - policy.max_summary_words;
    Some(RuleChange {
        item_type: ItemType::SummaryWords,
        description: format!(
            "Truncated summary from {before} to {} words",
            policy.max_summary_words
        ),
        reason: format!("max_summary_words={}", policy.max_summary_words),
    })
}

fn cap_experience_bullets(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let removed = cap_lists(
        snapshot.experiences.iter_mut().map(|e| &mut e.bullets),
        policy.max_experience_bullets,
    );
    if removed == 0 {
        return None;
    }
    summary.experience_bullets_removed += removed;
    Some(RuleChange {
        item_type: ItemType::ExperienceBullets,
        description: format!("Removed {removed} experience bullets"),
        reason: format!("max_experience_bullets={}", policy.max_experience_bullets),
    })
}

fn cap_project_bullets(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let removed = cap_lists(
        snapshot.projects.iter_mut().map(|p| &mut p.bullets),
        policy.max_project_bullets,
    );
    if removed == 0 {
        return None;
    }
    summary.project_bullets_removed += removed;
    Some(RuleChange {
        item_type: ItemType::ProjectBullets,
        description: format!("Removed {removed} project bullets"),
        reason: format!("max_project_bullets={}", policy.max_project_bullets),
    })
}

fn drop_excess_experiences(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let dropped = keep_by_priority(&mut snapshot.experiences, policy.max_experiences, |e| {
        e.priority
    });
    if dropped.is_empty() {
        return None;
    }
    summary.experiences_removed += dropped.len();
    let titles: Vec<&str> = dropped.iter().map(|e| e.title.as_str()).collect();
    Some(RuleChange {
        item_type: ItemType::Experience,
        description: format!("Dropped {} experiences: {}", dropped.len(), titles.join(", ")),
        reason: format!("max_experiences={}", policy.max_experiences),
    })
}

fn drop_excess_projects(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let dropped = keep_by_priority(&mut snapshot.projects, policy.max_projects, |p| p.priority);
    if dropped.is_empty() {
        return None;
    }
    summary.projects_removed += dropped.len();
    let names: Vec<&str> = dropped.iter().map(|p| p.name.as_str()).collect();
    Some(RuleChange {
        item_type: ItemType::Project,
        description: format!("Dropped {} projects: {}", dropped.len(), names.join(", ")),
        reason: format!("max_projects={}", policy.max_projects),
    })
}

fn cap_skills(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let removed = snapshot.skills.len().saturating_sub(policy.max_skills);
    if removed == 0 {
        return None;
    }
    snapshot.skills.truncate(policy.max_skills);
    summary.skills_removed += removed;
    Some(RuleChange {
        item_type: ItemType::Skill,
        description: format!("Removed {removed} trailing skills"),
        reason: format!("max_skills={}", policy.max_skills),
    })
}

fn cap_education(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let removed = snapshot
        .education
        .len()
        .saturating_sub(policy.max_education_entries);
    if removed == 0 {
        return None;
    }
    snapshot.education.truncate(policy.max_education_entries);
    summary.education_removed += removed;
    Some(RuleChange {
        item_type: ItemType::Education,
        description: format!("Removed {removed} education entries"),
        reason: format!("max_education_entries={}", policy.max_education_entries),
    })
}

/// Aggressive-only: caps every bullet at `aggressive_max_bullet_words`.
fn shorten_bullets(
    snapshot: &mut ContentSnapshot,
    policy: &BudgetPolicy,
    summary: &mut TrimSummary,
) -> Option<RuleChange> {
    let max_words = policy.aggressive_max_bullet_words;
    let mut shortened = 0usize;
    let bullets = snapshot
        .experiences
        .iter_mut()
        .flat_map(|e| e.bullets.iter_mut())
        .chain(snapshot.projects.iter_mut().flat_map(|p| p.bullets.iter_mut()));
    for bullet in bullets {
        if let Some(short) = truncate_words(bullet, max_words) {
            *bullet = short;
            shortened += 1;
        }
    }
    if shortened == 0 {
        return None;
    }
    summary.bullets_shortened += shortened;
    Some(RuleChange {
        item_type: ItemType::Bullet,
        description: format!("Shortened {shortened} bullets to {max_words} words"),
        reason: format!("aggressive_max_bullet_words={max_words}"),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

/// Keeps the first `max_words` words and marks the cut with `...`.
/// Returns `None` when the text is already short enough.
pub(crate) fn truncate_words(text: &str, max_words: usize) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return None;
    }
    if max_words == 0 {
        return Some(String::new());
    }
    let mut kept = words[..max_words].join(" ");
    kept.push_str("...");
    Some(kept)
}

/// Truncates each list to `max`, returning the number of removed items.
fn cap_lists<'a>(lists: impl Iterator<Item = &'a mut Vec<String>>, max: usize) -> usize {
    lists
        .map(|list| {
            let removed = list.len().saturating_sub(max);
            list.truncate(max);
            removed
        })
        .sum()
}

/// Keeps the `max` most important items (lowest priority value, absent last, ties by
/// position) in their original order. Returns the dropped items in original order.
pub(crate) fn keep_by_priority<T>(
    items: &mut Vec<T>,
    max: usize,
    priority: impl Fn(&T) -> Option<i32>,
) -> Vec<T> {
    if items.len() <= max {
        return Vec::new();
    }

    let mut ranked: Vec<(i32, usize)> = items
        .iter()
        .enumerate()
        .map(|(i, item)| (priority(item).unwrap_or(i32::MAX), i))
        .collect();
    ranked.sort();

    let mut keep = vec![false; items.len()];
    for &(_, i) in ranked.iter().take(max) {
        keep[i] = true;
    }

    let mut kept = Vec::with_capacity(max);
    let mut dropped = Vec::new();
    for (item, keep) in std::mem::take(items).into_iter().zip(keep) {
        if keep {
            kept.push(item);
        } else {
            dropped.push(item);
        }
    }
    *items = kept;
    dropped
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
