//! Adaptive Reducer: ranker-guided removal rounds for snapshots the trimmer could not fit.
//!
//! # Architecture
//! - `reduce` is the public async entry point, bounded by `policy.max_adaptive_iterations`.
//! - Each round asks the `ContentRanker` for ordered candidates, then `apply_round` removes
//!   up to N of them (N > 1 only when the overshoot exceeds
//!   `policy.multi_removal_threshold_lines`).
//! - A candidate that does not resolve, or whose removal does not lower the estimate, is
//!   skipped and the next one tried. Only ranker-named items are ever removed.
//! - If the ranker errors or times out, the rest of the run uses `fallback_candidates`.
//! - A caller deadline is checked between rounds; the round in flight always completes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::layout::audit::ReductionLogEntry;
use crate::layout::candidates::RemovalCandidate;
use crate::layout::estimator::{breakdown, estimate, EstimationResult};
use crate::layout::fallback::fallback_candidates;
use crate::layout::policy::BudgetPolicy;
use crate::layout::ranking::{ContentRanker, RankingContext, RankingError, RelevanceContext};
use crate::models::snapshot::ContentSnapshot;

/// Fractional-line change below which a removal counts as "no measurable reduction".
pub(crate) const MIN_MEASURABLE_SAVINGS: f32 = 1e-3;

// ────────────────────────────────────────────────────────────────────────────
// Input / output types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReduceOptions {
    pub relevance: RelevanceContext,
    /// Abandon the loop (after the current round) once this instant has passed.
    pub deadline: Option<Instant>,
    pub ranker_timeout: Duration,
    /// Lines the estimator under-counts, learned from a compiled artifact.
    pub calibration_lines: u32,
}

impl Default for ReduceOptions {
    fn default() -> Self {
        Self {
            relevance: RelevanceContext::default(),
            deadline: None,
            ranker_timeout: Duration::from_secs(30),
            calibration_lines: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    NoCandidates,
    IterationsExhausted,
    DeadlineReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReductionStatus {
    AlreadyWithinBudget,
    Met,
    Partial { reason: PartialReason },
}

impl ReductionStatus {
    pub fn target_met(&self) -> bool {
        matches!(self, ReductionStatus::AlreadyWithinBudget | ReductionStatus::Met)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionOutcome {
    pub snapshot: ContentSnapshot,
    pub log: Vec<ReductionLogEntry>,
    pub status: ReductionStatus,
    pub iterations: u32,
    pub items_removed: usize,
    pub initial: EstimationResult,
    pub final_estimate: EstimationResult,
    /// True once the local fallback ordering replaced the ranker.
    pub used_fallback: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

/// Removes ranker-selected items, round by round, until the snapshot fits or the loop is spent.
pub async fn reduce(
    snapshot: ContentSnapshot,
    policy: &BudgetPolicy,
    ranker: &dyn ContentRanker,
    options: &ReduceOptions,
) -> ReductionOutcome {
    let initial = estimate(&snapshot, policy);
    let budget = CalibratedBudget {
        policy,
        calibration_lines: options.calibration_lines,
    };

    let mut current = snapshot;
    let mut log = Vec::new();
    let mut iterations = 0u32;
    let mut items_removed = 0usize;
    let mut used_fallback = false;

    let status = if budget.within(&initial) {
        ReductionStatus::AlreadyWithinBudget
    } else {
        let mut status = ReductionStatus::Partial {
            reason: PartialReason::IterationsExhausted,
        };

        for iteration in 1..=policy.max_adaptive_iterations {
            if options.deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(iteration, "Adaptive reduction abandoned: deadline reached");
                status = ReductionStatus::Partial {
                    reason: PartialReason::DeadlineReached,
                };
                break;
            }
            iterations = iteration;

            let estimation = estimate(&current, policy);
            let lines_needed = budget.lines_needed(&estimation);
            let round_size = if lines_needed > policy.multi_removal_threshold_lines {
                policy.max_removals_per_round
            } else {
                1
            };

            let candidates = if used_fallback {
                fallback_candidates(&current, policy)
            } else {
                let context = RankingContext {
                    relevance: options.relevance.clone(),
                    estimated_pages: budget.pages(&estimation),
                    target_pages: policy.target_pages,
                    lines_needed,
                };
                match rank_with_timeout(ranker, &current, &context, options.ranker_timeout).await
                {
                    Ok(candidates) => candidates,
                    Err(e) => {
                        warn!(
                            ranker = ranker.name(),
                            error = %e,
                            "Ranking unavailable, switching to fallback ordering"
                        );
                        used_fallback = true;
                        fallback_candidates(&current, policy)
                    }
                }
            };

            debug!(
                iteration,
                lines_needed,
                round_size,
                candidates = candidates.len(),
                "Adaptive reduction round"
            );

            let removed = apply_round(
                &mut current,
                candidates,
                round_size,
                iteration,
                &budget,
                &mut log,
            );
            items_removed += removed;

            if removed == 0 {
                status = ReductionStatus::Partial {
                    reason: PartialReason::NoCandidates,
                };
                break;
            }
            if budget.within(&estimate(&current, policy)) {
                status = ReductionStatus::Met;
                break;
            }
        }
        status
    };

    let final_estimate = estimate(&current, policy);

    info!(
        iterations,
        items_removed,
        initial_estimated_pages = initial.estimated_pages,
        final_estimated_pages = final_estimate.estimated_pages,
        target_met = status.target_met(),
        fallback = used_fallback,
        "Adaptive reduction complete"
    );

    ReductionOutcome {
        snapshot: current,
        log,
        status,
        iterations,
        items_removed,
        initial,
        final_estimate,
        used_fallback,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

/// Target check with the optional calibration offset applied to every estimate.
struct CalibratedBudget<'a> {
    policy: &'a BudgetPolicy,
    calibration_lines: u32,
}

impl CalibratedBudget<'_> {
    fn lines(&self, estimation: &EstimationResult) -> u32 {
        estimation.estimated_lines + self.calibration_lines
    }

    fn pages(&self, estimation: &EstimationResult) -> f32 {
        self.lines(estimation) as f32 / self.policy.lines_per_page.max(1) as f32
    }

    fn within(&self, estimation: &EstimationResult) -> bool {
        self.pages(estimation) <= self.policy.target_pages
    }

    fn lines_needed(&self, estimation: &EstimationResult) -> u32 {
        let over = self.lines(estimation) as f32 - self.policy.target_lines();
        if over > 0.0 {
            over.ceil() as u32
        } else {
            0
        }
    }
}

async fn rank_with_timeout(
    ranker: &dyn ContentRanker,
    snapshot: &ContentSnapshot,
    context: &RankingContext,
    timeout: Duration,
) -> Result<Vec<RemovalCandidate>, RankingError> {
    match tokio::time::timeout(timeout, ranker.rank(snapshot, context)).await {
        Ok(result) => result,
        Err(_) => Err(RankingError::Timeout(timeout.as_secs())),
    }
}

/// Removes up to `round_size` candidates with measurable savings, stopping early once the
/// budget is met. Returns the number removed.
fn apply_round(
    current: &mut ContentSnapshot,
    candidates: Vec<RemovalCandidate>,
    round_size: usize,
    iteration: u32,
    budget: &CalibratedBudget<'_>,
    log: &mut Vec<ReductionLogEntry>,
) -> usize {
    let mut pending = candidates;
    let mut removed = 0usize;

    while removed < round_size && !pending.is_empty() {
        let candidate = pending.remove(0);

        let mut trial = current.clone();
        let Some(description) = candidate.item.remove_from(&mut trial) else {
            debug!(item = ?candidate.item, "Skipping unresolvable removal candidate");
            continue;
        };

        let before = breakdown(current).total();
        let after = breakdown(&trial).total();
        if before - after < MIN_MEASURABLE_SAVINGS {
            debug!(item = ?candidate.item, "Skipping candidate with no measurable savings");
            continue;
        }

        *current = trial;
        removed += 1;
        log.push(ReductionLogEntry::new(
            iteration,
            candidate.item.item_type(),
            description,
            candidate.reason.clone(),
            (before - after).ceil() as u32,
        ));

        pending = pending
            .into_iter()
            .filter_map(|c| {
                c.item
                    .shift_after(&candidate.item)
                    .map(|item| RemovalCandidate { item, ..c })
            })
            .collect();

        if budget.within(&estimate(current, budget.policy)) {
            break;
        }
    }

    removed
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
