//! Document pipeline: budget enforcement, rendering and the optional compile loop.
//!
//! # Architecture
//! - `enforce_budget`: Estimator → (if over) Trimmer → (if still over by more than
//!   `policy.adaptive_trigger_lines`) Adaptive Reducer. Trimming runs via
//!   `tokio::task::spawn_blocking`; only the ranker call is awaited I/O.
//! - `generate_document`: `enforce_budget` → assemble → repair → optional
//!   `DocumentCompiler`. A compiled page count above the target re-enters the reducer with
//!   a calibration offset, at most `policy.max_compile_rounds` times.
//! - An unmet budget is a warning in the report, never an error. Generation fails only on
//!   an assembly error or a compiler rejection.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::generation::compiler::{CompileError, DocumentCompiler};
use crate::layout::audit::ReductionLogEntry;
use crate::layout::estimator::{estimate, EstimationResult};
use crate::layout::policy::BudgetPolicy;
use crate::layout::ranking::ContentRanker;
use crate::layout::reducer::{reduce, ReduceOptions, ReductionOutcome, ReductionStatus};
use crate::layout::trimmer::{trim, TrimSummary};
use crate::models::snapshot::ContentSnapshot;
use crate::render::{assemble, repair_with_report, AssemblyError, AssemblyOptions, RepairReport};

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    /// The compiler refused the markup. `last_good_markup` is the most recent markup it
    /// accepted in this run, if any.
    #[error("Compiler rejected the document: {diagnostic}")]
    CompileRejected {
        diagnostic: String,
        last_good_markup: Option<String>,
        rejected_markup: String,
    },

    #[error("Pipeline task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What one enforcement run did, for callers and the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetReport {
    pub initial: EstimationResult,
    pub final_estimate: EstimationResult,
    /// Present when the trimmer ran.
    pub trim_summary: Option<TrimSummary>,
    pub aggressive_applied: bool,
    /// Status of the last reducer run, if any ran.
    pub reduction_status: Option<ReductionStatus>,
    pub adaptive_iterations: u32,
    pub used_fallback: bool,
    pub log: Vec<ReductionLogEntry>,
    pub target_met: bool,
    pub warnings: Vec<String>,
}

impl BudgetReport {
    fn new(initial: EstimationResult) -> Self {
        Self {
            final_estimate: initial.clone(),
            initial,
            trim_summary: None,
            aggressive_applied: false,
            reduction_status: None,
            adaptive_iterations: 0,
            used_fallback: false,
            log: Vec::new(),
            target_met: false,
            warnings: Vec::new(),
        }
    }

    /// Folds a reducer run into the report and hands back its snapshot.
    fn absorb(&mut self, outcome: ReductionOutcome) -> ContentSnapshot {
        self.reduction_status = Some(outcome.status);
        self.adaptive_iterations += outcome.iterations;
        self.used_fallback |= outcome.used_fallback;
        self.log.extend(outcome.log);
        outcome.snapshot
    }
}

#[derive(Debug, Clone)]
pub struct BudgetOutcome {
    pub snapshot: ContentSnapshot,
    pub report: BudgetReport,
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub assembly: AssemblyOptions,
    pub reduce: ReduceOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompileSummary {
    pub page_count: Option<u32>,
    pub rounds: u32,
    pub log: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedDocument {
    pub snapshot: ContentSnapshot,
    pub markup: String,
    pub applied_rules: Vec<&'static str>,
    pub report: BudgetReport,
    /// Absent when no compiler is configured or it was unavailable before the first round.
    pub compile: Option<CompileSummary>,
}

// ────────────────────────────────────────────────────────────────────────────
// Budget enforcement
// ────────────────────────────────────────────────────────────────────────────

/// Brings `snapshot` within `policy.target_pages` as far as the trimmer and reducer can.
pub async fn enforce_budget(
    snapshot: ContentSnapshot,
    policy: &BudgetPolicy,
    ranker: &dyn ContentRanker,
    options: &ReduceOptions,
) -> Result<BudgetOutcome, PipelineError> {
    let initial = estimate(&snapshot, policy);
    let mut report = BudgetReport::new(initial.clone());

    if initial.within_budget(policy) {
        info!(
            estimated_pages = initial.estimated_pages,
            target_pages = policy.target_pages,
            "Snapshot already within budget"
        );
        report.target_met = true;
        return Ok(BudgetOutcome { snapshot, report });
    }

    // CPU-bound rule passes, off the async executor.
    let trim_policy = policy.clone();
    let trimmed = tokio::task::spawn_blocking(move || trim(snapshot, &trim_policy)).await?;

    report.trim_summary = Some(trimmed.summary);
    report.aggressive_applied = trimmed.aggressive_applied;
    report.log.extend(trimmed.log);
    let mut snapshot = trimmed.snapshot;

    let over = trimmed.after.over_budget_lines(policy);
    if over > policy.adaptive_trigger_lines {
        let outcome = reduce(snapshot, policy, ranker, options).await;
        snapshot = report.absorb(outcome);
    } else if over > 0 {
        debug!(
            over_lines = over,
            trigger_lines = policy.adaptive_trigger_lines,
            "Overshoot below adaptive trigger, skipping reducer"
        );
    }

    let final_estimate = estimate(&snapshot, policy);
    report.target_met = final_estimate.within_budget(policy);
    if !report.target_met {
        let warning = format!(
            "Estimated {:.2} pages after reduction exceeds the {} page target",
            final_estimate.estimated_pages, policy.target_pages
        );
        warn!(
            estimated_pages = final_estimate.estimated_pages,
            target_pages = policy.target_pages,
            "Budget not met, continuing with best effort"
        );
        report.warnings.push(warning);
    }

    info!(
        initial_lines = report.initial.estimated_lines,
        final_lines = final_estimate.estimated_lines,
        removals = report.log.len(),
        target_met = report.target_met,
        "Budget enforcement complete"
    );
    report.final_estimate = final_estimate;

    Ok(BudgetOutcome { snapshot, report })
}

// ────────────────────────────────────────────────────────────────────────────
// Full generation
// ────────────────────────────────────────────────────────────────────────────

/// Enforces the budget, renders the snapshot and, if a compiler is given, verifies the
/// real page count.
pub async fn generate_document(
    snapshot: ContentSnapshot,
    template: &str,
    policy: &BudgetPolicy,
    ranker: &dyn ContentRanker,
    compiler: Option<&dyn DocumentCompiler>,
    options: &GenerateOptions,
) -> Result<GeneratedDocument, PipelineError> {
    let BudgetOutcome {
        mut snapshot,
        mut report,
    } = enforce_budget(snapshot, policy, ranker, &options.reduce).await?;

    let mut rendered = render(&snapshot, template, &options.assembly).await?;

    let Some(compiler) = compiler else {
        return Ok(GeneratedDocument {
            snapshot,
            markup: rendered.markup,
            applied_rules: rendered.applied_rules,
            report,
            compile: None,
        });
    };

    let mut compile: Option<CompileSummary> = None;
    let mut last_good: Option<String> = None;
    let mut calibration_lines = 0u32;
    let mut rounds = 0u32;

    loop {
        rounds += 1;
        let compiled = match compiler.compile(&rendered.markup).await {
            Ok(compiled) => compiled,
            Err(CompileError::Rejected { diagnostic }) => {
                warn!(
                    compiler = compiler.name(),
                    round = rounds,
                    diagnostic = %diagnostic,
                    "Compiler rejected markup"
                );
                return Err(PipelineError::CompileRejected {
                    diagnostic,
                    last_good_markup: last_good,
                    rejected_markup: rendered.markup,
                });
            }
            Err(e @ CompileError::Unavailable(_)) => {
                warn!(compiler = compiler.name(), error = %e, "Returning uncompiled markup");
                report.warnings.push(e.to_string());
                break;
            }
        };

        last_good = Some(rendered.markup.clone());
        compile = Some(CompileSummary {
            page_count: compiled.page_count,
            rounds,
            log: compiled.log,
        });

        let Some(pages) = compiled.page_count else {
            debug!(compiler = compiler.name(), "Compiler reported no page count");
            break;
        };
        let allowed = policy.target_pages.ceil() as u32;
        report.target_met = pages <= allowed;
        if report.target_met {
            info!(pages, rounds, "Compiled document within page target");
            break;
        }
        if rounds > policy.max_compile_rounds {
            warn!(pages, rounds, "Compile rounds exhausted over the page target");
            report.warnings.push(format!(
                "Compiled document has {pages} pages, target is {}",
                policy.target_pages
            ));
            break;
        }

        // The artifact holds more than `pages - 1` full pages; charge the estimator for
        // whatever it missed, and always at least one line more than last round.
        let estimated = estimate(&snapshot, policy);
        let floor_lines = (pages - 1) * policy.lines_per_page + 1;
        calibration_lines = floor_lines
            .saturating_sub(estimated.estimated_lines)
            .max(calibration_lines + 1);
        info!(
            pages,
            estimated_lines = estimated.estimated_lines,
            calibration_lines,
            "Compiled document over target, re-entering reducer"
        );

        let reduce_options = ReduceOptions {
            calibration_lines,
            ..options.reduce.clone()
        };
        let outcome = reduce(snapshot.clone(), policy, ranker, &reduce_options).await;
        if outcome.items_removed == 0 {
            report.absorb(outcome);
            warn!(pages, "Reducer found nothing more to remove after compile");
            report.warnings.push(format!(
                "Compiled document has {pages} pages and no further content could be removed"
            ));
            break;
        }
        snapshot = report.absorb(outcome);
        rendered = render(&snapshot, template, &options.assembly).await?;
    }

    report.final_estimate = estimate(&snapshot, policy);

    Ok(GeneratedDocument {
        snapshot,
        markup: rendered.markup,
        applied_rules: rendered.applied_rules,
        report,
        compile,
    })
}

/// Assemble then repair, off the async executor.
async fn render(
    snapshot: &ContentSnapshot,
    template: &str,
    options: &AssemblyOptions,
) -> Result<RepairReport, PipelineError> {
    let snapshot = snapshot.clone();
    let template = template.to_string();
    let options = options.clone();

    let report = tokio::task::spawn_blocking(move || {
        assemble(&snapshot, &template, &options).map(|markup| repair_with_report(&markup))
    })
    .await??;
    Ok(report)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::compiler::CompileReport;
    use crate::layout::audit::ItemType;
    use crate::layout::candidates::{BulletSection, ItemRef, RemovalCandidate};
    use crate::layout::ranking::{KeywordContentRanker, RankingContext, RankingError};
    use crate::models::snapshot::{ContactBlock, ExperienceEntry};
    use crate::render::DEFAULT_TEMPLATE;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedRanker(Vec<RemovalCandidate>);

    #[async_trait]
    impl ContentRanker for ScriptedRanker {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn rank(
            &self,
            _snapshot: &ContentSnapshot,
            _context: &RankingContext,
        ) -> Result<Vec<RemovalCandidate>, RankingError> {
            Ok(self.0.clone())
        }
    }

    /// Replays queued results and records every markup it was handed.
    struct ScriptedCompiler {
        results: Mutex<VecDeque<Result<CompileReport, CompileError>>>,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedCompiler {
        fn new(results: Vec<Result<CompileReport, CompileError>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DocumentCompiler for ScriptedCompiler {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn compile(&self, markup: &str) -> Result<CompileReport, CompileError> {
            self.seen.lock().unwrap().push(markup.to_string());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CompileError::Unavailable("script exhausted".to_string())))
        }
    }

    fn pages(n: u32) -> Result<CompileReport, CompileError> {
        Ok(CompileReport {
            page_count: Some(n),
            log: format!("Output written ({n} pages)"),
        })
    }

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    fn make_experience(i: usize, bullets: usize) -> ExperienceEntry {
        ExperienceEntry {
            title: format!("Role {i}"),
            organization: "Acme".to_string(),
            bullets: (0..bullets).map(|_| words(12)).collect(),
            ..Default::default()
        }
    }

    fn make_contact() -> ContactBlock {
        ContactBlock {
            name: Some("Ada Lovelace".to_string()),
            email: Some("ada@example.com".to_string()),
            phone: Some("5551234567".to_string()),
            ..Default::default()
        }
    }

    /// 200-word summary and six five-bullet roles: 147 estimated lines.
    fn make_overfull_snapshot() -> ContentSnapshot {
        ContentSnapshot {
            summary: words(200),
            experiences: (0..6).map(|i| make_experience(i, 5)).collect(),
            contact: make_contact(),
            ..Default::default()
        }
    }

    /// 100-word summary and four three-bullet roles: 82 estimated lines, under two pages.
    fn make_fitting_snapshot() -> ContentSnapshot {
        ContentSnapshot {
            summary: words(100),
            experiences: (0..4).map(|i| make_experience(i, 3)).collect(),
            contact: make_contact(),
            ..Default::default()
        }
    }

    fn drop_last_bullet_of_first_role() -> ScriptedRanker {
        ScriptedRanker(vec![RemovalCandidate::new(
            ItemRef::Bullet {
                section: BulletSection::Experience,
                entry: 0,
                bullet: 2,
            },
            "least specific",
            2,
        )])
    }

    // ── enforce_budget ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_within_budget_is_untouched() {
        let snapshot = make_fitting_snapshot();
        let outcome = enforce_budget(
            snapshot.clone(),
            &BudgetPolicy::default(),
            &KeywordContentRanker,
            &ReduceOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.snapshot, snapshot);
        assert!(outcome.report.target_met);
        assert!(outcome.report.trim_summary.is_none());
        assert!(outcome.report.log.is_empty());
    }

    #[tokio::test]
    async fn test_trimmer_alone_meets_budget() {
        let outcome = enforce_budget(
            make_overfull_snapshot(),
            &BudgetPolicy::default(),
            &KeywordContentRanker,
            &ReduceOptions::default(),
        )
        .await
        .unwrap();

        assert!(outcome.report.target_met);
        assert!(outcome.report.reduction_status.is_none());
        assert_eq!(outcome.snapshot.experiences.len(), 4);
        assert!(outcome.report.log.iter().all(|e| e.iteration == 0));
        assert!(outcome.report.final_estimate.estimated_lines < outcome.report.initial.estimated_lines);
    }

    #[tokio::test]
    async fn test_reducer_runs_after_aggressive_pass() {
        // Aggressive pass leaves 42 lines; a 0.8-page target allows 36.
        let policy = BudgetPolicy {
            target_pages: 0.8,
            ..Default::default()
        };
        let ranker = ScriptedRanker(vec![RemovalCandidate::new(
            ItemRef::Experience { index: 1 },
            "least relevant role",
            8,
        )]);

        let outcome = enforce_budget(make_overfull_snapshot(), &policy, &ranker, &ReduceOptions::default())
            .await
            .unwrap();

        assert!(outcome.report.aggressive_applied);
        assert_eq!(outcome.report.reduction_status, Some(ReductionStatus::Met));
        assert!(outcome.report.target_met);
        assert!(outcome.report.warnings.is_empty());
        assert_eq!(outcome.snapshot.experiences.len(), 1);
        assert_eq!(outcome.snapshot.experiences[0].title, "Role 0");

        let adaptive: Vec<_> = outcome.report.log.iter().filter(|e| e.iteration > 0).collect();
        assert_eq!(adaptive.len(), 1);
        assert_eq!(adaptive[0].removed_item_type, ItemType::Experience);
        assert!(outcome
            .report
            .log
            .iter()
            .any(|e| e.removed_item_type == ItemType::BudgetOverrun));
    }

    #[tokio::test]
    async fn test_trigger_threshold_skips_reducer() {
        let policy = BudgetPolicy {
            target_pages: 0.8,
            adaptive_trigger_lines: 10,
            ..Default::default()
        };
        let outcome = enforce_budget(
            make_overfull_snapshot(),
            &policy,
            &ScriptedRanker(Vec::new()),
            &ReduceOptions::default(),
        )
        .await
        .unwrap();

        assert!(outcome.report.reduction_status.is_none());
        assert!(!outcome.report.target_met);
        assert_eq!(outcome.report.warnings.len(), 1);
    }

    // ── generate_document ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_generate_without_compiler() {
        let document = generate_document(
            make_fitting_snapshot(),
            DEFAULT_TEMPLATE,
            &BudgetPolicy::default(),
            &KeywordContentRanker,
            None,
            &GenerateOptions::default(),
        )
        .await
        .unwrap();

        assert!(document.compile.is_none());
        assert!(document.markup.contains("\\cventry{"));
        assert!(document.markup.contains("\\email{ada@example.com}"));
        assert!(!document.markup.contains("% === AUTO:"));
    }

    #[tokio::test]
    async fn test_compile_overshoot_reenters_reducer() {
        let compiler = ScriptedCompiler::new(vec![pages(3), pages(2)]);
        let ranker = drop_last_bullet_of_first_role();

        let document = generate_document(
            make_fitting_snapshot(),
            DEFAULT_TEMPLATE,
            &BudgetPolicy::default(),
            &ranker,
            Some(&compiler),
            &GenerateOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(compiler.calls(), 2);
        let compile = document.compile.unwrap();
        assert_eq!(compile.page_count, Some(2));
        assert_eq!(compile.rounds, 2);
        assert!(document.report.target_met);
        assert_eq!(document.snapshot.experiences[0].bullets.len(), 2);
        assert_eq!(document.report.reduction_status, Some(ReductionStatus::Met));
    }

    #[tokio::test]
    async fn test_compile_rounds_are_bounded() {
        let compiler = ScriptedCompiler::new(vec![pages(3), pages(3), pages(3), pages(3)]);
        let policy = BudgetPolicy {
            max_compile_rounds: 1,
            ..Default::default()
        };

        let document = generate_document(
            make_fitting_snapshot(),
            DEFAULT_TEMPLATE,
            &policy,
            &KeywordContentRanker,
            Some(&compiler),
            &GenerateOptions::default(),
        )
        .await
        .unwrap();

        assert_eq!(compiler.calls(), 2);
        assert!(!document.report.target_met);
        assert!(document.report.warnings.iter().any(|w| w.contains("3 pages")));
    }

    #[tokio::test]
    async fn test_first_compile_rejection_has_no_good_markup() {
        let compiler = ScriptedCompiler::new(vec![Err(CompileError::Rejected {
            diagnostic: "! Undefined control sequence.".to_string(),
        })]);

        let err = generate_document(
            make_fitting_snapshot(),
            DEFAULT_TEMPLATE,
            &BudgetPolicy::default(),
            &KeywordContentRanker,
            Some(&compiler),
            &GenerateOptions::default(),
        )
        .await
        .unwrap_err();

        match err {
            PipelineError::CompileRejected {
                diagnostic,
                last_good_markup,
                rejected_markup,
            } => {
                assert!(diagnostic.contains("Undefined control sequence"));
                assert!(last_good_markup.is_none());
                assert!(rejected_markup.contains("\\begin{document}"));
            }
            other => panic!("expected CompileRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_later_rejection_keeps_last_good_markup() {
        let compiler = ScriptedCompiler::new(vec![
            pages(3),
            Err(CompileError::Rejected {
                diagnostic: "! Missing } inserted.".to_string(),
            }),
        ]);
        let ranker = drop_last_bullet_of_first_role();

        let err = generate_document(
            make_fitting_snapshot(),
            DEFAULT_TEMPLATE,
            &BudgetPolicy::default(),
            &ranker,
            Some(&compiler),
            &GenerateOptions::default(),
        )
        .await
        .unwrap_err();

        let first = compiler.seen.lock().unwrap()[0].clone();
        match err {
            PipelineError::CompileRejected {
                last_good_markup,
                rejected_markup,
                ..
            } => {
                assert_eq!(last_good_markup, Some(first));
                assert_ne!(last_good_markup.as_deref(), Some(rejected_markup.as_str()));
            }
            other => panic!("expected CompileRejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unavailable_compiler_is_a_warning() {
        let compiler = ScriptedCompiler::new(vec![Err(CompileError::Unavailable(
            "engine not installed".to_string(),
        ))]);

        let document = generate_document(
            make_fitting_snapshot(),
            DEFAULT_TEMPLATE,
            &BudgetPolicy::default(),
            &KeywordContentRanker,
            Some(&compiler),
            &GenerateOptions::default(),
        )
        .await
        .unwrap();

        assert!(document.compile.is_none());
        assert!(document.report.warnings[0].contains("engine not installed"));
    }

    #[tokio::test]
    async fn test_empty_template_fails_generation() {
        let err = generate_document(
            make_fitting_snapshot(),
            "   ",
            &BudgetPolicy::default(),
            &KeywordContentRanker,
            None,
            &GenerateOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Assembly(AssemblyError::TemplateMissing)));
    }
}
