//! Local fallback ordering used when the ranking capability is unavailable.
//!
//! Order: trailing skills (down to a floor), then projects from the end, then trailing
//! experience bullets (down to a per-entry floor), then summary words (down to a floor).
//! Candidates are regenerated from the current snapshot every round, so the floors hold
//! across rounds as well as within one.

use crate::layout::candidates::{BulletSection, ItemRef, RemovalCandidate};
use crate::layout::policy::BudgetPolicy;
use crate::models::snapshot::ContentSnapshot;

pub fn fallback_candidates(
    snapshot: &ContentSnapshot,
    policy: &BudgetPolicy,
) -> Vec<RemovalCandidate> {
    let mut candidates = Vec::new();

    let skills = snapshot.skills.len();
    for index in (policy.fallback_min_skills..skills).rev() {
        candidates.push(RemovalCandidate::new(
            ItemRef::Skill { index },
            format!("fallback: trim skills (floor {})", policy.fallback_min_skills),
            1,
        ));
    }

    for index in (0..snapshot.projects.len()).rev() {
        candidates.push(RemovalCandidate::new(
            ItemRef::Project { index },
            "fallback: remove project",
            6,
        ));
    }

    for (entry, exp) in snapshot.experiences.iter().enumerate().rev() {
        for bullet in (policy.fallback_min_bullets..exp.bullets.len()).rev() {
            candidates.push(RemovalCandidate::new(
                ItemRef::Bullet {
                    section: BulletSection::Experience,
                    entry,
                    bullet,
                },
                format!(
                    "fallback: trim experience bullets (floor {})",
                    policy.fallback_min_bullets
                ),
                2,
            ));
        }
    }

    let words = snapshot.summary_word_count();
    if words > policy.fallback_min_summary_words {
        let count = (words - policy.fallback_min_summary_words)
            .min(policy.fallback_summary_words_step.max(1));
        candidates.push(RemovalCandidate::new(
            ItemRef::SummaryWords { count },
            format!(
                "fallback: shorten summary (floor {} words)",
                policy.fallback_min_summary_words
            ),
            (count / 8).max(1) as u32,
        ));
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::{ExperienceEntry, ProjectEntry};

    fn make_snapshot() -> ContentSnapshot {
        ContentSnapshot {
            summary: vec!["word"; 64].join(" "),
            experiences: vec![ExperienceEntry {
                bullets: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                ..Default::default()
            }],
            projects: vec![ProjectEntry::default(), ProjectEntry::default()],
            skills: (0..7).map(|i| format!("s{i}")).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_fallback_order_is_skills_projects_bullets_summary() {
        let items: Vec<ItemRef> = fallback_candidates(&make_snapshot(), &BudgetPolicy::default())
            .into_iter()
            .map(|c| c.item)
            .collect();
        assert_eq!(
            items,
            vec![
                ItemRef::Skill { index: 6 },
                ItemRef::Skill { index: 5 },
                ItemRef::Project { index: 1 },
                ItemRef::Project { index: 0 },
                ItemRef::Bullet {
                    section: BulletSection::Experience,
                    entry: 0,
                    bullet: 3
                },
                ItemRef::Bullet {
                    section: BulletSection::Experience,
                    entry: 0,
                    bullet: 2
                },
                ItemRef::SummaryWords { count: 14 },
            ]
        );
    }

    #[test]
    fn test_fallback_respects_floors() {
        let snapshot = ContentSnapshot {
            summary: vec!["word"; 40].join(" "),
            experiences: vec![ExperienceEntry {
                bullets: vec!["a".into(), "b".into()],
                ..Default::default()
            }],
            skills: (0..3).map(|i| format!("s{i}")).collect(),
            ..Default::default()
        };
        assert!(fallback_candidates(&snapshot, &BudgetPolicy::default()).is_empty());
    }
}
