//! Removal candidates: references to individual snapshot items that a ranker may
//! authorize for removal.
//!
//! References are positional. When a round removes several items, the remaining
//! candidates are re-based with `ItemRef::shift_after` so they keep pointing at the
//! same content.

use serde::{Deserialize, Serialize};

use crate::layout::audit::{preview, ItemType};
use crate::layout::trimmer::truncate_words;
use crate::models::snapshot::ContentSnapshot;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletSection {
    Experience,
    Project,
}

/// A positional reference into a `ContentSnapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemRef {
    Skill {
        index: usize,
    },
    Bullet {
        section: BulletSection,
        entry: usize,
        bullet: usize,
    },
    Project {
        index: usize,
    },
    Experience {
        index: usize,
    },
    /// Drop this many words from the end of the summary.
    SummaryWords {
        count: usize,
    },
}

/// One ranked removal suggestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalCandidate {
    #[serde(flatten)]
    pub item: ItemRef,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub estimated_savings_lines: u32,
}

impl RemovalCandidate {
    pub fn new(item: ItemRef, reason: impl Into<String>, estimated_savings_lines: u32) -> Self {
        Self {
            item,
            reason: reason.into(),
            estimated_savings_lines,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resolution and removal
// ────────────────────────────────────────────────────────────────────────────

impl ItemRef {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemRef::Skill { .. } => ItemType::Skill,
            ItemRef::Bullet { .. } => ItemType::Bullet,
            ItemRef::Project { .. } => ItemType::Project,
            ItemRef::Experience { .. } => ItemType::Experience,
            ItemRef::SummaryWords { .. } => ItemType::SummaryWords,
        }
    }

    /// Human-readable description, or `None` if the reference does not resolve.
    pub fn describe(&self, snapshot: &ContentSnapshot) -> Option<String> {
        match *self {
            ItemRef::Skill { index } => snapshot
                .skills
                .get(index)
                .map(|skill| format!("Skill: {skill}")),
            ItemRef::Bullet {
                section,
                entry,
                bullet,
            } => {
                let (owner, text) = match section {
                    BulletSection::Experience => {
                        let exp = snapshot.experiences.get(entry)?;
                        (exp.title.as_str(), exp.bullets.get(bullet)?)
                    }
                    BulletSection::Project => {
                        let project = snapshot.projects.get(entry)?;
                        (project.name.as_str(), project.bullets.get(bullet)?)
                    }
                };
                Some(format!("Bullet from {owner}: {}", preview(text, 60)))
            }
            ItemRef::Project { index } => snapshot
                .projects
                .get(index)
                .map(|p| format!("Project: {}", p.name)),
            ItemRef::Experience { index } => snapshot
                .experiences
                .get(index)
                .map(|e| format!("Experience: {} at {}", e.title, e.organization)),
            ItemRef::SummaryWords { count } => {
                let words = snapshot.summary_word_count();
                (count > 0 && words > 0)
                    .then(|| format!("Summary shortened by {} words", count.min(words)))
            }
        }
    }

    /// Removes the referenced item. Returns its description, or `None` if the reference
    /// does not resolve (the snapshot is then unchanged).
    pub fn remove_from(&self, snapshot: &mut ContentSnapshot) -> Option<String> {
        let description = self.describe(snapshot)?;
        match *self {
            ItemRef::Skill { index } => {
                snapshot.skills.remove(index);
            }
            ItemRef::Bullet {
                section: BulletSection::Experience,
                entry,
                bullet,
            } => {
                snapshot.experiences[entry].bullets.remove(bullet);
            }
            ItemRef::Bullet {
                section: BulletSection::Project,
                entry,
                bullet,
            } => {
                snapshot.projects[entry].bullets.remove(bullet);
            }
            ItemRef::Project { index } => {
                snapshot.projects.remove(index);
            }
            ItemRef::Experience { index } => {
                snapshot.experiences.remove(index);
            }
            ItemRef::SummaryWords { count } => {
                let keep = snapshot.summary_word_count().saturating_sub(count);
                snapshot.summary = truncate_words(&snapshot.summary, keep).unwrap_or_default();
            }
        }
        Some(description)
    }

    /// Re-bases this reference after `removed` was taken out of the snapshot.
    /// Returns `None` when this reference pointed at (or inside) the removed item.
    pub fn shift_after(&self, removed: &ItemRef) -> Option<ItemRef> {
        use ItemRef::*;

        let shift = |i: usize, r: usize| -> Option<usize> {
            match i.cmp(&r) {
                std::cmp::Ordering::Less => Some(i),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(i - 1),
            }
        };

        match (self, removed) {
            (Skill { index }, Skill { index: r }) => shift(*index, *r).map(|index| Skill { index }),
            (Project { index }, Project { index: r }) => {
                shift(*index, *r).map(|index| Project { index })
            }
            (Experience { index }, Experience { index: r }) => {
                shift(*index, *r).map(|index| Experience { index })
            }
            (
                Bullet {
                    section,
                    entry,
                    bullet,
                },
                Project { index: r },
            ) if *section == BulletSection::Project => shift(*entry, *r).map(|entry| Bullet {
                section: *section,
                entry,
                bullet: *bullet,
            }),
            (
                Bullet {
                    section,
                    entry,
                    bullet,
                },
                Experience { index: r },
            ) if *section == BulletSection::Experience => shift(*entry, *r).map(|entry| Bullet {
                section: *section,
                entry,
                bullet: *bullet,
            }),
            (
                Bullet {
                    section,
                    entry,
                    bullet,
                },
                Bullet {
                    section: rs,
                    entry: re,
                    bullet: rb,
                },
            ) if section == rs && entry == re => shift(*bullet, *rb).map(|bullet| Bullet {
                section: *section,
                entry: *entry,
                bullet,
            }),
            _ => Some(self.clone()),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
