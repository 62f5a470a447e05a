//! Reduction audit trail: what was removed and why, for one enforcement run.

use serde::{Deserialize, Serialize};

/// Kind of content touched by a reduction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    SummaryWords,
    ExperienceBullets,
    ProjectBullets,
    Experience,
    Project,
    Skill,
    Education,
    Bullet,
    /// Not a removal: records that the terminal pass still left the snapshot over budget.
    BudgetOverrun,
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReductionLogEntry {
    /// 0 for deterministic trimming, 1.. for adaptive rounds.
    pub iteration: u32,
    pub removed_item_type: ItemType,
    pub removed_item_description: String,
    pub reason: String,
    pub estimated_savings_lines: u32,
}

impl ReductionLogEntry {
    pub fn new(
        iteration: u32,
        removed_item_type: ItemType,
        removed_item_description: impl Into<String>,
        reason: impl Into<String>,
        estimated_savings_lines: u32,
    ) -> Self {
        Self {
            iteration,
            removed_item_type,
            removed_item_description: removed_item_description.into(),
            reason: reason.into(),
            estimated_savings_lines,
        }
    }
}

/// Shortens free text for log descriptions.
pub fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_keeps_short_text() {
        assert_eq!(preview("  Rust  ", 10), "Rust");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        assert_eq!(preview("héllo wörld", 5), "héllo...");
    }

    #[test]
    fn test_item_type_serializes_snake_case() {
        let json = serde_json::to_string(&ItemType::SummaryWords).unwrap();
        assert_eq!(json, "\"summary_words\"");
    }
}
