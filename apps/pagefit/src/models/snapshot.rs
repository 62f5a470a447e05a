//! Content snapshot: the unit of work for one enforcement run.
//!
//! Every field is serde-defaulted so that partially populated or oddly shaped section blocks
//! deserialize into an empty-but-valid snapshot instead of failing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ────────────────────────────────────────────────────────────────────────────
// Snapshot
// ────────────────────────────────────────────────────────────────────────────

/// All résumé section data at one point in time. List order is importance order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentSnapshot {
    #[serde(deserialize_with = "string_or_empty")]
    pub summary: String,
    #[serde(alias = "selected_experiences", deserialize_with = "entry_list")]
    pub experiences: Vec<ExperienceEntry>,
    #[serde(alias = "selected_projects", deserialize_with = "entry_list")]
    pub projects: Vec<ProjectEntry>,
    #[serde(alias = "selected_skills", deserialize_with = "string_list")]
    pub skills: Vec<String>,
    #[serde(deserialize_with = "entry_list")]
    pub education: Vec<EducationEntry>,
    #[serde(deserialize_with = "or_default")]
    pub contact: ContactBlock,
}

impl ContentSnapshot {
    pub fn summary_word_count(&self) -> usize {
        self.summary.split_whitespace().count()
    }

    /// True when nothing but the contact block is populated.
    pub fn is_body_empty(&self) -> bool {
        self.summary.trim().is_empty()
            && self.experiences.is_empty()
            && self.projects.is_empty()
            && self.skills.is_empty()
            && self.education.is_empty()
    }
}

/// A work-history item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceEntry {
    #[serde(alias = "role", deserialize_with = "string_or_empty")]
    pub title: String,
    #[serde(alias = "company", deserialize_with = "string_or_empty")]
    pub organization: String,
    #[serde(alias = "date", deserialize_with = "string_or_empty")]
    pub dates: String,
    #[serde(deserialize_with = "string_or_empty")]
    pub location: String,
    #[serde(alias = "description", deserialize_with = "string_list")]
    pub bullets: Vec<String>,
    #[serde(deserialize_with = "or_default")]
    pub priority: Option<i32>,
}

/// A project item. `description` is used when there are no bullets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectEntry {
    #[serde(alias = "title", deserialize_with = "string_or_empty")]
    pub name: String,
    #[serde(alias = "date", deserialize_with = "string_or_empty")]
    pub dates: String,
    #[serde(deserialize_with = "string_or_empty")]
    pub location: String,
    #[serde(deserialize_with = "string_list")]
    pub bullets: Vec<String>,
    #[serde(deserialize_with = "optional_string")]
    pub description: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub url: Option<String>,
    #[serde(deserialize_with = "or_default")]
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    #[serde(deserialize_with = "string_or_empty")]
    pub degree: String,
    #[serde(alias = "school", deserialize_with = "string_or_empty")]
    pub institution: String,
    #[serde(alias = "date", deserialize_with = "string_or_empty")]
    pub dates: String,
    #[serde(deserialize_with = "string_or_empty")]
    pub location: String,
    #[serde(deserialize_with = "optional_string")]
    pub gpa: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub honors: Option<String>,
}

/// Identity and link fields. Email and phone are required by the assembler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactBlock {
    #[serde(deserialize_with = "optional_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub first_name: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub last_name: Option<String>,
    /// Optional line rendered above the contact table.
    #[serde(deserialize_with = "optional_string")]
    pub headline: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub email: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub phone: Option<String>,
    #[serde(alias = "address", deserialize_with = "optional_string")]
    pub location: Option<String>,
    #[serde(alias = "homepage", deserialize_with = "optional_string")]
    pub website: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub linkedin: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub github: Option<String>,
    #[serde(deserialize_with = "optional_string")]
    pub google_scholar: Option<String>,
}

impl ContactBlock {
    /// Splits the display name into (first, last). Explicit first/last fields win;
    /// otherwise the last whitespace-separated word of `name` is the family name.
    pub fn name_parts(&self) -> (String, String) {
        if let (Some(first), Some(last)) = (&self.first_name, &self.last_name) {
            return (first.trim().to_string(), last.trim().to_string());
        }

        let full = self.name.as_deref().unwrap_or("").trim();
        match full.rsplit_once(char::is_whitespace) {
            Some((first, last)) => (first.trim().to_string(), last.trim().to_string()),
            None => (full.to_string(), String::new()),
        }
    }

    /// Returns the field value if present and non-blank.
    pub fn field(value: &Option<String>) -> Option<&str> {
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Lenient deserializers
// ────────────────────────────────────────────────────────────────────────────

/// Accepts a string, a number, or null. Anything else becomes empty.
fn string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Like `string_or_empty`, but absent, null and other shapes are `None`.
fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Decodes the value as `T`, falling back to `T::default()` for null or any other shape.
fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// A list of section entries. Null, maps and scalars become an empty list, and list items
/// that are not entry objects are skipped.
fn entry_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Accepts a list of strings, a single string, or null. A single string is split on
/// newlines so pasted bullet blocks become separate bullets. Non-string list items are
/// skipped unless they carry a `text` field.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s
            .lines()
            .map(|line| line.trim().trim_start_matches(['-', '*', '•']).trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Object(map) => map
                    .get("text")
                    .or_else(|| map.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        _ => Vec::new(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_object_deserializes_to_default() {
        let snapshot: ContentSnapshot = serde_json::from_value(json!({})).unwrap();
        assert_eq!(snapshot, ContentSnapshot::default());
        assert!(snapshot.is_body_empty());
    }

    #[test]
    fn test_malformed_fields_recover_as_empty() {
        let snapshot: ContentSnapshot = serde_json::from_value(json!({
            "summary": null,
            "skills": "Rust",
            "experiences": [{ "title": 42, "bullets": null }]
        }))
        .unwrap();
        assert_eq!(snapshot.summary, "");
        assert_eq!(snapshot.skills, vec!["Rust".to_string()]);
        assert_eq!(snapshot.experiences[0].title, "42");
        assert!(snapshot.experiences[0].bullets.is_empty());
    }

    #[test]
    fn test_wrong_section_shapes_recover_as_empty() {
        let snapshot: ContentSnapshot = serde_json::from_value(json!({
            "experiences": null,
            "projects": "none",
            "education": {},
            "contact": null
        }))
        .unwrap();
        assert_eq!(snapshot, ContentSnapshot::default());

        let snapshot: ContentSnapshot = serde_json::from_value(json!({
            "summary": {},
            "experiences": {},
            "projects": {},
            "skills": {},
            "education": {},
            "contact": {}
        }))
        .unwrap();
        assert_eq!(snapshot, ContentSnapshot::default());
    }

    #[test]
    fn test_non_object_entries_skipped() {
        let snapshot: ContentSnapshot = serde_json::from_value(json!({
            "experiences": ["loose text", null, { "title": "Engineer", "priority": "high" }],
            "education": [42, { "school": "MIT", "gpa": 3.9 }]
        }))
        .unwrap();
        assert_eq!(snapshot.experiences.len(), 1);
        assert_eq!(snapshot.experiences[0].title, "Engineer");
        assert_eq!(snapshot.experiences[0].priority, None);
        assert_eq!(snapshot.education[0].institution, "MIT");
        assert_eq!(snapshot.education[0].gpa.as_deref(), Some("3.9"));
    }

    #[test]
    fn test_numeric_contact_fields_kept_as_text() {
        let contact: ContactBlock = serde_json::from_value(json!({
            "name": "Ada Lovelace",
            "phone": 5551234567u64,
            "email": ["not", "a", "string"]
        }))
        .unwrap();
        assert_eq!(contact.phone.as_deref(), Some("5551234567"));
        assert_eq!(contact.email, None);
    }

    #[test]
    fn test_experience_aliases_accepted() {
        let entry: ExperienceEntry = serde_json::from_value(json!({
            "title": "Engineer",
            "company": "Acme",
            "description": "- Built the thing\n- Shipped the other thing"
        }))
        .unwrap();
        assert_eq!(entry.organization, "Acme");
        assert_eq!(
            entry.bullets,
            vec!["Built the thing".to_string(), "Shipped the other thing".to_string()]
        );
        assert_eq!(entry.priority, None);
    }

    #[test]
    fn test_bullet_objects_with_text_are_kept() {
        let entry: ProjectEntry = serde_json::from_value(json!({
            "name": "pagefit",
            "bullets": [{ "text": "Estimator" }, 7, "Assembler"]
        }))
        .unwrap();
        assert_eq!(entry.bullets, vec!["Estimator".to_string(), "Assembler".to_string()]);
    }

    #[test]
    fn test_name_parts_split_on_last_space() {
        let contact = ContactBlock {
            name: Some("Ada King Lovelace".to_string()),
            ..Default::default()
        };
        assert_eq!(
            contact.name_parts(),
            ("Ada King".to_string(), "Lovelace".to_string())
        );
    }

    #[test]
    fn test_name_parts_explicit_fields_win() {
        let contact = ContactBlock {
            name: Some("Ignored Name".to_string()),
            first_name: Some("Grace".to_string()),
            last_name: Some("Hopper".to_string()),
            ..Default::default()
        };
        assert_eq!(contact.name_parts(), ("Grace".to_string(), "Hopper".to_string()));
    }

    #[test]
    fn test_field_filters_blank_values() {
        assert_eq!(ContactBlock::field(&Some("  ".to_string())), None);
        assert_eq!(ContactBlock::field(&Some(" x ".to_string())), Some("x"));
        assert_eq!(ContactBlock::field(&None), None);
    }
}
