//! Section store: persisted content blocks keyed by `(document_id, SectionName)`.
//!
//! # Architecture
//! - `BlockStore` is the persistence seam (`FsBlockStore`, `PgBlockStore`). Writes replace a
//!   whole section; there is no history.
//! - `RunCache` is the read-through cache for one enforcement run, invalidated on write.
//! - `load_snapshot` decodes every section into a `ContentSnapshot`, tolerating the payload
//!   shapes older writers produced (bare lists, wrapped lists, alias keys, fenced text).
//! - `write_back` persists only the sections an enforcement run actually changed.
//! - `DocumentLocks` serializes enforcement runs per document at the service edge.

pub mod cache;
pub mod fs;
pub mod locks;
pub mod pg;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::llm_client::strip_json_fences;
use crate::models::snapshot::ContentSnapshot;

pub use cache::RunCache;
pub use fs::FsBlockStore;
pub use locks::DocumentLocks;
pub use pg::PgBlockStore;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    Summary,
    Experiences,
    Projects,
    Skills,
    Education,
    Contact,
}

impl SectionName {
    pub const ALL: [SectionName; 6] = [
        SectionName::Summary,
        SectionName::Experiences,
        SectionName::Projects,
        SectionName::Skills,
        SectionName::Education,
        SectionName::Contact,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionName::Summary => "summary",
            SectionName::Experiences => "experiences",
            SectionName::Projects => "projects",
            SectionName::Skills => "skills",
            SectionName::Education => "education",
            SectionName::Contact => "contact",
        }
    }

    /// Wrapper keys a stored payload may carry this section under.
    fn payload_keys(&self) -> &'static [&'static str] {
        match self {
            SectionName::Summary => &["summary", "text"],
            SectionName::Experiences => &["experiences", "selected_experiences", "items"],
            SectionName::Projects => &["projects", "selected_projects", "items"],
            SectionName::Skills => &["skills", "selected_skills", "items"],
            SectionName::Education => &["education", "items"],
            SectionName::Contact => &["contact", "identity"],
        }
    }
}

impl std::fmt::Display for SectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed {section} block: {source}")]
    Malformed {
        section: SectionName,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {section} block: {source}")]
    Encode {
        section: SectionName,
        #[source]
        source: serde_json::Error,
    },
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait BlockStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// The stored payload, or `None` if the section was never written.
    async fn load(
        &self,
        document_id: Uuid,
        section: SectionName,
    ) -> Result<Option<Value>, StoreError>;

    /// Replaces the whole section.
    async fn save(
        &self,
        document_id: Uuid,
        section: SectionName,
        payload: &Value,
    ) -> Result<(), StoreError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Snapshot load / write-back
// ────────────────────────────────────────────────────────────────────────────

/// Loads every section through `cache`. Malformed sections are logged and left empty.
pub async fn load_snapshot(
    store: &dyn BlockStore,
    cache: &mut RunCache,
    document_id: Uuid,
) -> Result<ContentSnapshot, StoreError> {
    let mut snapshot = ContentSnapshot::default();

    for section in SectionName::ALL {
        let payload = match cache.load(store, document_id, section).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(%document_id, %section, "Section not stored");
                continue;
            }
            Err(e @ StoreError::Malformed { .. }) => {
                warn!(%document_id, %section, error = %e, "Ignoring unreadable section block");
                continue;
            }
            Err(e) => return Err(e),
        };
        if let Err(e) = decode_section(section, payload, &mut snapshot) {
            warn!(%document_id, %section, error = %e, "Ignoring malformed section block");
        }
    }

    Ok(snapshot)
}

/// Saves the sections that differ between `before` and `after`. Returns what was written.
pub async fn write_back(
    store: &dyn BlockStore,
    cache: &mut RunCache,
    document_id: Uuid,
    before: &ContentSnapshot,
    after: &ContentSnapshot,
) -> Result<Vec<SectionName>, StoreError> {
    let mut written = Vec::new();

    for section in SectionName::ALL {
        let old = encode_section(section, before)?;
        let new = encode_section(section, after)?;
        if old == new {
            continue;
        }
        cache.save(store, document_id, section, &new).await?;
        written.push(section);
    }

    info!(
        %document_id,
        store = store.name(),
        sections = ?written,
        "Wrote back changed sections"
    );
    Ok(written)
}

// ────────────────────────────────────────────────────────────────────────────
// Payload codec
// ────────────────────────────────────────────────────────────────────────────

/// Parses raw stored text: fences stripped, empty text treated as absent. A summary
/// stored as plain prose (not JSON) is accepted as a string.
pub fn parse_payload(section: SectionName, raw: &str) -> Result<Option<Value>, StoreError> {
    let text = strip_json_fences(raw);
    if text.is_empty() {
        return Ok(None);
    }
    match serde_json::from_str(text) {
        Ok(value) => Ok(Some(value)),
        Err(_) if section == SectionName::Summary => Ok(Some(Value::String(text.to_string()))),
        Err(source) => Err(StoreError::Malformed { section, source }),
    }
}

/// Merges one stored payload into `snapshot`.
pub fn decode_section(
    section: SectionName,
    payload: Value,
    snapshot: &mut ContentSnapshot,
) -> Result<(), StoreError> {
    let payload = normalize_payload(payload);
    let inner = match payload {
        Value::Object(mut map) => match section
            .payload_keys()
            .iter()
            .find(|key| map.contains_key(**key))
        {
            Some(key) => map.remove(*key).unwrap_or(Value::Null),
            None => Value::Object(map),
        },
        other => other,
    };

    // Route through the snapshot's own lenient field decoding.
    let mut wrapper = Map::new();
    wrapper.insert(section.as_str().to_string(), inner);
    let decoded: ContentSnapshot = serde_json::from_value(Value::Object(wrapper))
        .map_err(|source| StoreError::Malformed { section, source })?;

    match section {
        SectionName::Summary => snapshot.summary = decoded.summary,
        SectionName::Experiences => snapshot.experiences = decoded.experiences,
        SectionName::Projects => snapshot.projects = decoded.projects,
        SectionName::Skills => snapshot.skills = decoded.skills,
        SectionName::Education => snapshot.education = decoded.education,
        SectionName::Contact => snapshot.contact = decoded.contact,
    }
    Ok(())
}

/// Canonical stored form of one section: `{"<section>": value}`.
pub fn encode_section(section: SectionName, snapshot: &ContentSnapshot) -> Result<Value, StoreError> {
    let value = match section {
        SectionName::Summary => serde_json::to_value(&snapshot.summary),
        SectionName::Experiences => serde_json::to_value(&snapshot.experiences),
        SectionName::Projects => serde_json::to_value(&snapshot.projects),
        SectionName::Skills => serde_json::to_value(&snapshot.skills),
        SectionName::Education => serde_json::to_value(&snapshot.education),
        SectionName::Contact => serde_json::to_value(&snapshot.contact),
    }
    .map_err(|source| StoreError::Encode { section, source })?;

    Ok(json!({ section.as_str(): value }))
}

/// A JSON string that itself holds fenced or plain JSON is unwrapped one level.
fn normalize_payload(payload: Value) -> Value {
    match payload {
        Value::String(text) => {
            let inner = strip_json_fences(&text);
            match serde_json::from_str::<Value>(inner) {
                Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
                _ => Value::String(text),
            }
        }
        other => other,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::ExperienceEntry;

    fn decode(section: SectionName, payload: Value) -> ContentSnapshot {
        let mut snapshot = ContentSnapshot::default();
        decode_section(section, payload, &mut snapshot).unwrap();
        snapshot
    }

    #[test]
    fn test_decode_accepts_wrapped_and_bare_lists() {
        let wrapped = decode(
            SectionName::Experiences,
            json!({"selected_experiences": [{"role": "Engineer", "company": "Acme"}]}),
        );
        let bare = decode(
            SectionName::Experiences,
            json!([{"title": "Engineer", "organization": "Acme"}]),
        );
        assert_eq!(wrapped.experiences, bare.experiences);
        assert_eq!(wrapped.experiences[0].organization, "Acme");
    }

    #[test]
    fn test_decode_summary_shapes() {
        assert_eq!(decode(SectionName::Summary, json!("Plain")).summary, "Plain");
        assert_eq!(decode(SectionName::Summary, json!({"summary": "Wrapped"})).summary, "Wrapped");
        assert_eq!(decode(SectionName::Summary, json!({"text": "Alt"})).summary, "Alt");
    }

    #[test]
    fn test_decode_contact_object_directly() {
        let snapshot = decode(
            SectionName::Contact,
            json!({"name": "Ada Lovelace", "address": "London"}),
        );
        assert_eq!(snapshot.contact.location.as_deref(), Some("London"));
    }

    #[test]
    fn test_decode_fenced_string_payload() {
        let snapshot = decode(
            SectionName::Skills,
            json!("```json\n{\"skills\": [\"Rust\", \"Go\"]}\n```"),
        );
        assert_eq!(snapshot.skills, vec!["Rust".to_string(), "Go".to_string()]);
    }

    #[test]
    fn test_parse_payload() {
        assert!(parse_payload(SectionName::Skills, "  ").unwrap().is_none());
        assert_eq!(
            parse_payload(SectionName::Summary, "Just prose.").unwrap(),
            Some(json!("Just prose."))
        );
        assert!(matches!(
            parse_payload(SectionName::Skills, "[not json"),
            Err(StoreError::Malformed { section: SectionName::Skills, .. })
        ));
    }

    #[test]
    fn test_encode_then_decode_preserves_section() {
        let snapshot = ContentSnapshot {
            experiences: vec![ExperienceEntry {
                title: "Engineer".to_string(),
                bullets: vec!["Did a thing".to_string()],
                priority: Some(1),
                ..Default::default()
            }],
            ..Default::default()
        };
        let encoded = encode_section(SectionName::Experiences, &snapshot).unwrap();
        assert_eq!(decode(SectionName::Experiences, encoded).experiences, snapshot.experiences);
    }
}
