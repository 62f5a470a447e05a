//! Filesystem block store: one JSON file per section under `<root>/<document_id>/`.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::store::{parse_payload, BlockStore, SectionName, StoreError};

#[derive(Debug, Clone)]
pub struct FsBlockStore {
    root: PathBuf,
}

impl FsBlockStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn section_path(&self, document_id: Uuid, section: SectionName) -> PathBuf {
        self.root
            .join(document_id.to_string())
            .join(format!("{}.json", section.as_str()))
    }
}

#[async_trait]
impl BlockStore for FsBlockStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn load(
        &self,
        document_id: Uuid,
        section: SectionName,
    ) -> Result<Option<Value>, StoreError> {
        let path = self.section_path(document_id, section);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), bytes = raw.len(), "Loaded section file");
        parse_payload(section, &raw)
    }

    async fn save(
        &self,
        document_id: Uuid,
        section: SectionName,
        payload: &Value,
    ) -> Result<(), StoreError> {
        let path = self.section_path(document_id, section);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_string_pretty(payload)
            .map_err(|source| StoreError::Encode { section, source })?;

        // Write-then-rename so a reader never sees a half-written section.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), "Saved section file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::snapshot::{ContentSnapshot, ExperienceEntry};
    use crate::store::{load_snapshot, write_back, RunCache};
    use serde_json::json;

    fn make_store() -> (tempfile::TempDir, FsBlockStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlockStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_missing_section_loads_none() {
        let (_dir, store) = make_store();
        let loaded = store.load(Uuid::new_v4(), SectionName::Skills).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let (_dir, store) = make_store();
        let id = Uuid::new_v4();
        let payload = json!({"skills": ["Rust", "SQL"]});

        store.save(id, SectionName::Skills, &payload).await.unwrap();

        assert_eq!(store.load(id, SectionName::Skills).await.unwrap(), Some(payload));
        assert!(!store.section_path(id, SectionName::Skills).with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_fenced_file_is_tolerated() {
        let (dir, store) = make_store();
        let id = Uuid::new_v4();
        let doc_dir = dir.path().join(id.to_string());
        std::fs::create_dir_all(&doc_dir).unwrap();
        std::fs::write(
            doc_dir.join("experiences.json"),
            "```json\n{\"selected_experiences\": [{\"role\": \"Engineer\", \"description\": \"Built it\"}]}\n```",
        )
        .unwrap();

        let mut cache = RunCache::new();
        let snapshot = load_snapshot(&store, &mut cache, id).await.unwrap();
        assert_eq!(snapshot.experiences.len(), 1);
        assert_eq!(snapshot.experiences[0].title, "Engineer");
        assert_eq!(snapshot.experiences[0].bullets, vec!["Built it".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_section_is_skipped() {
        let (dir, store) = make_store();
        let id = Uuid::new_v4();
        let doc_dir = dir.path().join(id.to_string());
        std::fs::create_dir_all(&doc_dir).unwrap();
        std::fs::write(doc_dir.join("skills.json"), "{broken").unwrap();
        std::fs::write(doc_dir.join("summary.json"), "\"Hello\"").unwrap();

        assert!(matches!(
            store.load(id, SectionName::Skills).await,
            Err(StoreError::Malformed { .. })
        ));

        let mut cache = RunCache::new();
        let snapshot = load_snapshot(&store, &mut cache, id).await.unwrap();
        assert!(snapshot.skills.is_empty());
        assert_eq!(snapshot.summary, "Hello");
    }

    #[tokio::test]
    async fn test_write_back_only_changed_sections() {
        let (dir, store) = make_store();
        let id = Uuid::new_v4();
        let before = ContentSnapshot {
            summary: "Short".to_string(),
            experiences: vec![ExperienceEntry {
                title: "Engineer".to_string(),
                bullets: vec!["a".to_string(), "b".to_string()],
                ..Default::default()
            }],
            skills: vec!["Rust".to_string()],
            ..Default::default()
        };
        let mut after = before.clone();
        after.experiences[0].bullets.pop();

        let mut cache = RunCache::new();
        let written = write_back(&store, &mut cache, id, &before, &after).await.unwrap();

        assert_eq!(written, vec![SectionName::Experiences]);
        assert!(dir.path().join(id.to_string()).join("experiences.json").exists());
        assert!(!dir.path().join(id.to_string()).join("skills.json").exists());

        let reloaded = load_snapshot(&store, &mut cache, id).await.unwrap();
        assert_eq!(reloaded.experiences, after.experiences);
    }
}
