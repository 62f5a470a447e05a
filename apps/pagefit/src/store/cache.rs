//! Run-scoped read-through cache over a `BlockStore`.
//!
//! One `RunCache` lives for one enforcement run; it is never shared across runs, so it
//! cannot serve a section another run has since rewritten. A write goes straight to the
//! store and drops the cached entry.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

use crate::store::{BlockStore, SectionName, StoreError};

#[derive(Debug, Default)]
pub struct RunCache {
    entries: HashMap<(Uuid, SectionName), Option<Value>>,
}

impl RunCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(
        &mut self,
        store: &dyn BlockStore,
        document_id: Uuid,
        section: SectionName,
    ) -> Result<Option<Value>, StoreError> {
        if let Some(cached) = self.entries.get(&(document_id, section)) {
            return Ok(cached.clone());
        }
        let loaded = store.load(document_id, section).await?;
        self.entries.insert((document_id, section), loaded.clone());
        Ok(loaded)
    }

    pub async fn save(
        &mut self,
        store: &dyn BlockStore,
        document_id: Uuid,
        section: SectionName,
        payload: &Value,
    ) -> Result<(), StoreError> {
        self.entries.remove(&(document_id, section));
        store.save(document_id, section, payload).await
    }
}
