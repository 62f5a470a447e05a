use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// One persisted section of a document (`content_blocks` table).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContentBlockRow {
    pub document_id: Uuid,
    pub section: String,
    pub payload: Value,
    pub updated_at: DateTime<Utc>,
}
