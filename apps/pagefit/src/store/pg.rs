//! Postgres block store: one row per `(document_id, section)` in `content_blocks`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::block::ContentBlockRow;
use crate::store::{BlockStore, SectionName, StoreError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS content_blocks (
    document_id UUID        NOT NULL,
    section     TEXT        NOT NULL,
    payload     JSONB       NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (document_id, section)
)
"#;

#[derive(Clone)]
pub struct PgBlockStore {
    pool: PgPool,
}

impl PgBlockStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the `content_blocks` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        info!("content_blocks table ready");
        Ok(())
    }
}

#[async_trait]
impl BlockStore for PgBlockStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn load(
        &self,
        document_id: Uuid,
        section: SectionName,
    ) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query_as::<_, ContentBlockRow>(
            "SELECT document_id, section, payload, updated_at FROM content_blocks \
             WHERE document_id = $1 AND section = $2",
        )
        .bind(document_id)
        .bind(section.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = &row {
            debug!(%document_id, section = %row.section, updated_at = %row.updated_at, "Loaded section row");
        }
        Ok(row.map(|row| row.payload))
    }

    async fn save(
        &self,
        document_id: Uuid,
        section: SectionName,
        payload: &Value,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO content_blocks (document_id, section, payload, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (document_id, section)
            DO UPDATE SET payload = EXCLUDED.payload, updated_at = NOW()
            "#,
        )
        .bind(document_id)
        .bind(section.as_str())
        .bind(payload)
        .execute(&self.pool)
        .await?;

        debug!(%document_id, %section, "Upserted section row");
        Ok(())
    }
}
