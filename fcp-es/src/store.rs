//! Label bookkeeping (SQLite table `label`)

use fcp_common::model::{LabelMessage, LabelType, SessionId};
use fcp_common::{Error, Result};
use sqlx::SqlitePool;

use crate::label::{LabelPair, LabelSource};

/// One label per (session, source); a repeated label replaces the earlier one
#[derive(Clone)]
pub struct LabelStore {
    pool: SqlitePool,
}

impl LabelStore {
    /// Wrap a pool, creating the table if needed
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS label (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL,
                source TEXT NOT NULL,
                label TEXT NOT NULL,
                timestamp TEXT,
                UNIQUE (uuid, source)
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn store(&self, source: LabelSource, message: &LabelMessage) -> Result<()> {
        let uuid = serde_json::to_string(&message.uuid)?;
        sqlx::query(
            r#"
            INSERT INTO label (uuid, source, label, timestamp)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (uuid, source) DO UPDATE SET
                label = excluded.label,
                timestamp = excluded.timestamp
            "#,
        )
        .bind(uuid)
        .bind(source.as_str())
        .bind(message.label.as_str())
        .bind(message.timestamp.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Sessions holding both an expert and a classifier label
    pub async fn complete_pairs(&self) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM label c JOIN label e ON c.uuid = e.uuid
            WHERE c.source = 'classifier' AND e.source = 'expert'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        u32::try_from(count).map_err(|_| Error::Internal(format!("Pair count {} out of range", count)))
    }

    /// Oldest complete pairs, in the order the classifier labelled them
    pub async fn pairs(&self, limit: u32) -> Result<Vec<LabelPair>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT c.uuid, e.label, c.label
            FROM label c JOIN label e ON c.uuid = e.uuid
            WHERE c.source = 'classifier' AND e.source = 'expert'
            ORDER BY c.id
            LIMIT ?
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(uuid, expert, classifier)| {
                Ok(LabelPair {
                    uuid: serde_json::from_str::<SessionId>(&uuid)?,
                    expert: expert.parse::<LabelType>()?,
                    classifier: classifier.parse::<LabelType>()?,
                })
            })
            .collect()
    }

    /// Drop both labels of every given pair
    pub async fn delete_pairs(&self, pairs: &[LabelPair]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for pair in pairs {
            let uuid = serde_json::to_string(&pair.uuid)?;
            sqlx::query("DELETE FROM label WHERE uuid = ?")
                .bind(uuid)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM label")
            .fetch_one(&self.pool)
            .await?;
        u32::try_from(count).map_err(|_| Error::Internal(format!("Label count {} out of range", count)))
    }
}
