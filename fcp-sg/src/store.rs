//! Buffered prepared sessions (SQLite table `prepared_session`)

use fcp_common::model::{LabelType, PreparedSession, SessionId};
use fcp_common::{Error, Result};
use sqlx::SqlitePool;

type SessionRow = (String, Option<String>, f64, f64, f64, f64, f64, f64);

/// Append-only session buffer, cleared explicitly by the control loop
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Wrap a pool, creating the table if needed
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS prepared_session (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL,
                label TEXT,
                mean_current REAL NOT NULL,
                mean_voltage REAL NOT NULL,
                mean_temperature REAL NOT NULL,
                mean_external_temperature REAL NOT NULL,
                mean_external_humidity REAL NOT NULL,
                mean_occupancy REAL NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool })
    }

    pub async fn insert(&self, session: &PreparedSession) -> Result<()> {
        // uuid kept as JSON so integer and string ids survive the round trip
        let uuid = serde_json::to_string(&session.uuid)?;
        sqlx::query(
            r#"
            INSERT INTO prepared_session (
                uuid, label, mean_current, mean_voltage, mean_temperature,
                mean_external_temperature, mean_external_humidity, mean_occupancy
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid)
        .bind(session.label.map(|l| l.as_str()))
        .bind(session.mean_current)
        .bind(session.mean_voltage)
        .bind(session.mean_temperature)
        .bind(session.mean_external_temperature)
        .bind(session.mean_external_humidity)
        .bind(session.mean_occupancy)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every buffered session in insertion order
    pub async fn all(&self) -> Result<Vec<PreparedSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT uuid, label, mean_current, mean_voltage, mean_temperature,
                   mean_external_temperature, mean_external_humidity, mean_occupancy
            FROM prepared_session
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_session).collect()
    }

    pub async fn count(&self) -> Result<u32> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM prepared_session")
            .fetch_one(&self.pool)
            .await?;
        u32::try_from(count).map_err(|_| Error::Internal(format!("Session count {} out of range", count)))
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM prepared_session").execute(&self.pool).await?;
        Ok(())
    }
}

fn row_to_session(row: SessionRow) -> Result<PreparedSession> {
    let (uuid, label, current, voltage, temperature, ext_temperature, ext_humidity, occupancy) = row;
    let uuid: SessionId = serde_json::from_str(&uuid)?;
    let label = label.map(|l| l.parse::<LabelType>()).transpose()?;
    Ok(PreparedSession::from_features(
        uuid,
        label,
        [current, voltage, temperature, ext_temperature, ext_humidity, occupancy],
    ))
}
