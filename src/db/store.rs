use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{debug, info};

use crate::db::models::{DropAlertRow, HistoryRow};
use crate::error::{AppError, Result};
use crate::types::{DropAlert, History};

/// Durable home of the rolling [`History`]. Read at the start of a cycle and
/// written at the end; a single writer is assumed.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self) -> Result<History>;

    /// Replaces the stored record. Callers prune `drop_alerts` first.
    async fn save(&self, history: &History) -> Result<()>;
}

/// SQLite-backed history: one `history` row plus the `drop_alerts` table.
pub struct SqliteHistoryStore {
    pool: sqlx::SqlitePool,
}

impl SqliteHistoryStore {
    /// Opens (creating if needed) the database at `db_path` and runs migrations.
    pub async fn connect(db_path: &str) -> Result<Self> {
        let url = if db_path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{db_path}?mode=rwc")
        };
        // One connection: the store has a single writer, and an in-memory
        // database only exists on the connection that created it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("History store ready at {db_path}");
        Ok(Self { pool })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn load(&self) -> Result<History> {
        let row: Option<HistoryRow> = sqlx::query_as(
            "SELECT last_credits, last_daily_report_at, last_hourly_check_at FROM history WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let alerts: Vec<DropAlertRow> = sqlx::query_as(
            r#"
            SELECT occurred_at, drop_amount, drop_percentage, from_credits, to_credits
            FROM drop_alerts
            ORDER BY occurred_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut history = match row {
            Some(r) => History {
                last_credits: r.last_credits.map(to_credits).transpose()?,
                last_daily_report_at: r.last_daily_report_at.as_deref().map(parse_ts).transpose()?,
                last_hourly_check_at: r.last_hourly_check_at.as_deref().map(parse_ts).transpose()?,
                drop_alerts: Vec::new(),
            },
            None => History::default(),
        };

        history.drop_alerts = alerts
            .into_iter()
            .map(|a| {
                Ok(DropAlert {
                    occurred_at: parse_ts(&a.occurred_at)?,
                    drop_amount: a.drop_amount,
                    drop_percentage: a.drop_percentage,
                    from_credits: to_credits(a.from_credits)?,
                    to_credits: to_credits(a.to_credits)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            last_credits = ?history.last_credits,
            drop_alerts = history.drop_alerts.len(),
            "loaded history"
        );
        Ok(history)
    }

    async fn save(&self, history: &History) -> Result<()> {
        let last_credits = history.last_credits.map(from_credits).transpose()?;
        let last_daily = history.last_daily_report_at.map(format_ts);
        let last_hourly = history.last_hourly_check_at.map(format_ts);

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO history (id, last_credits, last_daily_report_at, last_hourly_check_at)
            VALUES (1, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                last_credits = excluded.last_credits,
                last_daily_report_at = excluded.last_daily_report_at,
                last_hourly_check_at = excluded.last_hourly_check_at
            "#,
        )
        .bind(last_credits)
        .bind(last_daily)
        .bind(last_hourly)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM drop_alerts").execute(&mut *tx).await?;

        for alert in &history.drop_alerts {
            sqlx::query(
                r#"
                INSERT INTO drop_alerts (
                    occurred_at, drop_amount, drop_percentage, from_credits, to_credits
                ) VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(format_ts(alert.occurred_at))
            .bind(alert.drop_amount)
            .bind(alert.drop_percentage)
            .bind(from_credits(alert.from_credits)?)
            .bind(from_credits(alert.to_credits)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(drop_alerts = history.drop_alerts.len(), "saved history");
        Ok(())
    }
}

// Fixed-width UTC text sorts chronologically.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::CorruptHistory(format!("bad timestamp {raw:?}: {e}")))
}

fn to_credits(raw: i64) -> Result<u64> {
    u64::try_from(raw).map_err(|_| AppError::CorruptHistory(format!("negative credit value {raw}")))
}

fn from_credits(credits: u64) -> Result<i64> {
    i64::try_from(credits)
        .map_err(|_| AppError::CorruptHistory(format!("credit value {credits} out of range")))
}
