/// Row types matching `migrations/0001_history.sql`.
/// Timestamps are stored as RFC 3339 text in UTC.

#[derive(Debug, sqlx::FromRow)]
pub struct HistoryRow {
    pub last_credits: Option<i64>,
    pub last_daily_report_at: Option<String>,
    pub last_hourly_check_at: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct DropAlertRow {
    pub occurred_at: String,
    pub drop_amount: i64,
    pub drop_percentage: f64,
    pub from_credits: i64,
    pub to_credits: i64,
}
