use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};

use crate::error::{AppError, Result};

/// Number of samples the consensus reader takes before falling back.
pub const VALIDATION_ATTEMPTS: u32 = 5;

/// Settle time before every sample (milliseconds).
pub const VALIDATION_DELAY_MS: u64 = 2_000;

/// Readings at or below this value need corroboration from repeated samples.
pub const SUSPICIOUS_THRESHOLD: u64 = 10;

/// Two consecutive readings agree if they differ by at most this many credits...
pub const AGREEMENT_ABSOLUTE: u64 = 100;
/// ...or by at most this percentage of the larger reading.
pub const AGREEMENT_PERCENT: f64 = 5.0;

/// Full extraction rounds the retry orchestrator runs.
pub const MAX_RETRIES: u32 = 2;

/// Backoff after a round that produced a likely-false zero (seconds).
pub const ZERO_BACKOFF_SECS: u64 = 5;

/// Backoff after a round that failed outright (seconds).
pub const ERROR_BACKOFF_SECS: u64 = 10;

/// Upper bound for one external sampler invocation (seconds).
pub const SAMPLER_TIMEOUT_SECS: u64 = 120;

/// How long delivered drop alerts are kept for dedup (days).
pub const DROP_ALERT_RETENTION_DAYS: i64 = 7;

/// Accepted range for DROP_ALERT_RETENTION_DAYS. Below one day the alert just
/// recorded would be pruned before it is saved.
pub const DROP_ALERT_RETENTION_RANGE: std::ops::RangeInclusive<i64> = 1..=365;

/// Alert tier thresholds. Defaults only; each can be overridden from the environment.
pub mod alert_thresholds {
    /// credits < CRITICAL → critical alert.
    pub const CRITICAL: u64 = 100;
    /// CRITICAL <= credits <= APPROACHING_MAX and decreasing → early warning.
    pub const APPROACHING_MAX: u64 = 200;
    /// A drop of more than this many credits since the last check is major.
    pub const MAJOR_DROP_AMOUNT: i64 = 1_000;
    /// A drop of more than this percentage since the last check is major.
    pub const MAJOR_DROP_PERCENT: f64 = 50.0;
}

/// Presentation bands for the daily report (lower bounds).
pub mod status_bands {
    pub const PLENTY_MIN: u64 = 1_000;
    pub const HEALTHY_MIN: u64 = 500;
    pub const MODERATE_MIN: u64 = 200;
    pub const LOW_MIN: u64 = 100;
}

/// Quiet hours default to 22:00–06:00 at UTC+2.
pub const QUIET_HOURS_START: u32 = 22;
pub const QUIET_HOURS_END: u32 = 6;
pub const UTC_OFFSET_HOURS: i32 = 2;

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub max_attempts: u32,
    pub settle_delay: Duration,
    pub suspicious_threshold: u64,
    /// Consecutive readings agree if they differ by at most this many credits...
    pub agreement_absolute: u64,
    /// ...or by at most this percentage of the larger reading.
    pub agreement_percent: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: VALIDATION_ATTEMPTS,
            settle_delay: Duration::from_millis(VALIDATION_DELAY_MS),
            suspicious_threshold: SUSPICIOUS_THRESHOLD,
            agreement_absolute: AGREEMENT_ABSOLUTE,
            agreement_percent: AGREEMENT_PERCENT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub zero_backoff: Duration,
    pub error_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            zero_backoff: Duration::from_secs(ZERO_BACKOFF_SECS),
            error_backoff: Duration::from_secs(ERROR_BACKOFF_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub critical_threshold: u64,
    pub approaching_critical_max: u64,
    pub major_drop_amount: i64,
    pub major_drop_percent: f64,
    /// Local hour (inclusive) at which quiet hours begin.
    pub quiet_hours_start: u32,
    /// Local hour (exclusive) at which quiet hours end.
    pub quiet_hours_end: u32,
    /// Offset used to derive the local hour and the calendar day for dedup.
    pub utc_offset: FixedOffset,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            critical_threshold: alert_thresholds::CRITICAL,
            approaching_critical_max: alert_thresholds::APPROACHING_MAX,
            major_drop_amount: alert_thresholds::MAJOR_DROP_AMOUNT,
            major_drop_percent: alert_thresholds::MAJOR_DROP_PERCENT,
            quiet_hours_start: QUIET_HOURS_START,
            quiet_hours_end: QUIET_HOURS_END,
            utc_offset: offset_from_hours(UTC_OFFSET_HOURS).unwrap_or_else(|| Utc.fix()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum SamplerSource {
    /// Run an external command and read the credit text from its stdout.
    Command(String),
    /// GET a URL and use the response body as the credit text.
    Url(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    /// Where raw credit text comes from (SAMPLER_COMMAND or SAMPLER_URL).
    pub sampler: SamplerSource,
    pub sampler_timeout: Duration,
    /// Webhook that receives notifications (NOTIFY_WEBHOOK_URL). Log-only when unset.
    pub notify_webhook_url: Option<String>,
    pub drop_alert_retention_days: i64,
    pub reader: ReaderConfig,
    pub retry: RetryConfig,
    pub alerts: AlertConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let sampler = match (
            std::env::var("SAMPLER_COMMAND").ok().filter(|s| !s.trim().is_empty()),
            std::env::var("SAMPLER_URL").ok().filter(|s| !s.trim().is_empty()),
        ) {
            (Some(cmd), _) => SamplerSource::Command(cmd),
            (None, Some(url)) => SamplerSource::Url(url),
            (None, None) => {
                return Err(AppError::Config(
                    "one of SAMPLER_COMMAND or SAMPLER_URL must be set".to_string(),
                ))
            }
        };

        let utc_offset_hours: i32 = parse_var("UTC_OFFSET_HOURS", UTC_OFFSET_HOURS)?;
        let utc_offset = offset_from_hours(utc_offset_hours).ok_or_else(|| {
            AppError::Config("UTC_OFFSET_HOURS must be between -23 and 23".to_string())
        })?;

        let quiet_hours_start: u32 = parse_var("QUIET_HOURS_START", QUIET_HOURS_START)?;
        let quiet_hours_end: u32 = parse_var("QUIET_HOURS_END", QUIET_HOURS_END)?;
        if quiet_hours_start > 23 || quiet_hours_end > 23 {
            return Err(AppError::Config(
                "QUIET_HOURS_START and QUIET_HOURS_END must be hours in 0..=23".to_string(),
            ));
        }

        let max_attempts: u32 = parse_var("VALIDATION_ATTEMPTS", VALIDATION_ATTEMPTS)?;
        let max_retries: u32 = parse_var("MAX_RETRIES", MAX_RETRIES)?;
        if max_attempts == 0 || max_retries == 0 {
            return Err(AppError::Config(
                "VALIDATION_ATTEMPTS and MAX_RETRIES must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "credit-monitor.db".to_string()),
            sampler,
            sampler_timeout: Duration::from_secs(parse_var(
                "SAMPLER_TIMEOUT_SECS",
                SAMPLER_TIMEOUT_SECS,
            )?),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            drop_alert_retention_days: retention_days(parse_var(
                "DROP_ALERT_RETENTION_DAYS",
                DROP_ALERT_RETENTION_DAYS,
            )?)?,
            reader: ReaderConfig {
                max_attempts,
                settle_delay: Duration::from_millis(parse_var(
                    "VALIDATION_DELAY_MS",
                    VALIDATION_DELAY_MS,
                )?),
                suspicious_threshold: parse_var("SUSPICIOUS_THRESHOLD", SUSPICIOUS_THRESHOLD)?,
                agreement_absolute: parse_var("AGREEMENT_ABSOLUTE", AGREEMENT_ABSOLUTE)?,
                agreement_percent: parse_var("AGREEMENT_PERCENT", AGREEMENT_PERCENT)?,
            },
            retry: RetryConfig {
                max_retries,
                ..RetryConfig::default()
            },
            alerts: AlertConfig {
                critical_threshold: parse_var("CRITICAL_THRESHOLD", alert_thresholds::CRITICAL)?,
                approaching_critical_max: parse_var(
                    "APPROACHING_CRITICAL_MAX",
                    alert_thresholds::APPROACHING_MAX,
                )?,
                major_drop_amount: parse_var(
                    "MAJOR_DROP_AMOUNT",
                    alert_thresholds::MAJOR_DROP_AMOUNT,
                )?,
                major_drop_percent: parse_var(
                    "MAJOR_DROP_PERCENT",
                    alert_thresholds::MAJOR_DROP_PERCENT,
                )?,
                quiet_hours_start,
                quiet_hours_end,
                utc_offset,
            },
        })
    }
}

/// Reads an optional env var, falling back to `default` when unset and
/// rejecting values that do not parse.
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{name} has an invalid value: {raw:?}"))),
        _ => Ok(default),
    }
}

fn retention_days(days: i64) -> Result<i64> {
    if DROP_ALERT_RETENTION_RANGE.contains(&days) {
        Ok(days)
    } else {
        Err(AppError::Config(format!(
            "DROP_ALERT_RETENTION_DAYS must be in {}..={}, got {days}",
            DROP_ALERT_RETENTION_RANGE.start(),
            DROP_ALERT_RETENTION_RANGE.end()
        )))
    }
}

pub fn offset_from_hours(hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(hours.checked_mul(3_600)?)
}
