use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::status_bands;

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// One successfully parsed sample. Lives only inside a single extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    /// 1-based attempt index the sample was taken on.
    pub attempt: u32,
    pub value: u64,
    pub raw_text: String,
}

/// Whether the extracted value was corroborated or chosen by the fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Accepted after agreeing samples.
    Validated,
    /// Attempt budget ran out; value picked by fallback.
    Unconfirmed,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Validated => write!(f, "validated"),
            Confidence::Unconfirmed => write!(f, "unconfirmed"),
        }
    }
}

/// Result of one consensus extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extraction {
    pub credits: u64,
    pub confidence: Confidence,
    /// Attempt on which the value was accepted (or the last attempt for fallbacks).
    pub attempts_used: u32,
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// A major-drop alert that was delivered. Kept for same-day dedup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropAlert {
    pub occurred_at: DateTime<Utc>,
    pub drop_amount: i64,
    pub drop_percentage: f64,
    pub from_credits: u64,
    pub to_credits: u64,
}

/// Rolling record that survives across invocations. Owned by the monitor;
/// decision code only ever reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub last_credits: Option<u64>,
    pub last_daily_report_at: Option<DateTime<Utc>>,
    pub last_hourly_check_at: Option<DateTime<Utc>>,
    pub drop_alerts: Vec<DropAlert>,
}

impl History {
    /// Drops alerts older than `retention` relative to `now`, keeping order.
    pub fn prune_drop_alerts(&mut self, now: DateTime<Utc>, retention: Duration) {
        let cutoff = now - retention;
        self.drop_alerts.retain(|a| a.occurred_at > cutoff);
    }
}

// ---------------------------------------------------------------------------
// Alert decisions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    None,
    /// Credits below the critical threshold. Never deduplicated.
    Critical,
    /// Large drop since the last check. At most one per calendar day.
    MajorDrop,
    /// Low band and still decreasing.
    ApproachingCritical,
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertType::None => "none",
            AlertType::Critical => "critical",
            AlertType::MajorDrop => "major_drop",
            AlertType::ApproachingCritical => "approaching_critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertDecision {
    pub should_alert: bool,
    pub reason: String,
    pub alert_type: AlertType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_percentage: Option<f64>,
}

impl AlertDecision {
    pub fn quiet(reason: impl Into<String>) -> Self {
        Self {
            should_alert: false,
            reason: reason.into(),
            alert_type: AlertType::None,
            drop_amount: None,
            drop_percentage: None,
        }
    }

    pub fn alert(alert_type: AlertType, reason: impl Into<String>) -> Self {
        Self {
            should_alert: true,
            reason: reason.into(),
            alert_type,
            drop_amount: None,
            drop_percentage: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Report status bands (presentation only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditStatus {
    /// >= 1000
    Plenty,
    /// 500–999
    Healthy,
    /// 200–499
    Moderate,
    /// 100–199
    Low,
    /// < 100
    Critical,
}

impl CreditStatus {
    pub fn from_credits(credits: u64) -> Self {
        use status_bands::*;
        if credits >= PLENTY_MIN {
            CreditStatus::Plenty
        } else if credits >= HEALTHY_MIN {
            CreditStatus::Healthy
        } else if credits >= MODERATE_MIN {
            CreditStatus::Moderate
        } else if credits >= LOW_MIN {
            CreditStatus::Low
        } else {
            CreditStatus::Critical
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            CreditStatus::Plenty => "You have plenty of credits remaining.",
            CreditStatus::Healthy => "Your credit levels are healthy.",
            CreditStatus::Moderate => "Credit levels are moderate. Keep an eye on usage.",
            CreditStatus::Low => "Credits are getting low. Consider topping up soon.",
            CreditStatus::Critical => {
                "CRITICAL: Very low credit levels! Top up immediately to avoid service interruption."
            }
        }
    }
}

impl std::fmt::Display for CreditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CreditStatus::Plenty => "plenty",
            CreditStatus::Healthy => "healthy",
            CreditStatus::Moderate => "moderate",
            CreditStatus::Low => "low",
            CreditStatus::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn alert_at(day: u32) -> DropAlert {
        DropAlert {
            occurred_at: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            drop_amount: 1500,
            drop_percentage: 60.0,
            from_credits: 2500,
            to_credits: 1000,
        }
    }

    #[test]
    fn prune_keeps_only_last_seven_days() {
        let mut history = History {
            drop_alerts: vec![alert_at(1), alert_at(5), alert_at(10)],
            ..History::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 13, 0, 0).unwrap();
        history.prune_drop_alerts(now, Duration::days(7));

        let days: Vec<_> = history
            .drop_alerts
            .iter()
            .map(|a| a.occurred_at.format("%d").to_string())
            .collect();
        assert_eq!(days, vec!["05", "10"]);
    }

    #[test]
    fn status_bands_match_boundaries() {
        assert_eq!(CreditStatus::from_credits(1000), CreditStatus::Plenty);
        assert_eq!(CreditStatus::from_credits(999), CreditStatus::Healthy);
        assert_eq!(CreditStatus::from_credits(500), CreditStatus::Healthy);
        assert_eq!(CreditStatus::from_credits(200), CreditStatus::Moderate);
        assert_eq!(CreditStatus::from_credits(100), CreditStatus::Low);
        assert_eq!(CreditStatus::from_credits(99), CreditStatus::Critical);
        assert_eq!(CreditStatus::from_credits(0), CreditStatus::Critical);
    }

    #[test]
    fn alert_type_serializes_snake_case() {
        let json = serde_json::to_string(&AlertType::ApproachingCritical).unwrap();
        assert_eq!(json, "\"approaching_critical\"");
    }
}
