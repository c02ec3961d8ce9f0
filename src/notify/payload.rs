use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::types::{AlertDecision, AlertType, Confidence, CreditStatus};

const PRODUCT: &str = "Credit Monitor";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

/// Daily summary, sent regardless of thresholds.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload {
    pub subject: String,
    pub credits: u64,
    pub status: CreditStatus,
    pub status_message: String,
    pub confidence: Confidence,
    pub generated_at: DateTime<FixedOffset>,
}

/// Hourly alert for one of the alerting tiers.
#[derive(Debug, Clone, Serialize)]
pub struct AlertPayload {
    pub subject: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub alert_type: AlertType,
    pub reason: String,
    pub credits: u64,
    pub previous_credits: Option<u64>,
    pub change: Option<i64>,
    pub drop_amount: Option<i64>,
    pub drop_percentage: Option<f64>,
    pub status: CreditStatus,
    pub generated_at: DateTime<FixedOffset>,
}

/// Hard failure of a check cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub subject: String,
    pub error: String,
    pub generated_at: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Report(ReportPayload),
    Alert(AlertPayload),
    Error(ErrorPayload),
}

impl Notification {
    pub fn report(credits: u64, confidence: Confidence, now: DateTime<FixedOffset>) -> Self {
        let status = CreditStatus::from_credits(credits);
        Notification::Report(ReportPayload {
            subject: format!("{PRODUCT} Daily Credit Report - {}", now.format("%B %-d, %Y")),
            credits,
            status,
            status_message: status.message().to_string(),
            confidence,
            generated_at: now,
        })
    }

    pub fn alert(
        credits: u64,
        decision: &AlertDecision,
        previous_credits: Option<u64>,
        now: DateTime<FixedOffset>,
    ) -> Self {
        let (subject, title, message, priority) = match decision.alert_type {
            AlertType::Critical => (
                format!("URGENT: Credits CRITICAL ({credits} remaining)"),
                "CRITICAL - Credits Below Threshold".to_string(),
                "Your credits have dropped below the critical threshold and may run out very soon! Immediate action required.".to_string(),
                Priority::Critical,
            ),
            AlertType::MajorDrop => {
                let amount = decision.drop_amount.unwrap_or_default();
                let pct = decision.drop_percentage.unwrap_or_default();
                (
                    format!("Credits Alert: Major Drop Detected (-{amount} credits)"),
                    "Major Credit Drop Detected".to_string(),
                    format!("Your credits dropped by {amount} ({pct:.1}%) since the last check. This may indicate an issue."),
                    Priority::High,
                )
            }
            AlertType::ApproachingCritical => (
                format!("Credits Warning: Approaching Critical Level ({credits} remaining)"),
                "Approaching Critical Level".to_string(),
                "Your credits are approaching the critical threshold and continue to decline.".to_string(),
                Priority::Medium,
            ),
            AlertType::None => (
                format!("Credits Update ({credits} remaining)"),
                "Credit Update".to_string(),
                "Credit level update notification.".to_string(),
                Priority::Low,
            ),
        };

        Notification::Alert(AlertPayload {
            subject,
            title,
            message,
            priority,
            alert_type: decision.alert_type,
            reason: decision.reason.clone(),
            credits,
            previous_credits,
            change: previous_credits.map(|prev| credits as i64 - prev as i64),
            drop_amount: decision.drop_amount,
            drop_percentage: decision.drop_percentage,
            status: CreditStatus::from_credits(credits),
            generated_at: now,
        })
    }

    pub fn error(error: impl Into<String>, now: DateTime<FixedOffset>) -> Self {
        Notification::Error(ErrorPayload {
            subject: format!("{PRODUCT} Error - {}", now.format("%Y-%m-%d")),
            error: error.into(),
            generated_at: now,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Report(_) => "report",
            Notification::Alert(_) => "alert",
            Notification::Error(_) => "error",
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            Notification::Report(p) => &p.subject,
            Notification::Alert(p) => &p.subject,
            Notification::Error(p) => &p.subject,
        }
    }
}
