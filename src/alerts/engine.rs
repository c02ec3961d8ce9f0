use chrono::{DateTime, Timelike, Utc};
use tracing::debug;

use crate::config::AlertConfig;
use crate::types::{AlertDecision, AlertType, History};

pub const REASON_QUIET_HOURS: &str = "outside monitoring hours";
pub const REASON_NO_ISSUES: &str = "credits above threshold and no major issues detected";

/// Classifies an hourly observation into an alert tier.
///
/// Rules are evaluated in order and the first match wins:
/// quiet hours, critical, major drop (once per local calendar day),
/// approaching critical (only while decreasing), no alert.
///
/// Pure: the same `(current, history, now)` always gives the same decision.
pub struct AlertDecisionEngine {
    cfg: AlertConfig,
}

impl AlertDecisionEngine {
    pub fn new(cfg: AlertConfig) -> Self {
        Self { cfg }
    }

    pub fn decide(&self, current: u64, history: &History, now: DateTime<Utc>) -> AlertDecision {
        if self.in_quiet_hours(now) {
            return AlertDecision::quiet(REASON_QUIET_HOURS);
        }

        if current < self.cfg.critical_threshold {
            return AlertDecision::alert(
                AlertType::Critical,
                format!(
                    "credits below critical threshold ({current} < {})",
                    self.cfg.critical_threshold
                ),
            );
        }

        if let Some(last) = history.last_credits {
            let drop_amount = last as i64 - current as i64;
            let drop_percentage = if last > 0 {
                drop_amount as f64 / last as f64 * 100.0
            } else {
                0.0
            };

            if drop_amount > self.cfg.major_drop_amount
                || drop_percentage > self.cfg.major_drop_percent
            {
                if self.drop_alert_sent_today(history, now) {
                    debug!(
                        drop_amount,
                        drop_percentage,
                        "major drop already alerted today, suppressing"
                    );
                } else {
                    return AlertDecision {
                        drop_amount: Some(drop_amount),
                        drop_percentage: Some(drop_percentage),
                        ..AlertDecision::alert(
                            AlertType::MajorDrop,
                            format!(
                                "major credit drop: -{drop_amount} ({drop_percentage:.1}%) since last check"
                            ),
                        )
                    };
                }
            }

            if (self.cfg.critical_threshold..=self.cfg.approaching_critical_max).contains(&current)
                && current < last
            {
                return AlertDecision::alert(
                    AlertType::ApproachingCritical,
                    format!(
                        "credits approaching critical level and decreasing ({last} -> {current})"
                    ),
                );
            }
        }

        AlertDecision::quiet(REASON_NO_ISSUES)
    }

    /// Quiet hours may wrap midnight (start > end). Equal bounds disable them.
    pub fn in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.cfg.utc_offset).hour();
        let (start, end) = (self.cfg.quiet_hours_start, self.cfg.quiet_hours_end);
        if start > end {
            hour >= start || hour < end
        } else {
            hour >= start && hour < end
        }
    }

    fn drop_alert_sent_today(&self, history: &History, now: DateTime<Utc>) -> bool {
        let offset = &self.cfg.utc_offset;
        let today = now.with_timezone(offset).date_naive();
        history
            .drop_alerts
            .iter()
            .any(|a| a.occurred_at.with_timezone(offset).date_naive() == today)
    }
}
