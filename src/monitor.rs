use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use tracing::{error, info, warn};

use crate::alerts::AlertDecisionEngine;
use crate::config::Config;
use crate::db::HistoryStore;
use crate::error::{AppError, Result};
use crate::notify::{DeliveryId, Notification, Notifier};
use crate::reader::{CreditReader, RetryOrchestrator};
use crate::types::{AlertDecision, AlertType, Confidence, DropAlert, Extraction};

/// Outcome of one hourly check cycle.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub extraction: Extraction,
    pub decision: AlertDecision,
    /// Set when an alert was delivered.
    pub delivery: Option<DeliveryId>,
}

/// How a run ended, as far as the scheduler is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    /// Likely a loading artifact. Exit cleanly, nobody is alerted.
    SoftFailure,
    /// Genuine fault. An error notice was attempted.
    HardFailure,
}

impl RunStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            RunStatus::Success | RunStatus::SoftFailure => 0,
            RunStatus::HardFailure => 1,
        }
    }
}

/// Owns the check cycle: reads credits, asks the engine for a decision,
/// delivers notifications and is the only place [`crate::types::History`]
/// is mutated and persisted.
pub struct Monitor {
    reader: Box<dyn CreditReader>,
    retry: RetryOrchestrator,
    engine: AlertDecisionEngine,
    notifier: Arc<dyn Notifier>,
    store: Box<dyn HistoryStore>,
    utc_offset: FixedOffset,
    retention: chrono::Duration,
}

impl Monitor {
    pub fn new(
        cfg: &Config,
        reader: Box<dyn CreditReader>,
        notifier: Arc<dyn Notifier>,
        store: Box<dyn HistoryStore>,
    ) -> Self {
        Self {
            reader,
            retry: RetryOrchestrator::new(cfg.retry.clone()),
            engine: AlertDecisionEngine::new(cfg.alerts.clone()),
            notifier,
            store,
            utc_offset: cfg.alerts.utc_offset,
            retention: chrono::Duration::days(cfg.drop_alert_retention_days),
        }
    }

    /// Hourly check. Alert delivery failures are logged and do not fail the cycle.
    pub async fn run_check(&self, now: DateTime<Utc>) -> Result<CheckReport> {
        let mut history = self.store.load().await?;
        let extraction = self.read_credits().await?;
        let credits = extraction.credits;

        let decision = self.engine.decide(credits, &history, now);
        info!(
            credits,
            previous = ?history.last_credits,
            should_alert = decision.should_alert,
            alert_type = %decision.alert_type,
            "Alert decision: {}",
            decision.reason
        );

        let mut delivery = None;
        if decision.should_alert {
            let notification =
                Notification::alert(credits, &decision, history.last_credits, self.local(now));
            match self.notifier.send(&notification).await {
                Ok(id) => {
                    info!(channel = self.notifier.name(), delivery_id = %id, "alert sent");
                    if decision.alert_type == AlertType::MajorDrop {
                        if let Some(from) = history.last_credits {
                            history.drop_alerts.push(DropAlert {
                                occurred_at: now,
                                drop_amount: decision.drop_amount.unwrap_or_default(),
                                drop_percentage: decision.drop_percentage.unwrap_or_default(),
                                from_credits: from,
                                to_credits: credits,
                            });
                        }
                    }
                    delivery = Some(id);
                }
                Err(e) => error!(channel = self.notifier.name(), "failed to send alert: {e}"),
            }
        }

        history.last_credits = Some(credits);
        history.last_hourly_check_at = Some(now);
        history.prune_drop_alerts(now, self.retention);
        self.store.save(&history).await?;

        Ok(CheckReport {
            extraction,
            decision,
            delivery,
        })
    }

    /// Daily report. Always notifies; a failed delivery fails the run.
    pub async fn run_daily_report(&self, now: DateTime<Utc>) -> Result<DeliveryId> {
        let mut history = self.store.load().await?;
        let extraction = self.read_credits().await?;

        let notification =
            Notification::report(extraction.credits, extraction.confidence, self.local(now));
        let sent = self.notifier.send(&notification).await;

        history.last_credits = Some(extraction.credits);
        if sent.is_ok() {
            history.last_daily_report_at = Some(now);
        }
        history.prune_drop_alerts(now, self.retention);
        self.store.save(&history).await?;

        let id = sent?;
        info!(
            channel = self.notifier.name(),
            delivery_id = %id,
            credits = extraction.credits,
            "daily report sent"
        );
        Ok(id)
    }

    async fn read_credits(&self) -> Result<Extraction> {
        let extraction = self.retry.run(self.reader.as_ref()).await?;
        info!(
            credits = extraction.credits,
            confidence = %extraction.confidence,
            attempts = extraction.attempts_used,
            "Retrieved credit count"
        );
        if extraction.confidence == Confidence::Unconfirmed {
            warn!(
                credits = extraction.credits,
                "credit value was not corroborated by consecutive readings"
            );
        }
        Ok(extraction)
    }

    fn local(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.utc_offset)
    }
}

/// Maps a run result onto the exit contract. Hard failures trigger one error
/// notification; if that fails too it is only logged.
pub async fn finish<T>(
    result: Result<T>,
    notifier: &dyn Notifier,
    now: DateTime<FixedOffset>,
) -> RunStatus {
    let err = match result {
        Ok(_) => {
            info!("Credit check completed successfully");
            return RunStatus::Success;
        }
        Err(e) => e,
    };

    if err.is_soft() {
        warn!("Soft failure, exiting without alert: {err}");
        return RunStatus::SoftFailure;
    }

    error!("Error in credit check process: {err}");
    notify_error(&err, notifier, now).await;
    RunStatus::HardFailure
}

async fn notify_error(err: &AppError, notifier: &dyn Notifier, now: DateTime<FixedOffset>) {
    match notifier.send(&Notification::error(err.to_string(), now)).await {
        Ok(id) => info!(delivery_id = %id, "error notification sent"),
        Err(e) => error!("Failed to send error notification: {e}"),
    }
}
