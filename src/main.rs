mod alerts;
mod config;
mod db;
mod error;
mod monitor;
mod notify;
mod reader;
mod source;
mod types;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Config, SamplerSource};
use crate::db::SqliteHistoryStore;
use crate::error::{AppError, Result};
use crate::monitor::{finish, Monitor};
use crate::notify::{LogNotifier, Notifier, WebhookNotifier};
use crate::reader::{ConsensusReader, SampledReader};
use crate::source::{CommandSampler, HttpSampler, Sampler};

#[derive(Debug, Clone, Copy)]
enum Mode {
    /// Hourly threshold check with alert decisions.
    Check,
    /// Daily report, always sent.
    Report,
}

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    let mode = match std::env::args().nth(1).as_deref() {
        None | Some("check") => Mode::Check,
        Some("report") => Mode::Report,
        Some(other) => {
            error!("Unknown mode {other:?}, expected \"check\" or \"report\"");
            std::process::exit(1);
        }
    };

    let notifier: Arc<dyn Notifier> = match &cfg.notify_webhook_url {
        Some(url) => match WebhookNotifier::new(url.clone()) {
            Ok(n) => Arc::new(n),
            Err(e) => {
                error!("Fatal error: could not build webhook notifier: {e}");
                std::process::exit(1);
            }
        },
        None => {
            warn!("NOTIFY_WEBHOOK_URL not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    info!(?mode, "Starting credit check at {}", Utc::now().to_rfc3339());
    let result = run(&cfg, mode, Arc::clone(&notifier)).await;

    let now = Utc::now().with_timezone(&cfg.alerts.utc_offset);
    let status = finish(result, notifier.as_ref(), now).await;
    std::process::exit(status.exit_code());
}

async fn run(cfg: &Config, mode: Mode, notifier: Arc<dyn Notifier>) -> Result<()> {
    let store = SqliteHistoryStore::connect(&cfg.db_path).await?;

    let sampler: Box<dyn Sampler> = match &cfg.sampler {
        SamplerSource::Command(cmd) => Box::new(CommandSampler::new(cmd.clone(), cfg.sampler_timeout)),
        SamplerSource::Url(url) => Box::new(
            HttpSampler::new(url.clone(), cfg.sampler_timeout)
                .map_err(|e| AppError::Config(format!("SAMPLER_URL: {e}")))?,
        ),
    };
    let reader = SampledReader::new(ConsensusReader::new(cfg.reader.clone()), sampler);

    let monitor = Monitor::new(cfg, Box::new(reader), notifier, Box::new(store));

    match mode {
        Mode::Check => {
            let report = monitor.run_check(Utc::now()).await?;
            info!(
                credits = report.extraction.credits,
                confidence = %report.extraction.confidence,
                alert_type = %report.decision.alert_type,
                alerted = report.delivery.is_some(),
                "Credit check finished"
            );
        }
        Mode::Report => {
            monitor.run_daily_report(Utc::now()).await?;
        }
    }

    Ok(())
}
