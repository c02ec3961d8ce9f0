use tracing::{error, info, warn};

use crate::config::RetryConfig;
use crate::error::RetryExhausted;
use crate::reader::CreditReader;
use crate::types::Extraction;

/// Runs whole extraction rounds until one yields a usable value.
///
/// A round that returns exactly 0 is treated as a likely false reading and
/// retried after a short backoff, unless it is the final round. A failed round
/// is followed by a longer backoff. No backoff follows the final round.
pub struct RetryOrchestrator {
    cfg: RetryConfig,
}

impl RetryOrchestrator {
    pub fn new(cfg: RetryConfig) -> Self {
        Self { cfg }
    }

    pub async fn run<R>(&self, reader: &R) -> Result<Extraction, RetryExhausted>
    where
        R: CreditReader + ?Sized,
    {
        let max_retries = self.cfg.max_retries;
        let mut last_error: Option<String> = None;

        for round in 1..=max_retries {
            info!("Credit extraction round {round}/{max_retries}");
            let is_last = round == max_retries;

            match reader.read().await {
                Ok(extraction) if extraction.credits == 0 && !is_last => {
                    warn!(round, "got 0 credits, retrying");
                    tokio::time::sleep(self.cfg.zero_backoff).await;
                }
                Ok(extraction) => return Ok(extraction),
                Err(e) => {
                    error!(round, "extraction round failed: {e}");
                    last_error = Some(e.to_string());
                    if !is_last {
                        tokio::time::sleep(self.cfg.error_backoff).await;
                    }
                }
            }
        }

        Err(RetryExhausted {
            attempts: max_retries,
            last_error: last_error.unwrap_or_else(|| "no extraction round was run".to_string()),
        })
    }
}
