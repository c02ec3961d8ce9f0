use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::SampleError;
use crate::source::Sampler;

/// Runs an external command (typically a headless-browser script that has
/// already logged in) and treats its stdout as the credit text.
pub struct CommandSampler {
    command: String,
    timeout: Duration,
}

impl CommandSampler {
    pub fn new(command: String, timeout: Duration) -> Self {
        Self { command, timeout }
    }
}

#[async_trait]
impl Sampler for CommandSampler {
    async fn sample(&self) -> Result<String, SampleError> {
        debug!(command = %self.command, "running sampler command");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        };
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| SampleError::Timeout(self.timeout.as_secs()))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SampleError::Command(format!(
                "{} ({})",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_trimmed_stdout() {
        let sampler = CommandSampler::new("echo '  1,234 credits left '".to_string(), Duration::from_secs(5));
        assert_eq!(sampler.sample().await.unwrap(), "1,234 credits left");
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let sampler = CommandSampler::new("echo boom >&2; exit 3".to_string(), Duration::from_secs(5));
        match sampler.sample().await {
            Err(SampleError::Command(msg)) => assert!(msg.contains("boom"), "got {msg}"),
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let sampler = CommandSampler::new("sleep 5".to_string(), Duration::from_millis(50));
        assert!(matches!(sampler.sample().await, Err(SampleError::Timeout(_))));
    }
}
