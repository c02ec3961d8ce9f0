use thiserror::Error;

/// Message fragments that mark a failure as an observation artifact (the
/// dashboard had not finished rendering) rather than a genuine fault.
const SOFT_FAILURE_MARKERS: &[&str] = &["false reading", "loading issue"];

/// True if `message` describes a likely-transient reading failure.
pub fn is_soft_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    SOFT_FAILURE_MARKERS.iter().any(|m| lower.contains(m))
}

/// A single sampler invocation failed.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("sampler command failed: {0}")]
    Command(String),

    #[error("sampler timed out after {0}s")]
    Timeout(u64),

    #[error("sampler HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sampler IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The consensus reader could not produce any usable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionFailure {
    /// Every parsed sample was 0. Indistinguishable from a page that has not loaded.
    #[error("All credit extraction attempts returned 0 - this is likely a false reading due to loading issues")]
    AllZero { readings: usize },

    /// No sample ever contained a number. The page structure is probably broken.
    #[error("Failed to extract any credit values after {attempts} attempts")]
    NoNumericValue { attempts: u32 },
}

impl ExtractionFailure {
    pub fn is_soft(&self) -> bool {
        is_soft_message(&self.to_string())
    }
}

/// Every retry round failed. Carries the last underlying failure's message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to get credits after {attempts} attempts. Last error: {last_error}")]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: String,
}

impl RetryExhausted {
    /// Inherits soft/hard from the wrapped failure's message.
    pub fn is_soft(&self) -> bool {
        is_soft_message(&self.last_error)
    }
}

/// Delivery of a report, alert or error notification failed.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook rejected notification with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credit extraction error: {0}")]
    Extraction(#[from] ExtractionFailure),

    #[error("{0}")]
    Retry(#[from] RetryExhausted),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("Corrupt history record: {0}")]
    CorruptHistory(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Soft failures exit cleanly without an error alert; everything else is hard.
    pub fn is_soft(&self) -> bool {
        match self {
            AppError::Extraction(e) => e.is_soft(),
            AppError::Retry(e) => e.is_soft(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_zero_is_soft_and_no_numeric_is_hard() {
        assert!(ExtractionFailure::AllZero { readings: 5 }.is_soft());
        assert!(!ExtractionFailure::NoNumericValue { attempts: 5 }.is_soft());
    }

    #[test]
    fn retry_exhausted_inherits_classification() {
        let soft = RetryExhausted {
            attempts: 2,
            last_error: ExtractionFailure::AllZero { readings: 5 }.to_string(),
        };
        assert!(soft.is_soft());
        assert!(AppError::from(soft).is_soft());

        let hard = RetryExhausted {
            attempts: 2,
            last_error: "sampler command failed: exit status 1".to_string(),
        };
        assert!(!hard.is_soft());
        assert!(!AppError::from(hard).is_soft());
    }

    #[test]
    fn soft_marker_match_ignores_case() {
        assert!(is_soft_message("Probably a LOADING ISSUE on the dashboard"));
        assert!(!is_soft_message("connection refused"));
    }

    #[test]
    fn config_errors_are_hard() {
        assert!(!AppError::Config("bad".to_string()).is_soft());
    }
}
