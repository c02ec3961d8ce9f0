//! Page sources: anything that can hand back the raw text the dashboard shows
//! for the credit balance. Login and navigation live outside this crate.

pub mod command;
pub mod http;

use async_trait::async_trait;

use crate::error::SampleError;

pub use command::CommandSampler;
pub use http::HttpSampler;

/// Yields a fresh raw text snippet on every call. The text may be "0" or
/// garbage while the page is still loading.
#[async_trait]
pub trait Sampler: Send + Sync {
    async fn sample(&self) -> Result<String, SampleError>;
}
