use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::SampleError;
use crate::source::Sampler;

/// Fetches a URL that renders the credit text (e.g. a scraping sidecar that
/// holds the dashboard session) and returns the body.
pub struct HttpSampler {
    url: String,
    client: reqwest::Client,
}

impl HttpSampler {
    pub fn new(url: String, timeout: Duration) -> Result<Self, SampleError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Sampler for HttpSampler {
    async fn sample(&self) -> Result<String, SampleError> {
        debug!(url = %self.url, "fetching credit text");
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn returns_trimmed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/credits"))
            .respond_with(ResponseTemplate::new(200).set_body_string("\n 12,480 \n"))
            .mount(&server)
            .await;

        let sampler = HttpSampler::new(format!("{}/credits", server.uri()), Duration::from_secs(5)).unwrap();
        assert_eq!(sampler.sample().await.unwrap(), "12,480");
    }

    #[tokio::test]
    async fn error_status_is_a_sample_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let sampler = HttpSampler::new(server.uri(), Duration::from_secs(5)).unwrap();
        assert!(matches!(sampler.sample().await, Err(SampleError::Http(_))));
    }
}
