use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::NotifyError;
use crate::notify::{DeliveryId, Notification, Notifier};

/// Posts notifications as JSON to a webhook (mail relay, chat hook, ...).
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { url, client })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, notification: &Notification) -> Result<DeliveryId, NotifyError> {
        debug!(kind = notification.kind(), url = %self.url, "posting notification");

        let resp = self.client.post(&self.url).json(notification).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(delivery_id_from_body(&body).unwrap_or_else(|| format!("http-{}", status.as_u16())))
    }
}

/// Relays answer with differently named id fields; take the first one present.
fn delivery_id_from_body(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["id", "message_id", "messageId"]
        .iter()
        .find_map(|key| match value.get(*key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::Confidence;

    fn report() -> Notification {
        let now = FixedOffset::east_opt(2 * 3_600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 10, 9, 0, 0)
            .unwrap();
        Notification::report(2500, Confidence::Validated, now)
    }

    #[test]
    fn delivery_id_accepts_common_field_names() {
        assert_eq!(delivery_id_from_body(r#"{"id":"abc"}"#), Some("abc".to_string()));
        assert_eq!(
            delivery_id_from_body(r#"{"messageId":"<x@relay>"}"#),
            Some("<x@relay>".to_string())
        );
        assert_eq!(delivery_id_from_body(r#"{"message_id":42}"#), Some("42".to_string()));
        assert_eq!(delivery_id_from_body("ok"), None);
    }

    #[tokio::test]
    async fn posts_json_and_returns_delivery_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({"kind": "report", "credits": 2500})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "msg-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
        let id = notifier.send(&report()).await.unwrap();
        assert_eq!(id, "msg-1");
    }

    #[tokio::test]
    async fn falls_back_to_status_when_body_has_no_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        assert_eq!(notifier.send(&report()).await.unwrap(), "http-202");
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("relay down"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        match notifier.send(&report()).await {
            Err(NotifyError::Rejected { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "relay down");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }
}
