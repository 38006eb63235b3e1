//! Platform send client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use tracing::trace;

use super::medium::{DeliveryTarget, MessagePayload};
use crate::config::DeliveryConfig;
use crate::{RelayError, Result};

/// Raw platform answer to a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub status: u16,
    pub body: String,
}

impl SendResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends rendered messages to a chat platform.
///
/// Errors mean the request never got an answer; any HTTP status, including
/// 4xx and 5xx, is returned as a [`SendResponse`].
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn send(&self, target: &DeliveryTarget, payload: &MessagePayload)
        -> Result<SendResponse>;
}

/// Discord REST API client.
#[derive(Clone)]
pub struct DiscordRestClient {
    client: reqwest::Client,
    api_base_url: String,
    bot_token: String,
}

impl DiscordRestClient {
    pub fn new(config: &DeliveryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| RelayError::Delivery(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.clone(),
            bot_token: config.bot_token.clone(),
        })
    }
}

#[async_trait]
impl PlatformClient for DiscordRestClient {
    async fn send(
        &self,
        target: &DeliveryTarget,
        payload: &MessagePayload,
    ) -> Result<SendResponse> {
        let endpoint = target.endpoint(&self.api_base_url);
        trace!(kind = target.kind(), "Sending message");

        let mut request = self
            .client
            .post(&endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if target.needs_bot_auth() {
            request = request.header(AUTHORIZATION, format!("Bot {}", self.bot_token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RelayError::Delivery(format!("request failed: {}", e)))?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(SendResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base: &str) -> DeliveryConfig {
        DeliveryConfig {
            api_base_url: base.to_string(),
            bot_token: "secret".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_channel_send_uses_bot_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/c1/messages"))
            .and(header("authorization", "Bot secret"))
            .and(body_json(serde_json::json!({ "content": "hi" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        let client = DiscordRestClient::new(&config(&server.uri())).unwrap();
        let payload = MessagePayload {
            content: Some("hi".to_string()),
            ..Default::default()
        };
        let response = client
            .send(&DeliveryTarget::Channel { id: "c1".into() }, &payload)
            .await
            .unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_webhook_error_status_is_returned() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/webhooks/w1/tok"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Unknown Webhook"))
            .mount(&server)
            .await;

        let client = DiscordRestClient::new(&config(&server.uri())).unwrap();
        let target = DeliveryTarget::Webhook {
            id: "w1".into(),
            token: "tok".into(),
            username: None,
            avatar_url: None,
        };
        let response = client
            .send(&target, &MessagePayload::default())
            .await
            .unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "Unknown Webhook");
    }

    #[tokio::test]
    async fn test_transport_error() {
        let client = DiscordRestClient::new(&config("http://127.0.0.1:1")).unwrap();
        let result = client
            .send(&DeliveryTarget::Channel { id: "c1".into() }, &MessagePayload::default())
            .await;
        assert!(matches!(result, Err(RelayError::Delivery(_))));
    }
}
