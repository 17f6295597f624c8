// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::alert::AlertPayload;
use crate::domain::webhook::{ProcessorResult, WebhookConfig, WebhookEvent, WebhookProcessor};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const NAME: &str = "forwarding";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Relays the raw payload to every URL in the endpoint config.
pub struct ForwardingProcessor {
    client: reqwest::Client,
}

impl ForwardingProcessor {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build forwarding HTTP client, using defaults");
                reqwest::Client::new()
            });
        Self { client }
    }

    async fn forward(&self, payload: &AlertPayload, url: &str) -> Result<(), String> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(format!("HTTP {}", status.as_u16()));
        }
        Ok(())
    }
}

impl Default for ForwardingProcessor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookProcessor for ForwardingProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn can_process(&self, _event: &WebhookEvent, config: &WebhookConfig) -> bool {
        !config.forward_urls.is_empty()
    }

    async fn process(&self, event: &WebhookEvent, config: &WebhookConfig) -> ProcessorResult {
        let mut forwarded_to = Vec::new();
        let mut failures = Vec::new();

        for url in &config.forward_urls {
            match self.forward(&event.payload, url).await {
                Ok(()) => {
                    debug!(event_id = event.id, url = %url, "Payload forwarded");
                    forwarded_to.push(url.clone());
                }
                Err(e) => failures.push(format!("{url}: {e}")),
            }
        }

        let mut result = ProcessorResult {
            processor_name: NAME.to_string(),
            success: !forwarded_to.is_empty() || failures.is_empty(),
            ..Default::default()
        };
        if !failures.is_empty() {
            result.error = format!("some forwards failed: [{}]", failures.join(", "));
        }
        if !forwarded_to.is_empty() {
            result.message = format!("forwarded to {} URLs", forwarded_to.len());
        }
        result.forwarded_to = forwarded_to;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(urls: Vec<String>) -> WebhookConfig {
        WebhookConfig {
            name: "default".to_string(),
            forward_urls: urls,
            active: true,
            ..Default::default()
        }
    }

    fn event() -> WebhookEvent {
        WebhookEvent::new(
            3,
            AlertPayload {
                monitor_id: 12,
                alert_status: "Alert".to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_applicable_only_with_urls() {
        let p = ForwardingProcessor::new();
        assert!(!p.can_process(&event(), &config(vec![])));
        assert!(p.can_process(&event(), &config(vec!["http://x".to_string()])));
    }

    #[tokio::test]
    async fn test_partial_forward_is_success_with_error() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("POST", "/ok")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"monitor_id": 12})))
            .with_status(200)
            .create_async()
            .await;
        server.mock("POST", "/down").with_status(503).create_async().await;

        let ok_url = format!("{}/ok", server.url());
        let down_url = format!("{}/down", server.url());
        let result = ForwardingProcessor::new()
            .process(&event(), &config(vec![ok_url.clone(), down_url.clone()]))
            .await;

        ok.assert_async().await;
        assert!(result.success);
        assert_eq!(result.forwarded_to, vec![ok_url]);
        assert_eq!(result.message, "forwarded to 1 URLs");
        assert_eq!(result.error, format!("some forwards failed: [{down_url}: HTTP 503]"));
    }

    #[tokio::test]
    async fn test_all_forwards_failed() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/").with_status(404).create_async().await;

        let result = ForwardingProcessor::new()
            .process(&event(), &config(vec![format!("{}/", server.url())]))
            .await;

        assert!(!result.success);
        assert!(result.forwarded_to.is_empty());
        assert!(result.message.is_empty());
    }
}
