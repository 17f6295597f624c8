// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::node_config::DatadogConfig;
use crate::domain::webhook::{ProcessorResult, WebhookConfig, WebhookEvent, WebhookProcessor};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

const NAME: &str = "downtime";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct DowntimeRequest {
    data: DowntimeData,
}

#[derive(Serialize)]
struct DowntimeData {
    #[serde(rename = "type")]
    kind: &'static str,
    attributes: DowntimeAttributes,
}

#[derive(Serialize)]
struct DowntimeAttributes {
    message: String,
    monitor_identifier: MonitorIdentifier,
    scope: String,
    schedule: DowntimeSchedule,
}

#[derive(Serialize)]
struct MonitorIdentifier {
    monitor_id: i64,
}

#[derive(Serialize)]
struct DowntimeSchedule {
    start: String,
    end: String,
}

impl DowntimeRequest {
    fn new(monitor_id: i64, scope: &str, minutes: u32) -> Self {
        let start = Utc::now();
        let end = start + chrono::Duration::minutes(i64::from(minutes));
        Self {
            data: DowntimeData {
                kind: "downtime",
                attributes: DowntimeAttributes {
                    message: format!("Auto-created downtime after monitor recovery (ID: {monitor_id})"),
                    monitor_identifier: MonitorIdentifier { monitor_id },
                    scope: format_scope(scope),
                    schedule: DowntimeSchedule {
                        start: start.to_rfc3339_opts(SecondsFormat::Secs, true),
                        end: end.to_rfc3339_opts(SecondsFormat::Secs, true),
                    },
                },
            },
        }
    }
}

/// `"env:prod, team:web"` becomes `"env:prod AND team:web"`; an empty scope is `"*"`.
pub fn format_scope(scope: &str) -> String {
    let parts: Vec<&str> = scope.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        "*".to_string()
    } else {
        parts.join(" AND ")
    }
}

/// Silences a monitor for a while after it recovers.
pub struct DowntimeProcessor {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    app_key: String,
}

impl DowntimeProcessor {
    pub fn new(config: &DatadogConfig) -> Self {
        Self::with_api_url(config, config.api_url())
    }

    pub fn with_api_url(config: &DatadogConfig, api_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build downtime HTTP client, using defaults");
                reqwest::Client::new()
            });

        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            app_key: config.app_key.clone().unwrap_or_default(),
        }
    }

    async fn create_downtime(&self, monitor_id: i64, scope: &str, minutes: u32) -> Result<(), String> {
        let response = self
            .client
            .post(format!("{}/api/v2/downtime", self.api_url))
            .header("Accept", "application/json")
            .header("DD-API-KEY", &self.api_key)
            .header("DD-APPLICATION-KEY", &self.app_key)
            .json(&DowntimeRequest::new(monitor_id, scope, minutes))
            .send()
            .await
            .map_err(|e| format!("execute request: {e}"))?;

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("API returned {}: {}", status.as_u16(), body));
        }
        Ok(())
    }
}

#[async_trait]
impl WebhookProcessor for DowntimeProcessor {
    fn name(&self) -> &str {
        NAME
    }

    fn can_process(&self, event: &WebhookEvent, config: &WebhookConfig) -> bool {
        config.auto_downtime && event.payload.alert_status == "OK"
    }

    async fn process(&self, event: &WebhookEvent, config: &WebhookConfig) -> ProcessorResult {
        let minutes = config.downtime_minutes();
        let monitor_id = event.payload.monitor_id;

        match self.create_downtime(monitor_id, &event.payload.scope, minutes).await {
            Ok(()) => ProcessorResult::ok(
                NAME,
                format!("created {minutes} minute downtime for monitor {monitor_id}"),
            ),
            Err(e) => ProcessorResult::failed(NAME, e),
        }
    }
}
