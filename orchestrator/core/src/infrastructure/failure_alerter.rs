// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Failure Alerter
//
// Records failed analyses as Datadog events so pipeline failures stay visible
// even when the sidecar itself is unreachable. Best effort: every error is
// logged here and dropped.

use crate::domain::alerting::{FailureReport, FailureReporter};
use crate::domain::node_config::DatadogConfig;
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct DatadogEvent {
    title: String,
    text: String,
    priority: &'static str,
    tags: Vec<String>,
    alert_type: &'static str,
    source_type_name: &'static str,
}

impl DatadogEvent {
    fn from_report(report: &FailureReport) -> Self {
        let role = report.role_label();
        Self {
            title: format!("[Agent Analysis Failure] {}", report.monitor_name),
            text: format!(
                "## Agent Analysis Failure\n\n\
                 **Monitor:** {} (ID: {})\n\
                 **Agent Role:** {}\n\
                 **Error:** {}\n\
                 **Timestamp:** {}\n",
                report.monitor_name,
                report.monitor_id,
                role,
                report.error,
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            priority: "normal",
            tags: vec![
                "service:rayne".to_string(),
                "source:agent_orchestrator".to_string(),
                format!("monitor_id:{}", report.monitor_id),
                format!("agent_role:{role}"),
            ],
            alert_type: "error",
            source_type_name: "custom",
        }
    }
}

struct Credentials {
    api_key: String,
    app_key: String,
}

pub struct DatadogFailureAlerter {
    client: reqwest::Client,
    api_url: String,
    credentials: Option<Credentials>,
}

impl DatadogFailureAlerter {
    /// Disabled (logs and skips) unless both keys are configured.
    pub fn new(config: &DatadogConfig) -> Self {
        Self::with_api_url(config, config.api_url())
    }

    pub fn with_api_url(config: &DatadogConfig, api_url: impl Into<String>) -> Self {
        let credentials = match (&config.api_key, &config.app_key) {
            (Some(api_key), Some(app_key)) if config.has_credentials() => Some(Credentials {
                api_key: api_key.clone(),
                app_key: app_key.clone(),
            }),
            _ => None,
        };

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build alerter HTTP client, using defaults");
                reqwest::Client::new()
            });

        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }
}

#[async_trait]
impl FailureReporter for DatadogFailureAlerter {
    async fn report_failure(&self, report: FailureReport) {
        let Some(credentials) = &self.credentials else {
            info!(monitor_id = report.monitor_id, "Skipping failure alert, Datadog keys not configured");
            return;
        };

        let event = DatadogEvent::from_report(&report);
        let response = self
            .client
            .post(format!("{}/api/v1/events", self.api_url))
            .header("DD-API-KEY", &credentials.api_key)
            .header("DD-APPLICATION-KEY", &credentials.app_key)
            .json(&event)
            .send()
            .await;

        match response {
            Ok(resp) if matches!(resp.status().as_u16(), 200 | 202) => {
                info!(
                    monitor_id = report.monitor_id,
                    monitor_name = %report.monitor_name,
                    "Failure event created"
                );
            }
            Ok(resp) => {
                warn!(
                    monitor_id = report.monitor_id,
                    status = resp.status().as_u16(),
                    "Events API rejected failure event"
                );
            }
            Err(e) => {
                warn!(monitor_id = report.monitor_id, error = %e, "Failed to send failure event");
            }
        }
    }
}
