// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Analysis Sidecar Agent Adapter
//
// Anti-Corruption Layer for the AI analysis sidecar. One `SidecarAgent` per role;
// the sidecar does the whole investigation in a single call, so the agent completes
// on its first plan and makes that call while concluding.

use crate::domain::agent::{
    truncate, Agent, AgentContext, AgentError, AgentPlan, AgentRole, AnalysisResult, Finding,
    FindingSeverity, QueryResult, RecoveryCapable,
};
use crate::domain::alert::AlertEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub struct SidecarAgent {
    client: reqwest::Client,
    base_url: String,
    role: AgentRole,
    name: String,
}

#[derive(Serialize)]
struct SidecarRequest<'a> {
    payload: SidecarPayload<'a>,
}

#[derive(Serialize)]
struct SidecarPayload<'a> {
    monitor_id: i64,
    monitor_name: &'a str,
    alert_status: &'a str,
    hostname: &'a str,
    service: &'a str,
    scope: &'a str,
    tags: &'a [String],
    #[serde(rename = "ALERT_STATE")]
    alert_state: &'a str,
    #[serde(rename = "ALERT_TITLE")]
    alert_title: &'a str,
    #[serde(rename = "APPLICATION_TEAM")]
    application_team: &'a str,
    #[serde(rename = "APPLICATION_LONGNAME")]
    application_longname: &'a str,
    #[serde(rename = "DETAILED_DESCRIPTION")]
    detailed_description: &'a str,
    #[serde(rename = "IMPACT")]
    impact: &'a str,
    #[serde(rename = "METRIC")]
    metric: &'a str,
    #[serde(rename = "SUPPORT_GROUP")]
    support_group: &'a str,
    #[serde(rename = "THRESHOLD")]
    threshold: &'a str,
    #[serde(rename = "VALUE")]
    value: &'a str,
    #[serde(rename = "URGENCY")]
    urgency: &'a str,
}

impl<'a> SidecarPayload<'a> {
    fn from_event(event: &'a AlertEvent) -> Self {
        let p = &event.payload;
        Self {
            monitor_id: p.effective_monitor_id(),
            monitor_name: p.effective_monitor_name(),
            alert_status: &p.alert_status,
            hostname: &p.hostname,
            service: &p.service,
            scope: &p.scope,
            tags: &p.tags,
            alert_state: &p.alert_state,
            alert_title: &p.alert_title_custom,
            application_team: &p.application_team,
            application_longname: &p.application_longname,
            detailed_description: &p.detailed_description,
            impact: &p.impact,
            metric: &p.metric,
            support_group: &p.support_group,
            threshold: &p.threshold,
            value: &p.value,
            urgency: &p.urgency,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SidecarResponse {
    success: bool,
    analysis: String,
    error: String,
    error_type: String,
    retries_exhausted: bool,
    notebook: Option<NotebookRef>,
    failure_event: Option<serde_json::Value>,
    failure_notebook: Option<NotebookRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NotebookRef {
    url: String,
}

impl SidecarResponse {
    /// A non-empty `error` is a failure whatever the HTTP status said.
    fn error_detail(&self) -> Option<String> {
        if self.error.is_empty() {
            return None;
        }
        let mut detail = if self.error_type.is_empty() {
            self.error.clone()
        } else {
            format!("[{}] {}", self.error_type, self.error)
        };
        if self.retries_exhausted {
            detail.push_str(" (retries exhausted)");
        }
        Some(detail)
    }
}

/// Result of one `/analyze` or `/watchdog` call.
struct Analysis {
    text: String,
    notebook_url: Option<String>,
}

impl SidecarAgent {
    pub fn new(base_url: impl Into<String>, role: AgentRole, timeout: Duration) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(Self::with_client(client, base_url, role))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, role: AgentRole) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            role,
            name: format!("sidecar-{role}"),
        }
    }

    fn endpoint(&self) -> &'static str {
        if self.role == AgentRole::Watchdog {
            "/watchdog"
        } else {
            "/analyze"
        }
    }

    async fn post(&self, cancel: &CancellationToken, path: &str, event: &AlertEvent) -> Result<SidecarResponse, AgentError> {
        let request = SidecarRequest {
            payload: SidecarPayload::from_event(event),
        };
        let call = async {
            let response = self
                .client
                .post(format!("{}{}", self.base_url, path))
                .json(&request)
                .send()
                .await
                .map_err(|e| AgentError::Network(e.to_string()))?;

            response
                .json::<SidecarResponse>()
                .await
                .map_err(|e| AgentError::Decode(e.to_string()))
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            result = call => result,
        }
    }

    async fn invoke_analysis(&self, cancel: &CancellationToken, event: &AlertEvent) -> Result<Analysis, AgentError> {
        let response = self.post(cancel, self.endpoint(), event).await?;

        if let Some(detail) = response.error_detail() {
            if let Some(notebook) = response.failure_notebook.as_ref().filter(|n| !n.url.is_empty()) {
                debug!(agent = %self.name, url = %notebook.url, "Sidecar created a failure notebook");
            }
            if response.failure_event.is_some() {
                debug!(agent = %self.name, "Sidecar emitted a failure event");
            }
            return Err(AgentError::Sidecar(detail));
        }

        debug!(agent = %self.name, success = response.success, bytes = response.analysis.len(), "Sidecar analysis received");
        Ok(Analysis {
            text: response.analysis,
            notebook_url: response.notebook.map(|n| n.url).filter(|u| !u.is_empty()),
        })
    }
}

#[async_trait]
impl Agent for SidecarAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    /// Single shot: the sidecar runs the whole investigation during `conclude`.
    async fn plan(&self, _cancel: &CancellationToken, _event: &AlertEvent, _ctx: &AgentContext) -> AgentPlan {
        AgentPlan::complete("Delegating to the analysis sidecar")
    }

    async fn analyze(&self, _cancel: &CancellationToken, results: &[QueryResult], mut ctx: AgentContext) -> AgentContext {
        for r in results {
            let (details, severity) = match &r.error {
                Some(e) => (e.to_string(), FindingSeverity::Warning),
                None => (r.result.clone(), FindingSeverity::Info),
            };
            ctx.findings.push(Finding::new(
                r.query.agent_name.clone(),
                "query",
                r.query.query.clone(),
                details,
                severity,
            ));
        }
        ctx
    }

    async fn conclude(&self, cancel: &CancellationToken, ctx: &AgentContext) -> AnalysisResult {
        let mut findings = ctx.findings.clone();

        match self.invoke_analysis(cancel, &ctx.event).await {
            Ok(analysis) => {
                findings.push(Finding::new(
                    self.name.clone(),
                    "analysis",
                    "Sidecar analysis",
                    analysis.text.clone(),
                    FindingSeverity::Info,
                ));
                let summary = if analysis.text.is_empty() {
                    "Analysis completed".to_string()
                } else {
                    truncate(&analysis.text, 200)
                };

                AnalysisResult {
                    success: !analysis.text.is_empty(),
                    root_cause: analysis.text.clone(),
                    summary,
                    details: analysis.text,
                    findings,
                    recommendations: ctx.recommendations.clone(),
                    notebook_url: analysis.notebook_url,
                    ..AnalysisResult::for_event(&ctx.event, Some(self.role))
                }
            }
            Err(e) => {
                warn!(agent = %self.name, error = %e, "Analysis invocation failed");
                findings.push(Finding::new(
                    self.name.clone(),
                    "error",
                    "Analysis invocation failed",
                    e.to_string(),
                    FindingSeverity::Warning,
                ));

                AnalysisResult {
                    summary: "Analysis completed".to_string(),
                    findings,
                    error: Some(e.to_string()),
                    ..AnalysisResult::for_event(&ctx.event, Some(self.role))
                }
            }
        }
    }

    fn as_recovery(&self) -> Option<&dyn RecoveryCapable> {
        Some(self)
    }
}

#[async_trait]
impl RecoveryCapable for SidecarAgent {
    async fn invoke_recovery(&self, cancel: &CancellationToken, event: &AlertEvent) -> Result<(), AgentError> {
        let response = self.post(cancel, "/recover", event).await?;
        if !response.error.is_empty() {
            return Err(AgentError::Sidecar(format!("recovery error: {}", response.error)));
        }
        Ok(())
    }
}
