// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Webhook Pipeline Types
//!
//! Stored webhook events, per-endpoint processing options, and the
//! [`WebhookProcessor`] port implemented by Tier 1 fast processors.

use crate::domain::agent::AnalysisResult;
use crate::domain::alert::AlertPayload;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Processing status of a stored webhook event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Pending,
    Processing,
    Processed,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Processing => "processing",
            EventStatus::Processed => "processed",
            EventStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw inbound alert plus its processing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: i64,
    pub payload: AlertPayload,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub status: EventStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forwarded_to: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl WebhookEvent {
    pub fn new(id: i64, payload: AlertPayload) -> Self {
        Self {
            id,
            payload,
            received_at: Utc::now(),
            processed_at: None,
            status: EventStatus::Pending,
            forwarded_to: Vec::new(),
            error: String::new(),
        }
    }
}

pub const DEFAULT_DOWNTIME_MINUTES: u32 = 120;

/// Processing options for one webhook endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub id: i64,
    pub name: String,
    pub forward_urls: Vec<String>,
    pub auto_downtime: bool,
    /// Zero means [`DEFAULT_DOWNTIME_MINUTES`].
    #[serde(rename = "downtime_duration_minutes")]
    pub downtime_duration: u32,
    pub active: bool,
}

impl WebhookConfig {
    pub fn downtime_minutes(&self) -> u32 {
        if self.downtime_duration == 0 {
            DEFAULT_DOWNTIME_MINUTES
        } else {
            self.downtime_duration
        }
    }
}

/// Outcome of one fast processor for one config.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessorResult {
    pub processor_name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub forwarded_to: Vec<String>,
}

impl ProcessorResult {
    pub fn ok(processor_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            processor_name: processor_name.into(),
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failed(processor_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            processor_name: processor_name.into(),
            success: false,
            error: error.into(),
            ..Default::default()
        }
    }
}

/// Tier 1 processor: quick side effects such as forwarding or downtimes.
#[async_trait]
pub trait WebhookProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn can_process(&self, event: &WebhookEvent, config: &WebhookConfig) -> bool;

    async fn process(&self, event: &WebhookEvent, config: &WebhookConfig) -> ProcessorResult;
}

/// Everything one pass through the pipeline did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OrchestratorResult {
    pub processed_by: Vec<String>,
    pub errors: Vec<String>,
    pub agent_result: Option<AnalysisResult>,
}

impl OrchestratorResult {
    /// `Failed` iff nothing in either tier succeeded.
    pub fn status(&self) -> EventStatus {
        if self.processed_by.is_empty() {
            EventStatus::Failed
        } else {
            EventStatus::Processed
        }
    }

    pub fn error_message(&self) -> String {
        self.errors.join("; ")
    }
}

/// Outcome of one dispatcher job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub event_id: i64,
    pub success: bool,
    pub processed_by: Vec<String>,
    pub errors: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}
