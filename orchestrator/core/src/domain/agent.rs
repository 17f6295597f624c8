// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Contracts
//!
//! Capability traits and value types for the Plan → Query → Analyze → Conclude
//! loop driven by [`RlmCoordinator`](crate::domain::rlm::RlmCoordinator).
//!
//! | Trait | Implemented by | Purpose |
//! |-------|----------------|---------|
//! | [`Agent`] | specialist agents (one per [`AgentRole`]) | plans queries, interprets results, concludes |
//! | [`SubAgent`] | narrow data fetchers | answers a single query during the Query phase |
//! | [`RecoveryCapable`] | agents that can resolve prior artifacts | optional capability, discovered through [`Agent::as_recovery`] |
//!
//! Concrete agents are registered per role; routing never inspects concrete types.

use crate::domain::alert::AlertEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Specialist role an alert is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Infrastructure,
    Application,
    Network,
    Database,
    Logs,
    /// Vendor anomaly-detection monitors
    Watchdog,
    /// Fallback for unclassified alerts
    General,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Infrastructure => "infrastructure",
            AgentRole::Application => "application",
            AgentRole::Network => "network",
            AgentRole::Database => "database",
            AgentRole::Logs => "logs",
            AgentRole::Watchdog => "watchdog",
            AgentRole::General => "general",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision produced by one Plan phase.
#[derive(Debug, Clone, Default)]
pub struct AgentPlan {
    /// Analysis is done; the coordinator should conclude.
    pub complete: bool,
    pub queries: Vec<SubQuery>,
    pub reasoning: String,
}

impl AgentPlan {
    pub fn complete(reasoning: impl Into<String>) -> Self {
        Self {
            complete: true,
            queries: Vec::new(),
            reasoning: reasoning.into(),
        }
    }

    pub fn queries(queries: Vec<SubQuery>, reasoning: impl Into<String>) -> Self {
        Self {
            complete: false,
            queries,
            reasoning: reasoning.into(),
        }
    }
}

/// A request addressed to one registered [`SubAgent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    pub agent_name: String,
    pub query: String,
    /// Lower is more important.
    pub priority: i32,
    /// The analysis fails when this query fails.
    pub required: bool,
}

impl SubQuery {
    pub fn new(agent_name: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            query: query.into(),
            priority: 0,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Outcome of one [`SubQuery`]. Moved from the fan-out task to the coordinator.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub query: SubQuery,
    pub result: String,
    pub error: Option<SubAgentError>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl QueryResult {
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Info,
    Warning,
    Critical,
}

/// A fact discovered during analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Sub-agent or agent that produced the fact
    pub source: String,
    /// e.g. "metric", "log", "trace", "analysis", "error"
    pub category: String,
    pub summary: String,
    pub details: String,
    pub severity: FindingSeverity,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Finding {
    pub fn new(
        source: impl Into<String>,
        category: impl Into<String>,
        summary: impl Into<String>,
        details: impl Into<String>,
        severity: FindingSeverity,
    ) -> Self {
        Self {
            source: source.into(),
            category: category.into(),
            summary: summary.into(),
            details: details.into(),
            severity,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

/// Iteration state for a single `execute` call.
///
/// Created fresh per invocation and owned exclusively by it; never shared between tasks.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub event: Arc<AlertEvent>,
    pub iteration: u32,
    pub query_history: Vec<QueryResult>,
    pub findings: Vec<Finding>,
    pub hypotheses: Vec<String>,
    pub root_cause: String,
    pub recommendations: Vec<String>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentContext {
    pub fn new(event: Arc<AlertEvent>) -> Self {
        Self {
            event,
            iteration: 0,
            query_history: Vec::new(),
            findings: Vec::new(),
            hypotheses: Vec::new(),
            root_cause: String::new(),
            recommendations: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

/// Final outcome of an analysis or recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub monitor_id: i64,
    pub monitor_name: String,
    pub alert_status: String,

    pub success: bool,
    pub agent_role: Option<AgentRole>,
    pub root_cause: String,
    pub summary: String,
    pub details: String,

    pub findings: Vec<Finding>,
    pub recommendations: Vec<String>,

    pub iterations: u32,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notebook_url: Option<String>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Empty result stamped with the event's identity.
    pub fn for_event(event: &AlertEvent, role: Option<AgentRole>) -> Self {
        let now = Utc::now();
        Self {
            monitor_id: event.payload.monitor_id,
            monitor_name: event.payload.monitor_name.clone(),
            alert_status: event.payload.alert_status.clone(),
            success: false,
            agent_role: role,
            root_cause: String::new(),
            summary: String::new(),
            details: String::new(),
            findings: Vec::new(),
            recommendations: Vec::new(),
            iterations: 0,
            duration: Duration::ZERO,
            error: None,
            notebook_url: None,
            started_at: now,
            completed_at: now,
        }
    }

    /// Unsuccessful result carrying `error`. Not an exceptional condition by itself.
    pub fn unsuccessful(event: &AlertEvent, role: Option<AgentRole>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::for_event(event, role)
        }
    }
}

/// Error from a single sub-agent query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubAgentError {
    #[error("sub-agent not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),

    #[error("query cancelled")]
    Cancelled,
}

/// Why an analysis terminated unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("analysis cancelled")]
    Cancelled,

    #[error("required query to {agent} failed: {source}")]
    RequiredQueryFailed {
        agent: String,
        #[source]
        source: SubAgentError,
    },
}

/// An [`AnalysisError`] together with the terminal result built for it, when one exists.
///
/// A cancelled semaphore wait carries no result; a cancelled or failed RLM loop does.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct AnalysisFailure {
    pub error: AnalysisError,
    pub result: Option<Box<AnalysisResult>>,
}

impl AnalysisFailure {
    pub fn new(error: AnalysisError, result: Option<AnalysisResult>) -> Self {
        Self {
            error,
            result: result.map(Box::new),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(AnalysisError::Cancelled, None)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, AnalysisError::Cancelled)
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_deref()
    }
}

/// Errors raised by agent adapters talking to the analysis sidecar.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request failed: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("agent error: {0}")]
    Sidecar(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Role-bound specialist agent.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn role(&self) -> AgentRole;

    /// Decide which sub-queries are needed next, or that the analysis is complete.
    async fn plan(&self, cancel: &CancellationToken, event: &AlertEvent, ctx: &AgentContext) -> AgentPlan;

    /// Fold query results into the context.
    async fn analyze(&self, cancel: &CancellationToken, results: &[QueryResult], ctx: AgentContext) -> AgentContext;

    /// Build the final result from accumulated state.
    async fn conclude(&self, cancel: &CancellationToken, ctx: &AgentContext) -> AnalysisResult;

    /// Optional recovery capability. Agents that can resolve prior artifacts override this.
    fn as_recovery(&self) -> Option<&dyn RecoveryCapable> {
        None
    }
}

/// Marks an external artifact (e.g. an investigation notebook) resolved after a monitor recovers.
#[async_trait]
pub trait RecoveryCapable: Send + Sync {
    async fn invoke_recovery(&self, cancel: &CancellationToken, event: &AlertEvent) -> Result<(), AgentError>;
}

/// Narrow data-fetching collaborator queried during the Query phase.
#[async_trait]
pub trait SubAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn query(&self, cancel: &CancellationToken, query: &str) -> Result<String, SubAgentError>;
}

/// Shorten `s` to at most `max_chars` characters, appending "..." when cut.
pub fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
