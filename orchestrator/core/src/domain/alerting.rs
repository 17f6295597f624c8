// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Failure reporting port.
//!
//! Reports are fire-and-forget: implementations log their own errors and never
//! surface them to the analysis path.

use crate::domain::agent::{AgentRole, AnalysisResult};
use async_trait::async_trait;

/// What went wrong with one analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReport {
    pub monitor_id: i64,
    pub monitor_name: String,
    pub agent_role: Option<AgentRole>,
    pub error: String,
}

impl FailureReport {
    /// Build a report from whatever the failed analysis left behind.
    ///
    /// `error` wins over the result's own error text; without either the
    /// message is "unknown error".
    pub fn new(result: Option<&AnalysisResult>, error: Option<&str>) -> Self {
        let error = error
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .or_else(|| result.and_then(|r| r.error.clone()).filter(|e| !e.is_empty()))
            .unwrap_or_else(|| "unknown error".to_string());

        match result {
            Some(r) => Self {
                monitor_id: r.monitor_id,
                monitor_name: r.monitor_name.clone(),
                agent_role: r.agent_role,
                error,
            },
            None => Self {
                monitor_id: 0,
                monitor_name: "Unknown".to_string(),
                agent_role: None,
                error,
            },
        }
    }

    pub fn role_label(&self) -> &str {
        self.agent_role.map(|r| r.as_str()).unwrap_or("unknown")
    }
}

#[async_trait]
pub trait FailureReporter: Send + Sync {
    async fn report_failure(&self, report: FailureReport);
}
