// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Orchestrator
//!
//! Single entry point for agent analysis. Owns the concurrency bound, routes
//! alerts to role agents, runs the RLM loop, and reports failures.
//!
//! | Step | `analyze` | `recover` |
//! |------|-----------|-----------|
//! | 1 | acquire permit (cancellable) | acquire permit (cancellable) |
//! | 2 | classify → role agent, else default | default agent, else lowest registered role |
//! | 3 | no agent ⇒ unsuccessful result, `Ok` | no agent ⇒ unsuccessful result, `Ok` |
//! | 4 | `RlmCoordinator::execute` | `RecoveryCapable::invoke_recovery` |
//! | 5 | failure ⇒ detached [`FailureReporter`] call | — |

use crate::application::in_flight::InFlight;
use crate::domain::agent::{Agent, AgentRole, AnalysisFailure, AnalysisResult, SubAgent};
use crate::domain::alert::AlertEvent;
use crate::domain::alerting::{FailureReport, FailureReporter};
use crate::domain::classifier::RoleClassifier;
use crate::domain::node_config::OrchestratorConfig;
use crate::domain::rlm::RlmCoordinator;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// The Tier 2 surface of the webhook pipeline.
#[async_trait]
pub trait AlertAnalyzer: Send + Sync {
    fn should_analyze(&self, event: &AlertEvent) -> bool;

    fn should_recover(&self, event: &AlertEvent) -> bool;

    async fn analyze(&self, cancel: &CancellationToken, event: Arc<AlertEvent>) -> Result<AnalysisResult, AnalysisFailure>;

    async fn recover(&self, cancel: &CancellationToken, event: Arc<AlertEvent>) -> Result<AnalysisResult, AnalysisFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrchestratorStats {
    pub active_analyses: i64,
    pub max_concurrent: usize,
    pub total_processed: i64,
    pub total_errors: i64,
    pub registered_agents: usize,
    pub sub_agents: Vec<String>,
}

#[derive(Default)]
struct AgentRegistry {
    by_role: BTreeMap<AgentRole, Arc<dyn Agent>>,
    default: Option<Arc<dyn Agent>>,
}

pub struct AgentOrchestrator {
    classifier: RoleClassifier,
    agents: RwLock<AgentRegistry>,
    rlm: RlmCoordinator,
    reporter: Option<Arc<dyn FailureReporter>>,
    semaphore: Semaphore,
    max_concurrent: usize,

    active_count: AtomicI64,
    total_processed: AtomicI64,
    total_errors: AtomicI64,
}

impl AgentOrchestrator {
    /// Zero `max_concurrent` or `rlm_max_iterations` fall back to 3 and 5.
    pub fn new(config: OrchestratorConfig, reporter: Option<Arc<dyn FailureReporter>>) -> Self {
        let max_concurrent = if config.max_concurrent == 0 { 3 } else { config.max_concurrent };
        Self {
            classifier: RoleClassifier::new(),
            agents: RwLock::new(AgentRegistry::default()),
            rlm: RlmCoordinator::new(i64::from(config.rlm_max_iterations)),
            reporter,
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            active_count: AtomicI64::new(0),
            total_processed: AtomicI64::new(0),
            total_errors: AtomicI64::new(0),
        }
    }

    /// Register the specialist for `agent.role()`, replacing any previous one.
    pub fn register_agent(&self, agent: Arc<dyn Agent>) {
        info!(agent = agent.name(), role = %agent.role(), "Registered agent");
        self.agents.write().by_role.insert(agent.role(), agent);
    }

    /// Fallback agent for roles without a specialist.
    pub fn set_default_agent(&self, agent: Arc<dyn Agent>) {
        info!(agent = agent.name(), "Set default agent");
        self.agents.write().default = Some(agent);
    }

    pub fn register_sub_agent(&self, sub_agent: Arc<dyn SubAgent>) {
        self.rlm.register_sub_agent(sub_agent);
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            active_analyses: self.active_count.load(Ordering::SeqCst),
            max_concurrent: self.max_concurrent,
            total_processed: self.total_processed.load(Ordering::SeqCst),
            total_errors: self.total_errors.load(Ordering::SeqCst),
            registered_agents: self.agents.read().by_role.len(),
            sub_agents: self.rlm.list_sub_agents(),
        }
    }

    async fn acquire(&self, cancel: &CancellationToken, monitor_id: i64) -> Result<SemaphorePermit<'_>, AnalysisFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(monitor_id, "Cancelled while waiting for an analysis slot");
                Err(AnalysisFailure::cancelled())
            }
            permit = self.semaphore.acquire() => {
                // The semaphore is never closed
                permit.map_err(|_| AnalysisFailure::cancelled())
            }
        }
    }

    fn agent_for(&self, role: AgentRole) -> Option<Arc<dyn Agent>> {
        let registry = self.agents.read();
        registry.by_role.get(&role).cloned().or_else(|| registry.default.clone())
    }

    fn recovery_agent(&self) -> Option<Arc<dyn Agent>> {
        let registry = self.agents.read();
        registry
            .default
            .clone()
            .or_else(|| registry.by_role.values().next().cloned())
    }

    fn report(&self, result: Option<&AnalysisResult>, error: Option<String>) {
        let Some(reporter) = self.reporter.clone() else {
            return;
        };
        let report = FailureReport::new(result, error.as_deref());
        tokio::spawn(async move {
            reporter.report_failure(report).await;
        });
    }
}

#[async_trait]
impl AlertAnalyzer for AgentOrchestrator {
    /// Alert/Warn status, a triggering ALERT_STATE, or a detailed description.
    /// Never true for a recovery event.
    fn should_analyze(&self, event: &AlertEvent) -> bool {
        if self.should_recover(event) {
            return false;
        }
        let p = &event.payload;
        matches!(p.alert_status.as_str(), "Alert" | "Warn")
            || matches!(p.alert_state.as_str(), "Triggered" | "Alert" | "Warn")
            || !p.detailed_description.is_empty()
    }

    fn should_recover(&self, event: &AlertEvent) -> bool {
        let p = &event.payload;
        matches!(p.alert_status.as_str(), "OK" | "Recovered")
            || matches!(p.alert_state.as_str(), "OK" | "Recovered" | "Resolved")
    }

    async fn analyze(&self, cancel: &CancellationToken, event: Arc<AlertEvent>) -> Result<AnalysisResult, AnalysisFailure> {
        let monitor_id = event.payload.monitor_id;
        let _permit = self.acquire(cancel, monitor_id).await?;

        let active = InFlight::enter(&self.active_count, Some("rayne_agent_active_analyses"));
        info!(monitor_id, active = active.current(), "Starting analysis");

        self.run_analysis(cancel, event).await
    }

    async fn recover(&self, cancel: &CancellationToken, event: Arc<AlertEvent>) -> Result<AnalysisResult, AnalysisFailure> {
        let monitor_id = event.payload.monitor_id;
        let _permit = self.acquire(cancel, monitor_id).await?;

        info!(monitor_id, status = %event.payload.alert_status, "Starting recovery");

        let Some(agent) = self.recovery_agent() else {
            return Ok(AnalysisResult::unsuccessful(&event, None, "no agent available for recovery"));
        };

        let Some(recovery) = agent.as_recovery() else {
            return Ok(AnalysisResult::unsuccessful(&event, None, "agent does not support recovery"));
        };

        match recovery.invoke_recovery(cancel, &event).await {
            Ok(()) => {
                info!(monitor_id, agent = agent.name(), "Recovery notification sent");
                Ok(AnalysisResult {
                    success: true,
                    summary: "Recovery notification sent to agent sidecar".to_string(),
                    ..AnalysisResult::for_event(&event, Some(agent.role()))
                })
            }
            Err(e) => {
                warn!(monitor_id, error = %e, "Recovery failed");
                Ok(AnalysisResult::unsuccessful(&event, None, e.to_string()))
            }
        }
    }
}

impl AgentOrchestrator {
    async fn run_analysis(&self, cancel: &CancellationToken, event: Arc<AlertEvent>) -> Result<AnalysisResult, AnalysisFailure> {
        let monitor_id = event.payload.monitor_id;
        let role = self.classifier.classify(&event);
        info!(monitor_id, role = %role, "Classified alert");

        let Some(agent) = self.agent_for(role) else {
            self.total_errors.fetch_add(1, Ordering::SeqCst);
            metrics::counter!("rayne_agent_analysis_errors_total").increment(1);
            warn!(monitor_id, role = %role, "No agent available");
            return Ok(AnalysisResult::unsuccessful(
                &event,
                Some(role),
                format!("no agent available for role: {role}"),
            ));
        };

        let outcome = self.rlm.execute(cancel, agent.as_ref(), event).await;

        self.total_processed.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("rayne_agent_analyses_total").increment(1);

        match &outcome {
            Ok(result) if result.success => {
                info!(
                    monitor_id,
                    iterations = result.iterations,
                    duration = ?result.duration,
                    "Analysis completed"
                );
            }
            Ok(result) => {
                self.total_errors.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("rayne_agent_analysis_errors_total").increment(1);
                info!(monitor_id, iterations = result.iterations, "Analysis completed without a root cause");
                self.report(Some(result), None);
            }
            Err(failure) => {
                self.total_errors.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("rayne_agent_analysis_errors_total").increment(1);
                warn!(monitor_id, error = %failure, "Analysis failed");
                self.report(failure.result(), Some(failure.to_string()));
            }
        }

        outcome
    }
}
