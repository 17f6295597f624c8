// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # RLM Coordinator
//!
//! Drives one bounded Plan → Query → Analyze → Conclude loop per call to
//! [`RlmCoordinator::execute`].
//!
//! ## Loop Decision Table
//! | Condition | Action |
//! |-----------|--------|
//! | token cancelled at iteration boundary or after fan-in | return cancelled result + [`AnalysisError::Cancelled`] |
//! | plan is complete | `conclude`, stamp timing, return |
//! | plan has no queries | next iteration |
//! | a required query failed | return failed result + [`AnalysisError::RequiredQueryFailed`], no conclude |
//! | otherwise | `analyze`, next iteration |
//! | iterations exhausted | `conclude` with what was gathered |
//!
//! Sub-queries of one iteration run concurrently, one task each, and are all
//! collected before `analyze` sees them. Arrival order is not preserved. A
//! panicking sub-agent yields a failed [`QueryResult`].

use crate::domain::agent::{
    truncate, Agent, AgentContext, AnalysisError, AnalysisFailure, AnalysisResult, QueryResult,
    SubAgent, SubAgentError, SubQuery,
};
use crate::domain::alert::AlertEvent;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_ITERATIONS: u32 = 5;

pub struct RlmCoordinator {
    max_iterations: u32,
    sub_agents: RwLock<HashMap<String, Arc<dyn SubAgent>>>,
}

impl RlmCoordinator {
    /// A non-positive `max_iterations` falls back to [`DEFAULT_MAX_ITERATIONS`].
    pub fn new(max_iterations: i64) -> Self {
        let max_iterations = if max_iterations <= 0 {
            DEFAULT_MAX_ITERATIONS
        } else {
            u32::try_from(max_iterations).unwrap_or(u32::MAX)
        };
        Self {
            max_iterations,
            sub_agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Register a sub-agent under its name, replacing any previous one.
    pub fn register_sub_agent(&self, agent: Arc<dyn SubAgent>) {
        let name = agent.name().to_string();
        self.sub_agents.write().insert(name.clone(), agent);
        info!(sub_agent = %name, "Registered sub-agent");
    }

    pub fn unregister_sub_agent(&self, name: &str) {
        if self.sub_agents.write().remove(name).is_some() {
            info!(sub_agent = %name, "Unregistered sub-agent");
        }
    }

    /// Names of registered sub-agents, sorted.
    pub fn list_sub_agents(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sub_agents.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Run the loop for `agent` against `event`.
    ///
    /// On failure the returned [`AnalysisFailure`] always carries the terminal
    /// result built for it.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        agent: &dyn Agent,
        event: Arc<AlertEvent>,
    ) -> Result<AnalysisResult, AnalysisFailure> {
        let started = Instant::now();
        let started_at = Utc::now();
        let monitor_id = event.payload.monitor_id;
        let mut ctx = AgentContext::new(event.clone());

        info!(
            monitor_id,
            agent = agent.name(),
            max_iterations = self.max_iterations,
            "Starting analysis"
        );

        for iteration in 1..=self.max_iterations {
            if cancel.is_cancelled() {
                return Err(cancelled(agent, &ctx, started, started_at));
            }

            ctx.iteration = iteration;
            debug!(monitor_id, iteration, max_iterations = self.max_iterations, "Iteration");

            let plan = agent.plan(cancel, &event, &ctx).await;
            debug!(
                monitor_id,
                queries = plan.queries.len(),
                complete = plan.complete,
                reasoning = %truncate(&plan.reasoning, 100),
                "Plan"
            );

            if plan.complete {
                let result = self.finish(agent, cancel, &ctx, iteration, started, started_at).await;
                info!(monitor_id, iterations = result.iterations, "Analysis complete");
                return Ok(result);
            }

            if plan.queries.is_empty() {
                continue;
            }

            let results = self.execute_sub_queries(cancel, plan.queries).await;

            // Results that land after cancellation are dropped
            if cancel.is_cancelled() {
                return Err(cancelled(agent, &ctx, started, started_at));
            }
            ctx.query_history.extend(results.iter().cloned());

            if let Some(failed) = results.iter().find(|r| r.query.required && r.is_err()) {
                let source = failed
                    .error
                    .clone()
                    .unwrap_or_else(|| SubAgentError::Failed("unknown error".to_string()));
                warn!(
                    monitor_id,
                    sub_agent = %failed.query.agent_name,
                    error = %source,
                    "Required query failed"
                );
                let error = AnalysisError::RequiredQueryFailed {
                    agent: failed.query.agent_name.clone(),
                    source,
                };
                let result = terminal_result(
                    agent,
                    &ctx,
                    started,
                    started_at,
                    "Analysis failed",
                    "A required query failed during analysis",
                    &error,
                );
                return Err(AnalysisFailure::new(error, Some(result)));
            }

            ctx = agent.analyze(cancel, &results, ctx).await;
        }

        info!(monitor_id, "Max iterations reached, concluding with available data");
        Ok(self
            .finish(agent, cancel, &ctx, self.max_iterations, started, started_at)
            .await)
    }

    async fn finish(
        &self,
        agent: &dyn Agent,
        cancel: &CancellationToken,
        ctx: &AgentContext,
        iterations: u32,
        started: Instant,
        started_at: DateTime<Utc>,
    ) -> AnalysisResult {
        let mut result = agent.conclude(cancel, ctx).await;
        result.iterations = iterations;
        result.duration = started.elapsed();
        result.started_at = started_at;
        result.completed_at = Utc::now();
        result
    }

    /// Fan out every query on its own task and wait for all of them.
    async fn execute_sub_queries(&self, cancel: &CancellationToken, queries: Vec<SubQuery>) -> Vec<QueryResult> {
        let snapshot = self.sub_agents.read().clone();
        let expected = queries.len();
        let (tx, mut rx) = mpsc::channel(expected.max(1));

        for query in queries {
            let tx = tx.clone();
            let sub_agent = snapshot.get(&query.agent_name).cloned();
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let fallback = query.clone();
                let result = match AssertUnwindSafe(run_query(&cancel, sub_agent, query))
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        error!(sub_agent = %fallback.agent_name, "Sub-agent panicked");
                        QueryResult {
                            query: fallback,
                            result: String::new(),
                            error: Some(SubAgentError::Failed("sub-agent panicked".to_string())),
                            duration: std::time::Duration::ZERO,
                            timestamp: Utc::now(),
                        }
                    }
                };
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut collected = Vec::with_capacity(expected);
        while let Some(result) = rx.recv().await {
            collected.push(result);
        }
        collected
    }
}

async fn run_query(cancel: &CancellationToken, sub_agent: Option<Arc<dyn SubAgent>>, query: SubQuery) -> QueryResult {
    let timestamp = Utc::now();

    let Some(sub_agent) = sub_agent else {
        warn!(sub_agent = %query.agent_name, "Sub-agent not found");
        return QueryResult {
            error: Some(SubAgentError::NotFound(query.agent_name.clone())),
            query,
            result: String::new(),
            duration: std::time::Duration::ZERO,
            timestamp,
        };
    };

    let started = Instant::now();
    let outcome = sub_agent.query(cancel, &query.query).await;
    let duration = started.elapsed();

    match outcome {
        Ok(result) => {
            debug!(
                sub_agent = %query.agent_name,
                query = %truncate(&query.query, 50),
                ?duration,
                bytes = result.len(),
                "Query succeeded"
            );
            QueryResult {
                query,
                result,
                error: None,
                duration,
                timestamp,
            }
        }
        Err(e) => {
            warn!(
                sub_agent = %query.agent_name,
                query = %truncate(&query.query, 50),
                ?duration,
                error = %e,
                "Query failed"
            );
            QueryResult {
                query,
                result: String::new(),
                error: Some(e),
                duration,
                timestamp,
            }
        }
    }
}

fn cancelled(agent: &dyn Agent, ctx: &AgentContext, started: Instant, started_at: DateTime<Utc>) -> AnalysisFailure {
    warn!(monitor_id = ctx.event.payload.monitor_id, iteration = ctx.iteration, "Analysis cancelled");
    let result = terminal_result(
        agent,
        ctx,
        started,
        started_at,
        "Analysis cancelled",
        "The analysis was cancelled before completion",
        &AnalysisError::Cancelled,
    );
    AnalysisFailure::new(AnalysisError::Cancelled, Some(result))
}

fn terminal_result(
    agent: &dyn Agent,
    ctx: &AgentContext,
    started: Instant,
    started_at: DateTime<Utc>,
    summary: &str,
    details: &str,
    error: &AnalysisError,
) -> AnalysisResult {
    AnalysisResult {
        summary: summary.to_string(),
        details: details.to_string(),
        findings: ctx.findings.clone(),
        iterations: ctx.iteration,
        duration: started.elapsed(),
        started_at,
        completed_at: Utc::now(),
        ..AnalysisResult::unsuccessful(&ctx.event, Some(agent.role()), error.to_string())
    }
}
