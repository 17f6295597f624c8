// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Concurrency properties of the orchestrators and the dispatcher
//!
//! - the analysis semaphore is never exceeded under a burst of alerts
//! - Tier 1 processors run side by side
//! - a saturated dispatcher rejects instead of blocking

use async_trait::async_trait;
use rayne_core::application::{AgentOrchestrator, AlertAnalyzer, DispatchError, Dispatcher, ProcessorOrchestrator};
use rayne_core::domain::agent::{Agent, AgentContext, AgentPlan, AgentRole, AnalysisResult, QueryResult};
use rayne_core::domain::alert::{AlertEvent, AlertPayload};
use rayne_core::domain::node_config::{DispatcherConfig, OrchestratorConfig};
use rayne_core::domain::webhook::{ProcessorResult, WebhookConfig, WebhookEvent, WebhookProcessor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Records how many analyses overlap inside `conclude`.
struct GaugedAgent {
    current: AtomicUsize,
    peak: AtomicUsize,
    hold: Duration,
}

impl GaugedAgent {
    fn new(hold: Duration) -> Arc<Self> {
        Arc::new(Self {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            hold,
        })
    }
}

#[async_trait]
impl Agent for GaugedAgent {
    fn name(&self) -> &str {
        "gauged"
    }

    fn role(&self) -> AgentRole {
        AgentRole::Infrastructure
    }

    async fn plan(&self, _cancel: &CancellationToken, _event: &AlertEvent, _ctx: &AgentContext) -> AgentPlan {
        AgentPlan::complete("hold the slot")
    }

    async fn analyze(&self, _cancel: &CancellationToken, _results: &[QueryResult], ctx: AgentContext) -> AgentContext {
        ctx
    }

    async fn conclude(&self, _cancel: &CancellationToken, ctx: &AgentContext) -> AnalysisResult {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.current.fetch_sub(1, Ordering::SeqCst);

        AnalysisResult {
            success: true,
            root_cause: "held".to_string(),
            ..AnalysisResult::for_event(&ctx.event, Some(AgentRole::Infrastructure))
        }
    }
}

struct SleepyProcessor {
    name: &'static str,
    delay: Duration,
}

#[async_trait]
impl WebhookProcessor for SleepyProcessor {
    fn name(&self) -> &str {
        self.name
    }

    fn can_process(&self, _event: &WebhookEvent, _config: &WebhookConfig) -> bool {
        true
    }

    async fn process(&self, _event: &WebhookEvent, _config: &WebhookConfig) -> ProcessorResult {
        tokio::time::sleep(self.delay).await;
        ProcessorResult::ok(self.name, "slept")
    }
}

fn alert(id: i64) -> Arc<AlertEvent> {
    Arc::new(AlertEvent::new(
        id,
        AlertPayload {
            monitor_id: id,
            alert_status: "Alert".to_string(),
            ..Default::default()
        },
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_analyses_never_exceed_limit() {
    let orchestrator = Arc::new(AgentOrchestrator::new(
        OrchestratorConfig {
            max_concurrent: 2,
            rlm_max_iterations: 5,
        },
        None,
    ));
    let agent = GaugedAgent::new(Duration::from_millis(40));
    orchestrator.register_agent(agent.clone());

    let handles: Vec<_> = (0..8)
        .map(|id| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move { orchestrator.analyze(&CancellationToken::new(), alert(id)).await })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        assert!(handle.unwrap().unwrap().success);
    }

    assert_eq!(agent.peak.load(Ordering::SeqCst), 2);
    let stats = orchestrator.stats();
    assert_eq!(stats.total_processed, 8);
    assert_eq!(stats.active_analyses, 0);
}

#[tokio::test]
async fn test_cancel_while_queued_for_a_slot() {
    let orchestrator = Arc::new(AgentOrchestrator::new(
        OrchestratorConfig {
            max_concurrent: 1,
            rlm_max_iterations: 5,
        },
        None,
    ));
    orchestrator.register_agent(GaugedAgent::new(Duration::from_millis(200)));

    let busy = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.analyze(&CancellationToken::new(), alert(1)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let cancel = CancellationToken::new();
    let waiter = {
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.analyze(&cancel, alert(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let failure = waiter.await.unwrap().unwrap_err();
    assert!(failure.is_cancelled());
    assert!(failure.result().is_none());

    assert!(busy.await.unwrap().unwrap().success);
    assert_eq!(orchestrator.stats().total_processed, 1);
}

#[tokio::test]
async fn test_tier1_processors_overlap() {
    let orchestrator = ProcessorOrchestrator::new(None, None);
    for name in ["first", "second", "third"] {
        orchestrator.register_fast_processor(Arc::new(SleepyProcessor {
            name,
            delay: Duration::from_millis(100),
        }));
    }

    let started = Instant::now();
    let outcome = orchestrator
        .process(&CancellationToken::new(), &WebhookEvent::new(1, AlertPayload::default()))
        .await;

    assert!(started.elapsed() < Duration::from_millis(250));
    assert_eq!(outcome.processed_by.len(), 3);
}

#[tokio::test]
async fn test_saturated_dispatcher_rejects_and_recovers() {
    let orchestrator = ProcessorOrchestrator::new(None, None);
    orchestrator.register_fast_processor(Arc::new(SleepyProcessor {
        name: "slow",
        delay: Duration::from_millis(100),
    }));
    let dispatcher = Dispatcher::new(Arc::new(orchestrator), DispatcherConfig { workers: 1, queue_size: 2 });
    dispatcher.start();

    let mut accepted = 0;
    let mut rejected = 0;
    for id in 0..10 {
        match dispatcher.submit(CancellationToken::new(), WebhookEvent::new(id, AlertPayload::default())) {
            Ok(()) => accepted += 1,
            Err(DispatchError::QueueFull) => rejected += 1,
            Err(e) => panic!("unexpected dispatch error: {e}"),
        }
    }

    // one job in flight at most, two queued
    assert!(accepted <= 3);
    assert_eq!(accepted + rejected, 10);
    assert_eq!(dispatcher.stats().dropped_count, rejected);

    dispatcher.shutdown().await;
    let stats = dispatcher.stats();
    assert_eq!(stats.processed_count, accepted);
    assert_eq!(stats.error_count, 0);
}
