// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the webhook pipeline
//!
//! These tests drive events through the same wiring `rayne serve` uses:
//! 1. Store the payload
//! 2. Dispatch it to a worker
//! 3. Run Tier 1 fast processors against mocked HTTP endpoints
//! 4. Route Tier 2 to the role agent (RLM loop with sub-agents, or the sidecar)
//! 5. Verify the persisted status

use async_trait::async_trait;
use parking_lot::Mutex;
use rayne_core::application::{AgentOrchestrator, AlertAnalyzer, Dispatcher, ProcessorOrchestrator};
use rayne_core::domain::agent::{
    Agent, AgentContext, AgentPlan, AgentRole, AnalysisResult, Finding, FindingSeverity, QueryResult,
    SubAgent, SubAgentError, SubQuery,
};
use rayne_core::domain::alert::{AlertEvent, AlertPayload};
use rayne_core::domain::alerting::{FailureReport, FailureReporter};
use rayne_core::domain::node_config::{DatadogConfig, DispatcherConfig, OrchestratorConfig};
use rayne_core::domain::repository::WebhookStorage;
use rayne_core::domain::webhook::{EventStatus, WebhookConfig};
use rayne_core::infrastructure::processors::{DowntimeProcessor, ForwardingProcessor};
use rayne_core::infrastructure::{InMemoryWebhookStorage, SidecarAgent};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Plans one query per named sub-agent, then completes with whatever came back.
struct InvestigatingAgent {
    role: AgentRole,
    queries: Vec<SubQuery>,
}

#[async_trait]
impl Agent for InvestigatingAgent {
    fn name(&self) -> &str {
        "investigator"
    }

    fn role(&self) -> AgentRole {
        self.role
    }

    async fn plan(&self, _cancel: &CancellationToken, _event: &AlertEvent, ctx: &AgentContext) -> AgentPlan {
        if ctx.iteration == 1 {
            AgentPlan::queries(self.queries.clone(), "gather signals")
        } else {
            AgentPlan::complete("enough signals")
        }
    }

    async fn analyze(&self, _cancel: &CancellationToken, results: &[QueryResult], mut ctx: AgentContext) -> AgentContext {
        for r in results.iter().filter(|r| !r.is_err()) {
            ctx.findings.push(Finding::new(
                r.query.agent_name.clone(),
                "metric",
                r.query.query.clone(),
                r.result.clone(),
                FindingSeverity::Info,
            ));
        }
        ctx.root_cause = ctx
            .findings
            .iter()
            .map(|f| f.details.clone())
            .collect::<Vec<_>>()
            .join("; ");
        ctx
    }

    async fn conclude(&self, _cancel: &CancellationToken, ctx: &AgentContext) -> AnalysisResult {
        AnalysisResult {
            success: !ctx.root_cause.is_empty(),
            root_cause: ctx.root_cause.clone(),
            summary: ctx.root_cause.clone(),
            findings: ctx.findings.clone(),
            ..AnalysisResult::for_event(&ctx.event, Some(self.role))
        }
    }
}

struct FixedSubAgent {
    name: &'static str,
    answer: Result<&'static str, &'static str>,
}

#[async_trait]
impl SubAgent for FixedSubAgent {
    fn name(&self) -> &str {
        self.name
    }

    async fn query(&self, _cancel: &CancellationToken, _query: &str) -> Result<String, SubAgentError> {
        self.answer
            .map(str::to_string)
            .map_err(|e| SubAgentError::Failed(e.to_string()))
    }
}

#[derive(Default)]
struct RecordingReporter {
    reports: Mutex<Vec<FailureReport>>,
}

#[async_trait]
impl FailureReporter for RecordingReporter {
    async fn report_failure(&self, report: FailureReport) {
        self.reports.lock().push(report);
    }
}

impl RecordingReporter {
    async fn wait_for(&self, count: usize) -> Vec<FailureReport> {
        for _ in 0..50 {
            if self.reports.lock().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.reports.lock().clone()
    }
}

struct Pipeline {
    storage: Arc<InMemoryWebhookStorage>,
    agents: Arc<AgentOrchestrator>,
    processors: Arc<ProcessorOrchestrator>,
    dispatcher: Dispatcher,
}

fn pipeline(configs: Vec<WebhookConfig>, reporter: Option<Arc<dyn FailureReporter>>) -> Pipeline {
    let storage = Arc::new(InMemoryWebhookStorage::new(configs));
    let agents = Arc::new(AgentOrchestrator::new(OrchestratorConfig::default(), reporter));
    let processors = Arc::new(ProcessorOrchestrator::new(
        Some(storage.clone() as Arc<dyn WebhookStorage>),
        Some(agents.clone() as Arc<dyn AlertAnalyzer>),
    ));
    processors.register_fast_processor(Arc::new(ForwardingProcessor::new()));
    let dispatcher = Dispatcher::new(processors.clone(), DispatcherConfig { workers: 2, queue_size: 8 });
    dispatcher.start();
    Pipeline {
        storage,
        agents,
        processors,
        dispatcher,
    }
}

fn forwarding_config(url: String) -> WebhookConfig {
    WebhookConfig {
        id: 1,
        name: "primary".to_string(),
        forward_urls: vec![url],
        active: true,
        ..Default::default()
    }
}

fn database_alert() -> AlertPayload {
    AlertPayload {
        monitor_id: 4242,
        monitor_name: "Replication lag".to_string(),
        monitor_type: "dbm".to_string(),
        alert_status: "Alert".to_string(),
        hostname: "pg-primary-01".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_alert_flows_through_both_tiers() {
    let mut server = mockito::Server::new_async().await;
    let forward = server.mock("POST", "/hook").with_status(200).create_async().await;

    let p = pipeline(vec![forwarding_config(format!("{}/hook", server.url()))], None);
    p.agents.register_agent(Arc::new(InvestigatingAgent {
        role: AgentRole::Database,
        queries: vec![
            SubQuery::new("metrics", "replication lag p99").required(),
            SubQuery::new("logs", "replica errors"),
        ],
    }));
    p.agents.register_sub_agent(Arc::new(FixedSubAgent {
        name: "metrics",
        answer: Ok("lag 45s"),
    }));
    p.agents.register_sub_agent(Arc::new(FixedSubAgent {
        name: "logs",
        answer: Ok("WAL sender timeout"),
    }));

    let event = p.storage.store_event(database_alert()).await.unwrap();
    let result = p
        .dispatcher
        .submit_with_result(CancellationToken::new(), event.clone())
        .unwrap()
        .await
        .unwrap();

    forward.assert_async().await;
    assert!(result.success, "errors: {:?}", result.errors);
    assert_eq!(result.processed_by, vec!["forwarding", "agent_database"]);

    let stored = p.storage.get_event(event.id).unwrap();
    assert_eq!(stored.status, EventStatus::Processed);
    assert_eq!(stored.forwarded_to, vec![format!("{}/hook", server.url())]);
    assert!(stored.processed_at.is_some());

    let stats = p.agents.stats();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.total_errors, 0);
    assert_eq!(stats.sub_agents, vec!["logs", "metrics"]);

    p.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_required_query_failure_is_partial_success_and_reported() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/hook").with_status(200).create_async().await;

    let reporter = Arc::new(RecordingReporter::default());
    let p = pipeline(
        vec![forwarding_config(format!("{}/hook", server.url()))],
        Some(reporter.clone() as Arc<dyn FailureReporter>),
    );
    p.agents.register_agent(Arc::new(InvestigatingAgent {
        role: AgentRole::Database,
        queries: vec![SubQuery::new("metrics", "replication lag").required()],
    }));
    p.agents.register_sub_agent(Arc::new(FixedSubAgent {
        name: "metrics",
        answer: Err("metrics backend unavailable"),
    }));

    let event = p.storage.store_event(database_alert()).await.unwrap();
    let outcome = p.processors.process(&CancellationToken::new(), &event).await;

    // forwarding succeeded, so the event is processed despite the agent failure
    assert_eq!(outcome.processed_by, vec!["forwarding"]);
    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].starts_with("agent_analysis: required query to metrics failed"));

    let terminal = outcome.agent_result.unwrap();
    assert!(!terminal.success);
    assert_eq!(terminal.summary, "Analysis failed");
    assert_eq!(terminal.agent_role, Some(AgentRole::Database));

    let stored = p.storage.get_event(event.id).unwrap();
    assert_eq!(stored.status, EventStatus::Processed);
    assert!(stored.error.contains("metrics backend unavailable"));

    let reports = reporter.wait_for(1).await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].monitor_id, 4242);
    assert_eq!(reports[0].role_label(), "database");
}

#[tokio::test]
async fn test_status_failed_only_when_nothing_succeeds() {
    let mut server = mockito::Server::new_async().await;
    server.mock("POST", "/hook").with_status(500).create_async().await;

    // no agent registered for the role: a non-error result that still counts as processed
    let p = pipeline(vec![forwarding_config(format!("{}/hook", server.url()))], None);
    let event = p
        .storage
        .store_event(AlertPayload {
            alert_status: "Warn".to_string(),
            ..database_alert()
        })
        .await
        .unwrap();

    let outcome = p.processors.process(&CancellationToken::new(), &event).await;
    assert_eq!(outcome.processed_by, vec!["agent_database"]);
    assert!(outcome.errors.iter().any(|e| e.starts_with("forwarding: some forwards failed")));
    assert!(outcome
        .errors
        .iter()
        .any(|e| e == "agent_analysis: no agent available for role: database"));

    let stored = p.storage.get_event(event.id).unwrap();
    assert_eq!(stored.status, EventStatus::Processed);

    // with the analyzer gone, only the failing forward remains
    let bare = ProcessorOrchestrator::new(Some(p.storage.clone() as Arc<dyn WebhookStorage>), None);
    bare.register_fast_processor(Arc::new(ForwardingProcessor::new()));
    let outcome = bare.process(&CancellationToken::new(), &event).await;
    assert!(outcome.processed_by.is_empty());
    assert_eq!(p.storage.get_event(event.id).unwrap().status, EventStatus::Failed);
}

#[tokio::test]
async fn test_sidecar_agent_end_to_end() {
    let mut sidecar = mockito::Server::new_async().await;
    let analyze = sidecar
        .mock("POST", "/analyze")
        .match_body(mockito::Matcher::PartialJson(serde_json::json!({
            "payload": {"monitor_id": 4242, "hostname": "pg-primary-01"}
        })))
        .with_status(200)
        .with_body(r#"{"success": true, "analysis": "Long-running vacuum blocked replication", "notebook": {"url": "https://nb/9"}}"#)
        .create_async()
        .await;

    let p = pipeline(Vec::new(), None);
    let agent = SidecarAgent::new(sidecar.url(), AgentRole::Database, Duration::from_secs(5)).unwrap();
    p.agents.register_agent(Arc::new(agent));

    let event = p.storage.store_event(database_alert()).await.unwrap();
    let outcome = p.processors.process(&CancellationToken::new(), &event).await;

    analyze.assert_async().await;
    assert_eq!(outcome.processed_by, vec!["agent_database"]);
    let analysis = outcome.agent_result.unwrap();
    assert!(analysis.success);
    assert_eq!(analysis.iterations, 1);
    assert_eq!(analysis.root_cause, "Long-running vacuum blocked replication");
    assert_eq!(analysis.notebook_url.as_deref(), Some("https://nb/9"));
}

#[tokio::test]
async fn test_recovery_creates_downtime_and_notifies_sidecar() {
    let mut server = mockito::Server::new_async().await;
    let downtime = server
        .mock("POST", "/api/v2/downtime")
        .with_status(200)
        .create_async()
        .await;
    let recover = server
        .mock("POST", "/recover")
        .with_status(200)
        .with_body(r#"{"success": true}"#)
        .create_async()
        .await;
    let analyze = server.mock("POST", "/analyze").expect(0).create_async().await;

    let p = pipeline(
        vec![WebhookConfig {
            id: 1,
            name: "primary".to_string(),
            auto_downtime: true,
            downtime_duration: 30,
            active: true,
            ..Default::default()
        }],
        None,
    );
    let keys = DatadogConfig {
        api_key: Some("api".to_string()),
        app_key: Some("app".to_string()),
        ..Default::default()
    };
    p.processors
        .register_fast_processor(Arc::new(DowntimeProcessor::with_api_url(&keys, server.url())));
    let general = SidecarAgent::new(server.url(), AgentRole::General, Duration::from_secs(5)).unwrap();
    p.agents.set_default_agent(Arc::new(general));

    let event = p
        .storage
        .store_event(AlertPayload {
            alert_status: "OK".to_string(),
            ..database_alert()
        })
        .await
        .unwrap();
    let outcome = p.processors.process(&CancellationToken::new(), &event).await;

    downtime.assert_async().await;
    recover.assert_async().await;
    analyze.assert_async().await;
    assert_eq!(outcome.processed_by, vec!["downtime", "agent_recovery"]);
    assert!(outcome.errors.is_empty());
}
