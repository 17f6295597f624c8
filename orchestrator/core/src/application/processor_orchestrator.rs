// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Processor Orchestrator
//!
//! Two-tier webhook pipeline:
//!
//! - **Tier 1**: every applicable fast processor, per active config, concurrently.
//!   Outcomes are independent; a panic or cancellation becomes that processor's
//!   failure and never affects its peers.
//! - **Tier 2**: the payload is normalized into an [`AlertEvent`] and handed to
//!   the [`AlertAnalyzer`], either `analyze` or `recover`, never both.
//!
//! The event ends `failed` only when nothing in either tier succeeded.

use crate::application::agent_orchestrator::AlertAnalyzer;
use crate::domain::alert::{AlertEvent, AlertPayload};
use crate::domain::repository::{StorageError, WebhookStorage};
use crate::domain::webhook::{
    EventStatus, OrchestratorResult, ProcessorResult, WebhookConfig, WebhookEvent, WebhookProcessor,
};
use futures::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PENDING_BATCH: usize = 100;

/// Monitor types that vendors put in the `service` field.
const MONITOR_TYPE_SERVICES: &[&str] = &[
    "http-check",
    "process-check",
    "tcp-check",
    "dns-check",
    "ssl-check",
    "grpc-check",
    "service-check",
    "custom-check",
    "metric alert",
    "query alert",
    "composite",
    "synthetics",
    "event-v2 alert",
    "watchdog",
];

const TEAM_TAG: &str = "application_team:";

pub struct ProcessorOrchestrator {
    fast_processors: RwLock<Vec<Arc<dyn WebhookProcessor>>>,
    analyzer: Option<Arc<dyn AlertAnalyzer>>,
    storage: Option<Arc<dyn WebhookStorage>>,
}

impl ProcessorOrchestrator {
    /// Without storage the pipeline runs one default config and skips persistence.
    pub fn new(storage: Option<Arc<dyn WebhookStorage>>, analyzer: Option<Arc<dyn AlertAnalyzer>>) -> Self {
        Self {
            fast_processors: RwLock::new(Vec::new()),
            analyzer,
            storage,
        }
    }

    pub fn register_fast_processor(&self, processor: Arc<dyn WebhookProcessor>) {
        info!(processor = processor.name(), "Registered fast processor");
        self.fast_processors.write().push(processor);
    }

    /// Fast processors in registration order, then `agent_orchestrator`.
    pub fn list_processors(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .fast_processors
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        names.push("agent_orchestrator".to_string());
        names
    }

    pub async fn process(&self, cancel: &CancellationToken, event: &WebhookEvent) -> OrchestratorResult {
        let mut result = OrchestratorResult::default();
        info!(event_id = event.id, status = %event.payload.alert_status, "Processing event");

        let mut configs = match &self.storage {
            Some(storage) => match storage.get_active_configs().await {
                Ok(configs) => configs,
                Err(e) => {
                    warn!(event_id = event.id, error = %e, "Failed to load configs");
                    result.errors.push(format!("failed to get configs: {e}"));
                    if let Err(e) = storage
                        .update_event_status(event.id, EventStatus::Failed, &[], &e.to_string())
                        .await
                    {
                        warn!(event_id = event.id, error = %e, "Failed to persist event status");
                    }
                    metrics::counter!("rayne_webhook_events_total", "status" => "failed").increment(1);
                    return result;
                }
            },
            None => Vec::new(),
        };
        if configs.is_empty() {
            configs.push(WebhookConfig::default());
        }

        // Tier 1
        let processors = self.fast_processors.read().clone();
        let shared_event = Arc::new(event.clone());
        let mut forwarded_to = Vec::new();

        for config in configs {
            let outcomes = execute_fast_processors(cancel, &shared_event, Arc::new(config), &processors).await;
            for outcome in outcomes {
                if outcome.success {
                    result.processed_by.push(outcome.processor_name.clone());
                } else if !outcome.error.is_empty() {
                    result.errors.push(format!("{}: {}", outcome.processor_name, outcome.error));
                }
                forwarded_to.extend(outcome.forwarded_to);
            }
        }

        // Tier 2
        if let Some(analyzer) = &self.analyzer {
            let alert = Arc::new(to_alert_event(event));

            if analyzer.should_analyze(&alert) {
                info!(event_id = event.id, "Triggering agent analysis");
                match analyzer.analyze(cancel, alert).await {
                    Ok(analysis) => {
                        let role = analysis.agent_role.map(|r| r.as_str()).unwrap_or("unknown");
                        result.processed_by.push(format!("agent_{role}"));
                        if !analysis.success {
                            if let Some(error) = analysis.error.as_deref().filter(|e| !e.is_empty()) {
                                result.errors.push(format!("agent_analysis: {error}"));
                            }
                        }
                        result.agent_result = Some(analysis);
                    }
                    Err(failure) => {
                        warn!(event_id = event.id, error = %failure, "Agent analysis failed");
                        result.errors.push(format!("agent_analysis: {failure}"));
                        result.agent_result = failure.result().cloned();
                    }
                }
            } else if analyzer.should_recover(&alert) {
                info!(
                    event_id = event.id,
                    monitor_id = alert.payload.monitor_id,
                    status = %alert.payload.alert_status,
                    "Triggering recovery"
                );
                match analyzer.recover(cancel, alert).await {
                    Ok(recovery) => {
                        result.processed_by.push("agent_recovery".to_string());
                        if !recovery.success {
                            if let Some(error) = recovery.error.as_deref().filter(|e| !e.is_empty()) {
                                result.errors.push(format!("agent_recovery: {error}"));
                            }
                        }
                    }
                    Err(failure) => {
                        warn!(event_id = event.id, error = %failure, "Recovery failed");
                        result.errors.push(format!("agent_recovery: {failure}"));
                    }
                }
            }
        }

        let status = result.status();
        let error_message = result.error_message();

        if let Some(storage) = &self.storage {
            if let Err(e) = storage
                .update_event_status(event.id, status, &forwarded_to, &error_message)
                .await
            {
                warn!(event_id = event.id, error = %e, "Failed to persist event status");
            }
        }

        metrics::counter!("rayne_webhook_events_total", "status" => status.as_str()).increment(1);
        info!(
            event_id = event.id,
            status = %status,
            processors = ?result.processed_by,
            errors = result.errors.len(),
            "Event processed"
        );

        result
    }

    /// Persist a terminal `failed` status for an event whose processing never finished.
    pub async fn record_failure(&self, event_id: i64, error: &str) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage
            .update_event_status(event_id, EventStatus::Failed, &[], error)
            .await
        {
            warn!(event_id, error = %e, "Failed to persist event status");
        }
        metrics::counter!("rayne_webhook_events_total", "status" => "failed").increment(1);
    }

    /// Re-run up to 100 recent `pending` events on detached tasks. Returns how many were started.
    pub async fn process_pending(self: &Arc<Self>, cancel: &CancellationToken) -> Result<usize, StorageError> {
        let Some(storage) = &self.storage else {
            return Ok(0);
        };

        let (events, _) = storage.get_recent_events(PENDING_BATCH, 0).await?;
        let mut count = 0;
        for event in events.into_iter().filter(|e| e.status == EventStatus::Pending) {
            let this = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                this.process(&cancel, &event).await;
            });
            count += 1;
        }

        info!(count, "Reprocessing pending events");
        Ok(count)
    }
}

async fn execute_fast_processors(
    cancel: &CancellationToken,
    event: &Arc<WebhookEvent>,
    config: Arc<WebhookConfig>,
    processors: &[Arc<dyn WebhookProcessor>],
) -> Vec<ProcessorResult> {
    let applicable: Vec<_> = processors
        .iter()
        .filter(|p| p.can_process(event, &config))
        .cloned()
        .collect();
    if applicable.is_empty() {
        return Vec::new();
    }

    let mut join_set = JoinSet::new();
    for processor in applicable {
        let event = Arc::clone(event);
        let config = Arc::clone(&config);
        let cancel = cancel.clone();

        join_set.spawn(async move {
            let name = processor.name().to_string();
            if cancel.is_cancelled() {
                return ProcessorResult::failed(name, "context cancelled");
            }

            debug!(processor = %name, event_id = event.id, "Running fast processor");
            let outcome = AssertUnwindSafe(processor.process(&event, &config))
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => {
                    if result.success {
                        debug!(processor = %name, message = %result.message, "Fast processor succeeded");
                    } else {
                        warn!(processor = %name, error = %result.error, "Fast processor failed");
                    }
                    result
                }
                Err(_) => {
                    warn!(processor = %name, event_id = event.id, "Fast processor panicked");
                    ProcessorResult::failed(name, "processor panicked")
                }
            }
        });
    }

    let mut results = Vec::with_capacity(join_set.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => warn!(error = %e, "Fast processor task did not complete"),
        }
    }
    results
}

/// Normalize a stored webhook into the agent-layer alert.
///
/// Custom templates fill the uppercase fields and leave the standard ones empty,
/// so the standard title and status are reconciled from them here.
pub fn to_alert_event(event: &WebhookEvent) -> AlertEvent {
    let mut payload = event.payload.clone();

    if payload.alert_title.is_empty() {
        payload.alert_title = payload.alert_title_custom.clone();
    }
    if payload.alert_status.is_empty() && payload.alert_state == "Triggered" {
        payload.alert_status = "Alert".to_string();
    }

    let resolved = resolve_service_name(&event.payload);
    if resolved != payload.service {
        debug!(
            resolved = %resolved,
            raw = %payload.service,
            application_team = %payload.application_team,
            "Resolved service name"
        );
    }
    payload.service = resolved;

    AlertEvent {
        id: event.id,
        payload,
        received_at: event.received_at,
    }
}

/// Best service name for a payload.
///
/// Precedence: APPLICATION_TEAM, `application_team:` in scope, `application_team:`
/// tag, the service field unless it is a monitor type, then the raw service field.
pub fn resolve_service_name(payload: &AlertPayload) -> String {
    let team = payload.application_team.trim();
    if !team.is_empty() {
        return team.to_string();
    }

    if let Some(team) = team_from_scope(&payload.scope) {
        return team.to_string();
    }

    if let Some(team) = payload
        .tags
        .iter()
        .filter_map(|tag| tag.strip_prefix(TEAM_TAG))
        .find(|value| !value.is_empty())
    {
        return team.to_string();
    }

    let service = payload.service.trim();
    if !service.is_empty() && !is_monitor_type(service) {
        return service.to_string();
    }

    payload.service.clone()
}

fn team_from_scope(scope: &str) -> Option<&str> {
    scope.match_indices(TEAM_TAG).find_map(|(idx, _)| {
        let rest = &scope[idx + TEAM_TAG.len()..];
        let end = rest
            .find(|c: char| c == ',' || c.is_whitespace())
            .unwrap_or(rest.len());
        (end > 0).then(|| &rest[..end])
    })
}

fn is_monitor_type(service: &str) -> bool {
    MONITOR_TYPE_SERVICES.iter().any(|t| t.eq_ignore_ascii_case(service))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentRole, AnalysisFailure, AnalysisResult};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    struct SleepyProcessor {
        name: &'static str,
        delay: Duration,
        succeed: bool,
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
            if self.succeed {
                ProcessorResult::ok(self.name, "done")
            } else {
                ProcessorResult::failed(self.name, "HTTP 500")
            }
        }
    }

    struct PanickingProcessor;

    #[async_trait]
    impl WebhookProcessor for PanickingProcessor {
        fn name(&self) -> &str {
            "panicky"
        }

        fn can_process(&self, _event: &WebhookEvent, _config: &WebhookConfig) -> bool {
            true
        }

        async fn process(&self, _event: &WebhookEvent, _config: &WebhookConfig) -> ProcessorResult {
            panic!("boom");
        }
    }

    #[derive(Default)]
    struct StubAnalyzer {
        analyzed: Mutex<Vec<AlertEvent>>,
        recovered: Mutex<u32>,
        fail: bool,
    }

    #[async_trait]
    impl AlertAnalyzer for StubAnalyzer {
        fn should_analyze(&self, event: &AlertEvent) -> bool {
            event.payload.alert_status == "Alert"
        }

        fn should_recover(&self, event: &AlertEvent) -> bool {
            event.payload.alert_status == "OK"
        }

        async fn analyze(&self, _cancel: &CancellationToken, event: Arc<AlertEvent>) -> Result<AnalysisResult, AnalysisFailure> {
            self.analyzed.lock().push((*event).clone());
            if self.fail {
                return Err(AnalysisFailure::cancelled());
            }
            Ok(AnalysisResult {
                success: true,
                ..AnalysisResult::for_event(&event, Some(AgentRole::Database))
            })
        }

        async fn recover(&self, _cancel: &CancellationToken, event: Arc<AlertEvent>) -> Result<AnalysisResult, AnalysisFailure> {
            *self.recovered.lock() += 1;
            Ok(AnalysisResult {
                success: true,
                ..AnalysisResult::for_event(&event, None)
            })
        }
    }

    fn webhook(status: &str) -> WebhookEvent {
        WebhookEvent::new(
            9,
            AlertPayload {
                monitor_id: 3,
                alert_status: status.to_string(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_resolve_service_name_precedence() {
        let mut p = AlertPayload {
            application_team: "  payments ".to_string(),
            scope: "env:prod,application_team:orders".to_string(),
            tags: vec!["application_team:billing".to_string()],
            service: "checkout".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_service_name(&p), "payments");

        p.application_team.clear();
        assert_eq!(resolve_service_name(&p), "orders");

        p.scope = "env:prod".to_string();
        assert_eq!(resolve_service_name(&p), "billing");

        p.tags = vec!["application_team:".to_string()];
        assert_eq!(resolve_service_name(&p), "checkout");

        p.service = "HTTP-Check".to_string();
        assert_eq!(resolve_service_name(&p), "HTTP-Check");

        p.service.clear();
        assert_eq!(resolve_service_name(&p), "");
    }

    #[test]
    fn test_team_from_scope_stops_at_separators() {
        assert_eq!(team_from_scope("application_team:core host:a"), Some("core"));
        assert_eq!(team_from_scope("application_team:, application_team:edge"), Some("edge"));
        assert_eq!(team_from_scope("host:a"), None);
    }

    #[test]
    fn test_to_alert_event_reconciles_custom_fields() {
        let event = WebhookEvent::new(
            5,
            AlertPayload {
                alert_state: "Triggered".to_string(),
                alert_title_custom: "Latency high".to_string(),
                service: "synthetics".to_string(),
                tags: vec!["application_team:search".to_string()],
                ..Default::default()
            },
        );
        let alert = to_alert_event(&event);
        assert_eq!(alert.id, 5);
        assert_eq!(alert.payload.alert_status, "Alert");
        assert_eq!(alert.payload.alert_title, "Latency high");
        assert_eq!(alert.payload.service, "search");
    }

    #[test]
    fn test_list_processors() {
        let orch = ProcessorOrchestrator::new(None, None);
        orch.register_fast_processor(Arc::new(SleepyProcessor {
            name: "forwarding",
            delay: Duration::ZERO,
            succeed: true,
        }));
        assert_eq!(orch.list_processors(), vec!["forwarding", "agent_orchestrator"]);
    }

    #[tokio::test]
    async fn test_tier1_runs_in_parallel() {
        let orch = ProcessorOrchestrator::new(None, None);
        for name in ["a", "b", "c"] {
            orch.register_fast_processor(Arc::new(SleepyProcessor {
                name,
                delay: Duration::from_millis(100),
                succeed: true,
            }));
        }

        let started = Instant::now();
        let result = orch.process(&CancellationToken::new(), &webhook("No Data")).await;
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(result.processed_by.len(), 3);
        assert_eq!(result.status(), EventStatus::Processed);
    }

    #[tokio::test]
    async fn test_failure_and_panic_are_isolated() {
        let orch = ProcessorOrchestrator::new(None, None);
        orch.register_fast_processor(Arc::new(SleepyProcessor {
            name: "forwarding",
            delay: Duration::ZERO,
            succeed: false,
        }));
        orch.register_fast_processor(Arc::new(PanickingProcessor));
        orch.register_fast_processor(Arc::new(SleepyProcessor {
            name: "downtime",
            delay: Duration::from_millis(10),
            succeed: true,
        }));

        let result = orch.process(&CancellationToken::new(), &webhook("No Data")).await;
        assert_eq!(result.processed_by, vec!["downtime"]);
        assert!(result.errors.contains(&"forwarding: HTTP 500".to_string()));
        assert!(result.errors.contains(&"panicky: processor panicked".to_string()));
        assert_eq!(result.status(), EventStatus::Processed);
    }

    #[tokio::test]
    async fn test_cancelled_token_fails_each_processor() {
        let orch = ProcessorOrchestrator::new(None, None);
        orch.register_fast_processor(Arc::new(SleepyProcessor {
            name: "forwarding",
            delay: Duration::ZERO,
            succeed: true,
        }));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = orch.process(&cancel, &webhook("No Data")).await;
        assert_eq!(result.errors, vec!["forwarding: context cancelled"]);
        assert_eq!(result.status(), EventStatus::Failed);
    }

    #[tokio::test]
    async fn test_tier2_branches_exclusively() {
        let analyzer = Arc::new(StubAnalyzer::default());
        let orch = ProcessorOrchestrator::new(None, Some(analyzer.clone()));

        let result = orch.process(&CancellationToken::new(), &webhook("Alert")).await;
        assert_eq!(result.processed_by, vec!["agent_database"]);
        assert!(result.agent_result.is_some());

        let result = orch.process(&CancellationToken::new(), &webhook("OK")).await;
        assert_eq!(result.processed_by, vec!["agent_recovery"]);

        assert_eq!(analyzer.analyzed.lock().len(), 1);
        assert_eq!(*analyzer.recovered.lock(), 1);
    }

    #[tokio::test]
    async fn test_agent_error_is_prefixed() {
        let analyzer = Arc::new(StubAnalyzer {
            fail: true,
            ..Default::default()
        });
        let orch = ProcessorOrchestrator::new(None, Some(analyzer));

        let result = orch.process(&CancellationToken::new(), &webhook("Alert")).await;
        assert_eq!(result.errors, vec!["agent_analysis: analysis cancelled"]);
        assert_eq!(result.status(), EventStatus::Failed);
    }
}
