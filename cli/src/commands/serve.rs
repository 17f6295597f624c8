// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `rayne serve` - wire the pipeline and run the webhook server

use anyhow::{Context, Result};
use clap::Args;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use rayne_core::{
    application::{AgentOrchestrator, AlertAnalyzer, Dispatcher, ProcessorOrchestrator},
    domain::agent::AgentRole,
    domain::alerting::FailureReporter,
    domain::node_config::NodeConfig,
    domain::repository::WebhookStorage,
    infrastructure::{
        processors::{DowntimeProcessor, ForwardingProcessor},
        DatadogFailureAlerter, InMemoryWebhookStorage, SidecarAgent,
    },
    presentation::api::{self, AppState},
};

/// Stored events still `pending` this long after arrival are queued again.
const PENDING_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

const SPECIALIST_ROLES: [AgentRole; 6] = [
    AgentRole::Infrastructure,
    AgentRole::Application,
    AgentRole::Network,
    AgentRole::Database,
    AgentRole::Logs,
    AgentRole::Watchdog,
];

#[derive(Args)]
pub struct ServeArgs {
    /// HTTP listen port (overrides config)
    #[arg(long, env = "RAYNE_PORT")]
    port: Option<u16>,

    /// HTTP listen host (overrides config)
    #[arg(long, env = "RAYNE_HOST")]
    host: Option<String>,
}

pub async fn run(args: ServeArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config = NodeConfig::load_or_default(config_path).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }
    config.validate().context("Configuration validation failed")?;

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = config.metrics.port, "Prometheus exporter listening");
    }

    let storage = Arc::new(InMemoryWebhookStorage::new(config.webhooks.clone()));

    let reporter: Arc<dyn FailureReporter> = Arc::new(DatadogFailureAlerter::new(&config.datadog));
    let agents = Arc::new(AgentOrchestrator::new(config.orchestrator.clone(), Some(reporter)));

    let timeout = config.sidecar.timeout();
    for role in SPECIALIST_ROLES {
        let agent = SidecarAgent::new(&config.sidecar.url, role, timeout)
            .with_context(|| format!("Failed to build {role} agent"))?;
        agents.register_agent(Arc::new(agent));
    }
    let general = SidecarAgent::new(&config.sidecar.url, AgentRole::General, timeout)
        .context("Failed to build general agent")?;
    agents.set_default_agent(Arc::new(general));

    let processors = Arc::new(ProcessorOrchestrator::new(
        Some(storage.clone() as Arc<dyn WebhookStorage>),
        Some(agents.clone() as Arc<dyn AlertAnalyzer>),
    ));
    processors.register_fast_processor(Arc::new(ForwardingProcessor::new()));
    if config.datadog.has_credentials() {
        processors.register_fast_processor(Arc::new(DowntimeProcessor::new(&config.datadog)));
    } else {
        warn!("Datadog credentials missing, auto downtime disabled");
    }

    let dispatcher = Arc::new(Dispatcher::new(processors.clone(), config.dispatcher.clone()));
    dispatcher.start();

    let background = CancellationToken::new();
    match processors.process_pending(&background).await {
        Ok(0) => {}
        Ok(n) => info!(count = n, "Re-dispatched pending events"),
        Err(e) => warn!(error = %e, "Failed to load pending events"),
    }
    let sweep = dispatcher.spawn_pending_sweep(
        storage.clone() as Arc<dyn WebhookStorage>,
        PENDING_SWEEP_INTERVAL,
        background.clone(),
    );

    let app = api::app(AppState {
        storage,
        dispatcher: dispatcher.clone(),
        agent_orchestrator: agents,
        processor_orchestrator: processors,
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Rayne listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Draining dispatcher");
    background.cancel();
    if let Err(e) = sweep.await {
        warn!(error = %e, "Pending sweep task failed");
    }
    dispatcher.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
