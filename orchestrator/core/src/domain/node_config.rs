// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the YAML configuration schema for a Rayne node:
// - HTTP ingress bind address
// - Agent orchestrator bounds (concurrency, RLM iterations)
// - Dispatcher worker pool and queue sizing
// - Analysis sidecar endpoint
// - Monitoring vendor credentials (failure alerting, downtimes)
// - Prometheus exporter
// - Seed webhook endpoint configs

use crate::domain::webhook::WebhookConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level node configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub sidecar: SidecarConfig,

    #[serde(default)]
    pub datadog: DatadogConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Endpoint configs loaded into the in-memory store at startup
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub host: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum simultaneous agent analyses
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Upper bound on Plan/Query/Analyze iterations per analysis
    #[serde(default = "default_rlm_max_iterations")]
    pub rlm_max_iterations: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            rlm_max_iterations: default_rlm_max_iterations(),
        }
    }
}

/// Worker pool sizing. Zero means "derive from available parallelism".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub workers: usize,

    #[serde(default)]
    pub queue_size: usize,
}

impl DispatcherConfig {
    /// Concrete `(workers, queue_size)`: workers default to the available
    /// parallelism, the queue to twice the workers.
    pub fn resolve(&self) -> (usize, usize) {
        let workers = if self.workers == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        } else {
            self.workers
        };
        let queue_size = if self.queue_size == 0 { workers * 2 } else { self.queue_size };
        (workers, queue_size)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarConfig {
    #[serde(default = "default_sidecar_url")]
    pub url: String,

    #[serde(default = "default_sidecar_timeout")]
    pub timeout_seconds: u64,
}

impl SidecarConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: default_sidecar_url(),
            timeout_seconds: default_sidecar_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatadogConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,

    #[serde(default = "default_site")]
    pub site: String,
}

impl DatadogConfig {
    /// `https://api.<site>`
    pub fn api_url(&self) -> String {
        format!("https://api.{}", self.site)
    }

    /// Both keys present and non-empty.
    pub fn has_credentials(&self) -> bool {
        matches!((&self.api_key, &self.app_key), (Some(a), Some(b)) if !a.is_empty() && !b.is_empty())
    }
}

impl Default for DatadogConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            app_key: None,
            site: default_site(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus exposition
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_max_concurrent() -> usize {
    3
}

fn default_rlm_max_iterations() -> u32 {
    5
}

fn default_sidecar_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_sidecar_timeout() -> u64 {
    180
}

fn default_site() -> String {
    "ddog-gov.com".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl NodeConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discovery candidates in precedence order, each labelled with its source.
    /// 1. RAYNE_CONFIG_PATH environment variable (when set)
    /// 2. ./rayne-config.yaml (working directory)
    /// 3. ~/.rayne/config.yaml (user home)
    /// 4. /etc/rayne/config.yaml (system, Unix) or C:\ProgramData\Rayne\config.yaml (Windows)
    pub fn discovery_candidates() -> Vec<(&'static str, PathBuf)> {
        candidates(std::env::var_os("RAYNE_CONFIG_PATH").map(PathBuf::from), dirs::home_dir())
    }

    /// First existing file among [`NodeConfig::discovery_candidates`].
    pub fn discover_config() -> Option<PathBuf> {
        Self::discovery_candidates()
            .into_iter()
            .map(|(_, path)| path)
            .find(|path| path.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path (fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("CLAUDE_AGENT_URL").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: CLAUDE_AGENT_URL={}", url);
            self.sidecar.url = url;
        }
        if let Some(key) = lookup("DD_API_KEY").filter(|v| !v.is_empty()) {
            self.datadog.api_key = Some(key);
        }
        if let Some(key) = lookup("DD_APP_KEY").filter(|v| !v.is_empty()) {
            self.datadog.app_key = Some(key);
        }
        if let Some(site) = lookup("DD_SITE").filter(|v| !v.is_empty()) {
            tracing::info!("Environment override: DD_SITE={}", site);
            self.datadog.site = site;
        }

        let numeric = |key: &str| -> Option<usize> {
            let val = lookup(key)?;
            match val.trim().parse::<usize>() {
                Ok(n) => {
                    tracing::info!("Environment override: {}={}", key, n);
                    Some(n)
                }
                Err(_) => {
                    tracing::warn!("Invalid value for {}: '{}'. Expected a number. Ignoring.", key, val);
                    None
                }
            }
        };

        if let Some(n) = numeric("RAYNE_MAX_CONCURRENT") {
            self.orchestrator.max_concurrent = n;
        }
        if let Some(n) = numeric("RAYNE_WORKERS") {
            self.dispatcher.workers = n;
        }
        if let Some(n) = numeric("RAYNE_QUEUE_SIZE") {
            self.dispatcher.queue_size = n;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.orchestrator.max_concurrent == 0 {
            anyhow::bail!("orchestrator.max_concurrent must be at least 1");
        }

        if self.orchestrator.rlm_max_iterations == 0 {
            anyhow::bail!("orchestrator.rlm_max_iterations must be at least 1");
        }

        let (workers, queue_size) = self.dispatcher.resolve();
        if queue_size < workers {
            anyhow::bail!(
                "dispatcher.queue_size ({}) must be >= dispatcher.workers ({})",
                queue_size,
                workers
            );
        }

        if self.sidecar.url.is_empty() {
            anyhow::bail!("sidecar.url cannot be empty");
        }

        if self.datadog.site.is_empty() {
            anyhow::bail!("datadog.site cannot be empty");
        }

        for webhook in &self.webhooks {
            if webhook.name.is_empty() {
                anyhow::bail!("webhook name cannot be empty (id {})", webhook.id);
            }
        }

        Ok(())
    }
}

fn candidates(env_path: Option<PathBuf>, home: Option<PathBuf>) -> Vec<(&'static str, PathBuf)> {
    let mut paths = Vec::with_capacity(4);
    if let Some(path) = env_path {
        paths.push(("RAYNE_CONFIG_PATH", path));
    }
    paths.push(("working directory", PathBuf::from("./rayne-config.yaml")));
    if let Some(home) = home {
        paths.push(("user home", home.join(".rayne").join("config.yaml")));
    }

    #[cfg(unix)]
    paths.push(("system", PathBuf::from("/etc/rayne/config.yaml")));
    #[cfg(windows)]
    paths.push(("system", PathBuf::from("C:\\ProgramData\\Rayne\\config.yaml")));

    paths
}
