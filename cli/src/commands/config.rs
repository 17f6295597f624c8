// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use rayne_core::domain::node_config::NodeConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file populated with defaults
    Generate {
        /// Output path (default: ./rayne-config.yaml)
        #[arg(short, long, default_value = "./rayne-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config =
        NodeConfig::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        for (step, (source, path)) in NodeConfig::discovery_candidates().into_iter().enumerate() {
            let found = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {}: {} ({})", step + 2, source, path.display(), found);
        }
        println!();
    }

    println!("{}", "Server:".bold());
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!();

    println!("{}", "Agents:".bold());
    println!("  Max concurrent analyses: {}", config.orchestrator.max_concurrent);
    println!("  RLM max iterations: {}", config.orchestrator.rlm_max_iterations);
    println!("  Sidecar: {} (timeout {}s)", config.sidecar.url, config.sidecar.timeout_seconds);
    println!();

    let (workers, queue) = config.dispatcher.resolve();
    println!("{}", "Dispatcher:".bold());
    println!("  Workers: {workers}");
    println!("  Queue size: {queue}");
    println!();

    println!("{}", "Datadog:".bold());
    println!("  Site: {}", config.datadog.site);
    if config.datadog.has_credentials() {
        println!("  Credentials: {}", "configured".green());
    } else {
        println!("  Credentials: {}", "missing (failure alerts and downtimes disabled)".yellow());
    }
    println!();

    println!("{}", "Webhook endpoints:".bold());
    if config.webhooks.is_empty() {
        println!("  {}", "(none; a single default endpoint is used)".dimmed());
    }
    for webhook in &config.webhooks {
        let state = if webhook.active { "active".green() } else { "inactive".dimmed() };
        println!("  {} [{}]", webhook.name.bold(), state);
        for url in &webhook.forward_urls {
            println!("    forward → {url}");
        }
        if webhook.auto_downtime {
            println!("    auto downtime: {} minutes", webhook.downtime_minutes());
        }
    }

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    NodeConfig::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}
