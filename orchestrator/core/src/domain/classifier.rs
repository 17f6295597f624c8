// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Role Classifier
//!
//! Maps an alert to the specialist [`AgentRole`] that should analyze it.
//!
//! ## Cascade
//! | Stage | Input | Match |
//! |-------|-------|-------|
//! | 0 | type, name, titles, tags | watchdog markers |
//! | 1 | `monitor_type` | exact, then substring (table order) |
//! | 2 | `tags` | exact tag rule, then `monitor_type:<x>` via stage 1 table |
//! | 3 | `service` | substring (table order) |
//! | 4 | `hostname` | substring (table order) |
//! | 5 | — | `Infrastructure` |
//!
//! Matching is case-insensitive and the first stage that matches wins. All tables
//! are ordered slices so partial matches resolve the same way on every call.

use crate::domain::agent::AgentRole;
use crate::domain::alert::{AlertEvent, AlertPayload};

const MONITOR_TYPE_RULES: &[(&str, AgentRole)] = &[
    ("apm", AgentRole::Application),
    ("trace-analytics", AgentRole::Application),
    ("rum", AgentRole::Application),
    ("error tracking", AgentRole::Application),
    ("profiling", AgentRole::Application),
    ("metric", AgentRole::Infrastructure),
    ("host", AgentRole::Infrastructure),
    ("process", AgentRole::Infrastructure),
    ("integration", AgentRole::Infrastructure),
    ("service check", AgentRole::Infrastructure),
    ("outlier", AgentRole::Infrastructure),
    ("forecast", AgentRole::Infrastructure),
    ("anomaly", AgentRole::Infrastructure),
    ("dbm", AgentRole::Database),
    ("database", AgentRole::Database),
    ("logs", AgentRole::Logs),
    ("log", AgentRole::Logs),
    ("synthetics", AgentRole::Network),
    ("network performance", AgentRole::Network),
    ("network", AgentRole::Network),
];

const TAG_RULES: &[(&str, AgentRole)] = &[
    ("monitor_type:apm", AgentRole::Application),
    ("monitor_type:dbm", AgentRole::Database),
    ("monitor_type:logs", AgentRole::Logs),
    ("monitor_type:network", AgentRole::Network),
    ("monitor_type:infrastructure", AgentRole::Infrastructure),
    ("service_type:database", AgentRole::Database),
    ("service_type:web", AgentRole::Application),
    ("service_type:api", AgentRole::Application),
    ("tier:database", AgentRole::Database),
    ("tier:application", AgentRole::Application),
    ("tier:network", AgentRole::Network),
];

const SERVICE_PATTERNS: &[(&str, AgentRole)] = &[
    // database
    ("postgres", AgentRole::Database),
    ("mysql", AgentRole::Database),
    ("mongodb", AgentRole::Database),
    ("redis", AgentRole::Database),
    ("memcached", AgentRole::Database),
    ("cassandra", AgentRole::Database),
    ("database", AgentRole::Database),
    ("aurora", AgentRole::Database),
    ("dynamo", AgentRole::Database),
    ("rds", AgentRole::Database),
    ("db", AgentRole::Database),
    // network
    ("nginx", AgentRole::Network),
    ("haproxy", AgentRole::Network),
    ("loadbalancer", AgentRole::Network),
    ("gateway", AgentRole::Network),
    ("proxy", AgentRole::Network),
    ("cdn", AgentRole::Network),
    ("dns", AgentRole::Network),
    ("lb", AgentRole::Network),
    // application
    ("graphql", AgentRole::Application),
    ("frontend", AgentRole::Application),
    ("backend", AgentRole::Application),
    ("rest", AgentRole::Application),
    ("api", AgentRole::Application),
    ("web", AgentRole::Application),
    ("app", AgentRole::Application),
    ("service", AgentRole::Application),
    // infrastructure
    ("kubernetes", AgentRole::Infrastructure),
    ("k8s", AgentRole::Infrastructure),
    ("docker", AgentRole::Infrastructure),
    ("container", AgentRole::Infrastructure),
    ("lambda", AgentRole::Infrastructure),
    ("ec2", AgentRole::Infrastructure),
    ("ecs", AgentRole::Infrastructure),
];

const HOSTNAME_PATTERNS: &[(&str, AgentRole)] = &[
    ("postgres", AgentRole::Database),
    ("mysql", AgentRole::Database),
    ("redis", AgentRole::Database),
    ("mongo", AgentRole::Database),
    ("db", AgentRole::Database),
    ("nginx", AgentRole::Network),
    ("proxy", AgentRole::Network),
    ("lb", AgentRole::Network),
    ("web", AgentRole::Application),
    ("api", AgentRole::Application),
    ("app", AgentRole::Application),
];

const WATCHDOG_TAGS: &[&str] = &["source:watchdog", "monitor_type:watchdog", "created_by:watchdog"];

/// Determines which specialist agent should handle an alert.
///
/// Stateless; the default instance carries the built-in rule tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoleClassifier;

impl RoleClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify an alert. Total and deterministic: always returns a role.
    pub fn classify(&self, event: &AlertEvent) -> AgentRole {
        let payload = &event.payload;

        if is_watchdog(payload) {
            return AgentRole::Watchdog;
        }

        by_monitor_type(&payload.monitor_type)
            .or_else(|| by_tags(&payload.tags))
            .or_else(|| by_patterns(&payload.service, SERVICE_PATTERNS))
            .or_else(|| by_patterns(&payload.hostname, HOSTNAME_PATTERNS))
            .unwrap_or(AgentRole::Infrastructure)
    }
}

/// Whether the alert comes from the vendor's Watchdog anomaly detection.
pub fn is_watchdog(payload: &AlertPayload) -> bool {
    let contains = |s: &str| s.to_lowercase().contains("watchdog");

    if contains(&payload.monitor_type)
        || contains(&payload.monitor_name)
        || contains(&payload.alert_title)
        || contains(&payload.alert_title_custom)
    {
        return true;
    }

    payload
        .tags
        .iter()
        .any(|tag| WATCHDOG_TAGS.contains(&tag.to_lowercase().as_str()))
}

fn lookup(key: &str, table: &[(&str, AgentRole)]) -> Option<AgentRole> {
    table.iter().find(|(k, _)| *k == key).map(|(_, role)| *role)
}

fn by_monitor_type(monitor_type: &str) -> Option<AgentRole> {
    if monitor_type.is_empty() {
        return None;
    }
    let mt = monitor_type.to_lowercase();

    lookup(&mt, MONITOR_TYPE_RULES).or_else(|| {
        MONITOR_TYPE_RULES
            .iter()
            .find(|(pattern, _)| mt.contains(pattern))
            .map(|(_, role)| *role)
    })
}

fn by_tags(tags: &[String]) -> Option<AgentRole> {
    tags.iter().find_map(|tag| {
        let tag = tag.to_lowercase();
        lookup(&tag, TAG_RULES).or_else(|| {
            tag.strip_prefix("monitor_type:")
                .and_then(|mt| lookup(mt, MONITOR_TYPE_RULES))
        })
    })
}

fn by_patterns(value: &str, patterns: &[(&str, AgentRole)]) -> Option<AgentRole> {
    if value.is_empty() {
        return None;
    }
    let value = value.to_lowercase();
    patterns
        .iter()
        .find(|(pattern, _)| value.contains(pattern))
        .map(|(_, role)| *role)
}
