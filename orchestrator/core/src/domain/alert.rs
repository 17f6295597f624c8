// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Alert Domain Types
//!
//! The alert payload shared by the webhook pipeline and the agent layer.
//!
//! Monitoring webhooks arrive in two overlapping schemas: the vendor's standard
//! lowercase fields (`alert_status`, `monitor_name`, ...) and a custom webhook
//! template that populates uppercase fields (`ALERT_STATE`, `ALERT_TITLE`, ...)
//! while leaving the standard ones empty. Both live on [`AlertPayload`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Data carried by an inbound monitoring alert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertPayload {
    pub alert_id: i64,
    pub alert_title: String,
    pub alert_message: String,
    /// "Alert", "OK", "Warn", "No Data"
    pub alert_status: String,
    pub monitor_id: i64,
    pub monitor_name: String,
    pub monitor_type: String,
    pub tags: Vec<String>,
    pub timestamp: i64,
    pub event_type: String,
    pub priority: String,
    pub hostname: String,
    pub service: String,
    pub scope: String,
    pub transition_id: String,
    pub last_updated: i64,
    pub snapshot_url: String,
    pub link: String,
    pub org_id: i64,
    pub org_name: String,

    // Custom webhook template fields
    #[serde(rename = "ALERT_STATE")]
    pub alert_state: String,
    #[serde(rename = "ALERT_TITLE")]
    pub alert_title_custom: String,
    #[serde(rename = "APPLICATION_LONGNAME")]
    pub application_longname: String,
    #[serde(rename = "APPLICATION_TEAM")]
    pub application_team: String,
    #[serde(rename = "DETAILED_DESCRIPTION")]
    pub detailed_description: String,
    #[serde(rename = "IMPACT")]
    pub impact: String,
    #[serde(rename = "METRIC")]
    pub metric: String,
    #[serde(rename = "SUPPORT_GROUP")]
    pub support_group: String,
    #[serde(rename = "THRESHOLD")]
    pub threshold: String,
    #[serde(rename = "VALUE")]
    pub value: String,
    #[serde(rename = "URGENCY")]
    pub urgency: String,
}

impl AlertPayload {
    /// Monitor id, falling back to the alert id when the template omits it.
    pub fn effective_monitor_id(&self) -> i64 {
        if self.monitor_id != 0 {
            self.monitor_id
        } else {
            self.alert_id
        }
    }

    /// Monitor name, falling back to the custom then standard alert title.
    pub fn effective_monitor_name(&self) -> &str {
        [&self.monitor_name, &self.alert_title_custom, &self.alert_title]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// A normalized alert handed to the agent layer. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: i64,
    pub payload: AlertPayload,
    pub received_at: DateTime<Utc>,
}

impl AlertEvent {
    pub fn new(id: i64, payload: AlertPayload) -> Self {
        Self {
            id,
            payload,
            received_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_accepts_custom_uppercase_fields() {
        let json = r#"{
            "monitor_id": 42,
            "alert_status": "",
            "ALERT_STATE": "Triggered",
            "ALERT_TITLE": "CPU high on web-01",
            "APPLICATION_TEAM": "checkout"
        }"#;

        let payload: AlertPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.monitor_id, 42);
        assert_eq!(payload.alert_state, "Triggered");
        assert_eq!(payload.alert_title_custom, "CPU high on web-01");
        assert_eq!(payload.application_team, "checkout");
        assert!(payload.tags.is_empty());
    }

    #[test]
    fn test_effective_identity_fallbacks() {
        let payload = AlertPayload {
            alert_id: 7,
            alert_title: "standard title".to_string(),
            alert_title_custom: "custom title".to_string(),
            ..Default::default()
        };
        assert_eq!(payload.effective_monitor_id(), 7);
        assert_eq!(payload.effective_monitor_name(), "custom title");

        let payload = AlertPayload {
            monitor_id: 9,
            monitor_name: "named".to_string(),
            alert_id: 7,
            ..Default::default()
        };
        assert_eq!(payload.effective_monitor_id(), 9);
        assert_eq!(payload.effective_monitor_name(), "named");
    }
}
