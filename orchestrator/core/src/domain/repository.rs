// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Webhook Storage Interface
//!
//! Persistence contract for webhook events and endpoint configs. Defined in the
//! domain layer, implemented in `crate::infrastructure::repositories`.
//!
//! | Operation | Used by |
//! |-----------|---------|
//! | `store_event` | ingress route |
//! | `get_active_configs` | Tier 1 of `ProcessorOrchestrator::process` |
//! | `update_event_status` | end of `ProcessorOrchestrator::process` |
//! | `get_recent_events` | `ProcessorOrchestrator::process_pending` |

use crate::domain::alert::AlertPayload;
use crate::domain::webhook::{EventStatus, WebhookConfig, WebhookEvent};
use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait WebhookStorage: Send + Sync {
    /// Persist a freshly received payload as a `pending` event.
    async fn store_event(&self, payload: AlertPayload) -> Result<WebhookEvent, StorageError>;

    async fn get_active_configs(&self) -> Result<Vec<WebhookConfig>, StorageError>;

    async fn update_event_status(
        &self,
        id: i64,
        status: EventStatus,
        forwarded_to: &[String],
        error: &str,
    ) -> Result<(), StorageError>;

    /// Newest first, plus the total number of stored events.
    async fn get_recent_events(&self, limit: usize, offset: usize) -> Result<(Vec<WebhookEvent>, usize), StorageError>;
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Backend(String),
}
