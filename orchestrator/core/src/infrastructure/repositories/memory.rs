// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process-local webhook store.
//!
//! Holds at most `max_events` events once older ones have settled: the oldest
//! `processed`/`failed` events are evicted first, `pending` and `processing`
//! events are never evicted.

use crate::domain::alert::AlertPayload;
use crate::domain::repository::{StorageError, WebhookStorage};
use crate::domain::webhook::{EventStatus, WebhookConfig, WebhookEvent};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Retention used by [`InMemoryWebhookStorage::new`].
pub const DEFAULT_MAX_EVENTS: usize = 10_000;

#[derive(Clone)]
pub struct InMemoryWebhookStorage {
    events: Arc<RwLock<BTreeMap<i64, WebhookEvent>>>,
    configs: Arc<RwLock<Vec<WebhookConfig>>>,
    next_id: Arc<AtomicI64>,
    max_events: usize,
}

impl InMemoryWebhookStorage {
    pub fn new(configs: Vec<WebhookConfig>) -> Self {
        Self::with_retention(configs, DEFAULT_MAX_EVENTS)
    }

    /// A zero `max_events` falls back to [`DEFAULT_MAX_EVENTS`].
    pub fn with_retention(configs: Vec<WebhookConfig>, max_events: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(BTreeMap::new())),
            configs: Arc::new(RwLock::new(configs)),
            next_id: Arc::new(AtomicI64::new(1)),
            max_events: if max_events == 0 { DEFAULT_MAX_EVENTS } else { max_events },
        }
    }

    /// Replace the endpoint configs; events are untouched.
    pub fn set_configs(&self, configs: Vec<WebhookConfig>) {
        *self.configs.write() = configs;
    }

    pub fn get_event(&self, id: i64) -> Option<WebhookEvent> {
        self.events.read().get(&id).cloned()
    }
}

fn evict_settled(events: &mut BTreeMap<i64, WebhookEvent>, max_events: usize) {
    let excess = events.len().saturating_sub(max_events);
    if excess == 0 {
        return;
    }

    let settled: Vec<i64> = events
        .values()
        .filter(|e| matches!(e.status, EventStatus::Processed | EventStatus::Failed))
        .map(|e| e.id)
        .take(excess)
        .collect();
    for id in &settled {
        events.remove(id);
    }
    debug!(evicted = settled.len(), retained = events.len(), "Evicted settled webhook events");
}

impl Default for InMemoryWebhookStorage {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl WebhookStorage for InMemoryWebhookStorage {
    async fn store_event(&self, payload: AlertPayload) -> Result<WebhookEvent, StorageError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = WebhookEvent::new(id, payload);
        let mut events = self.events.write();
        events.insert(id, event.clone());
        evict_settled(&mut events, self.max_events);
        Ok(event)
    }

    async fn get_active_configs(&self) -> Result<Vec<WebhookConfig>, StorageError> {
        Ok(self.configs.read().iter().filter(|c| c.active).cloned().collect())
    }

    async fn update_event_status(
        &self,
        id: i64,
        status: EventStatus,
        forwarded_to: &[String],
        error: &str,
    ) -> Result<(), StorageError> {
        let mut events = self.events.write();
        let event = events
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound(format!("webhook event {id}")))?;

        event.status = status;
        event.forwarded_to = forwarded_to.to_vec();
        event.error = error.to_string();
        if matches!(status, EventStatus::Processed | EventStatus::Failed) {
            event.processed_at = Some(Utc::now());
            evict_settled(&mut events, self.max_events);
        }
        Ok(())
    }

    async fn get_recent_events(&self, limit: usize, offset: usize) -> Result<(Vec<WebhookEvent>, usize), StorageError> {
        let events = self.events.read();
        // ids are assigned in arrival order
        let page = events.values().rev().skip(offset).take(limit).cloned().collect();
        Ok((page, events.len()))
    }
}
