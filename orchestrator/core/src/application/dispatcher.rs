// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dispatcher
//!
//! Fixed worker pool over a bounded queue in front of the [`ProcessorOrchestrator`].
//!
//! `submit` never waits: a full queue rejects the job with [`DispatchError::QueueFull`]
//! and counts it as dropped. `shutdown` closes the queue, lets the workers drain
//! what was already accepted, and gives up waiting after [`SHUTDOWN_TIMEOUT`].
//! `spawn_pending_sweep` re-queues stored events left `pending` after a drop.
//! A job that panics is recorded as a failed [`JobResult`] and the worker keeps
//! serving the queue.

use crate::application::in_flight::InFlight;
use crate::application::processor_orchestrator::ProcessorOrchestrator;
use crate::domain::node_config::DispatcherConfig;
use crate::domain::repository::{StorageError, WebhookStorage};
use crate::domain::webhook::{EventStatus, JobResult, WebhookEvent};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// How many recent events one pending sweep inspects.
const SWEEP_BATCH: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatcher queue is full")]
    QueueFull,

    #[error("dispatcher is shut down")]
    Closed,
}

struct WebhookJob {
    event: WebhookEvent,
    cancel: CancellationToken,
    result_tx: Option<oneshot::Sender<JobResult>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub active_workers: i64,
    pub total_workers: usize,
    pub processed_count: i64,
    pub error_count: i64,
    pub dropped_count: i64,
}

#[derive(Default)]
struct Counters {
    processed: AtomicI64,
    errors: AtomicI64,
    dropped: AtomicI64,
    active: AtomicI64,
    queued: AtomicI64,
    // ids accepted and not yet finished
    tracked: Mutex<HashSet<i64>>,
}

pub struct Dispatcher {
    orchestrator: Arc<ProcessorOrchestrator>,
    workers: usize,
    queue_capacity: usize,
    sender: Mutex<Option<mpsc::Sender<WebhookJob>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<WebhookJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<ProcessorOrchestrator>, config: DispatcherConfig) -> Self {
        let (workers, queue_capacity) = config.resolve();
        let (tx, rx) = mpsc::channel(queue_capacity);
        Self {
            orchestrator,
            workers,
            queue_capacity,
            sender: Mutex::new(Some(tx)),
            receiver: Arc::new(tokio::sync::Mutex::new(rx)),
            handles: Mutex::new(Vec::new()),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Launch the worker pool. Calling it again while running is a no-op.
    pub fn start(&self) {
        let mut handles = self.handles.lock();
        if !handles.is_empty() {
            info!("Dispatcher already started");
            return;
        }

        info!(workers = self.workers, queue_size = self.queue_capacity, "Starting dispatcher");
        for id in 0..self.workers {
            let receiver = Arc::clone(&self.receiver);
            let orchestrator = Arc::clone(&self.orchestrator);
            let counters = Arc::clone(&self.counters);
            handles.push(tokio::spawn(worker(id, receiver, orchestrator, counters)));
        }
    }

    /// Enqueue an event without waiting.
    pub fn submit(&self, cancel: CancellationToken, event: WebhookEvent) -> Result<(), DispatchError> {
        self.enqueue(WebhookJob {
            event,
            cancel,
            result_tx: None,
        })
    }

    /// Enqueue an event and get its [`JobResult`] once a worker finishes it.
    pub fn submit_with_result(
        &self,
        cancel: CancellationToken,
        event: WebhookEvent,
    ) -> Result<oneshot::Receiver<JobResult>, DispatchError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(WebhookJob {
            event,
            cancel,
            result_tx: Some(tx),
        })?;
        Ok(rx)
    }

    fn enqueue(&self, job: WebhookJob) -> Result<(), DispatchError> {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return Err(DispatchError::Closed);
        };

        let event_id = job.event.id;
        // raised before the send so a fast worker never sees it below zero
        let queued = self.counters.queued.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.tracked.lock().insert(event_id);
        match sender.try_send(job) {
            Ok(()) => {
                debug!(event_id, queued, capacity = self.queue_capacity, "Job queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.untrack(event_id);
                self.counters.dropped.fetch_add(1, Ordering::SeqCst);
                metrics::counter!("rayne_dispatcher_dropped_total").increment(1);
                warn!(event_id, "Queue full, dropping event");
                Err(DispatchError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.untrack(event_id);
                Err(DispatchError::Closed)
            }
        }
    }

    fn untrack(&self, event_id: i64) {
        self.counters.queued.fetch_sub(1, Ordering::SeqCst);
        self.counters.tracked.lock().remove(&event_id);
    }

    /// Re-submit stored events still `pending` after `min_age`, oldest first.
    ///
    /// Events already queued or running are skipped and the sweep stops at the
    /// first free-slot shortage, so it never counts as dropped. Returns how many
    /// events were queued.
    pub async fn redispatch_pending(
        &self,
        storage: &dyn WebhookStorage,
        min_age: Duration,
    ) -> Result<usize, StorageError> {
        let (recent, _) = storage.get_recent_events(SWEEP_BATCH, 0).await?;
        let min_age = chrono::Duration::from_std(min_age).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = chrono::Utc::now() - min_age;

        let mut count = 0;
        for event in recent.into_iter().rev() {
            if event.status != EventStatus::Pending || event.received_at > cutoff {
                continue;
            }
            if self.counters.tracked.lock().contains(&event.id) {
                continue;
            }
            if self.counters.queued.load(Ordering::SeqCst) >= self.queue_capacity as i64 {
                debug!(remaining_from = event.id, "Queue full, pending sweep deferred");
                break;
            }

            let event_id = event.id;
            match self.submit(CancellationToken::new(), event) {
                Ok(()) => count += 1,
                Err(e) => {
                    debug!(event_id, error = %e, "Pending sweep stopped");
                    break;
                }
            }
        }

        if count > 0 {
            info!(count, "Re-dispatched pending events");
        }
        Ok(count)
    }

    /// Run [`Dispatcher::redispatch_pending`] every `interval` until `cancel` fires.
    pub fn spawn_pending_sweep(
        self: &Arc<Self>,
        storage: Arc<dyn WebhookStorage>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // the first tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = dispatcher.redispatch_pending(storage.as_ref(), interval).await {
                            warn!(error = %e, "Pending sweep failed");
                        }
                    }
                }
            }
            debug!("Pending sweep stopped");
        })
    }

    /// Stop accepting jobs, drain the queue and wait for the workers.
    pub async fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        info!("Initiating dispatcher shutdown");
        drop(sender);

        let handles: Vec<_> = std::mem::take(&mut *self.handles.lock());
        let drained = futures::future::join_all(handles);

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, drained).await {
            Ok(_) => info!("All workers stopped gracefully"),
            Err(_) => warn!("Shutdown timeout, some workers may not have completed"),
        }
    }

    pub fn stats(&self) -> DispatcherStats {
        let queued = self.counters.queued.load(Ordering::SeqCst).max(0);

        DispatcherStats {
            queue_size: usize::try_from(queued).unwrap_or(0),
            queue_capacity: self.queue_capacity,
            active_workers: self.counters.active.load(Ordering::SeqCst),
            total_workers: self.workers,
            processed_count: self.counters.processed.load(Ordering::SeqCst),
            error_count: self.counters.errors.load(Ordering::SeqCst),
            dropped_count: self.counters.dropped.load(Ordering::SeqCst),
        }
    }
}

async fn worker(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<WebhookJob>>>,
    orchestrator: Arc<ProcessorOrchestrator>,
    counters: Arc<Counters>,
) {
    debug!(worker = id, "Worker started");

    loop {
        let job = { receiver.lock().await.recv().await };
        let Some(job) = job else { break };
        counters.queued.fetch_sub(1, Ordering::SeqCst);

        let started = Instant::now();
        let result = {
            let _active = InFlight::enter(&counters.active, None);
            match AssertUnwindSafe(process_job(&orchestrator, &job)).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    error!(worker = id, event_id = job.event.id, "Job panicked");
                    orchestrator.record_failure(job.event.id, "processing panicked").await;
                    JobResult {
                        event_id: job.event.id,
                        success: false,
                        processed_by: Vec::new(),
                        errors: vec!["processing panicked".to_string()],
                        duration: started.elapsed(),
                    }
                }
            }
        };

        counters.processed.fetch_add(1, Ordering::SeqCst);
        metrics::counter!("rayne_dispatcher_jobs_total").increment(1);
        if !result.success {
            counters.errors.fetch_add(1, Ordering::SeqCst);
        }

        debug!(
            worker = id,
            event_id = result.event_id,
            success = result.success,
            duration = ?result.duration,
            "Job finished"
        );

        counters.tracked.lock().remove(&result.event_id);

        if let Some(tx) = job.result_tx {
            if tx.send(result).is_err() {
                debug!(worker = id, "Result receiver dropped");
            }
        }
    }

    debug!(worker = id, "Worker stopped");
}

async fn process_job(orchestrator: &ProcessorOrchestrator, job: &WebhookJob) -> JobResult {
    let started = Instant::now();

    if job.cancel.is_cancelled() {
        return JobResult {
            event_id: job.event.id,
            success: false,
            processed_by: Vec::new(),
            errors: vec!["context cancelled".to_string()],
            duration: started.elapsed(),
        };
    }

    let outcome = orchestrator.process(&job.cancel, &job.event).await;

    JobResult {
        event_id: job.event.id,
        success: outcome.errors.is_empty(),
        processed_by: outcome.processed_by,
        errors: outcome.errors,
        duration: started.elapsed(),
    }
}
