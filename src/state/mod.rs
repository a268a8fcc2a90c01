//! Conversion status store.
//!
//! Single source of truth for conversion status and live process handles,
//! safe under concurrent access from job submission, the worker pool, the
//! abort path and any number of event subscribers. Three independently
//! locked maps (statuses, processes, subscribers); no lock is ever held
//! across an operation on another, which rules out lock-order deadlocks at
//! the cost of a small, omission-biased window in
//! [`ConversionStore::get_active_conversions_info`].

mod process;
mod types;

pub use process::ProcessHandle;
pub use types::*;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Message recorded when a conversion is aborted by the user.
pub const ABORT_MESSAGE: &str = "Conversion aborted by user";

/// Capacity of each subscriber's event buffer. A subscriber that falls this
/// far behind starts losing events (drop, not block).
const SUBSCRIBER_BUFFER: usize = 64;

pub struct ConversionStore {
    statuses: RwLock<HashMap<String, ConversionStatus>>,
    /// Live process handles, keyed by conversion id. Guarded separately from
    /// the status map so status polling never contends on process
    /// bookkeeping.
    processes: Mutex<HashMap<String, ProcessHandle>>,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<StoreEvent>>>,
    next_subscriber_id: AtomicU64,
}

impl ConversionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            statuses: RwLock::new(HashMap::new()),
            processes: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
        })
    }

    // ------------------------------------------------------------------
    // Status map
    // ------------------------------------------------------------------

    /// Insert or replace a status. Always publishes a status event.
    pub fn set_status(&self, id: &str, status: ConversionStatus) {
        let event = {
            let mut statuses = self.statuses.write();
            let summary = ConversionSummary::from_status(id, &status);
            statuses.insert(id.to_string(), status);
            StoreEvent::Status {
                conversion_id: id.to_string(),
                status: summary,
            }
        };
        self.publish(event);
    }

    /// Return a value copy of the status, or `None` if unknown. Callers
    /// never see a live reference, so there are no torn reads under
    /// concurrent mutation.
    pub fn get_status(&self, id: &str) -> Option<ConversionStatus> {
        self.statuses.read().get(id).cloned()
    }

    /// Remove a status. Publishes a removal event only if an entry existed.
    pub fn delete_status(&self, id: &str) {
        let removed = self.statuses.write().remove(id).is_some();
        if removed {
            self.publish(StoreEvent::Removed {
                conversion_id: id.to_string(),
            });
        }
    }

    /// Finalize a status as failed. Silent no-op when already complete, so
    /// an error can never overwrite a prior terminal state.
    pub fn update_status_with_error(&self, id: &str, message: &str) {
        self.finalize_error(id, message, ConversionOutcome::Failed);
    }

    /// Finalize a status as aborted by the user.
    pub fn update_status_aborted(&self, id: &str) {
        self.finalize_error(id, ABORT_MESSAGE, ConversionOutcome::Aborted);
    }

    fn finalize_error(&self, id: &str, message: &str, outcome: ConversionOutcome) {
        let event = {
            let mut statuses = self.statuses.write();
            let Some(status) = statuses.get_mut(id) else {
                return;
            };
            if status.complete {
                return;
            }
            status.complete = true;
            status.error = message.to_string();
            status.progress = 0.0;
            status.outcome = Some(outcome);
            status.completed_at = Some(Utc::now());
            StoreEvent::Status {
                conversion_id: id.to_string(),
                status: ConversionSummary::from_status(id, status),
            }
        };
        self.publish(event);
    }

    /// Store a progress sample, clamped into [0, 99]. No-op once the status
    /// is complete or carries an error: progress only reaches 100 through
    /// [`ConversionStore::update_status_on_success`], and never goes
    /// backwards out of a terminal state.
    pub fn set_progress_percentage(&self, id: &str, pct: f32) {
        let event = {
            let mut statuses = self.statuses.write();
            let Some(status) = statuses.get_mut(id) else {
                return;
            };
            if status.complete || !status.error.is_empty() {
                return;
            }
            // clamp passes NaN through, so map it to the floor explicitly.
            status.progress = if pct.is_nan() {
                0.0
            } else {
                pct.clamp(0.0, 99.0)
            };
            StoreEvent::Status {
                conversion_id: id.to_string(),
                status: ConversionSummary::from_status(id, status),
            }
        };
        self.publish(event);
    }

    /// Finalize a status as succeeded: progress 100, error cleared. No-op
    /// when already complete, so success cannot resurrect an aborted or
    /// errored conversion.
    pub fn update_status_on_success(&self, id: &str) {
        let event = {
            let mut statuses = self.statuses.write();
            let Some(status) = statuses.get_mut(id) else {
                return;
            };
            if status.complete {
                return;
            }
            status.complete = true;
            status.progress = 100.0;
            status.error.clear();
            status.outcome = Some(ConversionOutcome::Succeeded);
            status.completed_at = Some(Utc::now());
            StoreEvent::Status {
                conversion_id: id.to_string(),
                status: ConversionSummary::from_status(id, status),
            }
        };
        self.publish(event);
    }

    // ------------------------------------------------------------------
    // Process registry
    // ------------------------------------------------------------------

    pub fn register_active_process(&self, id: &str, handle: ProcessHandle) {
        self.processes.lock().insert(id.to_string(), handle);
    }

    pub fn unregister_active_process(&self, id: &str) {
        self.processes.lock().remove(id);
    }

    pub fn get_active_process(&self, id: &str) -> Option<ProcessHandle> {
        self.processes.lock().get(id).cloned()
    }

    /// Projections for every conversion that is both registered as running
    /// and not complete.
    ///
    /// The process-id snapshot is taken first and the status map read
    /// second, so a conversion that completes while its process is still
    /// briefly registered is omitted, never included.
    pub fn get_active_conversions_info(&self) -> Vec<ActiveConversionInfo> {
        let ids: Vec<String> = self.processes.lock().keys().cloned().collect();
        let statuses = self.statuses.read();
        ids.into_iter()
            .filter_map(|id| {
                let status = statuses.get(&id)?;
                if status.complete {
                    return None;
                }
                Some(ActiveConversionInfo {
                    id,
                    filename: status.filename.clone(),
                    format: status.format.clone(),
                    quality: status.quality.clone(),
                    progress: status.progress,
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Event bus
    // ------------------------------------------------------------------

    /// Register a push listener. The returned subscription unsubscribes
    /// itself when dropped.
    pub fn subscribe(self: &Arc<Self>) -> EventSubscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, tx);
        tracing::debug!(subscriber = id, "Event subscriber registered");
        EventSubscription {
            id,
            rx,
            store: Arc::clone(self),
        }
    }

    /// Deregister a listener and close its channel. Safe no-op for unknown
    /// ids.
    pub fn unsubscribe(&self, subscriber_id: u64) {
        if self.subscribers.lock().remove(&subscriber_id).is_some() {
            tracing::debug!(subscriber = subscriber_id, "Event subscriber removed");
        }
    }

    /// Fan an event out to all subscribers. A full subscriber buffer drops
    /// the event for that subscriber instead of blocking the mutation path;
    /// subscribers observe "latest wins" under backpressure, not a complete
    /// delivery log.
    fn publish(&self, event: StoreEvent) {
        let mut stale = Vec::new();
        {
            let subscribers = self.subscribers.lock();
            for (&id, tx) in subscribers.iter() {
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::debug!(
                            subscriber = id,
                            conversion_id = event.conversion_id(),
                            "Subscriber buffer full, dropping event"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => stale.push(id),
                }
            }
        }
        if !stale.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for id in stale {
                subscribers.remove(&id);
            }
        }
    }
}

/// A registration on the store's event bus. Dropping the subscription
/// unsubscribes it, closing the channel.
pub struct EventSubscription {
    id: u64,
    rx: mpsc::Receiver<StoreEvent>,
    store: Arc<ConversionStore>,
}

impl EventSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<StoreEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.store.unsubscribe(self.id);
    }
}
