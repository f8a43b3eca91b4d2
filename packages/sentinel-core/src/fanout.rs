//! Ordered delivery of alerts to independent subscribers.
//!
//! Every subscriber gets its own queue and worker task:
//!
//! - A subscriber sees alerts strictly in arrival order, one at a time.
//! - Different subscribers run concurrently with each other.
//! - A subscriber that errors or panics is logged and keeps receiving the
//!   following alerts; nobody else is affected.
//!
//! [`FanOut::deliver`] never waits. Once a subscriber is `capacity` alerts
//! behind, further alerts are dropped for that subscriber only and counted
//! in its stats, so a stalled subscriber can neither grow memory without
//! limit nor hold up the reader and the other subscribers.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::alert::Alert;

/// Errors a subscriber may report for a single alert.
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Consumer of normalized alerts.
#[async_trait]
pub trait AlertSubscriber: Send + Sync {
    /// Stable name used in logs and delivery stats.
    fn name(&self) -> &str;

    /// Handles one alert. Never called concurrently for the same subscriber.
    async fn on_alert(&self, alert: Arc<Alert>) -> Result<(), SubscriberError>;

    /// Starts a new session. Runs in queue order with the alerts, so every
    /// alert delivered before [`FanOut::reset`] is handled first.
    async fn on_reset(&self) {}
}

/// Delivery statistics for one subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriberStats {
    pub name: String,
    pub delivered: u64,
    pub failed: u64,
    /// Alerts never queued because the subscriber was too far behind.
    pub dropped: u64,
}

enum Envelope {
    Alert(Arc<Alert>),
    Reset(oneshot::Sender<()>),
    /// Acknowledged once everything queued before it has been handled.
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct SlotCounters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    /// Alerts queued but not yet picked up by the worker.
    queued: AtomicUsize,
}

struct SubscriberSlot {
    name: String,
    /// `None` once the fan-out has been shut down.
    tx: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    counters: Arc<SlotCounters>,
}

impl SubscriberSlot {
    /// Queues a control envelope. Returns false if the worker is gone.
    fn send_control(&self, envelope: Envelope) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        }
    }
}

/// Fans each alert out to all registered subscribers.
///
/// Workers exit on [`FanOut::shutdown`] or when the `FanOut` is dropped.
pub struct FanOut {
    slots: Vec<SubscriberSlot>,
    capacity: usize,
    /// Held while queueing to every slot, so deliveries and resets hit all
    /// subscribers in the same relative order.
    order: Mutex<()>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl FanOut {
    /// Spawns one worker per subscriber. Registration order is delivery order.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn new(subscribers: Vec<Arc<dyn AlertSubscriber>>, queue_capacity: usize) -> Self {
        let mut workers = Vec::with_capacity(subscribers.len());
        let slots = subscribers
            .into_iter()
            .map(|subscriber| {
                let (tx, rx) = mpsc::unbounded_channel();
                let counters = Arc::new(SlotCounters::default());
                let name = subscriber.name().to_string();
                workers.push(tokio::spawn(run_worker(
                    subscriber,
                    rx,
                    Arc::clone(&counters),
                )));
                SubscriberSlot {
                    name,
                    tx: Mutex::new(Some(tx)),
                    counters,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "[FanOut] Registered subscribers: {:?}",
            slots.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );

        Self {
            slots,
            capacity: queue_capacity.max(1),
            order: Mutex::new(()),
            workers: Mutex::new(workers),
        }
    }

    /// Queues `alert` for every subscriber, in registration order.
    ///
    /// Never waits. A subscriber with a full queue misses this alert.
    pub fn deliver(&self, alert: Arc<Alert>) {
        let _order = self.order.lock();
        for slot in &self.slots {
            let tx = slot.tx.lock();
            let Some(tx) = tx.as_ref() else {
                log::warn!(
                    "[FanOut] Subscriber '{}' is gone, dropping {}",
                    slot.name,
                    alert
                );
                continue;
            };

            let counters = &slot.counters;
            if counters.queued.load(Ordering::Acquire) >= self.capacity {
                let dropped = counters.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::warn!(
                    "[FanOut] Subscriber '{}' is {} alerts behind, dropping {} ({} dropped)",
                    slot.name,
                    self.capacity,
                    alert,
                    dropped
                );
                continue;
            }

            counters.queued.fetch_add(1, Ordering::AcqRel);
            if tx.send(Envelope::Alert(Arc::clone(&alert))).is_err() {
                counters.queued.fetch_sub(1, Ordering::AcqRel);
                log::warn!(
                    "[FanOut] Subscriber '{}' is gone, dropping {}",
                    slot.name,
                    alert
                );
            }
        }
    }

    /// Resolves once every subscriber has handled everything queued before the call.
    pub async fn flush(&self) {
        let acks = self
            .slots
            .iter()
            .filter_map(|slot| {
                let (ack_tx, ack_rx) = oneshot::channel();
                slot.send_control(Envelope::Flush(ack_tx)).then_some(ack_rx)
            })
            .collect::<Vec<_>>();
        futures::future::join_all(acks).await;
    }

    /// Starts a new session on every subscriber and waits until all have
    /// applied it.
    ///
    /// Each subscriber handles the alerts delivered before this call, then
    /// its reset, then the alerts delivered after it.
    pub async fn reset(&self) {
        let acks = {
            let _order = self.order.lock();
            self.slots
                .iter()
                .filter_map(|slot| {
                    let (ack_tx, ack_rx) = oneshot::channel();
                    slot.send_control(Envelope::Reset(ack_tx)).then_some(ack_rx)
                })
                .collect::<Vec<_>>()
        };
        futures::future::join_all(acks).await;
    }

    /// Closes every queue and waits for the workers to drain and exit.
    ///
    /// Alerts delivered after this call are dropped with a warning.
    pub async fn shutdown(&self) {
        for slot in &self.slots {
            slot.tx.lock().take();
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                log::error!("[FanOut] Worker task failed: {}", e);
            }
        }
    }

    /// Per-subscriber delivery stats, in registration order.
    #[must_use]
    pub fn stats(&self) -> Vec<SubscriberStats> {
        self.slots
            .iter()
            .map(|slot| SubscriberStats {
                name: slot.name.clone(),
                delivered: slot.counters.delivered.load(Ordering::Relaxed),
                failed: slot.counters.failed.load(Ordering::Relaxed),
                dropped: slot.counters.dropped.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Names of the registered subscribers, in delivery order.
    #[must_use]
    pub fn subscriber_names(&self) -> Vec<&str> {
        self.slots.iter().map(|slot| slot.name.as_str()).collect()
    }
}

async fn run_worker(
    subscriber: Arc<dyn AlertSubscriber>,
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    counters: Arc<SlotCounters>,
) {
    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Alert(alert) => {
                counters.queued.fetch_sub(1, Ordering::AcqRel);
                let outcome = AssertUnwindSafe(subscriber.on_alert(Arc::clone(&alert)))
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {
                        counters.delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Ok(Err(e)) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        log::warn!(
                            "[FanOut] Subscriber '{}' failed on {}: {}",
                            subscriber.name(),
                            alert,
                            e
                        );
                    }
                    Err(_) => {
                        counters.failed.fetch_add(1, Ordering::Relaxed);
                        log::error!(
                            "[FanOut] Subscriber '{}' panicked on {}",
                            subscriber.name(),
                            alert
                        );
                    }
                }
            }
            Envelope::Reset(ack) => {
                if AssertUnwindSafe(subscriber.on_reset())
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    log::error!("[FanOut] Subscriber '{}' panicked on reset", subscriber.name());
                }
                let _ = ack.send(());
            }
            Envelope::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    log::debug!("[FanOut] Worker for '{}' stopped", subscriber.name());
}
