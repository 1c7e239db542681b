//! Async processing lane - the queue/worker boundary between ingestion and
//! dispatch.
//!
//! Ingestion validates and enqueues synchronously; a worker pool consumes,
//! deduplicates, and invokes the dispatcher. Delivery is at-least-once, so
//! the dedupe store enforces at-most-one concurrent dispatch per dedupe id.
//! Transient failures are retried with capped exponential backoff up to the
//! attempt ceiling, then dead-lettered; permanent failures dead-letter
//! immediately.
//!
//! With `workers = 1` the lane is a single-consumer FIFO, giving best-effort
//! per-source ordering. Raising `workers` trades that ordering for
//! throughput.

use crate::dispatch::{Dispatcher, FailureClass};
use crate::envelope::BusEnvelope;
use anyhow::{anyhow, Result};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

mod dead_letter;
mod dedupe_store;

pub use dead_letter::{DeadLetter, DeadLetterStore};
pub use dedupe_store::{ClaimOutcome, DedupeStore, MemoryDedupeStore};

/// Lane tuning. All fields have working defaults for a single-node deploy.
#[derive(Debug, Clone, Deserialize)]
pub struct LaneConfig {
    /// Worker count. 1 = FIFO single consumer (best-effort per-source
    /// ordering); more workers trade ordering for throughput.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Attempt ceiling before an envelope is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base retry delay; attempt N waits base * 2^(N-1), capped
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Delay before re-offering a delivery whose dedupe id is in flight
    #[serde(default = "default_defer_delay_ms")]
    pub defer_delay_ms: u64,
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_workers() -> usize {
    1
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_defer_delay_ms() -> u64 {
    250
}

fn default_queue_depth() -> usize {
    1024
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            defer_delay_ms: default_defer_delay_ms(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// One delivery crossing the queue wire.
///
/// Envelopes travel as their flat-map form; workers reconstruct via
/// `BusEnvelope::from_map` before any processing.
#[derive(Debug, Clone)]
struct QueuedDelivery {
    envelope_map: Map<String, Value>,
    attempt: u32,
}

/// Shared worker dependencies.
///
/// Workers hold the requeue side of the channel only weakly, so dropping the
/// producer sender closes the channel and lets the pool drain out.
struct LaneInner {
    config: LaneConfig,
    dispatcher: Dispatcher,
    dedupe: Arc<dyn DedupeStore>,
    dead_letters: Arc<DeadLetterStore>,
    sender: mpsc::WeakSender<QueuedDelivery>,
}

/// The integration lane: producer handle plus its worker pool.
pub struct IntegrationLane {
    sender: Option<mpsc::Sender<QueuedDelivery>>,
    workers: Vec<JoinHandle<()>>,
    dead_letters: Arc<DeadLetterStore>,
}

impl IntegrationLane {
    /// Starts the worker pool and returns the producer handle.
    pub fn start(
        config: LaneConfig,
        dispatcher: Dispatcher,
        dedupe: Arc<dyn DedupeStore>,
        dead_letters: Arc<DeadLetterStore>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel::<QueuedDelivery>(config.queue_depth);
        let receiver = Arc::new(Mutex::new(receiver));

        let worker_count = config.workers.max(1);
        let inner = Arc::new(LaneInner {
            config,
            dispatcher,
            dedupe,
            dead_letters: Arc::clone(&dead_letters),
            sender: sender.downgrade(),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let inner = Arc::clone(&inner);
            let receiver = Arc::clone(&receiver);
            workers.push(tokio::spawn(async move {
                info!(worker_id, "Lane worker started");
                loop {
                    let delivery = { receiver.lock().await.recv().await };
                    let Some(delivery) = delivery else {
                        debug!(worker_id, "Lane channel closed, worker exiting");
                        break;
                    };
                    process_delivery(&inner, delivery).await;
                }
            }));
        }

        Self {
            sender: Some(sender),
            workers,
            dead_letters,
        }
    }

    /// Enqueues a validated envelope for dispatch.
    ///
    /// The envelope crosses the lane in flat-map form (the queue wire
    /// contract). Fails only when the lane is stopped or the queue is
    /// closed - structural validation has already happened at ingestion.
    pub async fn enqueue(&self, envelope: &BusEnvelope) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("Lane is stopped"))?;
        sender
            .send(QueuedDelivery {
                envelope_map: envelope.to_map(),
                attempt: 1,
            })
            .await
            .map_err(|_| anyhow!("Lane queue closed"))?;
        Ok(())
    }

    pub fn dead_letters(&self) -> Arc<DeadLetterStore> {
        Arc::clone(&self.dead_letters)
    }

    /// Stops accepting new envelopes and drains the queue.
    ///
    /// Dropping the producer sender closes the channel once in-flight
    /// deliveries settle; workers exit on the closed channel and are
    /// awaited, so everything already queued still gets processed.
    pub async fn shutdown(&mut self) {
        self.sender.take();
        let count = self.workers.len();
        for handle in self.workers.drain(..) {
            let _ = handle.await;
        }
        info!(worker_count = count, "Lane drained and stopped");
    }
}

impl Drop for IntegrationLane {
    fn drop(&mut self) {
        for handle in self.workers.drain(..) {
            handle.abort();
        }
    }
}

/// Processes one delivery end to end: reconstruct, claim, dispatch, settle.
async fn process_delivery(inner: &Arc<LaneInner>, delivery: QueuedDelivery) {
    let envelope = match BusEnvelope::from_map(&delivery.envelope_map) {
        Ok(envelope) => envelope,
        Err(e) => {
            // Pre-queue validation should make this unreachable; treat a
            // corrupt wire map as a permanent failure.
            let dedupe_id = delivery
                .envelope_map
                .get("dedupeId")
                .and_then(Value::as_str)
                .unwrap_or("corrupt")
                .to_string();
            warn!(dedupe_id = %dedupe_id, error = %e, "Corrupt delivery on lane, dead-lettering");
            inner.dead_letters.push(DeadLetter {
                dedupe_id,
                envelope: delivery.envelope_map,
                attempts: delivery.attempt,
                reason: format!("structural: {}", e),
                failed_at: Utc::now(),
            });
            return;
        }
    };

    let dedupe_id = envelope.dedupe_id().to_string();

    match inner.dedupe.try_claim(&dedupe_id) {
        ClaimOutcome::AlreadyDispatched => {
            debug!(dedupe_id = %dedupe_id, "Envelope already dispatched, skipping");
            return;
        }
        ClaimOutcome::InFlight => {
            // Another worker holds the claim; re-offer this delivery later
            // without consuming an attempt.
            debug!(dedupe_id = %dedupe_id, "Dedupe id in flight, deferring delivery");
            requeue(inner, delivery, Duration::from_millis(inner.config.defer_delay_ms));
            return;
        }
        ClaimOutcome::Claimed => {}
    }

    let report = inner.dispatcher.dispatch(&envelope).await;

    match report.failure_class() {
        None => {
            inner.dedupe.mark_dispatched(&dedupe_id);
            info!(
                dedupe_id = %dedupe_id,
                kind = %envelope.kind(),
                event = %envelope.event(),
                handlers = report.invoked(),
                attempt = delivery.attempt,
                "Envelope dispatched"
            );
        }
        Some(FailureClass::Transient) => {
            inner.dedupe.release(&dedupe_id);
            if delivery.attempt < inner.config.max_attempts {
                let delay = backoff_delay(&inner.config, delivery.attempt);
                warn!(
                    dedupe_id = %dedupe_id,
                    attempt = delivery.attempt,
                    next_delay_ms = delay.as_millis() as u64,
                    "Transient dispatch failure, scheduling retry"
                );
                requeue(
                    inner,
                    QueuedDelivery {
                        envelope_map: delivery.envelope_map,
                        attempt: delivery.attempt + 1,
                    },
                    delay,
                );
            } else {
                warn!(
                    dedupe_id = %dedupe_id,
                    attempts = delivery.attempt,
                    "Retry budget exhausted, dead-lettering"
                );
                inner.dead_letters.push(DeadLetter {
                    dedupe_id,
                    envelope: delivery.envelope_map,
                    attempts: delivery.attempt,
                    reason: "transient failures exhausted retry budget".to_string(),
                    failed_at: Utc::now(),
                });
            }
        }
        Some(FailureClass::Permanent) => {
            inner.dedupe.release(&dedupe_id);
            warn!(
                dedupe_id = %dedupe_id,
                attempt = delivery.attempt,
                "Permanent dispatch failure, dead-lettering"
            );
            inner.dead_letters.push(DeadLetter {
                dedupe_id,
                envelope: delivery.envelope_map,
                attempts: delivery.attempt,
                reason: "permanent handler failure".to_string(),
                failed_at: Utc::now(),
            });
        }
    }
}

/// Re-offers a delivery to the queue after `delay`.
fn requeue(inner: &Arc<LaneInner>, delivery: QueuedDelivery, delay: Duration) {
    let weak_sender = inner.sender.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        // The weak handle only upgrades while the producer side is alive;
        // a retry pending across shutdown is dropped instead of holding
        // the channel open.
        let Some(sender) = weak_sender.upgrade() else {
            warn!("Lane stopped, dropping requeued delivery");
            return;
        };
        if sender.send(delivery).await.is_err() {
            warn!("Lane queue closed, dropping requeued delivery");
        }
    });
}

/// Exponential backoff for attempt N: base * 2^(N-1), capped, plus up to
/// 10% jitter so synchronized retries fan out.
fn backoff_delay(config: &LaneConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(20);
    let base = config
        .base_delay_ms
        .saturating_mul(1u64 << exp)
        .min(config.max_delay_ms);
    let jitter = if base >= 10 {
        rand::thread_rng().gen_range(0..=base / 10)
    } else {
        0
    };
    Duration::from_millis(base + jitter)
}
