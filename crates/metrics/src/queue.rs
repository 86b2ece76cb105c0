//! The bounded async metrics queue (spec §4.7)
//!
//! Producers (request handlers, error tracker, query tracker) push
//! [`MetricEvent`]s through [`MetricsQueue::send`] rather than calling
//! [`crate::collector::MetricsCollector`] directly, so a slow or backed-up
//! metric write never blocks the request path. [`run`] is the single
//! consumer: it drains the channel and also drives the periodic retention
//! sweep (spec §12.4 decision: pruning runs both inline and on a timer).

use crate::collector::{MetricKind, MetricsCollector};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// One metric observation, as a producer sees it: name, value, unit,
/// description and the shape it should be recorded as.
#[derive(Debug, Clone)]
pub struct MetricEvent {
    /// Metric name (the `name:` tag value).
    pub name: String,
    /// What shape to record this observation as.
    pub kind: MetricKind,
    /// The value (counter delta, gauge reading, or histogram observation).
    pub value: f64,
    /// Unit label, e.g. `"ms"`, `"count"`, `"percent"`.
    pub unit: String,
    /// Human-readable description, set once at metric creation.
    pub description: String,
}

/// The producer-facing handle: a bounded `tokio::sync::mpsc` sender that
/// drops events rather than applying backpressure on overflow.
#[derive(Clone)]
pub struct MetricsQueue {
    tx: mpsc::Sender<MetricEvent>,
}

impl MetricsQueue {
    /// Build a queue of `capacity` (default 1000 per spec §6) paired with
    /// the receiver the background collector drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MetricEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (MetricsQueue { tx }, rx)
    }

    /// Build a queue at the spec's default capacity.
    pub fn with_default_capacity() -> (Self, mpsc::Receiver<MetricEvent>) {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }

    /// Enqueue `event`. Never blocks: on a full queue the event is dropped
    /// and a single warning logged (spec §4.7, §5 "Backpressure").
    pub fn send(&self, event: MetricEvent) {
        if let Err(err) = self.tx.try_send(event) {
            tracing::warn!(error = %err, "metrics queue full, dropping event");
        }
    }
}

/// The single consumer task: applies queued events to `collector` as they
/// arrive, and sweeps retention on every `prune_interval` tick regardless of
/// queue activity.
pub async fn run(collector: Arc<MetricsCollector>, mut rx: mpsc::Receiver<MetricEvent>, prune_interval: Duration) {
    let mut ticker = tokio::time::interval(prune_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => apply(&collector, event),
                    None => return,
                }
            }
            _ = ticker.tick() => {
                if let Err(err) = collector.prune_all() {
                    tracing::warn!(error = %err, "periodic retention sweep failed");
                }
            }
        }
    }
}

fn apply(collector: &MetricsCollector, event: MetricEvent) {
    let result = match event.kind {
        MetricKind::Counter => collector.record_counter(&event.name, event.value, &event.unit, &event.description),
        MetricKind::Gauge => collector.record_gauge(&event.name, event.value, &event.unit, &event.description, true),
        MetricKind::Histogram => collector.record_histogram(&event.name, event.value, &event.unit, &event.description),
    };
    if let Err(err) = result {
        tracing::warn!(error = %err, metric = %event.name, "failed to apply queued metric event");
    }
}
