//! The metrics subsystem (spec §4.6, §4.7)
//!
//! Every metric is a `type:metric` entity; an observation is one temporal
//! tag appended to it. [`collector::MetricsCollector`] holds the recording
//! logic (counter/gauge/histogram shapes, change detection, retention
//! pruning); [`queue::MetricsQueue`] is the bounded channel producers push
//! through so a slow or panicking metric write never blocks a request.

#![warn(missing_docs)]

pub mod collector;
pub mod prometheus;
pub mod queue;

pub use collector::{MetricKind, MetricsCollector};
pub use prometheus::render_prometheus;
pub use queue::{MetricEvent, MetricsQueue};
