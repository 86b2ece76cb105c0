//! Recording logic for counters, gauges and histograms (spec §4.6).
//!
//! Each public recording method is guarded by a thread-local re-entrancy
//! flag (spec §4.7): if the current thread is already inside a metrics
//! write (for instance because `entitydb_engine::Repository::update`
//! itself triggered an instrumentation callback), the call is a silent
//! no-op rather than a recursive write.

use entitydb_core::{Entity, EntityId, Error, Tag, Timestamp};
use entitydb_engine::Repository;
use std::cell::Cell;

thread_local! {
    static IN_METRICS_WRITE: Cell<bool> = const { Cell::new(false) };
}

fn guarded<F: FnOnce() -> Result<(), Error>>(f: F) -> Result<(), Error> {
    let already_writing = IN_METRICS_WRITE.with(|flag| flag.get());
    if already_writing {
        tracing::debug!("suppressing re-entrant metrics write");
        return Ok(());
    }
    IN_METRICS_WRITE.with(|flag| flag.set(true));
    let result = f();
    IN_METRICS_WRITE.with(|flag| flag.set(false));
    result
}

/// What shape of metric an entity represents, stored as its `kind:` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonic-ish cumulative value; `record_counter` adds a delta.
    Counter,
    /// Point-in-time value; `record_gauge` replaces it, with change
    /// detection suppressing no-op appends.
    Gauge,
    /// A distribution; every call appends a new observation.
    Histogram,
}

impl MetricKind {
    fn as_tag_value(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }

    /// Parse back a `kind:<...>` bare tag value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "counter" => Some(MetricKind::Counter),
            "gauge" => Some(MetricKind::Gauge),
            "histogram" => Some(MetricKind::Histogram),
            _ => None,
        }
    }
}

const VALUE_PREFIX: &str = "value:";
const OBSERVATION_PREFIX: &str = "observation:";

fn latest_prefixed(entity: &Entity, prefix: &str) -> Option<(Timestamp, f64)> {
    entity
        .tags
        .iter()
        .enumerate()
        .filter_map(|(i, t)| {
            t.bare()
                .strip_prefix(prefix)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| (t.timestamp(), i, v))
        })
        .max_by(|(ts1, i1, _), (ts2, i2, _)| ts1.cmp(ts2).then(i1.cmp(i2)))
        .map(|(ts, _, v)| (ts, v))
}

fn all_prefixed(entity: &Entity, prefix: &str) -> Vec<(Timestamp, f64)> {
    entity
        .tags
        .iter()
        .filter_map(|t| {
            t.bare()
                .strip_prefix(prefix)
                .and_then(|v| v.parse::<f64>().ok())
                .map(|v| (t.timestamp(), v))
        })
        .collect()
}

fn metric_entity_id(name: &str) -> EntityId {
    EntityId::from(format!("metric:{name}").as_str())
}

/// Records counter/gauge/histogram observations onto `type:metric`
/// entities, and prunes them back to their retention window.
pub struct MetricsCollector {
    repo: std::sync::Arc<Repository>,
    default_retention_count: usize,
    default_retention_period_secs: i64,
}

impl MetricsCollector {
    /// Build a collector over `repo`, used for any metric that doesn't
    /// specify its own retention at creation time.
    pub fn new(repo: std::sync::Arc<Repository>, default_retention_count: usize, default_retention_period_secs: i64) -> Self {
        MetricsCollector {
            repo,
            default_retention_count,
            default_retention_period_secs,
        }
    }

    fn ensure_metric(&self, name: &str, kind: MetricKind, unit: &str, description: &str) -> Result<EntityId, Error> {
        let id = metric_entity_id(name);
        if self.repo.get_by_id(&id, true).is_ok() {
            return Ok(id);
        }
        let now = Timestamp::now();
        self.repo.create_with_id(
            id.clone(),
            vec![
                Tag::new(now, "type:metric")?,
                Tag::new(now, "dataset:system")?,
                Tag::new(now, &format!("name:{name}"))?,
                Tag::new(now, &format!("kind:{}", kind.as_tag_value()))?,
                Tag::new(now, &format!("unit:{unit}"))?,
                Tag::new(now, &format!("description:{description}"))?,
                Tag::new(now, &format!("retention:count:{}", self.default_retention_count))?,
                Tag::new(now, &format!("retention:period:{}", self.default_retention_period_secs))?,
            ],
            Vec::new(),
        )?;
        Ok(id)
    }

    /// Record a counter delta: read the last `value:` tag, add `delta`,
    /// append the new absolute value (spec §4.6 "Counters").
    pub fn record_counter(&self, name: &str, delta: f64, unit: &str, description: &str) -> Result<(), Error> {
        guarded(|| {
            let id = self.ensure_metric(name, MetricKind::Counter, unit, description)?;
            let entity = self.repo.get_by_id(&id, true)?;
            let previous = latest_prefixed(&entity, VALUE_PREFIX).map(|(_, v)| v).unwrap_or(0.0);
            let new_value = previous + delta;
            let now = Timestamp::now();
            self.repo.update(&id, vec![Tag::new(now, &format!("{VALUE_PREFIX}{new_value}"))?])?;
            self.prune(&id)
        })
    }

    /// Record a gauge reading, suppressing the append if `value` equals the
    /// last recorded one and `suppress_unchanged` is set (spec §4.6 "Change
    /// detection").
    pub fn record_gauge(
        &self,
        name: &str,
        value: f64,
        unit: &str,
        description: &str,
        suppress_unchanged: bool,
    ) -> Result<(), Error> {
        guarded(|| {
            let id = self.ensure_metric(name, MetricKind::Gauge, unit, description)?;
            let entity = self.repo.get_by_id(&id, true)?;
            if suppress_unchanged {
                if let Some((_, last)) = latest_prefixed(&entity, VALUE_PREFIX) {
                    if last == value {
                        return Ok(());
                    }
                }
            }
            let now = Timestamp::now();
            self.repo.update(&id, vec![Tag::new(now, &format!("{VALUE_PREFIX}{value}"))?])?;
            self.prune(&id)
        })
    }

    /// Append a histogram observation (spec §4.6 "Histograms"): every call
    /// appends, never suppresses.
    pub fn record_histogram(&self, name: &str, observation: f64, unit: &str, description: &str) -> Result<(), Error> {
        guarded(|| {
            let id = self.ensure_metric(name, MetricKind::Histogram, unit, description)?;
            let now = Timestamp::now();
            self.repo
                .update(&id, vec![Tag::new(now, &format!("{OBSERVATION_PREFIX}{observation}"))?])?;
            self.prune(&id)
        })
    }

    /// Counter rate over the trailing `window_secs`: `(last - first) /
    /// window` across `value:` tags whose timestamp falls in the window.
    pub fn counter_rate(&self, name: &str, window_secs: i64) -> Result<Option<f64>, Error> {
        let entity = self.repo.get_by_id(&metric_entity_id(name), true)?;
        let now = Timestamp::now();
        let cutoff = now.as_nanos() - window_secs * 1_000_000_000;
        let mut samples: Vec<(Timestamp, f64)> = all_prefixed(&entity, VALUE_PREFIX)
            .into_iter()
            .filter(|(ts, _)| ts.as_nanos() >= cutoff)
            .collect();
        samples.sort_by_key(|(ts, _)| ts.as_nanos());
        match (samples.first(), samples.last()) {
            (Some((t0, v0)), Some((t1, v1))) if t0 != t1 => {
                let dt_secs = (t1.as_nanos() - t0.as_nanos()) as f64 / 1_000_000_000.0;
                Ok(Some((v1 - v0) / dt_secs))
            }
            _ => Ok(None),
        }
    }

    /// Percentile `p` (0-100) over histogram observations within the
    /// trailing `window_secs` (spec §4.6 "Histograms").
    pub fn percentile(&self, name: &str, p: f64, window_secs: i64) -> Result<Option<f64>, Error> {
        let entity = self.repo.get_by_id(&metric_entity_id(name), true)?;
        let now = Timestamp::now();
        let cutoff = now.as_nanos() - window_secs * 1_000_000_000;
        let mut values: Vec<f64> = all_prefixed(&entity, OBSERVATION_PREFIX)
            .into_iter()
            .filter(|(ts, _)| ts.as_nanos() >= cutoff)
            .map(|(_, v)| v)
            .collect();
        if values.is_empty() {
            return Ok(None);
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let rank = ((values.len() as f64) * p / 100.0).ceil() as usize;
        let idx = rank.saturating_sub(1).min(values.len() - 1);
        Ok(Some(values[idx]))
    }

    /// Prune `id`'s value/observation tags back to its retention policy
    /// (spec §4.6 "Retention"): called inline after every append, and from
    /// the periodic collector loop.
    pub fn prune(&self, id: &EntityId) -> Result<(), Error> {
        let entity = self.repo.get_by_id(id, true)?;
        let retention_count: usize = entity
            .tags
            .iter()
            .filter_map(|t| t.bare().strip_prefix("retention:count:"))
            .last()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_retention_count);
        let retention_period: i64 = entity
            .tags
            .iter()
            .filter_map(|t| t.bare().strip_prefix("retention:period:"))
            .last()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.default_retention_period_secs);
        let cutoff = Timestamp::now().as_nanos() - retention_period * 1_000_000_000;

        let mut kept: Vec<Tag> = Vec::with_capacity(entity.tags.len());
        let mut observations: Vec<(usize, Timestamp)> = Vec::new();
        for tag in &entity.tags {
            let is_observation = tag.bare().starts_with(VALUE_PREFIX) || tag.bare().starts_with(OBSERVATION_PREFIX);
            if is_observation {
                if tag.timestamp().as_nanos() < cutoff {
                    continue;
                }
                observations.push((kept.len(), tag.timestamp()));
            }
            kept.push(tag.clone());
        }

        if observations.len() > retention_count {
            observations.sort_by_key(|(_, ts)| std::cmp::Reverse(ts.as_nanos()));
            let drop_indices: std::collections::HashSet<usize> = observations
                .into_iter()
                .skip(retention_count)
                .map(|(idx, _)| idx)
                .collect();
            kept = kept
                .into_iter()
                .enumerate()
                .filter(|(i, _)| !drop_indices.contains(i))
                .map(|(_, t)| t)
                .collect();
        }

        if kept.len() != entity.tags.len() {
            self.repo.replace_tags(id, kept)?;
        }
        Ok(())
    }

    /// Run retention pruning across every metric entity (spec §12.4
    /// decision: pruning also runs "on a timer", driven by the periodic
    /// collector in [`crate::queue`]).
    pub fn prune_all(&self) -> Result<(), Error> {
        for entity in self.repo.list_by_tag("type:metric", false)? {
            self.prune(&entity.id)?;
        }
        Ok(())
    }

    /// Shared handle to the underlying repository, for the Prometheus
    /// exposition formatter.
    pub fn repo(&self) -> &Repository {
        &self.repo
    }
}
