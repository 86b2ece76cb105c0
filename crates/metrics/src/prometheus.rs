//! Prometheus text exposition (spec §6 `GET /metrics`)
//!
//! Renders every `type:metric` entity's current value as one exposition
//! line, `entitydb_<kind>_<name> <value>`, preceded by `# HELP`/`# TYPE`
//! comments per the Prometheus text format.

use crate::collector::MetricKind;
use entitydb_core::{Entity, Error};
use entitydb_engine::Repository;
use std::fmt::Write as _;

fn latest_value(entity: &Entity, prefix: &str) -> Option<f64> {
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
        .map(|(_, _, v)| v)
}

fn tag_value<'a>(entity: &'a Entity, prefix: &str) -> Option<&'a str> {
    entity.tags.iter().rev().find_map(|t| t.bare().strip_prefix(prefix))
}

/// Render the full Prometheus exposition document for every metric
/// entity currently stored.
pub fn render_prometheus(repo: &Repository) -> Result<String, Error> {
    let mut out = String::new();
    for entity in repo.list_by_tag("type:metric", false)? {
        let Some(name) = tag_value(&entity, "name:") else { continue };
        let Some(kind) = tag_value(&entity, "kind:").and_then(MetricKind::parse) else { continue };
        let description = tag_value(&entity, "description:").unwrap_or("");
        let metric_name = format!("entitydb_{}_{name}", kind_prefix(kind));

        let value = match kind {
            MetricKind::Counter | MetricKind::Gauge => latest_value(&entity, "value:"),
            MetricKind::Histogram => {
                let observations: Vec<f64> = entity
                    .tags
                    .iter()
                    .filter_map(|t| t.bare().strip_prefix("observation:").and_then(|v| v.parse().ok()))
                    .collect();
                if observations.is_empty() {
                    None
                } else {
                    Some(observations.len() as f64)
                }
            }
        };
        let Some(value) = value else { continue };

        let _ = writeln!(out, "# HELP {metric_name} {description}");
        let _ = writeln!(out, "# TYPE {metric_name} {}", prometheus_type(kind));
        let _ = writeln!(out, "{metric_name} {value}");
    }
    Ok(out)
}

fn kind_prefix(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Counter => "counter",
        MetricKind::Gauge => "gauge",
        MetricKind::Histogram => "histogram_count",
    }
}

fn prometheus_type(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Counter => "counter",
        MetricKind::Gauge => "gauge",
        MetricKind::Histogram => "gauge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::MetricsCollector;
    use entitydb_engine::EngineConfig;
    use tempfile::TempDir;

    #[test]
    fn gauge_renders_its_current_value() {
        let dir = TempDir::new().unwrap().into_path();
        let config = EngineConfig {
            data_path: dir,
            ..EngineConfig::default()
        };
        let repo = std::sync::Arc::new(Repository::open(config).unwrap());
        let collector = MetricsCollector::new(repo.clone(), 100, 3600);
        collector.record_gauge("cpu", 10.0, "percent", "cpu load", true).unwrap();
        collector.record_gauge("cpu", 30.0, "percent", "cpu load", true).unwrap();

        let text = render_prometheus(&repo).unwrap();
        assert!(text.contains("entitydb_gauge_cpu 30"));
    }
}
