//! mackerel-agent side of the plugin: graph meta output, metric value lines
//! and the last-run marker file.

use crate::collectors::{MetricsPlugin, ReportMap};
use crate::errors::ReportError;
use crate::graph::{Graph, GraphDefinition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Set by mackerel-agent when it wants graph definitions instead of values.
pub const META_ENV: &str = "MACKEREL_AGENT_PLUGIN_META";

const META_HEADER: &str = "# mackerel-agent-plugin";
const CUSTOM_PREFIX: &str = "custom.";
const LAST_TIME_KEY: &str = "_lastTime";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Definitions,
    Values,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(META_ENV) {
            Ok(v) if !v.is_empty() => Mode::Definitions,
            _ => Mode::Values,
        }
    }
}

#[derive(Serialize)]
struct GraphMeta<'a> {
    graphs: BTreeMap<String, &'a Graph>,
}

pub struct Reporter {
    tempfile: PathBuf,
}

impl Reporter {
    pub fn new(tempfile: PathBuf) -> Self {
        Self { tempfile }
    }

    pub fn tempfile(&self) -> &Path {
        &self.tempfile
    }

    pub async fn run<W: Write>(
        &self,
        plugin: &dyn MetricsPlugin,
        mode: Mode,
        now: DateTime<Utc>,
        out: &mut W,
    ) -> Result<(), ReportError> {
        let graphs = plugin.graph_definition();
        match mode {
            Mode::Definitions => output_definitions(&graphs, out),
            Mode::Values => {
                let report = plugin.fetch_metrics().await;
                output_values(&graphs, &report, now, out)?;
                self.save_marker(&report, now)
            }
        }
    }

    /// Persist this run's values and time. Nothing here reads it back.
    pub fn save_marker(&self, report: &ReportMap, now: DateTime<Utc>) -> Result<(), ReportError> {
        let mut doc: Map<String, Value> = report
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(*v)))
            .collect();
        doc.insert(LAST_TIME_KEY.to_string(), Value::from(now.timestamp()));

        let bytes = serde_json::to_vec(&doc).map_err(|source| ReportError::Encode {
            what: "marker",
            source,
        })?;

        let mut staging = self.tempfile.as_os_str().to_owned();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let marker_err = |source| ReportError::Marker {
            path: self.tempfile.display().to_string(),
            source,
        };
        std::fs::write(&staging, bytes).map_err(marker_err)?;
        std::fs::rename(&staging, &self.tempfile).map_err(marker_err)?;
        debug!(path = %self.tempfile.display(), entries = report.len(), "marker saved");
        Ok(())
    }
}

/// Meta header followed by the graph schema as one JSON line.
pub fn output_definitions<W: Write>(graphs: &GraphDefinition, out: &mut W) -> Result<(), ReportError> {
    let meta = GraphMeta {
        graphs: graphs
            .iter()
            .map(|(key, graph)| {
                let key = if key.starts_with(CUSTOM_PREFIX) {
                    key.clone()
                } else {
                    format!("{CUSTOM_PREFIX}{key}")
                };
                (key, graph)
            })
            .collect(),
    };
    let json = serde_json::to_string(&meta).map_err(|source| ReportError::Encode {
        what: "graph definition",
        source,
    })?;
    writeln!(out, "{META_HEADER}")?;
    writeln!(out, "{json}")?;
    Ok(())
}

/// One `name\tvalue\tepoch` line per declared series that has a value.
pub fn output_values<W: Write>(
    graphs: &GraphDefinition,
    report: &ReportMap,
    now: DateTime<Utc>,
    out: &mut W,
) -> Result<(), ReportError> {
    let epoch = now.timestamp();
    for (key, graph) in graphs {
        for series in &graph.metrics {
            let Some(value) = report.get(&series.name) else {
                continue;
            };
            if !value.is_finite() {
                warn!(graph = %key, metric = %series.name, %value, "skipping non-finite value");
                continue;
            }
            writeln!(out, "{key}.{}\t{value:.6}\t{epoch}", series.name)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{Aggregation, KeyConvention, MetricSpec, Unit};
    use crate::graph::graph_definition;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct StaticPlugin {
        graphs: GraphDefinition,
        report: ReportMap,
    }

    #[async_trait]
    impl MetricsPlugin for StaticPlugin {
        fn name(&self) -> &str {
            "static"
        }

        fn graph_definition(&self) -> GraphDefinition {
            self.graphs.clone()
        }

        async fn fetch_metrics(&self) -> ReportMap {
            self.report.clone()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn plugin() -> StaticPlugin {
        let specs = vec![
            MetricSpec::new("ConnectionBpsEgress", "dcon.bpsegress", Unit::Float, Aggregation::Average),
            MetricSpec::new("ConnectionBpsIngress", "dcon.bpsingress", Unit::Float, Aggregation::Average),
        ];
        let resources = vec!["dxcon-a".to_string(), "dxcon-b".to_string()];
        let mut report = ReportMap::new();
        report.insert("ConnectionBpsEgress_dxcon-a".into(), 42.5);
        report.insert("ConnectionBpsIngress_dxcon-b".into(), 7.0);
        StaticPlugin {
            graphs: graph_definition(&specs, &resources, KeyConvention::LabelResource),
            report,
        }
    }

    #[test]
    fn test_output_values_only_sampled_series() {
        let p = plugin();
        let mut out = Vec::new();
        output_values(&p.graphs, &p.report, now(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let epoch = now().timestamp();
        assert_eq!(
            text,
            format!(
                "dcon.bpsegress.ConnectionBpsEgress_dxcon-a\t42.500000\t{epoch}\n\
                 dcon.bpsingress.ConnectionBpsIngress_dxcon-b\t7.000000\t{epoch}\n"
            )
        );
    }

    #[test]
    fn test_output_values_skips_non_finite() {
        let mut p = plugin();
        p.report.insert("ConnectionBpsEgress_dxcon-a".into(), f64::NAN);
        p.report.insert("ConnectionBpsEgress_dxcon-b".into(), f64::INFINITY);
        let mut out = Vec::new();
        output_values(&p.graphs, &p.report, now(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            format!(
                "dcon.bpsingress.ConnectionBpsIngress_dxcon-b\t7.000000\t{}\n",
                now().timestamp()
            )
        );
    }

    #[test]
    fn test_output_definitions_adds_custom_prefix() {
        let p = plugin();
        let mut out = Vec::new();
        output_definitions(&p.graphs, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(META_HEADER));

        let meta: Value = serde_json::from_str(lines.next().unwrap()).unwrap();
        let graph = &meta["graphs"]["custom.dcon.bpsegress"];
        assert_eq!(graph["label"], "ConnectionBpsEgress");
        assert_eq!(graph["unit"], "float");
        assert_eq!(graph["metrics"][1]["name"], "ConnectionBpsEgress_dxcon-b");
        assert_eq!(graph["metrics"][1]["label"], "dxcon-b");
        assert_eq!(graph["metrics"][1]["stacked"], false);
    }

    #[tokio::test]
    async fn test_values_run_writes_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("mackerel-plugin-test");
        let reporter = Reporter::new(marker.clone());
        let mut out = Vec::new();

        reporter.run(&plugin(), Mode::Values, now(), &mut out).await.unwrap();

        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
        let saved: Value = serde_json::from_slice(&std::fs::read(&marker).unwrap()).unwrap();
        assert_eq!(saved[LAST_TIME_KEY], now().timestamp());
        assert_eq!(saved["ConnectionBpsEgress_dxcon-a"], 42.5);
        assert!(!dir.path().join("mackerel-plugin-test.tmp").exists());
    }

    #[tokio::test]
    async fn test_definitions_run_skips_fetch_and_marker() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let reporter = Reporter::new(marker.clone());
        let mut out = Vec::new();

        reporter.run(&plugin(), Mode::Definitions, now(), &mut out).await.unwrap();

        assert!(String::from_utf8(out).unwrap().starts_with(META_HEADER));
        assert!(!marker.exists());
    }

    #[test]
    fn test_marker_write_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Reporter::new(dir.path().join("missing-dir").join("marker"));
        let err = reporter.save_marker(&ReportMap::new(), now()).unwrap_err();
        assert!(matches!(err, ReportError::Marker { .. }));
    }
}
