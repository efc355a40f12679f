pub mod discovery;
pub mod sampler;

use crate::graph::GraphDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the reporting side needs from a plugin: a schema to render graphs
/// with, and the current values.
#[async_trait]
pub trait MetricsPlugin: Send + Sync {
    /// name of the plugin as used for the default marker path
    fn name(&self) -> &str;

    /// graph schema for the resources known to this run.
    fn graph_definition(&self) -> GraphDefinition;

    /// gather the latest values. Never fails as a whole.
    async fn fetch_metrics(&self) -> ReportMap;
}

/// Opaque resource identifier, the value of the configured dimension.
pub type Resource = String;

/// Flat sample key -> latest value, rebuilt on every run.
pub type ReportMap = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Float,
    Integer,
}

impl Unit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Float => "float",
            Unit::Integer => "integer",
        }
    }
}

/// Statistic requested from the upstream API for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Average,
    Sum,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Sum => "Sum",
        }
    }
}

/// A logical metric: which upstream series to read and how to show it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    /// upstream metric name, e.g. `ConnectionBpsEgress`
    pub key: String,
    /// display label; also the prefix of sample keys under
    /// [`KeyConvention::LabelResource`]
    pub label: String,
    /// graph key this metric is rendered under, e.g. `dcon.bpsegress`
    pub group: String,
    pub unit: Unit,
    pub aggregation: Aggregation,
}

impl MetricSpec {
    pub fn new(key: &str, group: &str, unit: Unit, aggregation: Aggregation) -> Self {
        Self {
            key: key.to_string(),
            label: key.to_string(),
            group: group.to_string(),
            unit,
            aggregation,
        }
    }
}

/// How a (metric, resource) pair is flattened into a report key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyConvention {
    /// `label + "_" + resource`
    #[default]
    LabelResource,
    /// `resource + "." + key`
    ResourceMetric,
}

impl KeyConvention {
    pub fn sample_key(&self, spec: &MetricSpec, resource: &str) -> String {
        match self {
            KeyConvention::LabelResource => format!("{}_{}", spec.label, resource),
            KeyConvention::ResourceMetric => format!("{}.{}", resource, spec.key),
        }
    }
}
