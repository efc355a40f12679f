//! Graph schema handed to the reporting side.
//!
//! Derived from the metric specs and the resources discovered in this run,
//! so its shape follows the resource set and may differ between runs.

use crate::collectors::{KeyConvention, MetricSpec, Resource};
use serde::Serialize;
use std::collections::BTreeMap;

/// Graph key -> graph.
pub type GraphDefinition = BTreeMap<String, Graph>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Graph {
    pub label: String,
    pub unit: String,
    pub metrics: Vec<GraphMetric>,
}

/// One series of a graph; `name` is the report key it reads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphMetric {
    pub name: String,
    pub label: String,
    pub stacked: bool,
}

/// One graph per metric spec, one series per resource.
pub fn graph_definition(
    metrics: &[MetricSpec],
    resources: &[Resource],
    key_convention: KeyConvention,
) -> GraphDefinition {
    metrics
        .iter()
        .map(|spec| {
            let series = resources
                .iter()
                .map(|resource| GraphMetric {
                    name: key_convention.sample_key(spec, resource),
                    label: resource.clone(),
                    stacked: false,
                })
                .collect();
            (
                spec.group.clone(),
                Graph {
                    label: spec.label.clone(),
                    unit: spec.unit.as_str().to_string(),
                    metrics: series,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{Aggregation, Unit};

    fn specs() -> Vec<MetricSpec> {
        vec![
            MetricSpec::new("ConnectionBpsEgress", "dcon.bpsegress", Unit::Float, Aggregation::Average),
            MetricSpec::new("ConnectionCRCErrorCount", "dcon.crcerror", Unit::Integer, Aggregation::Average),
        ]
    }

    #[test]
    fn test_one_graph_per_metric_one_series_per_resource() {
        let resources = vec!["dxcon-a".to_string(), "dxcon-b".to_string()];
        let def = graph_definition(&specs(), &resources, KeyConvention::LabelResource);

        assert_eq!(def.len(), 2);
        let egress = &def["dcon.bpsegress"];
        assert_eq!(egress.label, "ConnectionBpsEgress");
        assert_eq!(egress.unit, "float");
        let names: Vec<_> = egress.metrics.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["ConnectionBpsEgress_dxcon-a", "ConnectionBpsEgress_dxcon-b"]);
        assert_eq!(egress.metrics[1].label, "dxcon-b");
        assert_eq!(def["dcon.crcerror"].unit, "integer");
    }

    #[test]
    fn test_no_resources_gives_empty_graphs() {
        let def = graph_definition(&specs(), &[], KeyConvention::LabelResource);
        assert_eq!(def.len(), 2);
        assert!(def.values().all(|g| g.metrics.is_empty()));
    }

    #[test]
    fn test_series_names_follow_key_convention() {
        let resources = vec!["us-east-1a".to_string()];
        let def = graph_definition(&specs(), &resources, KeyConvention::ResourceMetric);
        assert_eq!(def["dcon.bpsegress"].metrics[0].name, "us-east-1a.ConnectionBpsEgress");
    }
}
