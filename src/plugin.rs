use crate::clock::Clock;
use crate::cloudwatch::MonitoringApi;
use crate::collectors::discovery::ResourceDiscoverer;
use crate::collectors::sampler::MetricSampler;
use crate::collectors::{MetricsPlugin, ReportMap, Resource};
use crate::config::PluginDefinition;
use crate::errors::DiscoveryError;
use crate::graph::{self, GraphDefinition};
use async_trait::async_trait;
use std::time::Instant;
use tracing::info;

/// One plugin for every CloudWatch variant; the definition decides the
/// namespace, the dimension and the metrics.
pub struct CloudWatchPlugin<A> {
    definition: PluginDefinition,
    api: A,
    clock: Box<dyn Clock>,
    resources: Vec<Resource>,
    concurrency: usize,
}

impl<A: MonitoringApi> CloudWatchPlugin<A> {
    /// Discover this run's resources. Fails if the catalog cannot be read.
    pub async fn prepare(
        definition: PluginDefinition,
        api: A,
        clock: Box<dyn Clock>,
    ) -> Result<Self, DiscoveryError> {
        let resources = ResourceDiscoverer::new(&api)
            .discover(
                &definition.namespace,
                &definition.dimension_name,
                &definition.liveness_metric,
            )
            .await?;

        Ok(Self {
            definition,
            api,
            clock,
            resources,
            concurrency: 1,
        })
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn api(&self) -> &A {
        &self.api
    }
}

#[async_trait]
impl<A: MonitoringApi> MetricsPlugin for CloudWatchPlugin<A> {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn graph_definition(&self) -> GraphDefinition {
        let graphs = graph::graph_definition(
            &self.definition.metrics,
            &self.resources,
            self.definition.key_convention,
        );
        match self.definition.key_prefix.as_deref() {
            Some(prefix) => graphs
                .into_iter()
                .map(|(key, graph)| (format!("{prefix}.{key}"), graph))
                .collect(),
            None => graphs,
        }
    }

    async fn fetch_metrics(&self) -> ReportMap {
        let started = Instant::now();
        let report = MetricSampler::new(&self.api, self.clock.as_ref(), self.definition.key_convention)
            .with_concurrency(self.concurrency)
            .sample(
                &self.resources,
                &self.definition.metrics,
                &self.definition.namespace,
                &self.definition.dimension_name,
            )
            .await;

        info!(
            plugin = %self.definition.name,
            resources = self.resources.len(),
            sampled = report.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched metrics"
        );
        report
    }
}
