use super::{Aggregation, KeyConvention, MetricSpec, ReportMap, Resource};
use crate::clock::Clock;
use crate::cloudwatch::{Datapoint, Dimension, MonitoringApi, StatisticsQuery};
use crate::errors::SampleSkip;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

/// Reads the latest statistic of every (resource, metric) pair.
///
/// Failures are isolated per pair: a pair that cannot be sampled is left
/// out of the report and the rest carry on.
pub struct MetricSampler<'a> {
    api: &'a dyn MonitoringApi,
    clock: &'a dyn Clock,
    key_convention: KeyConvention,
    concurrency: usize,
}

impl<'a> MetricSampler<'a> {
    pub fn new(api: &'a dyn MonitoringApi, clock: &'a dyn Clock, key_convention: KeyConvention) -> Self {
        Self {
            api,
            clock,
            key_convention,
            concurrency: 1,
        }
    }

    /// Allow up to `n` statistics queries in flight. 1 (the default) issues
    /// them strictly one after another.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub async fn sample(
        &self,
        resources: &[Resource],
        metrics: &[MetricSpec],
        namespace: &str,
        dimension_name: &str,
    ) -> ReportMap {
        let pairs = resources
            .iter()
            .flat_map(|resource| metrics.iter().map(move |spec| (resource, spec)));

        // `buffered` yields in input order whatever the concurrency, so the
        // first-wins rule on key collisions does not depend on timing.
        // Boxed so the future stays `Send` behind `MetricsPlugin::fetch_metrics`.
        let outcomes: Vec<_> = stream::iter(pairs)
            .map(|(resource, spec)| async move {
                let outcome = self
                    .sample_one(namespace, dimension_name, resource, spec)
                    .await;
                (resource, spec, outcome)
            })
            .boxed()
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut report = ReportMap::new();
        for (resource, spec, outcome) in outcomes {
            match outcome {
                Ok(value) => {
                    let key = self.key_convention.sample_key(spec, resource);
                    if report.contains_key(&key) {
                        warn!(%key, resource = %resource, metric = %spec.key, "sample key collision, keeping first value");
                        continue;
                    }
                    report.insert(key, value);
                }
                Err(SampleSkip::QueryFailed(e)) => {
                    warn!(resource = %resource, metric = %spec.key, error = %e, "skipping sample");
                }
                Err(skip) => {
                    debug!(resource = %resource, metric = %spec.key, reason = %skip, "skipping sample");
                }
            }
        }
        report
    }

    /// One statistics query over the trailing window ending now.
    pub async fn sample_one(
        &self,
        namespace: &str,
        dimension_name: &str,
        resource: &str,
        spec: &MetricSpec,
    ) -> Result<f64, SampleSkip> {
        let query = StatisticsQuery::trailing(
            namespace,
            &spec.key,
            Dimension::new(dimension_name, resource),
            spec.aggregation,
            self.clock.now(),
        );
        let points = self
            .api
            .get_statistics(&query)
            .await
            .map_err(SampleSkip::QueryFailed)?;
        latest_value(&points, spec.aggregation)
    }
}

/// Value of the requested statistic at the newest data point.
///
/// Points sharing the newest timestamp have no defined order upstream;
/// whichever of them comes last in the response wins. That choice is
/// arbitrary and callers must not rely on it.
pub fn latest_value(points: &[Datapoint], aggregation: Aggregation) -> Result<f64, SampleSkip> {
    let latest = points
        .iter()
        .max_by_key(|p| p.timestamp)
        .ok_or(SampleSkip::NoDatapoints)?;

    latest
        .statistic(aggregation)
        .ok_or(SampleSkip::MissingStatistic {
            statistic: aggregation.as_str(),
        })
}
