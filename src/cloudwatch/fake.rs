use super::{CatalogEntry, CatalogQuery, Datapoint, MonitoringApi, StatisticsQuery};
use crate::errors::ApiError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory monitoring API with scripted responses.
///
/// Statistics are keyed by `(metric name, first dimension value)`. Series
/// without a scripted response return no data points. Every query is
/// recorded so tests can assert on windows, namespaces and call order.
#[derive(Default)]
pub struct FakeMonitoringApi {
    catalog: Option<Result<Vec<CatalogEntry>, ApiError>>,
    statistics: HashMap<(String, String), Result<Vec<Datapoint>, ApiError>>,
    catalog_queries: Mutex<Vec<CatalogQuery>>,
    statistics_queries: Mutex<Vec<StatisticsQuery>>,
}

impl FakeMonitoringApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, entries: Vec<CatalogEntry>) -> Self {
        self.catalog = Some(Ok(entries));
        self
    }

    pub fn with_catalog_error(mut self, err: ApiError) -> Self {
        self.catalog = Some(Err(err));
        self
    }

    pub fn with_datapoints(mut self, metric: &str, resource: &str, points: Vec<Datapoint>) -> Self {
        self.statistics
            .insert((metric.to_string(), resource.to_string()), Ok(points));
        self
    }

    pub fn with_statistics_error(mut self, metric: &str, resource: &str, err: ApiError) -> Self {
        self.statistics
            .insert((metric.to_string(), resource.to_string()), Err(err));
        self
    }

    pub fn catalog_queries(&self) -> Vec<CatalogQuery> {
        self.catalog_queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }

    pub fn statistics_queries(&self) -> Vec<StatisticsQuery> {
        self.statistics_queries
            .lock()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MonitoringApi for FakeMonitoringApi {
    async fn list_metrics(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, ApiError> {
        if let Ok(mut seen) = self.catalog_queries.lock() {
            seen.push(query.clone());
        }
        self.catalog.clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn get_statistics(&self, query: &StatisticsQuery) -> Result<Vec<Datapoint>, ApiError> {
        if let Ok(mut seen) = self.statistics_queries.lock() {
            seen.push(query.clone());
        }
        let resource = query
            .dimensions
            .first()
            .map(|d| d.value.clone())
            .unwrap_or_default();
        self.statistics
            .get(&(query.metric_name.clone(), resource))
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
