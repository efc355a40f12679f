use super::Resource;
use crate::cloudwatch::{CatalogEntry, CatalogQuery, MonitoringApi};
use crate::errors::DiscoveryError;
use tracing::{debug, info};

/// Finds the resources to sample: every value of one dimension that appears
/// alongside a liveness metric in a namespace.
pub struct ResourceDiscoverer<'a> {
    api: &'a dyn MonitoringApi,
}

impl<'a> ResourceDiscoverer<'a> {
    pub fn new(api: &'a dyn MonitoringApi) -> Self {
        Self { api }
    }

    /// Resources in catalog order. Duplicates are kept as returned.
    pub async fn discover(
        &self,
        namespace: &str,
        dimension_name: &str,
        liveness_metric: &str,
    ) -> Result<Vec<Resource>, DiscoveryError> {
        let query = CatalogQuery {
            namespace: namespace.to_string(),
            metric_name: liveness_metric.to_string(),
            dimension_name: dimension_name.to_string(),
        };

        let entries = self
            .api
            .list_metrics(&query)
            .await
            .map_err(|source| DiscoveryError::CatalogQuery {
                namespace: namespace.to_string(),
                dimension: dimension_name.to_string(),
                metric: liveness_metric.to_string(),
                source,
            })?;

        let total = entries.len();
        let resources: Vec<Resource> = entries
            .iter()
            .filter_map(|entry| Self::resource_of(entry, dimension_name))
            .collect();

        info!(
            namespace,
            dimension = dimension_name,
            found = resources.len(),
            discarded = total - resources.len(),
            "discovered resources"
        );
        Ok(resources)
    }

    /// Only series dimensioned by exactly the configured dimension count;
    /// multi-dimensional series would be ambiguous.
    fn resource_of(entry: &CatalogEntry, dimension_name: &str) -> Option<Resource> {
        match entry.dimensions.as_slice() {
            [only] if only.name == dimension_name => Some(only.value.clone()),
            dims => {
                debug!(
                    metric = %entry.metric_name,
                    dimensions = dims.len(),
                    "skipping catalog entry"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudwatch::fake::FakeMonitoringApi;
    use crate::cloudwatch::Dimension;
    use crate::errors::ApiError;

    fn entry(dims: &[(&str, &str)]) -> CatalogEntry {
        CatalogEntry {
            namespace: "AWS/DX".into(),
            metric_name: "ConnectionState".into(),
            dimensions: dims.iter().map(|(n, v)| Dimension::new(*n, *v)).collect(),
        }
    }

    #[tokio::test]
    async fn test_discover_filters_and_keeps_order() {
        let api = FakeMonitoringApi::new().with_catalog(vec![
            entry(&[("ConnectionId", "dxcon-b")]),
            entry(&[("ConnectionId", "dxcon-x"), ("Region", "us-east-1")]),
            entry(&[("OpticalLaneNumber", "1")]),
            entry(&[("ConnectionId", "dxcon-y"), ("OpticalLaneNumber", "2")]),
            entry(&[("ConnectionId", "dxcon-a")]),
        ]);

        let resources = ResourceDiscoverer::new(&api)
            .discover("AWS/DX", "ConnectionId", "ConnectionState")
            .await
            .unwrap();

        assert_eq!(resources, vec!["dxcon-b".to_string(), "dxcon-a".to_string()]);
    }

    #[tokio::test]
    async fn test_discover_passes_query_through() {
        let api = FakeMonitoringApi::new();
        ResourceDiscoverer::new(&api)
            .discover("AWS/NATGateway", "NatGatewayId", "ActiveConnectionCount")
            .await
            .unwrap();

        let queries = api.catalog_queries();
        assert_eq!(queries.len(), 1);
        assert_eq!(queries[0].namespace, "AWS/NATGateway");
        assert_eq!(queries[0].dimension_name, "NatGatewayId");
        assert_eq!(queries[0].metric_name, "ActiveConnectionCount");
    }

    #[tokio::test]
    async fn test_empty_catalog_is_not_an_error() {
        let api = FakeMonitoringApi::new().with_catalog(vec![]);
        let resources = ResourceDiscoverer::new(&api)
            .discover("AWS/DX", "ConnectionId", "ConnectionState")
            .await
            .unwrap();
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn test_dimensionless_entry_is_discarded() {
        let api = FakeMonitoringApi::new()
            .with_catalog(vec![entry(&[]), entry(&[("ConnectionId", "dxcon-1")])]);
        let resources = ResourceDiscoverer::new(&api)
            .discover("AWS/DX", "ConnectionId", "ConnectionState")
            .await
            .unwrap();
        assert_eq!(resources, vec!["dxcon-1".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicates_are_kept() {
        let api = FakeMonitoringApi::new().with_catalog(vec![
            entry(&[("ConnectionId", "dxcon-1")]),
            entry(&[("ConnectionId", "dxcon-1")]),
        ]);
        let resources = ResourceDiscoverer::new(&api)
            .discover("AWS/DX", "ConnectionId", "ConnectionState")
            .await
            .unwrap();
        assert_eq!(resources.len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fatal() {
        let api = FakeMonitoringApi::new().with_catalog_error(ApiError::Request {
            operation: "ListMetrics".into(),
            message: "AccessDenied".into(),
        });
        let err = ResourceDiscoverer::new(&api)
            .discover("AWS/DX", "ConnectionId", "ConnectionState")
            .await
            .unwrap_err();
        match err {
            DiscoveryError::CatalogQuery { namespace, source, .. } => {
                assert_eq!(namespace, "AWS/DX");
                assert!(matches!(source, ApiError::Request { .. }));
            }
        }
    }
}
