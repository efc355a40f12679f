//! [`MonitoringApi`] over the AWS CloudWatch SDK.
//!
//! Region and credentials resolve through plain ordered fallbacks:
//! explicit flag first, then whatever the SDK's default chain finds
//! (environment, shared profile, instance metadata).

use super::{CatalogEntry, CatalogQuery, Datapoint, Dimension, MonitoringApi, StatisticsQuery};
use crate::collectors::Aggregation;
use crate::errors::ApiError;
use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_cloudwatch::config::{Credentials, Region};
use aws_sdk_cloudwatch::error::DisplayErrorContext;
use aws_sdk_cloudwatch::primitives::DateTime as AwsDateTime;
use aws_sdk_cloudwatch::types::{self as cw, DimensionFilter, Statistic};
use aws_sdk_cloudwatch::Client;
use chrono::{DateTime, Utc};
use tracing::debug;

const LIST_METRICS: &str = "ListMetrics";
const GET_METRIC_STATISTICS: &str = "GetMetricStatistics";

/// Connection settings as given on the command line. Empty strings count
/// as absent.
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl AwsSettings {
    pub fn explicit_region(&self) -> Option<Region> {
        non_empty(&self.region).map(|r| Region::new(r.to_string()))
    }

    /// Static keys are only used when both halves of the pair are present.
    pub fn static_credentials(&self) -> Option<Credentials> {
        match (non_empty(&self.access_key_id), non_empty(&self.secret_access_key)) {
            (Some(id), Some(secret)) => Some(Credentials::new(
                id.to_string(),
                secret.to_string(),
                None,
                None,
                "mackerel-cloudwatch-plugin",
            )),
            _ => None,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

pub struct CloudWatchApi {
    client: Client,
}

impl CloudWatchApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn connect(settings: &AwsSettings) -> Self {
        let region = RegionProviderChain::first_try(settings.explicit_region()).or_default_provider();
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(region);
        if let Some(credentials) = settings.static_credentials() {
            debug!("using static credentials from flags");
            loader = loader.credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;
        debug!(region = ?sdk_config.region(), "cloudwatch client configured");
        Self::new(Client::new(&sdk_config))
    }
}

#[async_trait]
impl MonitoringApi for CloudWatchApi {
    async fn list_metrics(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, ApiError> {
        let mut entries = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let output = self
                .client
                .list_metrics()
                .namespace(&query.namespace)
                .metric_name(&query.metric_name)
                .dimensions(DimensionFilter::builder().name(&query.dimension_name).build())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| request_error(LIST_METRICS, e))?;

            for metric in output.metrics() {
                entries.push(convert_metric(metric)?);
            }

            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn get_statistics(&self, query: &StatisticsQuery) -> Result<Vec<Datapoint>, ApiError> {
        let mut request = self
            .client
            .get_metric_statistics()
            .namespace(&query.namespace)
            .metric_name(&query.metric_name)
            .start_time(to_aws_time(query.start))
            .end_time(to_aws_time(query.end))
            .period(query.period_secs)
            .statistics(to_statistic(query.statistic));
        for d in &query.dimensions {
            request = request.dimensions(cw::Dimension::builder().name(&d.name).value(&d.value).build());
        }

        let output = request
            .send()
            .await
            .map_err(|e| request_error(GET_METRIC_STATISTICS, e))?;

        output.datapoints().iter().map(convert_datapoint).collect()
    }
}

fn request_error<E: std::error::Error>(operation: &str, err: E) -> ApiError {
    ApiError::Request {
        operation: operation.to_string(),
        message: DisplayErrorContext(err).to_string(),
    }
}

fn malformed(operation: &str, detail: impl Into<String>) -> ApiError {
    ApiError::MalformedResponse {
        operation: operation.to_string(),
        detail: detail.into(),
    }
}

fn to_statistic(aggregation: Aggregation) -> Statistic {
    match aggregation {
        Aggregation::Average => Statistic::Average,
        Aggregation::Sum => Statistic::Sum,
    }
}

fn to_aws_time(t: DateTime<Utc>) -> AwsDateTime {
    AwsDateTime::from_secs_and_nanos(t.timestamp(), t.timestamp_subsec_nanos())
}

fn from_aws_time(t: &AwsDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(t.secs(), t.subsec_nanos())
}

fn convert_metric(metric: &cw::Metric) -> Result<CatalogEntry, ApiError> {
    let dimensions = metric
        .dimensions()
        .iter()
        .map(|d| match (d.name(), d.value()) {
            (Some(name), Some(value)) => Ok(Dimension::new(name, value)),
            _ => Err(malformed(LIST_METRICS, "dimension without name or value")),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CatalogEntry {
        namespace: metric.namespace().unwrap_or_default().to_string(),
        metric_name: metric.metric_name().unwrap_or_default().to_string(),
        dimensions,
    })
}

fn convert_datapoint(dp: &cw::Datapoint) -> Result<Datapoint, ApiError> {
    let timestamp = dp
        .timestamp()
        .and_then(from_aws_time)
        .ok_or_else(|| malformed(GET_METRIC_STATISTICS, "datapoint without valid timestamp"))?;

    Ok(Datapoint {
        timestamp,
        average: dp.average(),
        sum: dp.sum(),
    })
}
