pub mod aws;
pub mod fake;

use crate::collectors::Aggregation;
use crate::errors::ApiError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

/// The two read-only calls the plugin makes against the monitoring API.
///
/// Neither call is retried here; retry and timeout policy belong to the
/// transport behind the implementation.
#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// List catalog entries for one metric name in a namespace, restricted
    /// to series that carry (at least) the given dimension name.
    async fn list_metrics(&self, query: &CatalogQuery) -> Result<Vec<CatalogEntry>, ApiError>;

    /// Fetch aggregated data points for a single series.
    async fn get_statistics(&self, query: &StatisticsQuery) -> Result<Vec<Datapoint>, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub name: String,
    pub value: String,
}

impl Dimension {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One metric series known to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimension_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsQuery {
    pub namespace: String,
    pub metric_name: String,
    pub dimensions: Vec<Dimension>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: i32,
    pub statistic: Aggregation,
}

/// Trailing window covered by every statistics query.
pub const LOOKBACK_SECS: i64 = 120;

/// Granularity of returned points.
pub const PERIOD_SECS: i32 = 60;

impl StatisticsQuery {
    /// Query for the last [`LOOKBACK_SECS`] ending at `now`, one point per
    /// [`PERIOD_SECS`]. Two periods are covered so that one late upstream
    /// period still leaves a point to report.
    pub fn trailing(
        namespace: &str,
        metric_name: &str,
        dimension: Dimension,
        statistic: Aggregation,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            metric_name: metric_name.to_string(),
            dimensions: vec![dimension],
            start: now - Duration::seconds(LOOKBACK_SECS),
            end: now,
            period_secs: PERIOD_SECS,
            statistic,
        }
    }
}

/// One aggregated point. Only the statistics that were requested are
/// populated by the upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub average: Option<f64>,
    pub sum: Option<f64>,
}

impl Datapoint {
    pub fn statistic(&self, aggregation: Aggregation) -> Option<f64> {
        match aggregation {
            Aggregation::Average => self.average,
            Aggregation::Sum => self.sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trailing_window_is_two_periods() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let q = StatisticsQuery::trailing(
            "AWS/DX",
            "ConnectionBpsEgress",
            Dimension::new("ConnectionId", "dxcon-ff"),
            Aggregation::Average,
            now,
        );
        assert_eq!(q.end, now);
        assert_eq!((q.end - q.start).num_seconds(), 120);
        assert_eq!(q.period_secs, 60);
        assert_eq!(q.namespace, "AWS/DX");
        assert_eq!(q.dimensions, vec![Dimension::new("ConnectionId", "dxcon-ff")]);
    }

    #[test]
    fn test_statistic_reads_matching_field() {
        let dp = Datapoint {
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            average: Some(1.5),
            sum: Some(9.0),
        };
        assert_eq!(dp.statistic(Aggregation::Average), Some(1.5));
        assert_eq!(dp.statistic(Aggregation::Sum), Some(9.0));
    }
}
