use thiserror::Error;

//create types errors for easy testability

/// Failure of one remote call against the monitoring API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("{operation} request failed: {message}")]
    Request { operation: String, message: String },

    #[error("malformed {operation} response: {detail}")]
    MalformedResponse { operation: String, detail: String },
}

/// Fatal: without a resource list there is nothing meaningful to report.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("failed to list {metric} in {namespace} by {dimension}: {source}")]
    CatalogQuery {
        namespace: String,
        dimension: String,
        metric: String,
        source: ApiError,
    },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read plugin definition {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse plugin definition {path}: {source}")]
    ParseError {
        path: String,
        source: toml::de::Error,
    },

    #[error("unknown preset {name:?} (available: {available})")]
    UnknownPreset { name: String, available: String },

    #[error("invalid plugin definition: {field} {reason}")]
    Invalid { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to write plugin output: {0}")]
    Output(#[from] std::io::Error),

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to write marker {path}: {source}")]
    Marker {
        path: String,
        source: std::io::Error,
    },
}

/// Why one (resource, metric) sample was left out of the report.
///
/// Recoverable by construction: the sampler logs it and moves on.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleSkip {
    QueryFailed(ApiError),
    NoDatapoints,
    MissingStatistic { statistic: &'static str },
}

impl std::fmt::Display for SampleSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleSkip::QueryFailed(e) => write!(f, "query failed: {e}"),
            SampleSkip::NoDatapoints => f.write_str("fetched no datapoints"),
            SampleSkip::MissingStatistic { statistic } => {
                write!(f, "latest datapoint carries no {statistic} value")
            }
        }
    }
}
