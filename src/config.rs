use crate::cloudwatch::aws::AwsSettings;
use crate::collectors::{Aggregation, KeyConvention, MetricSpec, Unit};
use crate::errors::ConfigError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug, Clone)]
#[command(name = "mackerel-cloudwatch-plugin", version, about)]
pub struct Config {
    /// AWS region. When omitted the SDK default chain decides
    /// (environment, profile, instance metadata).
    #[arg(long, env = "MACKEREL_CW_REGION")]
    pub region: Option<String>,

    /// AWS access key id. Used only together with --secret-access-key.
    #[arg(long, env = "MACKEREL_CW_ACCESS_KEY_ID")]
    pub access_key_id: Option<String>,

    /// AWS secret access key.
    #[arg(long, env = "MACKEREL_CW_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Last-run marker file.
    /// if none provided, default to <tmpdir>/mackerel-plugin-<name>.
    #[arg(long)]
    pub tempfile: Option<PathBuf>,

    /// Built-in plugin variant.
    #[arg(long, default_value = "dx")]
    pub preset: String,

    /// TOML plugin definition; takes precedence over --preset.
    #[arg(long, env = "MACKEREL_CW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Prefix put in front of every graph key.
    #[arg(long)]
    pub metric_key_prefix: Option<String>,

    /// Statistics queries in flight at once (1 = strictly sequential).
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub concurrency: u16,

    /// Enable JSON structured logging.
    #[arg(long, env = "MACKEREL_CW_JSON_LOGS", default_value_t = false)]
    pub json_logs: bool,
}

impl Config {
    pub fn aws_settings(&self) -> AwsSettings {
        AwsSettings {
            region: self.region.clone(),
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
        }
    }

    /// Definition from --config if given, otherwise the named preset, with
    /// --metric-key-prefix applied.
    pub fn plugin_definition(&self) -> Result<PluginDefinition, ConfigError> {
        let mut definition = match &self.config {
            Some(path) => PluginDefinition::load(path)?,
            None => PluginDefinition::preset(&self.preset)?,
        };
        if let Some(prefix) = self.metric_key_prefix.as_deref().filter(|p| !p.is_empty()) {
            definition.key_prefix = Some(prefix.to_string());
        }
        definition.validate()?;
        Ok(definition)
    }

    pub fn resolved_tempfile(&self, plugin_name: &str) -> PathBuf {
        self.tempfile
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("mackerel-plugin-{plugin_name}")))
    }
}

/// Everything that distinguishes one plugin variant from another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDefinition {
    pub name: String,
    pub namespace: String,
    pub dimension_name: String,
    pub liveness_metric: String,
    #[serde(default)]
    pub key_convention: KeyConvention,
    #[serde(default)]
    pub key_prefix: Option<String>,
    pub metrics: Vec<MetricSpec>,
}

pub const PRESETS: &[&str] = &["dx", "natgateway", "ec2-az"];

impl PluginDefinition {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let s = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::load_from_str(&s, &path.display().to_string())
    }

    /// Parse and validate a definition (e.g. for tests).
    pub fn load_from_str(s: &str, origin: &str) -> Result<Self, ConfigError> {
        let definition: PluginDefinition = toml::from_str(s).map_err(|e| ConfigError::ParseError {
            path: origin.to_string(),
            source: e,
        })?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        match name {
            "dx" => Ok(Self::direct_connect()),
            "natgateway" => Ok(Self::nat_gateway()),
            "ec2-az" => Ok(Self::ec2_availability_zone()),
            other => Err(ConfigError::UnknownPreset {
                name: other.to_string(),
                available: PRESETS.join(", "),
            }),
        }
    }

    fn direct_connect() -> Self {
        Self {
            name: "aws-dx".into(),
            namespace: "AWS/DX".into(),
            dimension_name: "ConnectionId".into(),
            liveness_metric: "ConnectionState".into(),
            key_convention: KeyConvention::LabelResource,
            key_prefix: None,
            metrics: vec![
                MetricSpec::new("ConnectionBpsEgress", "dcon.bpsegress", Unit::Float, Aggregation::Average),
                MetricSpec::new("ConnectionBpsIngress", "dcon.bpsingress", Unit::Float, Aggregation::Average),
                MetricSpec::new("ConnectionCRCErrorCount", "dcon.crcerror", Unit::Integer, Aggregation::Average),
            ],
        }
    }

    fn nat_gateway() -> Self {
        Self {
            name: "aws-natgateway".into(),
            namespace: "AWS/NATGateway".into(),
            dimension_name: "NatGatewayId".into(),
            liveness_metric: "ActiveConnectionCount".into(),
            key_convention: KeyConvention::LabelResource,
            key_prefix: None,
            metrics: vec![
                MetricSpec::new("ActiveConnectionCount", "natgw.connections", Unit::Integer, Aggregation::Average),
                MetricSpec::new("BytesOutToDestination", "natgw.bytesout", Unit::Integer, Aggregation::Sum),
                MetricSpec::new("BytesInFromDestination", "natgw.bytesin", Unit::Integer, Aggregation::Sum),
                MetricSpec::new("ErrorPortAllocation", "natgw.porterror", Unit::Integer, Aggregation::Sum),
            ],
        }
    }

    fn ec2_availability_zone() -> Self {
        Self {
            name: "aws-ec2-az".into(),
            namespace: "AWS/EC2".into(),
            dimension_name: "AvailabilityZone".into(),
            liveness_metric: "CPUUtilization".into(),
            key_convention: KeyConvention::ResourceMetric,
            key_prefix: None,
            metrics: vec![
                MetricSpec::new("CPUUtilization", "az.cpu", Unit::Float, Aggregation::Average),
                MetricSpec::new("NetworkIn", "az.networkin", Unit::Integer, Aggregation::Sum),
                MetricSpec::new("NetworkOut", "az.networkout", Unit::Integer, Aggregation::Sum),
            ],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("name", &self.name),
            ("namespace", &self.namespace),
            ("dimension_name", &self.dimension_name),
            ("liveness_metric", &self.liveness_metric),
        ] {
            ensure(!value.is_empty(), field, "must be non-empty")?;
        }
        ensure(!self.metrics.is_empty(), "metrics", "must list at least one metric")?;
        if let Some(prefix) = &self.key_prefix {
            ensure(is_graph_key(prefix), "key_prefix", "may only contain [A-Za-z0-9._-]")?;
        }

        let mut keys = HashSet::new();
        let mut groups = HashSet::new();
        for spec in &self.metrics {
            ensure(!spec.key.is_empty(), "metrics.key", "must be non-empty")?;
            ensure(!spec.label.is_empty(), "metrics.label", "must be non-empty")?;
            ensure(is_graph_key(&spec.group), "metrics.group", "may only contain [A-Za-z0-9._-]")?;
            ensure(keys.insert(spec.key.as_str()), "metrics.key", "must be unique")?;
            ensure(groups.insert(spec.group.as_str()), "metrics.group", "must be unique")?;
        }
        Ok(())
    }
}

fn ensure(cond: bool, field: &str, reason: &str) -> Result<(), ConfigError> {
    if cond {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: reason.to_string(),
        })
    }
}

fn is_graph_key(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
