use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Fields shared by every role of the cluster.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    /// Number of pods. Defaults to 1.
    pub replicas: Option<i32>,
    /// Overrides the cluster image for this role.
    pub image: Option<String>,
    /// Raw TOML merged into the generated configuration file.
    pub config: Option<String>,
    /// Overrides the cluster logging options for this role.
    pub logging: Option<LoggingSpec>,
    /// Extra arguments appended to the generated command line.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl ComponentSpec {
    pub fn replicas(&self) -> i32 {
        self.replicas.unwrap_or(1)
    }

    pub fn config(&self) -> Option<&str> {
        self.config.as_deref().filter(|c| !c.is_empty())
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl LoggingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoggingLevel::Error => "error",
            LoggingLevel::Warn => "warn",
            LoggingLevel::Info => "info",
            LoggingLevel::Debug => "debug",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoggingSpec {
    #[serde(default)]
    pub level: LoggingLevel,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    /// When true no log files are written and `logging.dir` is omitted.
    #[serde(default)]
    pub only_log_to_stdout: bool,
    /// Per-module overrides such as `mito2=debug`.
    #[serde(default)]
    pub filters: Vec<String>,
    #[serde(default)]
    pub format: LogFormat,
    pub slow_query: Option<SlowQuery>,
}

fn default_logs_dir() -> String {
    "/data/greptimedb/logs".to_string()
}

impl Default for LoggingSpec {
    fn default() -> Self {
        Self {
            level: LoggingLevel::default(),
            logs_dir: default_logs_dir(),
            only_log_to_stdout: false,
            filters: Vec::new(),
            format: LogFormat::default(),
            slow_query: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlowQuery {
    #[serde(default)]
    pub enabled: bool,
    /// Duration string, e.g. `10s`.
    #[serde(default = "default_slow_query_threshold")]
    pub threshold: String,
    /// Decimal string in (0, 1]. Kept as a string so a bad value degrades to 1.0.
    #[serde(default = "default_slow_query_sample_ratio")]
    pub sample_ratio: String,
}

fn default_slow_query_threshold() -> String {
    "10s".to_string()
}

fn default_slow_query_sample_ratio() -> String {
    "1.0".to_string()
}

/// A persistent volume a role mounts. All three fields are required together.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FileStorage {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mount_path: String,
    #[serde(default)]
    pub storage_size: String,
    pub storage_class_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TlsSpec {
    /// Secret holding `tls.crt` and `tls.key`.
    pub secret_name: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusMonitorSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub interval: Option<String>,
}
