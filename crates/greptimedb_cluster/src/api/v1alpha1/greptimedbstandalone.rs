use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ComponentSpec, PrometheusMonitorSpec, TlsSpec};
use super::greptimedbcluster::{default_http_port, default_mysql_port, default_postgresql_port, default_rpc_port};
use super::storage::{ObjectStorageProviderSpec, WalProviderSpec};
use super::*;

/// A single-process GreptimeDB instance. The cluster's monitoring role runs one.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(
    kind = "GreptimeDBStandalone",
    group = "greptime.io",
    version = "v1alpha1",
    namespaced,
    status = "GreptimeDBStandaloneStatus",
    shortname = "gts",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.standalonePhase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GreptimeDBStandaloneSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    pub object_storage: Option<ObjectStorageProviderSpec>,
    pub wal: Option<WalProviderSpec>,
    pub wal_dir: Option<String>,
    pub tls: Option<TlsSpec>,
    pub prometheus_monitor: Option<PrometheusMonitorSpec>,
    #[serde(default = "default_http_port")]
    pub http_port: i32,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: i32,
    #[serde(default = "default_mysql_port")]
    pub mysql_port: i32,
    #[serde(default = "default_postgresql_port", rename = "postgreSQLPort")]
    pub postgresql_port: i32,
}

impl Default for GreptimeDBStandaloneSpec {
    fn default() -> Self {
        Self {
            component: ComponentSpec::default(),
            object_storage: None,
            wal: None,
            wal_dir: None,
            tls: None,
            prometheus_monitor: None,
            http_port: default_http_port(),
            rpc_port: default_rpc_port(),
            mysql_port: default_mysql_port(),
            postgresql_port: default_postgresql_port(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GreptimeDBStandaloneStatus {
    pub standalone_phase: Option<Phase>,
    #[serde(default)]
    #[schemars(schema_with = "conditions_schema")]
    pub conditions: Vec<Condition>,
}

impl GreptimeDBStandalone {
    pub fn phase(&self) -> Option<Phase> {
        self.status.as_ref().and_then(|s| s.standalone_phase)
    }
}
