use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{ComponentSpec, FileStorage, LoggingSpec, PrometheusMonitorSpec, TlsSpec};
use super::greptimedbstandalone::GreptimeDBStandaloneSpec;
use super::storage::{MetaBackend, MetaBackendStorageSpec, ObjectStorageProviderSpec, WalProviderSpec};
use super::*;
use crate::validation::ValidationError;

pub static GREPTIMEDB_CLUSTER_FINALIZER: &str = "greptimedbcluster.greptime.io/finalizer";

/// Setting this annotation to `"true"` moves the cluster back to `Starting`.
pub static RESET_PHASE_ANNOTATION: &str = "greptime.io/reset-phase";

/// Generate the Kubernetes wrapper struct `GreptimeDBCluster` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "GreptimeDBCluster",
    group = "greptime.io",
    version = "v1alpha1",
    namespaced,
    status = "GreptimeDBClusterStatus",
    shortname = "gtc",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.clusterPhase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GreptimeDBClusterSpec {
    /// Image used by every role that does not set its own.
    pub image: Option<String>,
    pub meta: Option<MetaSpec>,
    pub datanode: Option<DatanodeSpec>,
    #[serde(default)]
    pub datanode_groups: Vec<DatanodeSpec>,
    pub frontend: Option<FrontendSpec>,
    #[serde(default)]
    pub frontend_groups: Vec<FrontendSpec>,
    pub flownode: Option<FlownodeSpec>,
    pub object_storage: Option<ObjectStorageProviderSpec>,
    pub wal: Option<WalProviderSpec>,
    pub wal_dir: Option<String>,
    /// Cluster-wide logging defaults. A role's own `logging` replaces it.
    pub logging: Option<LoggingSpec>,
    pub prometheus_monitor: Option<PrometheusMonitorSpec>,
    pub monitoring: Option<MonitoringSpec>,
    #[serde(default = "default_http_port")]
    pub http_port: i32,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: i32,
    #[serde(default = "default_mysql_port")]
    pub mysql_port: i32,
    #[serde(default = "default_postgresql_port", rename = "postgreSQLPort")]
    pub postgresql_port: i32,
}

pub(crate) fn default_http_port() -> i32 {
    DEFAULT_HTTP_PORT
}
pub(crate) fn default_rpc_port() -> i32 {
    DEFAULT_RPC_PORT
}
pub(crate) fn default_mysql_port() -> i32 {
    DEFAULT_MYSQL_PORT
}
pub(crate) fn default_postgresql_port() -> i32 {
    DEFAULT_POSTGRESQL_PORT
}
fn default_meta_rpc_port() -> i32 {
    DEFAULT_META_RPC_PORT
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetaSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default = "default_meta_rpc_port")]
    pub rpc_port: i32,
    #[serde(default = "default_http_port")]
    pub http_port: i32,
    pub backend_storage: Option<MetaBackendStorageSpec>,
    /// Etcd endpoints used when no `backendStorage` is given.
    #[serde(default)]
    pub etcd_endpoints: Vec<String>,
    /// Probe etcd before generating the meta objects.
    #[serde(default)]
    pub enable_check_etcd_service: bool,
    #[serde(default)]
    pub enable_region_failover: bool,
    pub store_key_prefix: Option<String>,
}

impl MetaSpec {
    pub fn backend(&self) -> Result<Option<MetaBackend<'_>>, ValidationError> {
        match &self.backend_storage {
            Some(storage) => storage.backend(),
            None => Ok(None),
        }
    }

    /// Etcd endpoints from the backend selector, falling back to `etcdEndpoints`.
    pub fn etcd_endpoints(&self) -> Vec<String> {
        match self.backend() {
            Ok(Some(MetaBackend::Etcd(etcd))) => etcd.endpoints.clone(),
            _ => self.etcd_endpoints.clone(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatanodeStorageSpec {
    #[serde(default = "default_data_home")]
    pub data_home: String,
    /// Volume claimed per datanode pod and mounted at `dataHome`.
    pub fs: Option<FileStorage>,
}

fn default_data_home() -> String {
    "/data/greptimedb".to_string()
}

impl Default for DatanodeStorageSpec {
    fn default() -> Self {
        Self {
            data_home: default_data_home(),
            fs: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatanodeSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    /// Required inside `datanodeGroups`.
    pub name: Option<String>,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: i32,
    #[serde(default = "default_http_port")]
    pub http_port: i32,
    pub storage: Option<DatanodeStorageSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FrontendSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    /// Required inside `frontendGroups`.
    pub name: Option<String>,
    pub tls: Option<TlsSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlownodeSpec {
    #[serde(flatten)]
    pub component: ComponentSpec,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: i32,
    #[serde(default = "default_http_port")]
    pub http_port: i32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringSpec {
    #[serde(default)]
    pub enabled: bool,
    /// The standalone instance that stores the cluster's own logs and metrics.
    pub standalone: Option<GreptimeDBStandaloneSpec>,
    pub logs_collection: Option<LogsCollectionSpec>,
    /// Vector sidecar shipping every role's logs and metrics to the standalone.
    pub vector: Option<VectorSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VectorSpec {
    #[serde(default = "default_vector_image")]
    pub image: String,
}

impl Default for VectorSpec {
    fn default() -> Self {
        Self {
            image: default_vector_image(),
        }
    }
}

fn default_vector_image() -> String {
    DEFAULT_VECTOR_IMAGE.to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogsCollectionSpec {
    pub pipeline: Option<LogPipeline>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogPipeline {
    /// Pipeline YAML uploaded in place of the built-in definition.
    pub data: Option<String>,
}

/// The status object of `GreptimeDBCluster`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GreptimeDBClusterStatus {
    pub cluster_phase: Option<Phase>,
    #[serde(default)]
    #[schemars(schema_with = "conditions_schema")]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub meta: MetaStatus,
    #[serde(default)]
    pub datanode: ComponentStatus,
    #[serde(default)]
    pub frontend: ComponentStatus,
    #[serde(default)]
    pub flownode: ComponentStatus,
    #[serde(default)]
    pub monitoring: MonitoringStatus,
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    pub replicas: i32,
    pub ready_replicas: i32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetaStatus {
    pub replicas: i32,
    pub ready_replicas: i32,
    #[serde(default)]
    pub etcd_endpoints: Vec<String>,
    #[serde(default)]
    pub maintenance_mode: bool,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
pub struct MonitoringStatus {
    #[serde(rename = "internalDNSName", skip_serializing_if = "Option::is_none")]
    pub internal_dns_name: Option<String>,
}

impl GreptimeDBCluster {
    /// `{cluster}-{role}`, or `{cluster}-{role}-{group}` for a named group.
    pub fn resource_name(&self, role: RoleKind, group: Option<&str>) -> String {
        match group {
            Some(group) => format!("{}-{}-{}", self.name_any(), role, group),
            None => format!("{}-{}", self.name_any(), role),
        }
    }

    pub fn image_for(&self, component: &ComponentSpec) -> String {
        component
            .image
            .clone()
            .or_else(|| self.spec.image.clone())
            .unwrap_or_else(|| DEFAULT_IMAGE.to_string())
    }

    pub fn logging_for<'a>(&'a self, component: &'a ComponentSpec) -> Option<&'a LoggingSpec> {
        component.logging.as_ref().or(self.spec.logging.as_ref())
    }

    pub fn phase(&self) -> Option<Phase> {
        self.status.as_ref().and_then(|s| s.cluster_phase)
    }

    pub fn prometheus_monitor_enabled(&self) -> bool {
        self.spec.prometheus_monitor.as_ref().is_some_and(|p| p.enabled)
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.spec
            .monitoring
            .as_ref()
            .is_some_and(|m| m.enabled && m.standalone.is_some())
    }

    /// The log collector sidecar, when monitoring is on and it is configured.
    pub fn vector(&self) -> Option<&VectorSpec> {
        if !self.monitoring_enabled() {
            return None;
        }
        self.spec.monitoring.as_ref()?.vector.as_ref()
    }

    pub fn vector_config_map_name(&self) -> String {
        format!("{}-vector", self.monitoring_standalone_name())
    }

    pub fn reset_phase_requested(&self) -> bool {
        self.annotations()
            .get(RESET_PHASE_ANNOTATION)
            .is_some_and(|v| v == "true")
    }

    /// Name of the `GreptimeDBStandalone` backing the monitoring role.
    pub fn monitoring_standalone_name(&self) -> String {
        format!("{}-monitor", self.name_any())
    }

    /// In-cluster host of the monitoring standalone service.
    pub fn monitoring_dns_name(&self) -> String {
        format!(
            "{}-{}.{}.svc.cluster.local",
            self.monitoring_standalone_name(),
            RoleKind::Standalone,
            self.namespace().unwrap_or_default()
        )
    }

    pub fn logs_pipeline_name(&self) -> String {
        format!(
            "greptime_logs_pipeline_{}_{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }

    /// Base URL of the meta HTTP admin server.
    pub fn meta_http_url(&self) -> String {
        let port = self.spec.meta.as_ref().map_or(DEFAULT_HTTP_PORT, |m| m.http_port);
        format!(
            "http://{}.{}.svc.cluster.local:{}",
            self.resource_name(RoleKind::Meta, None),
            self.namespace().unwrap_or_default(),
            port
        )
    }

    /// Every secret the cluster references, with the keys each must contain.
    pub fn secret_references(&self) -> Result<Vec<SecretReference>, ValidationError> {
        let namespace = self.namespace().unwrap_or_default();
        let mut refs = Vec::new();

        let frontends = self.spec.frontend.iter().chain(self.spec.frontend_groups.iter());
        for frontend in frontends {
            if let Some(tls) = frontend.tls.as_ref().filter(|t| !t.secret_name.is_empty()) {
                refs.push(SecretReference::new(
                    &namespace,
                    &tls.secret_name,
                    &[TLS_CRT_SECRET_KEY, TLS_KEY_SECRET_KEY],
                ));
            }
        }

        if let Some(storage) = &self.spec.object_storage {
            if let Some(provider) = storage.provider()? {
                refs.extend(provider.secret_ref(&namespace));
            }
        }

        if let Some(meta) = &self.spec.meta {
            if let Some(backend) = meta.backend()? {
                refs.extend(backend.secret_ref(&namespace));
            }
        }

        refs.dedup();
        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::storage::{S3Storage, SqlStorage};
    use crate::tests::fixtures::cluster;

    #[test]
    fn test_spec_deserializes_camel_case() {
        let spec: GreptimeDBClusterSpec = serde_json::from_value(serde_json::json!({
            "meta": { "replicas": 1, "etcdEndpoints": ["etcd.default:2379"] },
            "datanode": { "replicas": 3 },
            "frontend": { "replicas": 1, "tls": { "secretName": "tls" } },
            "postgreSQLPort": 5432,
        }))
        .unwrap();

        assert_eq!(spec.http_port, 4000);
        assert_eq!(spec.postgresql_port, 5432);
        assert_eq!(spec.meta.as_ref().unwrap().rpc_port, 3002);
        assert_eq!(spec.datanode.as_ref().unwrap().component.replicas(), 3);
        assert_eq!(spec.meta.unwrap().etcd_endpoints(), vec!["etcd.default:2379"]);
    }

    #[test]
    fn test_resource_names() {
        let cluster = cluster(GreptimeDBClusterSpec::default());
        assert_eq!(cluster.resource_name(RoleKind::Meta, None), "basic-meta");
        assert_eq!(
            cluster.resource_name(RoleKind::Frontend, Some("read")),
            "basic-frontend-read"
        );
        assert_eq!(cluster.monitoring_standalone_name(), "basic-monitor");
        assert_eq!(
            cluster.monitoring_dns_name(),
            "basic-monitor-standalone.default.svc.cluster.local"
        );
        assert_eq!(cluster.logs_pipeline_name(), "greptime_logs_pipeline_default_basic");
        assert_eq!(
            cluster.meta_http_url(),
            "http://basic-meta.default.svc.cluster.local:4000"
        );
    }

    #[test]
    fn test_secret_references() {
        let cluster = cluster(GreptimeDBClusterSpec {
            frontend: Some(FrontendSpec {
                tls: Some(TlsSpec {
                    secret_name: "frontend-tls".into(),
                }),
                ..Default::default()
            }),
            object_storage: Some(ObjectStorageProviderSpec {
                s3: Some(S3Storage {
                    secret_name: Some("s3-creds".into()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            meta: Some(MetaSpec {
                backend_storage: Some(MetaBackendStorageSpec {
                    mysql: Some(SqlStorage {
                        credentials_secret_name: "mysql-creds".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });

        let refs = cluster.secret_references().unwrap();
        let names: Vec<_> = refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["frontend-tls", "s3-creds", "mysql-creds"]);
        assert_eq!(refs[2].keys, &["username", "password"]);
    }
}
