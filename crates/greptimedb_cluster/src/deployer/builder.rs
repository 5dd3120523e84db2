use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec,
    SecretVolumeSource, Service, ServicePort, ServiceSpec, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use super::{BuildState, ClusterObject};
use crate::api::v1alpha1::common::FileStorage;
use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, VectorSpec};
use crate::api::v1alpha1::podmonitor::{
    PodMetricsEndpoint, PodMonitor, PodMonitorNamespaceSelector, PodMonitorSelector, PodMonitorSpec,
};
use crate::dbconfig::{config_hash, ComponentRef, RoleConfig, SecretStore, CONFIG_DIR, CONFIG_FILE_NAME};
use crate::util::errors::{Error, Result, StdError};

pub const COMPONENT_LABEL: &str = "app.greptime.io/component";
pub const CLUSTER_LABEL: &str = "app.greptime.io/cluster";
pub const CONFIG_HASH_ANNOTATION: &str = "greptime.io/config-hash";

pub const MAIN_CONTAINER: &str = "main";
const CONFIG_VOLUME: &str = "config";
const LOGS_VOLUME: &str = "logs";

pub const VECTOR_CONTAINER: &str = "vector";
const VECTOR_CONFIG_VOLUME: &str = "vector-config";
const VECTOR_CONFIG_DIR: &str = "/etc/vector";
const VECTOR_LOGS_DIR: &str = "/logs";

/// Env vars every main container gets from the downward API.
pub const ENV_POD_IP: &str = "POD_IP";
pub const ENV_POD_NAME: &str = "POD_NAME";
pub const ENV_POD_NAMESPACE: &str = "POD_NAMESPACE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

/// A secret mounted read-only into the main container.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretMount {
    pub volume: &'static str,
    pub secret_name: String,
    pub mount_path: String,
}

/// Role-specific shape of the generated objects.
#[derive(Debug, Clone)]
pub struct RoleLayout {
    pub workload: WorkloadKind,
    /// `(name, port)`; the first one named `http` is scraped.
    pub ports: Vec<(&'static str, i32)>,
    pub command: Option<Vec<String>>,
    pub args: Vec<String>,
    /// Volume claim templates. StatefulSets only.
    pub volume_claims: Vec<FileStorage>,
    pub secret_mounts: Vec<SecretMount>,
}

/// Builds the object set of one role of a cluster.
///
/// Steps are chained by value, e.g.
/// `RoleBuilder::new(..).build_service().build_config_map().build_workload().generate()`.
pub struct RoleBuilder<'a> {
    cluster: &'a GreptimeDBCluster,
    component: ComponentRef<'a>,
    layout: RoleLayout,
    name: String,
    namespace: String,
    rendered: Option<String>,
    state: BuildState,
}

impl<'a> RoleBuilder<'a> {
    pub fn new(
        cluster: &'a GreptimeDBCluster,
        component: ComponentRef<'a>,
        layout: RoleLayout,
        secrets: &SecretStore,
    ) -> Self {
        let mut state = BuildState::default();
        let rendered = match RoleConfig::from_cluster(cluster, component, secrets).and_then(|c| c.render()) {
            Ok(rendered) => Some(rendered),
            Err(e) => {
                state = state.fail(e);
                None
            }
        };
        RoleBuilder {
            cluster,
            component,
            layout,
            name: cluster.resource_name(component.role(), component.group()),
            namespace: cluster.namespace().unwrap_or_default(),
            rendered,
            state,
        }
    }

    fn step<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Self) -> Result<Option<ClusterObject>>,
    {
        let state = std::mem::take(&mut self.state);
        self.state = state.step(|objects| {
            objects.extend(f(&self)?);
            Ok(())
        });
        self
    }

    pub fn build_service(self) -> Self {
        self.step(|b| Ok(Some(ClusterObject::Service(b.service()))))
    }

    pub fn build_config_map(self) -> Self {
        self.step(|b| Ok(Some(ClusterObject::ConfigMap(b.config_map()?))))
    }

    pub fn build_workload(self) -> Self {
        self.step(|b| {
            let template = b.pod_template()?;
            Ok(Some(match b.layout.workload {
                WorkloadKind::Deployment => ClusterObject::Deployment(b.deployment(template)),
                WorkloadKind::StatefulSet => ClusterObject::StatefulSet(b.statefulset(template)),
            }))
        })
    }

    /// Skipped unless `prometheusMonitor.enabled`.
    pub fn build_pod_monitor(self) -> Self {
        self.step(|b| {
            if !b.cluster.prometheus_monitor_enabled() {
                return Ok(None);
            }
            Ok(Some(ClusterObject::PodMonitor(pod_monitor(
                b.cluster,
                &b.name,
                &b.namespace,
            ))))
        })
    }

    pub fn set_controller_and_annotation(mut self) -> Self {
        let cluster = self.cluster;
        self.state = self.state.step(|objects| set_controller(cluster, objects));
        self
    }

    pub fn generate(self) -> Result<Vec<ClusterObject>> {
        self.state.finish()
    }

    fn rendered_config(&self) -> Result<&str> {
        self.rendered.as_deref().ok_or_else(|| {
            Error::StdError(StdError::ConfigRenderError(format!(
                "no configuration rendered for '{}'",
                self.name
            )))
        })
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(COMPONENT_LABEL.to_string(), self.name.clone())])
    }

    fn object_meta(&self) -> ObjectMeta {
        ObjectMeta {
            name: Some(self.name.clone()),
            namespace: Some(self.namespace.clone()),
            labels: Some(self.selector_labels()),
            ..Default::default()
        }
    }

    fn service(&self) -> Service {
        let headless = self.layout.workload == WorkloadKind::StatefulSet;
        Service {
            metadata: self.object_meta(),
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                cluster_ip: headless.then(|| "None".to_string()),
                selector: Some(self.selector_labels()),
                ports: Some(
                    self.layout
                        .ports
                        .iter()
                        .map(|(name, port)| ServicePort {
                            name: Some(name.to_string()),
                            port: *port,
                            target_port: Some(IntOrString::Int(*port)),
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn config_map(&self) -> Result<ConfigMap> {
        Ok(ConfigMap {
            metadata: self.object_meta(),
            data: Some(BTreeMap::from([(
                CONFIG_FILE_NAME.to_string(),
                self.rendered_config()?.to_string(),
            )])),
            ..Default::default()
        })
    }

    fn pod_template(&self) -> Result<PodTemplateSpec> {
        let component = self.component.component();

        let mut volumes = vec![Volume {
            name: CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: self.name.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }];
        let mut mounts = vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        }];

        if let Some(logging) = self
            .cluster
            .logging_for(component)
            .filter(|l| !l.only_log_to_stdout && !l.logs_dir.is_empty())
        {
            volumes.push(Volume {
                name: LOGS_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            });
            mounts.push(VolumeMount {
                name: LOGS_VOLUME.to_string(),
                mount_path: logging.logs_dir.clone(),
                ..Default::default()
            });
        }

        let vector = self
            .cluster
            .vector()
            .map(|spec| self.vector_sidecar(spec, volumes.iter().any(|v| v.name == LOGS_VOLUME)));
        if vector.is_some() {
            volumes.push(Volume {
                name: VECTOR_CONFIG_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: self.cluster.vector_config_map_name(),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }

        for secret in &self.layout.secret_mounts {
            volumes.push(Volume {
                name: secret.volume.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.secret_name.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            });
            mounts.push(VolumeMount {
                name: secret.volume.to_string(),
                mount_path: secret.mount_path.clone(),
                read_only: Some(true),
                ..Default::default()
            });
        }

        for claim in &self.layout.volume_claims {
            mounts.push(VolumeMount {
                name: claim.name.clone(),
                mount_path: claim.mount_path.clone(),
                ..Default::default()
            });
        }

        let mut args = self.layout.args.clone();
        args.extend(component.extra_args.iter().cloned());

        let container = Container {
            name: MAIN_CONTAINER.to_string(),
            image: Some(self.cluster.image_for(component)),
            command: self.layout.command.clone(),
            args: Some(args),
            ports: Some(
                self.layout
                    .ports
                    .iter()
                    .map(|(name, port)| ContainerPort {
                        name: Some(name.to_string()),
                        container_port: *port,
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
            env: Some(pod_env()),
            volume_mounts: Some(mounts),
            ..Default::default()
        };

        Ok(PodTemplateSpec {
            metadata: Some(ObjectMeta {
                labels: Some(self.selector_labels()),
                annotations: Some(BTreeMap::from([(
                    CONFIG_HASH_ANNOTATION.to_string(),
                    config_hash(self.rendered_config()?),
                )])),
                ..Default::default()
            }),
            spec: Some(PodSpec {
                containers: std::iter::once(container).chain(vector).collect(),
                volumes: Some(volumes),
                ..Default::default()
            }),
        })
    }

    /// Ships the role's log files and scraped metrics to the monitoring standalone.
    fn vector_sidecar(&self, spec: &VectorSpec, with_logs: bool) -> Container {
        let http_port = self
            .layout
            .ports
            .iter()
            .find(|(name, _)| *name == "http")
            .map_or(0, |(_, port)| *port);

        let mut env = pod_env();
        env.extend([
            EnvVar {
                name: "ROLE".to_string(),
                value: Some(self.component.role().to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "GREPTIME_HTTP_PORT".to_string(),
                value: Some(http_port.to_string()),
                ..Default::default()
            },
        ]);

        let mut mounts = vec![VolumeMount {
            name: VECTOR_CONFIG_VOLUME.to_string(),
            mount_path: VECTOR_CONFIG_DIR.to_string(),
            read_only: Some(true),
            ..Default::default()
        }];
        if with_logs {
            mounts.push(VolumeMount {
                name: LOGS_VOLUME.to_string(),
                mount_path: VECTOR_LOGS_DIR.to_string(),
                ..Default::default()
            });
        }

        Container {
            name: VECTOR_CONTAINER.to_string(),
            image: Some(spec.image.clone()),
            args: Some(vec![
                "--config".to_string(),
                format!("{VECTOR_CONFIG_DIR}/{}", super::monitoring::VECTOR_CONFIG_FILE),
            ]),
            env: Some(env),
            volume_mounts: Some(mounts),
            ..Default::default()
        }
    }

    fn deployment(&self, template: PodTemplateSpec) -> Deployment {
        Deployment {
            metadata: self.object_meta(),
            spec: Some(DeploymentSpec {
                replicas: Some(self.component.component().replicas()),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                template,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn statefulset(&self, template: PodTemplateSpec) -> StatefulSet {
        let claims: Vec<_> = self.layout.volume_claims.iter().map(volume_claim).collect();
        StatefulSet {
            metadata: self.object_meta(),
            spec: Some(StatefulSetSpec {
                replicas: Some(self.component.component().replicas()),
                service_name: Some(self.name.clone()),
                pod_management_policy: Some("Parallel".to_string()),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                template,
                volume_claim_templates: (!claims.is_empty()).then_some(claims),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn pod_env() -> Vec<EnvVar> {
    [
        (ENV_POD_IP, "status.podIP"),
        (ENV_POD_NAME, "metadata.name"),
        (ENV_POD_NAMESPACE, "metadata.namespace"),
    ]
    .into_iter()
    .map(|(name, field_path)| EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    })
    .collect()
}

fn volume_claim(storage: &FileStorage) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(storage.name.clone()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: storage.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(storage.storage_size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Scrapes the `http` port of every pod labelled with `component`.
pub fn pod_monitor(cluster: &GreptimeDBCluster, component: &str, namespace: &str) -> PodMonitor {
    let monitor = cluster.spec.prometheus_monitor.clone().unwrap_or_default();
    let mut object = PodMonitor::new(
        component,
        PodMonitorSpec {
            selector: PodMonitorSelector {
                match_labels: BTreeMap::from([(COMPONENT_LABEL.to_string(), component.to_string())]),
            },
            namespace_selector: PodMonitorNamespaceSelector {
                match_names: vec![namespace.to_string()],
            },
            pod_metrics_endpoints: vec![PodMetricsEndpoint {
                port: "http".to_string(),
                path: "/metrics".to_string(),
                interval: monitor.interval,
            }],
        },
    );
    object.metadata.namespace = Some(namespace.to_string());
    object.metadata.labels = Some(monitor.labels);
    object
}

/// Stamps the owner reference and cluster label on every object.
pub fn set_controller(cluster: &GreptimeDBCluster, objects: &mut [ClusterObject]) -> Result<()> {
    let owner = cluster.controller_owner_ref(&()).ok_or_else(|| {
        Error::StdError(StdError::MetadataMissing(format!(
            "cluster '{}' has no uid yet",
            cluster.name_any()
        )))
    })?;
    for object in objects.iter_mut() {
        let meta = object.meta_mut();
        meta.owner_references = Some(vec![owner.clone()]);
        meta.labels
            .get_or_insert_with(BTreeMap::new)
            .insert(CLUSTER_LABEL.to_string(), cluster.name_any());
    }
    Ok(())
}
