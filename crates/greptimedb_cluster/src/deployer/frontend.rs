use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;

use super::builder::{RoleBuilder, RoleLayout, SecretMount, WorkloadKind, ENV_POD_IP};
use super::{ClusterObject, Collaborators, Deployer};
use crate::api::v1alpha1::greptimedbcluster::{FrontendSpec, GreptimeDBCluster, GreptimeDBClusterStatus};
use crate::api::v1alpha1::RoleKind;
use crate::dbconfig::frontend::TLS_DIR;
use crate::dbconfig::{ComponentRef, SecretStore, CONFIG_DIR, CONFIG_FILE_NAME};
use crate::util::errors::Result;
use crate::util::k8s::{is_deployment_ready, PlatformClient};

pub struct FrontendDeployer {
    platform: Arc<dyn PlatformClient>,
}

impl FrontendDeployer {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            platform: collaborators.platform.clone(),
        }
    }
}

fn frontends(cluster: &GreptimeDBCluster) -> impl Iterator<Item = &FrontendSpec> {
    cluster.spec.frontend.iter().chain(cluster.spec.frontend_groups.iter())
}

fn layout(cluster: &GreptimeDBCluster, spec: &FrontendSpec) -> RoleLayout {
    let ports = &cluster.spec;
    RoleLayout {
        workload: WorkloadKind::Deployment,
        ports: vec![
            ("rpc", ports.rpc_port),
            ("http", ports.http_port),
            ("mysql", ports.mysql_port),
            ("postgres", ports.postgresql_port),
        ],
        command: None,
        args: vec![
            "frontend".to_string(),
            "start".to_string(),
            "--rpc-bind-addr".to_string(),
            format!("0.0.0.0:{}", ports.rpc_port),
            "--rpc-server-addr".to_string(),
            format!("$({}):{}", ENV_POD_IP, ports.rpc_port),
            "--http-addr".to_string(),
            format!("0.0.0.0:{}", ports.http_port),
            "--mysql-addr".to_string(),
            format!("0.0.0.0:{}", ports.mysql_port),
            "--postgres-addr".to_string(),
            format!("0.0.0.0:{}", ports.postgresql_port),
            "--config-file".to_string(),
            format!("{CONFIG_DIR}/{CONFIG_FILE_NAME}"),
        ],
        volume_claims: vec![],
        secret_mounts: spec
            .tls
            .iter()
            .filter(|tls| !tls.secret_name.is_empty())
            .map(|tls| SecretMount {
                volume: "tls",
                secret_name: tls.secret_name.clone(),
                mount_path: TLS_DIR.to_string(),
            })
            .collect(),
    }
}

#[async_trait]
impl Deployer for FrontendDeployer {
    fn name(&self) -> &'static str {
        "frontend"
    }

    fn generate(&self, cluster: &GreptimeDBCluster, secrets: &SecretStore) -> Result<Vec<ClusterObject>> {
        let mut objects = Vec::new();
        for spec in frontends(cluster) {
            objects.extend(
                RoleBuilder::new(cluster, ComponentRef::Frontend(spec), layout(cluster, spec), secrets)
                    .build_service()
                    .build_config_map()
                    .build_workload()
                    .build_pod_monitor()
                    .set_controller_and_annotation()
                    .generate()?,
            );
        }
        Ok(objects)
    }

    async fn check_and_update_status(
        &self,
        cluster: &GreptimeDBCluster,
        status: &mut GreptimeDBClusterStatus,
    ) -> Result<bool> {
        let namespace = cluster.namespace().unwrap_or_default();
        let mut ready = true;
        let (mut replicas, mut ready_replicas) = (0, 0);
        let mut endpoints = Vec::new();

        for spec in frontends(cluster) {
            let name = cluster.resource_name(RoleKind::Frontend, spec.name.as_deref());
            endpoints.push(format!("{name}.{namespace}.svc.cluster.local"));
            match self.platform.get_deployment(&namespace, &name).await? {
                Some(deployment) => {
                    replicas += deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
                    ready_replicas += deployment.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
                    ready &= is_deployment_ready(&deployment);
                }
                None => ready = false,
            }
        }

        status.frontend.replicas = replicas;
        status.frontend.ready_replicas = ready_replicas;
        status.frontend.endpoints = endpoints;
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::common::TlsSpec;
    use crate::api::v1alpha1::greptimedbcluster::GreptimeDBClusterSpec;
    use crate::tests::fakes::{collaborators, ready_deployment, FakePlatform};
    use crate::tests::fixtures::{cluster, secret};

    fn tls_cluster() -> GreptimeDBCluster {
        cluster(GreptimeDBClusterSpec {
            frontend: Some(FrontendSpec {
                tls: Some(TlsSpec {
                    secret_name: "frontend-tls".into(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn test_tls_secret_is_mounted() {
        let cluster = tls_cluster();
        let mut secrets = SecretStore::default();
        secrets.insert(secret("default", "frontend-tls", &[("tls.crt", "crt"), ("tls.key", "key")]));
        let deployer = FrontendDeployer::new(&collaborators(FakePlatform::default()));

        let objects = deployer.generate(&cluster, &secrets).unwrap();
        let Some(ClusterObject::Deployment(deployment)) = objects.iter().find(|o| o.kind() == "Deployment") else {
            panic!("expected a deployment");
        };
        let pod = deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap();
        let tls = pod.volumes.as_ref().unwrap().iter().find(|v| v.name == "tls").unwrap();
        assert_eq!(
            tls.secret.as_ref().and_then(|s| s.secret_name.as_deref()),
            Some("frontend-tls")
        );
        let mounts = pod.containers[0].volume_mounts.as_ref().unwrap();
        assert!(mounts.iter().any(|m| m.mount_path == TLS_DIR));
    }

    #[test]
    fn test_ports_follow_cluster_spec() {
        let mut cluster = tls_cluster();
        cluster.spec.mysql_port = 3306;
        let spec = cluster.spec.frontend.clone().unwrap();
        let layout = layout(&cluster, &spec);
        assert!(layout.ports.contains(&("mysql", 3306)));
        assert!(layout.args.contains(&"0.0.0.0:3306".to_string()));
    }

    #[tokio::test]
    async fn test_status_reports_endpoints() {
        let cluster = tls_cluster();
        let platform = FakePlatform::default().with_deployment(ready_deployment("basic-frontend", 2));
        let deployer = FrontendDeployer::new(&collaborators(platform));
        let mut status = GreptimeDBClusterStatus::default();

        assert!(deployer.check_and_update_status(&cluster, &mut status).await.unwrap());
        assert_eq!(status.frontend.ready_replicas, 2);
        assert_eq!(status.frontend.endpoints, vec!["basic-frontend.default.svc.cluster.local"]);
    }
}
