use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{error, info};

use super::builder::{RoleBuilder, RoleLayout, WorkloadKind, ENV_POD_IP};
use super::{ClusterObject, Collaborators, Deployer};
use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterStatus, MetaSpec};
use crate::api::v1alpha1::{Phase, RoleKind};
use crate::clients::etcd::{check_etcd_service, EtcdMaintenance};
use crate::clients::meta::MetaAdmin;
use crate::dbconfig::{ComponentRef, SecretStore, CONFIG_DIR, CONFIG_FILE_NAME};
use crate::util::errors::Result;
use crate::util::k8s::{is_deployment_ready, PlatformClient};

pub struct MetaDeployer {
    platform: Arc<dyn PlatformClient>,
    etcd: Arc<dyn EtcdMaintenance>,
    meta_admin: Arc<dyn MetaAdmin>,
    /// Turn maintenance mode on while the cluster is being created.
    maintenance_mode_when_create_cluster: bool,
}

impl MetaDeployer {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            platform: collaborators.platform.clone(),
            etcd: collaborators.etcd.clone(),
            meta_admin: collaborators.meta_admin.clone(),
            maintenance_mode_when_create_cluster: collaborators.options.maintenance_mode_when_create_cluster,
        }
    }
}

fn layout(spec: &MetaSpec) -> RoleLayout {
    RoleLayout {
        workload: WorkloadKind::Deployment,
        ports: vec![("rpc", spec.rpc_port), ("http", spec.http_port)],
        command: None,
        args: vec![
            "metasrv".to_string(),
            "start".to_string(),
            "--rpc-bind-addr".to_string(),
            format!("0.0.0.0:{}", spec.rpc_port),
            "--http-addr".to_string(),
            format!("0.0.0.0:{}", spec.http_port),
            "--rpc-server-addr".to_string(),
            format!("$({}):{}", ENV_POD_IP, spec.rpc_port),
            "--config-file".to_string(),
            format!("{CONFIG_DIR}/{CONFIG_FILE_NAME}"),
        ],
        volume_claims: vec![],
        secret_mounts: vec![],
    }
}

#[async_trait]
impl Deployer for MetaDeployer {
    fn name(&self) -> &'static str {
        "meta"
    }

    async fn pre_sync_hooks(&self, cluster: &GreptimeDBCluster) -> Result<()> {
        let Some(meta) = cluster.spec.meta.as_ref().filter(|m| m.enable_check_etcd_service) else {
            return Ok(());
        };
        check_etcd_service(self.etcd.as_ref(), &meta.etcd_endpoints()).await
    }

    fn generate(&self, cluster: &GreptimeDBCluster, secrets: &SecretStore) -> Result<Vec<ClusterObject>> {
        let Some(meta) = &cluster.spec.meta else {
            return Ok(vec![]);
        };
        RoleBuilder::new(cluster, ComponentRef::Meta(meta), layout(meta), secrets)
            .build_service()
            .build_config_map()
            .build_workload()
            .build_pod_monitor()
            .set_controller_and_annotation()
            .generate()
    }

    async fn check_and_update_status(
        &self,
        cluster: &GreptimeDBCluster,
        status: &mut GreptimeDBClusterStatus,
    ) -> Result<bool> {
        let Some(meta) = &cluster.spec.meta else {
            return Ok(true);
        };

        let name = cluster.resource_name(RoleKind::Meta, None);
        let Some(deployment) = self
            .platform
            .get_deployment(&cluster.namespace().unwrap_or_default(), &name)
            .await?
        else {
            return Ok(false);
        };

        status.meta.replicas = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        status.meta.ready_replicas = deployment.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
        status.meta.etcd_endpoints = meta.etcd_endpoints();

        let ready = is_deployment_ready(&deployment);

        // Fires once per bring-up: the recorded flag gates re-entry.
        if self.maintenance_mode_when_create_cluster
            && status.cluster_phase == Some(Phase::Starting)
            && ready
            && !status.meta.maintenance_mode
        {
            info!("Turning on maintenance mode for '{}'", name);
            self.meta_admin
                .set_maintenance_mode(&cluster.meta_http_url(), true)
                .await
                .inspect_err(|e| error!("Failed to turn on maintenance mode for '{}': {}", name, e))?;
            status.meta.maintenance_mode = true;
        }

        Ok(ready)
    }

    async fn on_phase_change(
        &self,
        cluster: &GreptimeDBCluster,
        from: Phase,
        to: Phase,
        status: &mut GreptimeDBClusterStatus,
    ) -> Result<()> {
        if from != Phase::Starting || to != Phase::Running || !status.meta.maintenance_mode {
            return Ok(());
        }
        info!("Cluster '{}' is running, turning off maintenance mode", cluster.name_any());
        self.meta_admin
            .set_maintenance_mode(&cluster.meta_http_url(), false)
            .await?;
        status.meta.maintenance_mode = false;
        Ok(())
    }
}
