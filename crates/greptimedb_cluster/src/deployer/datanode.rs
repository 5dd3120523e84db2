use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;

use super::builder::{RoleBuilder, RoleLayout, WorkloadKind, ENV_POD_IP, ENV_POD_NAME};
use super::{ClusterObject, Collaborators, Deployer};
use crate::api::v1alpha1::common::FileStorage;
use crate::api::v1alpha1::greptimedbcluster::{DatanodeSpec, GreptimeDBCluster, GreptimeDBClusterStatus};
use crate::api::v1alpha1::storage::WalProvider;
use crate::api::v1alpha1::RoleKind;
use crate::dbconfig::{ComponentRef, SecretStore, CONFIG_DIR, CONFIG_FILE_NAME};
use crate::util::errors::Result;
use crate::util::k8s::{is_statefulset_ready, PlatformClient};

pub struct DatanodeDeployer {
    platform: Arc<dyn PlatformClient>,
}

impl DatanodeDeployer {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            platform: collaborators.platform.clone(),
        }
    }
}

/// The standalone datanode, or every member of `datanodeGroups`.
pub(crate) fn datanodes(cluster: &GreptimeDBCluster) -> impl Iterator<Item = &DatanodeSpec> {
    cluster.spec.datanode.iter().chain(cluster.spec.datanode_groups.iter())
}

/// Builds a start script so the node id can be taken from the StatefulSet ordinal.
pub(crate) fn start_script(subcommand: &str, rpc_port: i32, http_port: i32) -> Vec<String> {
    vec![
        "-c".to_string(),
        format!(
            "exec greptime {subcommand} start --node-id ${{{pod_name}##*-}} \
             --rpc-bind-addr 0.0.0.0:{rpc_port} --rpc-server-addr ${{{pod_ip}}}:{rpc_port} \
             --http-addr 0.0.0.0:{http_port} --config-file {CONFIG_DIR}/{CONFIG_FILE_NAME}",
            pod_name = ENV_POD_NAME,
            pod_ip = ENV_POD_IP,
        ),
    ]
}

fn volume_claims(cluster: &GreptimeDBCluster, spec: &DatanodeSpec) -> Result<Vec<FileStorage>> {
    let mut claims = Vec::new();

    if let Some(storage) = &spec.storage {
        if let Some(fs) = &storage.fs {
            let mut fs = fs.clone();
            if fs.mount_path.is_empty() {
                fs.mount_path = storage.data_home.clone();
            }
            claims.push(fs);
        }
    }

    if let Some(wal) = &cluster.spec.wal {
        if let Some(WalProvider::RaftEngine(raft)) = wal.provider()? {
            claims.extend(raft.fs.clone());
        }
    }

    if let Some(cache) = cluster.spec.object_storage.as_ref().and_then(|o| o.cache.as_ref()) {
        claims.push(cache.clone());
    }

    claims.retain(|c| !c.name.is_empty());
    Ok(claims)
}

fn layout(cluster: &GreptimeDBCluster, spec: &DatanodeSpec) -> Result<RoleLayout> {
    Ok(RoleLayout {
        workload: WorkloadKind::StatefulSet,
        ports: vec![("rpc", spec.rpc_port), ("http", spec.http_port)],
        command: Some(vec!["/bin/bash".to_string()]),
        args: start_script("datanode", spec.rpc_port, spec.http_port),
        volume_claims: volume_claims(cluster, spec)?,
        secret_mounts: vec![],
    })
}

#[async_trait]
impl Deployer for DatanodeDeployer {
    fn name(&self) -> &'static str {
        "datanode"
    }

    fn generate(&self, cluster: &GreptimeDBCluster, secrets: &SecretStore) -> Result<Vec<ClusterObject>> {
        let mut objects = Vec::new();
        for spec in datanodes(cluster) {
            objects.extend(
                RoleBuilder::new(cluster, ComponentRef::Datanode(spec), layout(cluster, spec)?, secrets)
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

        for spec in datanodes(cluster) {
            let name = cluster.resource_name(RoleKind::Datanode, spec.name.as_deref());
            match self.platform.get_statefulset(&namespace, &name).await? {
                Some(sts) => {
                    replicas += sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
                    ready_replicas += sts.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
                    ready &= is_statefulset_ready(&sts);
                }
                None => ready = false,
            }
        }

        status.datanode.replicas = replicas;
        status.datanode.ready_replicas = ready_replicas;
        Ok(ready)
    }
}
