use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;

use super::builder::{RoleBuilder, RoleLayout, WorkloadKind};
use super::datanode::start_script;
use super::{ClusterObject, Collaborators, Deployer};
use crate::api::v1alpha1::greptimedbcluster::{FlownodeSpec, GreptimeDBCluster, GreptimeDBClusterStatus};
use crate::api::v1alpha1::RoleKind;
use crate::dbconfig::{ComponentRef, SecretStore};
use crate::util::errors::Result;
use crate::util::k8s::{is_statefulset_ready, PlatformClient};

pub struct FlownodeDeployer {
    platform: Arc<dyn PlatformClient>,
}

impl FlownodeDeployer {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            platform: collaborators.platform.clone(),
        }
    }
}

fn layout(spec: &FlownodeSpec) -> RoleLayout {
    RoleLayout {
        workload: WorkloadKind::StatefulSet,
        ports: vec![("rpc", spec.rpc_port), ("http", spec.http_port)],
        command: Some(vec!["/bin/bash".to_string()]),
        args: start_script("flownode", spec.rpc_port, spec.http_port),
        volume_claims: vec![],
        secret_mounts: vec![],
    }
}

#[async_trait]
impl Deployer for FlownodeDeployer {
    fn name(&self) -> &'static str {
        "flownode"
    }

    fn generate(&self, cluster: &GreptimeDBCluster, secrets: &SecretStore) -> Result<Vec<ClusterObject>> {
        let Some(flownode) = &cluster.spec.flownode else {
            return Ok(vec![]);
        };
        RoleBuilder::new(cluster, ComponentRef::Flownode(flownode), layout(flownode), secrets)
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
        if cluster.spec.flownode.is_none() {
            return Ok(true);
        }
        let name = cluster.resource_name(RoleKind::Flownode, None);
        let Some(sts) = self
            .platform
            .get_statefulset(&cluster.namespace().unwrap_or_default(), &name)
            .await?
        else {
            return Ok(false);
        };

        status.flownode.replicas = sts.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0);
        status.flownode.ready_replicas = sts.status.as_ref().and_then(|s| s.ready_replicas).unwrap_or(0);
        Ok(is_statefulset_ready(&sts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::greptimedbcluster::GreptimeDBClusterSpec;
    use crate::tests::fakes::{collaborators, ready_statefulset, FakePlatform};
    use crate::tests::fixtures::cluster;

    #[test]
    fn test_absent_flownode_generates_nothing() {
        let deployer = FlownodeDeployer::new(&collaborators(FakePlatform::default()));
        let objects = deployer
            .generate(&cluster(GreptimeDBClusterSpec::default()), &SecretStore::default())
            .unwrap();
        assert!(objects.is_empty());
    }

    #[tokio::test]
    async fn test_statefulset_status() {
        let cluster = cluster(GreptimeDBClusterSpec {
            flownode: Some(FlownodeSpec::default()),
            ..Default::default()
        });
        let platform = FakePlatform::default().with_statefulset(ready_statefulset("basic-flownode", 1));
        let deployer = FlownodeDeployer::new(&collaborators(platform));

        let objects = deployer.generate(&cluster, &SecretStore::default()).unwrap();
        let kinds: Vec<_> = objects.iter().map(ClusterObject::kind).collect();
        assert_eq!(kinds, vec!["Service", "ConfigMap", "StatefulSet"]);

        let mut status = GreptimeDBClusterStatus::default();
        assert!(deployer.check_and_update_status(&cluster, &mut status).await.unwrap());
        assert_eq!(status.flownode.ready_replicas, 1);
    }
}
