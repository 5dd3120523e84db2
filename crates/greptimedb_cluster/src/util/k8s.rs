use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterStatus};
use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandalone;
use crate::api::v1alpha1::API_VERSION;
use crate::deployer::ClusterObject;

pub const FIELD_MANAGER: &str = "greptimedb-operator";

/// The orchestration platform as seen by the deployers and checks.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error>;

    async fn crd_exists(&self, name: &str) -> Result<bool, kube::Error>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, kube::Error>;

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, kube::Error>;

    async fn get_standalone(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GreptimeDBStandalone>, kube::Error>;

    /// Server-side apply. The object carries its own namespace.
    async fn apply(&self, object: &ClusterObject) -> Result<(), kube::Error>;

    async fn patch_cluster_status(
        &self,
        cluster: &GreptimeDBCluster,
        status: &GreptimeDBClusterStatus,
    ) -> Result<(), kube::Error>;

    async fn remove_cluster_annotation(&self, cluster: &GreptimeDBCluster, key: &str) -> Result<(), kube::Error>;
}

#[derive(Clone)]
pub struct KubePlatformClient {
    client: Client,
}

impl KubePlatformClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply_object<K>(&self, object: &K) -> Result<(), kube::Error>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + Debug + Serialize + DeserializeOwned,
        K::DynamicType: Default,
    {
        let namespace = object.namespace().unwrap_or_default();
        let name = object.name_any();
        debug!("Applying {} '{}/{}'", K::kind(&Default::default()), namespace, name);

        let api: Api<K> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(&name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Apply(object))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PlatformClient for KubePlatformClient {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn crd_exists(&self, name: &str) -> Result<bool, kube::Error> {
        let crds = Api::<CustomResourceDefinition>::all(self.client.clone());
        Ok(crds.get_opt(name).await?.is_some())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, kube::Error> {
        Api::<Deployment>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, kube::Error> {
        Api::<StatefulSet>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn get_standalone(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GreptimeDBStandalone>, kube::Error> {
        Api::<GreptimeDBStandalone>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn apply(&self, object: &ClusterObject) -> Result<(), kube::Error> {
        match object {
            ClusterObject::Service(o) => self.apply_object(o).await,
            ClusterObject::ConfigMap(o) => self.apply_object(o).await,
            ClusterObject::Deployment(o) => self.apply_object(o).await,
            ClusterObject::StatefulSet(o) => self.apply_object(o).await,
            ClusterObject::PodMonitor(o) => self.apply_object(o).await,
            ClusterObject::Standalone(o) => self.apply_object(o).await,
        }
    }

    async fn patch_cluster_status(
        &self,
        cluster: &GreptimeDBCluster,
        status: &GreptimeDBClusterStatus,
    ) -> Result<(), kube::Error> {
        let api: Api<GreptimeDBCluster> =
            Api::namespaced(self.client.clone(), &cluster.namespace().unwrap_or_default());
        let patch = Patch::Apply(json!({
            "apiVersion": API_VERSION,
            "kind": "GreptimeDBCluster",
            "status": status,
        }));
        api.patch_status(&cluster.name_any(), &PatchParams::apply(FIELD_MANAGER).force(), &patch)
            .await?;
        Ok(())
    }

    async fn remove_cluster_annotation(&self, cluster: &GreptimeDBCluster, key: &str) -> Result<(), kube::Error> {
        let api: Api<GreptimeDBCluster> =
            Api::namespaced(self.client.clone(), &cluster.namespace().unwrap_or_default());
        let patch = Patch::Merge(json!({ "metadata": { "annotations": { key: null } } }));
        api.patch(&cluster.name_any(), &PatchParams::default(), &patch).await?;
        Ok(())
    }
}

/// Ready once the rollout of the current generation has finished.
pub fn is_deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let Some(status) = &deployment.status else {
        return false;
    };
    status.observed_generation >= deployment.metadata.generation
        && status.ready_replicas.unwrap_or(0) >= desired
        && status.updated_replicas.unwrap_or(0) >= desired
}

pub fn is_statefulset_ready(statefulset: &StatefulSet) -> bool {
    let desired = statefulset.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    let Some(status) = &statefulset.status else {
        return false;
    };
    status.observed_generation >= statefulset.metadata.generation
        && status.ready_replicas.unwrap_or(0) >= desired
        && status.updated_replicas.unwrap_or(0) >= desired
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use kube::api::ObjectMeta;

    fn deployment(generation: i64, observed: i64, ready: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                generation: Some(generation),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(observed),
                ready_replicas: Some(ready),
                updated_replicas: Some(ready),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_deployment_readiness() {
        assert!(is_deployment_ready(&deployment(2, 2, 3)));
        assert!(!is_deployment_ready(&deployment(2, 2, 2)));
        assert!(!is_deployment_ready(&deployment(3, 2, 3)));
        assert!(!is_deployment_ready(&Deployment::default()));
    }
}
