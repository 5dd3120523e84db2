//! Per-role deployers.
//!
//! A deployer owns the object set of one role: it runs the role's pre-sync
//! hooks, generates the objects through a [`builder::RoleBuilder`] and reads the
//! applied workload back to fill in the role's slice of the cluster status.

pub mod builder;
pub mod datanode;
pub mod flownode;
pub mod frontend;
pub mod meta;
pub mod monitoring;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::ObjectMeta;
use kube::Resource;

use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterStatus};
use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandalone;
use crate::api::v1alpha1::podmonitor::PodMonitor;
use crate::api::v1alpha1::Phase;
use crate::clients::etcd::EtcdMaintenance;
use crate::clients::meta::MetaAdmin;
use crate::clients::pipeline::PipelineClient;
use crate::config::ControllerOptions;
use crate::dbconfig::SecretStore;
use crate::util::errors::{Error, Result};
use crate::util::k8s::PlatformClient;

/// An object a builder produced, ready for server-side apply.
#[derive(Debug, Clone)]
pub enum ClusterObject {
    Service(Service),
    ConfigMap(ConfigMap),
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    PodMonitor(PodMonitor),
    Standalone(GreptimeDBStandalone),
}

impl ClusterObject {
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterObject::Service(_) => "Service",
            ClusterObject::ConfigMap(_) => "ConfigMap",
            ClusterObject::Deployment(_) => "Deployment",
            ClusterObject::StatefulSet(_) => "StatefulSet",
            ClusterObject::PodMonitor(_) => "PodMonitor",
            ClusterObject::Standalone(_) => "GreptimeDBStandalone",
        }
    }

    pub fn meta(&self) -> &ObjectMeta {
        match self {
            ClusterObject::Service(o) => o.meta(),
            ClusterObject::ConfigMap(o) => o.meta(),
            ClusterObject::Deployment(o) => o.meta(),
            ClusterObject::StatefulSet(o) => o.meta(),
            ClusterObject::PodMonitor(o) => o.meta(),
            ClusterObject::Standalone(o) => o.meta(),
        }
    }

    pub fn meta_mut(&mut self) -> &mut ObjectMeta {
        match self {
            ClusterObject::Service(o) => o.meta_mut(),
            ClusterObject::ConfigMap(o) => o.meta_mut(),
            ClusterObject::Deployment(o) => o.meta_mut(),
            ClusterObject::StatefulSet(o) => o.meta_mut(),
            ClusterObject::PodMonitor(o) => o.meta_mut(),
            ClusterObject::Standalone(o) => o.meta_mut(),
        }
    }

    pub fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }
}

/// Objects accumulated by a chain of build steps, plus the first error any step hit.
///
/// Once `error` is set every later step passes the state through untouched.
#[derive(Debug, Default)]
pub struct BuildState {
    pub objects: Vec<ClusterObject>,
    pub error: Option<Error>,
}

impl BuildState {
    pub fn step<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut Vec<ClusterObject>) -> Result<()>,
    {
        if self.error.is_none() {
            if let Err(e) = f(&mut self.objects) {
                self.error = Some(e);
            }
        }
        self
    }

    pub fn fail(mut self, error: Error) -> Self {
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    pub fn finish(self) -> Result<Vec<ClusterObject>> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.objects),
        }
    }
}

#[async_trait]
pub trait Deployer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks of external dependencies. An error stops the pass before generation.
    async fn pre_sync_hooks(&self, _cluster: &GreptimeDBCluster) -> Result<()> {
        Ok(())
    }

    fn generate(&self, cluster: &GreptimeDBCluster, secrets: &SecretStore) -> Result<Vec<ClusterObject>>;

    /// Reads the live objects back into `status` and reports whether the role is ready.
    ///
    /// A workload that does not exist yet is "not ready", not an error.
    async fn check_and_update_status(
        &self,
        cluster: &GreptimeDBCluster,
        status: &mut GreptimeDBClusterStatus,
    ) -> Result<bool>;

    /// Called once the cluster phase is about to change from `from` to `to`.
    async fn on_phase_change(
        &self,
        _cluster: &GreptimeDBCluster,
        _from: Phase,
        _to: Phase,
        _status: &mut GreptimeDBClusterStatus,
    ) -> Result<()> {
        Ok(())
    }
}

/// Everything a deployer talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub platform: Arc<dyn PlatformClient>,
    pub etcd: Arc<dyn EtcdMaintenance>,
    pub meta_admin: Arc<dyn MetaAdmin>,
    pub pipelines: Arc<dyn PipelineClient>,
    pub options: ControllerOptions,
}

/// The deployers of a cluster, in sync order.
pub fn cluster_deployers(collaborators: &Collaborators) -> Vec<Box<dyn Deployer>> {
    vec![
        Box::new(meta::MetaDeployer::new(collaborators)),
        Box::new(datanode::DatanodeDeployer::new(collaborators)),
        Box::new(frontend::FrontendDeployer::new(collaborators)),
        Box::new(flownode::FlownodeDeployer::new(collaborators)),
        Box::new(monitoring::MonitoringDeployer::new(collaborators)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::errors::StdError;

    #[test]
    fn test_first_error_is_sticky() {
        let mut calls = 0;
        let result = BuildState::default()
            .step(|objects| {
                objects.push(ClusterObject::Service(Service::default()));
                Ok(())
            })
            .step(|_| Err(StdError::ConfigRenderError("first".into()).into()))
            .step(|_| {
                calls += 1;
                Err(StdError::ConfigRenderError("second".into()).into())
            })
            .finish();

        assert_eq!(calls, 0);
        assert!(result.unwrap_err().to_string().contains("first"));
    }

    #[test]
    fn test_objects_accumulate_in_order() {
        let objects = BuildState::default()
            .step(|objects| {
                objects.push(ClusterObject::Service(Service::default()));
                Ok(())
            })
            .step(|objects| {
                objects.push(ClusterObject::ConfigMap(ConfigMap::default()));
                Ok(())
            })
            .finish()
            .unwrap();
        let kinds: Vec<_> = objects.iter().map(ClusterObject::kind).collect();
        assert_eq!(kinds, vec!["Service", "ConfigMap"]);
    }
}
