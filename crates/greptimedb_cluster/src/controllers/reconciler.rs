//! One reconcile pass over a `GreptimeDBCluster`.
//!
//! A pass validates the cluster spec, reads referenced secrets, generates and applies
//! every role's objects, then reads the roles back to derive the cluster phase
//! and persist the status. Passes for the same cluster are serialized by the
//! controller runtime; nothing in here runs concurrently.

use std::sync::Arc;

use kube::ResourceExt;
use tracing::{debug, error, info, warn};

use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterStatus, RESET_PHASE_ANNOTATION};
use crate::api::v1alpha1::Phase;
use crate::config::ControllerOptions;
use crate::dbconfig::SecretStore;
use crate::deployer::{cluster_deployers, Collaborators, Deployer};
use crate::util::cluster_status::{next_phase, ready_condition};
use crate::util::errors::{Error, Result, StdError};
use crate::util::k8s::PlatformClient;
use crate::util::status::set_status_condition;
use crate::validation::check::CheckError;
use crate::validation::Validate;

pub struct ClusterReconciler {
    platform: Arc<dyn PlatformClient>,
    deployers: Vec<Box<dyn Deployer>>,
    options: ControllerOptions,
}

impl ClusterReconciler {
    pub fn from_collaborators(collaborators: &Collaborators) -> Self {
        Self {
            platform: collaborators.platform.clone(),
            deployers: cluster_deployers(collaborators),
            options: collaborators.options,
        }
    }

    /// Runs one pass under the reconcile deadline and returns the phase it persisted.
    ///
    /// A pass cut short by the deadline writes no status.
    pub async fn reconcile(&self, cluster: &GreptimeDBCluster) -> Result<Phase> {
        tokio::time::timeout(self.options.reconcile_timeout, self.pass(cluster))
            .await
            .map_err(|_| {
                Error::StdError(StdError::Timeout(format!(
                    "reconcile of '{}' exceeded {:?}",
                    cluster.name_any(),
                    self.options.reconcile_timeout
                )))
            })?
    }

    async fn pass(&self, cluster: &GreptimeDBCluster) -> Result<Phase> {
        let mut status = cluster.status.clone().unwrap_or_default();

        if cluster.reset_phase_requested() {
            self.reset(cluster, &mut status).await?;
        }
        if status.cluster_phase.is_none() {
            status.cluster_phase = Some(Phase::Starting);
        }

        if let Err(e) = self.sync(cluster).await {
            if is_fatal(&e) {
                return self.fail(cluster, status, e).await;
            }
            return Err(e);
        }

        let current = status.cluster_phase;
        let mut side_effect_error = None;
        let mut all_ready = true;
        for deployer in &self.deployers {
            match deployer.check_and_update_status(cluster, &mut status).await {
                Ok(ready) => {
                    debug!("Role '{}' of '{}' ready: {}", deployer.name(), cluster.name_any(), ready);
                    all_ready &= ready;
                }
                Err(e) => {
                    error!("Failed to check status of '{}' for '{}': {}", deployer.name(), cluster.name_any(), e);
                    all_ready = false;
                    side_effect_error.get_or_insert(e);
                }
            }
        }

        let phase = next_phase(current, all_ready);
        if let Some(from) = current.filter(|from| *from != phase) {
            info!("Cluster '{}' phase {} -> {}", cluster.name_any(), from, phase);
            for deployer in &self.deployers {
                if let Err(e) = deployer.on_phase_change(cluster, from, phase, &mut status).await {
                    error!("Phase change hook of '{}' failed: {}", deployer.name(), e);
                    side_effect_error.get_or_insert(e);
                }
            }
        }

        let message = if all_ready {
            "all roles are ready".to_string()
        } else {
            "waiting for roles to become ready".to_string()
        };
        self.persist(cluster, status, phase, message).await;

        match side_effect_error {
            Some(e) => Err(e),
            None => Ok(phase),
        }
    }

    /// Saves `Starting` with a cleared maintenance flag, then drops the annotation.
    ///
    /// The annotation stays on the object until the reset status is stored, so a
    /// failed write is retried by the next pass.
    async fn reset(&self, cluster: &GreptimeDBCluster, status: &mut GreptimeDBClusterStatus) -> Result<()> {
        info!("Resetting phase of '{}' to Starting", cluster.name_any());
        status.cluster_phase = Some(Phase::Starting);
        status.meta.maintenance_mode = false;
        self.platform
            .patch_cluster_status(cluster, status)
            .await
            .inspect_err(|e| error!("Failed to store reset of '{}': {}", cluster.name_any(), e))?;

        if let Err(e) = self
            .platform
            .remove_cluster_annotation(cluster, RESET_PHASE_ANNOTATION)
            .await
        {
            warn!("Failed to remove '{}' from '{}': {}", RESET_PHASE_ANNOTATION, cluster.name_any(), e);
        }
        Ok(())
    }

    /// Validates, renders and applies every role.
    async fn sync(&self, cluster: &GreptimeDBCluster) -> Result<()> {
        cluster.validate()?;
        let secrets = SecretStore::fetch(self.platform.as_ref(), &cluster.secret_references()?).await?;

        for deployer in &self.deployers {
            deployer.pre_sync_hooks(cluster).await?;
            for object in deployer.generate(cluster, &secrets)? {
                debug!("Applying {} '{}'", object.kind(), object.name());
                self.platform.apply(&object).await?;
            }
        }
        Ok(())
    }

    async fn fail(&self, cluster: &GreptimeDBCluster, status: GreptimeDBClusterStatus, e: Error) -> Result<Phase> {
        error!("Reconcile of '{}' failed: {}", cluster.name_any(), e);
        self.persist(cluster, status, Phase::Error, e.to_string()).await;
        Err(e)
    }

    /// Best-effort: a failed status write is logged and the pass goes on.
    async fn persist(&self, cluster: &GreptimeDBCluster, mut status: GreptimeDBClusterStatus, phase: Phase, message: String) {
        status.cluster_phase = Some(phase);
        status.observed_generation = cluster.metadata.generation;
        set_status_condition(
            &mut status.conditions,
            ready_condition(phase, message, cluster.metadata.generation),
        );
        if let Err(e) = self.platform.patch_cluster_status(cluster, &status).await {
            warn!("Failed to update status of '{}': {}", cluster.name_any(), e);
        }
    }
}

/// Errors the user has to fix in the cluster spec. Anything else is retried as is.
fn is_fatal(e: &Error) -> bool {
    match e {
        Error::StdError(StdError::InvalidSpec(_)) | Error::StdError(StdError::ConfigRenderError(_)) => true,
        Error::StdError(StdError::CheckFailed(check)) => !matches!(check, CheckError::Client(_)),
        _ => false,
    }
}
