//! The monitoring role: a `GreptimeDBStandalone` that stores the cluster's own logs,
//! plus the ingestion pipelines it needs before log collection can start.

use std::sync::Arc;

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{error, info};

use super::builder::set_controller;
use super::{BuildState, ClusterObject, Collaborators, Deployer};
use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterStatus};
use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandalone;
use crate::api::v1alpha1::Phase;
use crate::clients::pipeline::PipelineClient;
use crate::dbconfig::SecretStore;
use crate::util::errors::{Error, Result};
use crate::util::k8s::PlatformClient;
use crate::util::retry::{retry_with_policy, RetryPolicy, PIPELINE_UPLOAD_POLICY};

/// Built-in definition of the logs pipeline.
pub const DEFAULT_LOGS_PIPELINE: &str = include_str!("../../config/logs-pipeline.yaml");

const VECTOR_CONFIG_TEMPLATE: &str = include_str!("../../config/vector-config-template.yaml");

/// Key of the rendered Vector config in its ConfigMap.
pub const VECTOR_CONFIG_FILE: &str = "vector.yaml";

/// Table of the monitoring standalone that receives the collected logs.
pub const LOGS_TABLE: &str = "_gt_logs";

/// A pipeline the monitoring standalone must have.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefinition {
    pub name: String,
    pub data: String,
}

pub struct MonitoringDeployer {
    platform: Arc<dyn PlatformClient>,
    pipelines: Arc<dyn PipelineClient>,
    upload_policy: RetryPolicy,
}

impl MonitoringDeployer {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self {
            platform: collaborators.platform.clone(),
            pipelines: collaborators.pipelines.clone(),
            upload_policy: PIPELINE_UPLOAD_POLICY,
        }
    }

    #[cfg(test)]
    fn with_upload_policy(mut self, policy: RetryPolicy) -> Self {
        self.upload_policy = policy;
        self
    }

    /// Creates every missing pipeline. Existing ones are left untouched.
    async fn bootstrap_pipelines(&self, cluster: &GreptimeDBCluster, base_url: &str) -> Result<()> {
        for pipeline in required_pipelines(cluster) {
            let existing = self
                .pipelines
                .get_pipeline(base_url, &pipeline.name)
                .await
                .inspect_err(|e| error!("Failed to get pipeline '{}': {}", pipeline.name, e))?;
            if existing.is_some() {
                continue;
            }

            info!("Creating pipeline '{}' for standalone monitoring", pipeline.name);
            retry_with_policy(&self.upload_policy, "create_pipeline", Error::is_transient, || {
                self.pipelines.create_pipeline(base_url, &pipeline.name, &pipeline.data)
            })
            .await?;
        }
        Ok(())
    }
}

/// Pipelines to bootstrap. A definition embedded in the cluster spec replaces the built-in one.
pub fn required_pipelines(cluster: &GreptimeDBCluster) -> Vec<PipelineDefinition> {
    let data = cluster
        .spec
        .monitoring
        .as_ref()
        .and_then(|m| m.logs_collection.as_ref())
        .and_then(|l| l.pipeline.as_ref())
        .and_then(|p| p.data.clone())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| DEFAULT_LOGS_PIPELINE.to_string());

    vec![PipelineDefinition {
        name: cluster.logs_pipeline_name(),
        data,
    }]
}

fn standalone(cluster: &GreptimeDBCluster) -> Option<GreptimeDBStandalone> {
    if !cluster.monitoring_enabled() {
        return None;
    }
    let spec = cluster.spec.monitoring.as_ref()?.standalone.clone()?;
    let mut standalone = GreptimeDBStandalone::new(&cluster.monitoring_standalone_name(), spec);
    standalone.metadata.namespace = cluster.namespace();
    Some(standalone)
}

/// Vector config shared by every role's sidecar, pointed at the monitoring standalone.
pub fn vector_config(cluster: &GreptimeDBCluster, http_port: i32) -> String {
    let service = format!("http://{}:{}", cluster.monitoring_dns_name(), http_port);
    VECTOR_CONFIG_TEMPLATE
        .replace("{{CLUSTER_NAME}}", &cluster.name_any())
        .replace("{{LOGS_TABLE}}", LOGS_TABLE)
        .replace("{{LOGS_PIPELINE}}", &cluster.logs_pipeline_name())
        .replace("{{LOGGING_SERVICE}}", &service)
        .replace("{{METRIC_SERVICE}}", &format!("{service}/v1/prometheus/write?db=public"))
}

fn vector_config_map(cluster: &GreptimeDBCluster) -> Option<ConfigMap> {
    cluster.vector()?;
    let http_port = cluster.spec.monitoring.as_ref()?.standalone.as_ref()?.http_port;
    Some(ConfigMap {
        metadata: ObjectMeta {
            name: Some(cluster.vector_config_map_name()),
            namespace: cluster.namespace(),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            VECTOR_CONFIG_FILE.to_string(),
            vector_config(cluster, http_port),
        )])),
        ..Default::default()
    })
}

#[async_trait]
impl Deployer for MonitoringDeployer {
    fn name(&self) -> &'static str {
        "monitoring"
    }

    fn generate(&self, cluster: &GreptimeDBCluster, _secrets: &SecretStore) -> Result<Vec<ClusterObject>> {
        BuildState::default()
            .step(|objects| {
                objects.extend(standalone(cluster).map(ClusterObject::Standalone));
                Ok(())
            })
            .step(|objects| {
                objects.extend(vector_config_map(cluster).map(ClusterObject::ConfigMap));
                Ok(())
            })
            .step(|objects| set_controller(cluster, objects))
            .finish()
    }

    async fn check_and_update_status(
        &self,
        cluster: &GreptimeDBCluster,
        status: &mut GreptimeDBClusterStatus,
    ) -> Result<bool> {
        if !cluster.monitoring_enabled() {
            return Ok(true);
        }

        let Some(standalone) = self
            .platform
            .get_standalone(
                &cluster.namespace().unwrap_or_default(),
                &cluster.monitoring_standalone_name(),
            )
            .await?
        else {
            return Ok(false);
        };

        if standalone.phase() != Some(Phase::Running) {
            return Ok(false);
        }

        let http_port = standalone.spec.http_port;
        let base_url = format!("http://{}:{}", cluster.monitoring_dns_name(), http_port);
        self.bootstrap_pipelines(cluster, &base_url).await?;

        status.monitoring.internal_dns_name = Some(cluster.monitoring_dns_name());
        Ok(true)
    }
}
