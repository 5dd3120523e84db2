use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GREPTIMEDB_CLUSTER_FINALIZER};
use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandalone;
use crate::api::v1alpha1::Phase;
use crate::clients::etcd::EtcdMaintenanceClient;
use crate::clients::meta::MetaAdminClient;
use crate::clients::pipeline::PipelineHttpClient;
use crate::config::ControllerOptions;
use crate::controllers::reconciler::ClusterReconciler;
use crate::deployer::Collaborators;
use crate::util::k8s::{KubePlatformClient, PlatformClient};
use crate::util::{errors, errors::Result, metrics};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::{ConfigMap, Service},
};
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType, Recorder, Reporter},
        finalizer::{finalizer, Event as Finalizer},
        watcher::{self, Config},
    },
    Resource,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::*;

/// Upper bound on the requeue delay after a transient error.
const TRANSIENT_REQUEUE: Duration = Duration::from_secs(10);

impl GreptimeDBCluster {
    // Reconcile (for non-finalizer related changes)
    pub async fn reconcile(&self, ctx: Arc<Context>) -> Result<Action> {
        let reconciler = ClusterReconciler::from_collaborators(&ctx.collaborators);
        match reconciler.reconcile(self).await {
            Ok(phase) => {
                ctx.metrics.set_phase(self, phase);
                Ok(Action::requeue(ctx.collaborators.options.requeue_interval))
            }
            Err(errors::Error::ErrorWithRequeue(error)) => {
                warn!("reconcile of '{}' requeued: {}", self.name_any(), error);
                Ok(Action::requeue(error.duration))
            }
            Err(e) => {
                if let Some(phase) = self.phase() {
                    ctx.metrics.set_phase(self, phase);
                }
                Err(e)
            }
        }
    }

    // Finalizer cleanup: owned objects are garbage collected, so we only record the phase and publish an event
    async fn cleanup(&self, ctx: Arc<Context>) -> Result<Action> {
        let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone());

        let mut status = self.status.clone().unwrap_or_default();
        status.cluster_phase = Some(Phase::Terminating);
        if let Err(e) = ctx.collaborators.platform.patch_cluster_status(self, &status).await {
            warn!("failed to mark '{}' as terminating: {}", self.name_any(), e);
        }
        ctx.metrics.set_phase(self, Phase::Terminating);

        recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: "DeleteRequested".into(),
                    note: Some(format!("Delete `{}`", self.name_any())),
                    action: "Deleting".into(),
                    secondary: None,
                },
                &self.object_ref(&()),
            )
            .await
            .map_err(|e| errors::Error::StdError(errors::StdError::KubeError(e)))?;
        Ok(Action::await_change())
    }
}

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(&self, client: Client, options: ControllerOptions) -> Result<Arc<Context>> {
        let metrics = metrics::Metrics::new()
            .and_then(|m| m.register(&self.registry))
            .map_err(|e| errors::Error::StdError(errors::StdError::MetricsError(e)))?;

        let collaborators = Collaborators {
            platform: Arc::new(KubePlatformClient::new(client.clone())),
            etcd: Arc::new(EtcdMaintenanceClient::new(options.http_timeout)?),
            meta_admin: Arc::new(MetaAdminClient::new(options.http_timeout)?),
            pipelines: Arc::new(PipelineHttpClient::new(options.http_timeout)?),
            options,
        };

        Ok(Arc::new(Context {
            client,
            metrics,
            diagnostics: self.diagnostics.clone(),
            collaborators,
        }))
    }
}

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: metrics::Metrics,
    /// Platform and HTTP clients used by the deployers
    pub collaborators: Collaborators,
}

pub async fn reconcile(cluster: Arc<GreptimeDBCluster>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = ctx.metrics.count_and_measure("cluster");
    ctx.diagnostics.write().await.last_event = Utc::now();

    let ns = cluster.namespace().unwrap_or_default(); // cluster is namespace scoped
    let clusters: Api<GreptimeDBCluster> = Api::namespaced(ctx.client.clone(), &ns);

    info!("Reconciling GreptimeDBCluster \"{}\" in {}", cluster.name_any(), ns);
    finalizer(&clusters, GREPTIMEDB_CLUSTER_FINALIZER, cluster.clone(), |event| async {
        match event {
            Finalizer::Apply(cluster) => cluster.reconcile(ctx.clone()).await,
            Finalizer::Cleanup(cluster) => cluster.cleanup(ctx.clone()).await,
        }
    })
    .await
    .map_err(|e| errors::Error::StdError(errors::StdError::FinalizerError(Box::new(e))))
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}
impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: "greptimedb-operator".into(),
        }
    }
}
impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }
}

fn error_policy(cluster: Arc<GreptimeDBCluster>, error: &errors::Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {:?}", error);
    ctx.metrics.reconcile_failure(&cluster, error);
    Action::requeue(requeue_after(error, ctx.collaborators.options.requeue_interval))
}

fn requeue_after(error: &errors::Error, requeue_interval: Duration) -> Duration {
    if error.is_transient() {
        return requeue_interval.min(TRANSIENT_REQUEUE);
    }
    requeue_interval
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State, options: ControllerOptions) -> Result<()> {
    let client = Client::try_default().await?;

    let clusters = Api::<GreptimeDBCluster>::all(client.clone());
    if let Err(e) = clusters.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        return Err(e.into());
    }

    let ctx = state.to_context(client.clone(), options)?;

    Controller::new(clusters, Config::default().any_semantic())
        .owns(Api::<StatefulSet>::all(client.clone()), watcher::Config::default())
        .owns(Api::<Deployment>::all(client.clone()), watcher::Config::default())
        .owns(Api::<Service>::all(client.clone()), watcher::Config::default())
        .owns(Api::<ConfigMap>::all(client.clone()), watcher::Config::default())
        .owns(
            Api::<GreptimeDBStandalone>::all(client.clone()),
            watcher::Config::default(),
        )
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}
