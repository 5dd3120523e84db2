pub mod fixtures {
    use std::collections::BTreeMap;

    use k8s_openapi::api::core::v1::Secret;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;

    use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterSpec};

    /// `default/basic` with a uid, so owner references can be built.
    pub fn cluster(spec: GreptimeDBClusterSpec) -> GreptimeDBCluster {
        let mut cluster = GreptimeDBCluster::new("basic", spec);
        cluster.metadata.namespace = Some("default".to_string());
        cluster.metadata.uid = Some("uid-basic".to_string());
        cluster.metadata.generation = Some(1);
        cluster
    }

    pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }
}

pub mod fakes {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus, StatefulSet, StatefulSetSpec, StatefulSetStatus};
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;
    use kube::ResourceExt;

    use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterStatus};
    use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandalone;
    use crate::clients::etcd::{EtcdMaintenance, EtcdStatus};
    use crate::clients::meta::MetaAdmin;
    use crate::clients::pipeline::PipelineClient;
    use crate::config::ControllerOptions;
    use crate::deployer::{ClusterObject, Collaborators};
    use crate::util::errors::{Result, StdError};
    use crate::util::k8s::PlatformClient;

    type Key = (String, String);

    fn key(namespace: &str, name: &str) -> Key {
        (namespace.to_string(), name.to_string())
    }

    /// In-memory platform. Objects are looked up by `(namespace, name)`.
    #[derive(Default)]
    pub struct FakePlatform {
        secrets: BTreeMap<Key, Secret>,
        crds: BTreeSet<String>,
        deployments: BTreeMap<Key, Deployment>,
        statefulsets: BTreeMap<Key, StatefulSet>,
        standalones: BTreeMap<Key, GreptimeDBStandalone>,
        applied: Mutex<Vec<ClusterObject>>,
        status_patches: Mutex<Vec<GreptimeDBClusterStatus>>,
        removed_annotations: Mutex<Vec<String>>,
        fail_status_patch: bool,
    }

    impl FakePlatform {
        pub fn with_secret(mut self, secret: Secret) -> Self {
            self.secrets
                .insert(key(&secret.namespace().unwrap_or_default(), &secret.name_any()), secret);
            self
        }

        pub fn with_crd(mut self, name: &str) -> Self {
            self.crds.insert(name.to_string());
            self
        }

        pub fn with_deployment(mut self, deployment: Deployment) -> Self {
            self.deployments.insert(
                key(&deployment.namespace().unwrap_or_default(), &deployment.name_any()),
                deployment,
            );
            self
        }

        pub fn with_statefulset(mut self, sts: StatefulSet) -> Self {
            self.statefulsets
                .insert(key(&sts.namespace().unwrap_or_default(), &sts.name_any()), sts);
            self
        }

        pub fn with_standalone(mut self, standalone: GreptimeDBStandalone) -> Self {
            self.standalones.insert(
                key(&standalone.namespace().unwrap_or_default(), &standalone.name_any()),
                standalone,
            );
            self
        }

        pub fn failing_status_patch(mut self) -> Self {
            self.fail_status_patch = true;
            self
        }

        pub fn applied(&self) -> Vec<ClusterObject> {
            self.applied.lock().unwrap().clone()
        }

        pub fn status_patches(&self) -> Vec<GreptimeDBClusterStatus> {
            self.status_patches.lock().unwrap().clone()
        }

        pub fn removed_annotations(&self) -> Vec<String> {
            self.removed_annotations.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlatformClient for FakePlatform {
        async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
            Ok(self.secrets.get(&key(namespace, name)).cloned())
        }

        async fn crd_exists(&self, name: &str) -> Result<bool, kube::Error> {
            Ok(self.crds.contains(name))
        }

        async fn get_deployment(&self, namespace: &str, name: &str) -> Result<Option<Deployment>, kube::Error> {
            Ok(self.deployments.get(&key(namespace, name)).cloned())
        }

        async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>, kube::Error> {
            Ok(self.statefulsets.get(&key(namespace, name)).cloned())
        }

        async fn get_standalone(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<GreptimeDBStandalone>, kube::Error> {
            Ok(self.standalones.get(&key(namespace, name)).cloned())
        }

        async fn apply(&self, object: &ClusterObject) -> Result<(), kube::Error> {
            self.applied.lock().unwrap().push(object.clone());
            Ok(())
        }

        async fn patch_cluster_status(
            &self,
            _cluster: &GreptimeDBCluster,
            status: &GreptimeDBClusterStatus,
        ) -> Result<(), kube::Error> {
            if self.fail_status_patch {
                return Err(kube::Error::Api(kube::core::ErrorResponse {
                    status: "Failure".to_string(),
                    message: "the server is currently unable to handle the request".to_string(),
                    reason: "ServiceUnavailable".to_string(),
                    code: 503,
                }));
            }
            self.status_patches.lock().unwrap().push(status.clone());
            Ok(())
        }

        async fn remove_cluster_annotation(&self, _cluster: &GreptimeDBCluster, key: &str) -> Result<(), kube::Error> {
            self.removed_annotations.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    fn meta(name: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            generation: Some(1),
            ..Default::default()
        }
    }

    pub fn ready_deployment(name: &str, replicas: i32) -> Deployment {
        Deployment {
            metadata: meta(name),
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                observed_generation: Some(1),
                replicas: Some(replicas),
                ready_replicas: Some(replicas),
                updated_replicas: Some(replicas),
                ..Default::default()
            }),
        }
    }

    pub fn ready_statefulset(name: &str, replicas: i32) -> StatefulSet {
        StatefulSet {
            metadata: meta(name),
            spec: Some(StatefulSetSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(StatefulSetStatus {
                observed_generation: Some(1),
                replicas,
                ready_replicas: Some(replicas),
                updated_replicas: Some(replicas),
                ..Default::default()
            }),
        }
    }

    pub struct FakeEtcd {
        errors: Vec<String>,
    }

    impl FakeEtcd {
        pub fn healthy() -> Self {
            Self { errors: vec![] }
        }

        pub fn with_errors(errors: &[&str]) -> Self {
            Self {
                errors: errors.iter().map(|e| e.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl EtcdMaintenance for FakeEtcd {
        async fn status(&self, _endpoint: &str) -> Result<EtcdStatus> {
            Ok(EtcdStatus {
                version: "3.5.9".to_string(),
                errors: self.errors.clone(),
            })
        }
    }

    /// Records every maintenance toggle.
    #[derive(Default)]
    pub struct FakeMetaAdmin {
        calls: Mutex<Vec<bool>>,
        fail: bool,
    }

    impl FakeMetaAdmin {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub fn calls(&self) -> Vec<bool> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetaAdmin for FakeMetaAdmin {
        async fn set_maintenance_mode(&self, _meta_url: &str, enable: bool) -> Result<()> {
            if self.fail {
                return Err(StdError::HttpError("connection refused".to_string()).into());
            }
            self.calls.lock().unwrap().push(enable);
            Ok(())
        }
    }

    /// Pipelines keyed by name. The first `failures` create calls fail with a connection error.
    #[derive(Default)]
    pub struct FakePipelines {
        existing: Mutex<BTreeMap<String, String>>,
        created: Mutex<Vec<(String, String)>>,
        base_urls: Mutex<Vec<String>>,
        failures: u32,
        attempts: AtomicU32,
    }

    impl FakePipelines {
        pub fn with_existing(self, name: &str) -> Self {
            self.existing
                .lock()
                .unwrap()
                .insert(name.to_string(), "processors: []".to_string());
            self
        }

        pub fn failing_creates(mut self, failures: u32) -> Self {
            self.failures = failures;
            self
        }

        pub fn created(&self) -> Vec<(String, String)> {
            self.created.lock().unwrap().clone()
        }

        pub fn base_urls(&self) -> Vec<String> {
            self.base_urls.lock().unwrap().clone()
        }

        pub fn create_attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PipelineClient for FakePipelines {
        async fn get_pipeline(&self, _base_url: &str, name: &str) -> Result<Option<String>> {
            Ok(self.existing.lock().unwrap().get(name).cloned())
        }

        async fn create_pipeline(&self, base_url: &str, name: &str, data: &str) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if attempt <= self.failures {
                return Err(StdError::HttpError(format!("{base_url}: connection refused")).into());
            }
            self.base_urls.lock().unwrap().push(base_url.to_string());
            self.created
                .lock()
                .unwrap()
                .push((name.to_string(), data.to_string()));
            self.existing
                .lock()
                .unwrap()
                .insert(name.to_string(), data.to_string());
            Ok(())
        }
    }

    /// Collaborators over `platform`, with healthy fakes for everything else.
    pub fn collaborators(platform: FakePlatform) -> Collaborators {
        Collaborators {
            platform: Arc::new(platform),
            etcd: Arc::new(FakeEtcd::healthy()),
            meta_admin: Arc::new(FakeMetaAdmin::default()),
            pipelines: Arc::new(FakePipelines::default()),
            options: ControllerOptions::default(),
        }
    }
}

mod integration {
    use kube::api::{Api, ObjectMeta, Patch, PatchParams};
    use kube::Client;

    use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, GreptimeDBClusterSpec, MetaSpec};
    use crate::controllers::cluster_controller::State;
    use crate::controllers::reconciler::ClusterReconciler;
    use crate::util::k8s::FIELD_MANAGER;

    #[tokio::test]
    #[ignore = "uses k8s current-context"]
    async fn integration_reconcile_should_set_status() {
        let client = Client::try_default().await.unwrap();
        let ctx = State::default().to_context(client.clone(), Default::default()).unwrap();

        let cluster = GreptimeDBCluster {
            metadata: ObjectMeta {
                name: Some("test-cluster".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: GreptimeDBClusterSpec {
                meta: Some(MetaSpec {
                    etcd_endpoints: vec!["etcd.default:2379".to_string()],
                    ..Default::default()
                }),
                ..Default::default()
            },
            status: None,
        };

        let clusters: Api<GreptimeDBCluster> = Api::namespaced(client.clone(), "default");
        let applied = clusters
            .patch(
                "test-cluster",
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&cluster),
            )
            .await
            .unwrap();

        ClusterReconciler::from_collaborators(&ctx.collaborators)
            .reconcile(&applied)
            .await
            .unwrap();

        let output = clusters.get("test-cluster").await.unwrap();
        assert!(output.status.is_some_and(|s| s.cluster_phase.is_some()));
    }
}
