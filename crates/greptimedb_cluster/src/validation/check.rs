//! Checks of a spec against live platform state: referenced secrets and optional CRDs.

use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use thiserror::Error;
use tracing::debug;

use crate::api::v1alpha1::greptimedbcluster::GreptimeDBCluster;
use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandalone;
use crate::api::v1alpha1::podmonitor::POD_MONITOR_CRD_NAME;
use crate::api::v1alpha1::{SecretReference, TLS_CRT_SECRET_KEY, TLS_KEY_SECRET_KEY};
use crate::util::k8s::PlatformClient;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("secret '{namespace}/{name}' not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("the data of secret '{namespace}/{name}' is empty")]
    SecretDataEmpty { namespace: String, name: String },

    #[error("secret '{namespace}/{name}' does not have key '{key}'")]
    SecretKeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("the crd '{0}' is not installed")]
    CrdMissing(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(#[source] ValidationError),

    #[error("failed to query the platform: {0}")]
    Client(#[source] kube::Error),
}

impl From<ValidationError> for CheckError {
    fn from(e: ValidationError) -> Self {
        CheckError::InvalidSpec(e)
    }
}

/// The values of `reference.keys`, in order, or an error naming what is missing.
pub fn secret_values(secret: Option<&Secret>, reference: &SecretReference) -> Result<Vec<Vec<u8>>, CheckError> {
    let Some(secret) = secret else {
        return Err(CheckError::SecretNotFound {
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        });
    };
    let Some(data) = secret.data.as_ref() else {
        return Err(CheckError::SecretDataEmpty {
            namespace: reference.namespace.clone(),
            name: reference.name.clone(),
        });
    };

    reference
        .keys
        .iter()
        .map(|key| {
            data.get(*key)
                .map(|v| v.0.clone())
                .ok_or_else(|| CheckError::SecretKeyMissing {
                    namespace: reference.namespace.clone(),
                    name: reference.name.clone(),
                    key: key.to_string(),
                })
        })
        .collect()
}

async fn check_secret(client: &dyn PlatformClient, reference: &SecretReference) -> Result<(), CheckError> {
    debug!("Checking secret '{}/{}'", reference.namespace, reference.name);
    let secret = client
        .get_secret(&reference.namespace, &reference.name)
        .await
        .map_err(CheckError::Client)?;
    secret_values(secret.as_ref(), reference)?;
    Ok(())
}

async fn check_crd(client: &dyn PlatformClient, name: &str) -> Result<(), CheckError> {
    if client.crd_exists(name).await.map_err(CheckError::Client)? {
        Ok(())
    } else {
        Err(CheckError::CrdMissing(name.to_string()))
    }
}

/// Verifies every secret the cluster references and, when scraping is on, the PodMonitor CRD.
pub async fn check_cluster(cluster: &GreptimeDBCluster, client: &dyn PlatformClient) -> Result<(), CheckError> {
    let references = cluster.secret_references()?;

    // TLS first, then the scrape integration, then storage and database credentials.
    let (tls, credentials): (Vec<_>, Vec<_>) = references
        .into_iter()
        .partition(|r| r.keys == [TLS_CRT_SECRET_KEY, TLS_KEY_SECRET_KEY]);

    for reference in &tls {
        check_secret(client, reference).await?;
    }

    if cluster.prometheus_monitor_enabled() {
        check_crd(client, POD_MONITOR_CRD_NAME).await?;
    }

    for reference in &credentials {
        check_secret(client, reference).await?;
    }

    Ok(())
}

pub async fn check_standalone(
    standalone: &GreptimeDBStandalone,
    client: &dyn PlatformClient,
) -> Result<(), CheckError> {
    let namespace = standalone.namespace().unwrap_or_default();
    let spec = &standalone.spec;

    if let Some(tls) = spec.tls.as_ref().filter(|t| !t.secret_name.is_empty()) {
        let reference = SecretReference::new(
            &namespace,
            &tls.secret_name,
            &[TLS_CRT_SECRET_KEY, TLS_KEY_SECRET_KEY],
        );
        check_secret(client, &reference).await?;
    }

    if spec.prometheus_monitor.as_ref().is_some_and(|p| p.enabled) {
        check_crd(client, POD_MONITOR_CRD_NAME).await?;
    }

    if let Some(storage) = &spec.object_storage {
        if let Some(reference) = storage.provider()?.and_then(|p| p.secret_ref(&namespace)) {
            check_secret(client, &reference).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::common::{PrometheusMonitorSpec, TlsSpec};
    use crate::api::v1alpha1::greptimedbcluster::{FrontendSpec, GreptimeDBClusterSpec, MetaSpec};
    use crate::api::v1alpha1::storage::{MetaBackendStorageSpec, SqlStorage};
    use crate::tests::fakes::FakePlatform;
    use crate::tests::fixtures::{cluster, secret};

    fn mysql_cluster() -> GreptimeDBCluster {
        cluster(GreptimeDBClusterSpec {
            meta: Some(MetaSpec {
                backend_storage: Some(MetaBackendStorageSpec {
                    mysql: Some(SqlStorage {
                        host: "mysql.default".into(),
                        port: 3306,
                        database: "meta".into(),
                        credentials_secret_name: "mysql-creds".into(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_missing_password_is_named() {
        let platform = FakePlatform::default().with_secret(secret("default", "mysql-creds", &[("username", "root")]));
        let err = check_cluster(&mysql_cluster(), &platform).await.unwrap_err();
        assert!(matches!(&err, CheckError::SecretKeyMissing { key, .. } if key == "password"));
        assert_eq!(
            err.to_string(),
            "secret 'default/mysql-creds' does not have key 'password'"
        );
    }

    #[tokio::test]
    async fn test_missing_secret_is_named() {
        let platform = FakePlatform::default();
        let err = check_cluster(&mysql_cluster(), &platform).await.unwrap_err();
        assert_eq!(err.to_string(), "secret 'default/mysql-creds' not found");
    }

    #[tokio::test]
    async fn test_complete_secret_passes() {
        let platform = FakePlatform::default().with_secret(secret(
            "default",
            "mysql-creds",
            &[("username", "root"), ("password", "hunter2")],
        ));
        assert!(check_cluster(&mysql_cluster(), &platform).await.is_ok());
    }

    #[test]
    fn test_secret_without_data() {
        let reference = SecretReference::new("default", "empty", &["username"]);
        let secret = Secret::default();
        let err = secret_values(Some(&secret), &reference).unwrap_err();
        assert_eq!(err.to_string(), "the data of secret 'default/empty' is empty");
    }

    #[tokio::test]
    async fn test_pod_monitor_crd_required_when_enabled() {
        let mut c = cluster(GreptimeDBClusterSpec {
            prometheus_monitor: Some(PrometheusMonitorSpec {
                enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        });
        let err = check_cluster(&c, &FakePlatform::default()).await.unwrap_err();
        assert!(matches!(err, CheckError::CrdMissing(ref name) if name == POD_MONITOR_CRD_NAME));

        let platform = FakePlatform::default().with_crd(POD_MONITOR_CRD_NAME);
        assert!(check_cluster(&c, &platform).await.is_ok());

        c.spec.prometheus_monitor = None;
        assert!(check_cluster(&c, &FakePlatform::default()).await.is_ok());
    }

    #[tokio::test]
    async fn test_tls_checked_before_credentials() {
        let mut c = mysql_cluster();
        c.spec.frontend = Some(FrontendSpec {
            tls: Some(TlsSpec {
                secret_name: "frontend-tls".into(),
            }),
            ..Default::default()
        });
        let err = check_cluster(&c, &FakePlatform::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "secret 'default/frontend-tls' not found");
    }
}
