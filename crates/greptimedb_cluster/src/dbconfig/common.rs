use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::warn;

use crate::api::v1alpha1::common::LoggingSpec;
use crate::api::v1alpha1::greptimedbcluster::GreptimeDBCluster;
use crate::api::v1alpha1::storage::{ObjectStorage, ObjectStorageProviderSpec, WalProvider, WalProviderSpec};
use crate::api::v1alpha1::{RoleKind, SecretReference, DEFAULT_META_RPC_PORT};
use crate::util::errors::{Result, StdError};
use crate::util::k8s::PlatformClient;
use crate::validation::check::{secret_values, CheckError};

/// Secrets read once per reconcile pass. Never carried over to the next pass.
#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    secrets: BTreeMap<(String, String), Secret>,
}

impl SecretStore {
    /// Reads every referenced secret. Missing secrets are left out so lookups fail with a named error.
    pub async fn fetch(client: &dyn PlatformClient, refs: &[SecretReference]) -> Result<Self> {
        let mut store = SecretStore::default();
        for reference in refs {
            let secret = client
                .get_secret(&reference.namespace, &reference.name)
                .await
                .map_err(|e| StdError::CheckFailed(CheckError::Client(e)))?;
            if let Some(secret) = secret {
                store.insert(secret);
            }
        }
        Ok(store)
    }

    pub fn insert(&mut self, secret: Secret) {
        let key = (secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.insert(key, secret);
    }

    /// Values of `reference.keys`, in order.
    pub fn lookup(&self, reference: &SecretReference) -> Result<Vec<Vec<u8>>> {
        let secret = self
            .secrets
            .get(&(reference.namespace.clone(), reference.name.clone()));
        Ok(secret_values(secret, reference)?)
    }

    pub fn lookup_strings(&self, reference: &SecretReference) -> Result<Vec<String>> {
        let mut strings = Vec::with_capacity(reference.keys.len());
        for (bytes, key) in self.lookup(reference)?.into_iter().zip(reference.keys) {
            let value = String::from_utf8(bytes).map_err(|_| {
                StdError::ConfigRenderError(format!(
                    "key '{key}' of secret '{}/{}' is not valid UTF-8",
                    reference.namespace, reference.name
                ))
            })?;
            strings.push(value);
        }
        Ok(strings)
    }
}

toml_mapping! {
    pub struct StorageConfig {
        storage_type: String => "storage.type",
        data_home: String => "storage.data_home",
        access_key_id: String => "storage.access_key_id",
        secret_access_key: String => "storage.secret_access_key",
        access_key_secret: String => "storage.access_key_secret",
        account_name: String => "storage.account_name",
        account_key: String => "storage.account_key",
        bucket: String => "storage.bucket",
        container: String => "storage.container",
        root: String => "storage.root",
        region: String => "storage.region",
        endpoint: String => "storage.endpoint",
        scope: String => "storage.scope",
        credential: String => "storage.credential",
        cache_path: String => "storage.cache_path",
        cache_capacity: String => "storage.cache_capacity",
    }
}

fn non_empty(s: &str) -> Option<String> {
    Some(s.to_string()).filter(|s| !s.is_empty())
}

impl StorageConfig {
    pub fn configure_object_storage(
        &mut self,
        namespace: &str,
        spec: &ObjectStorageProviderSpec,
        secrets: &SecretStore,
    ) -> Result<()> {
        if let Some(cache) = &spec.cache {
            self.cache_path = non_empty(&cache.mount_path);
        }
        self.cache_capacity = spec.cache_capacity.clone();

        let Some(provider) = spec.provider()? else {
            return Ok(());
        };
        self.storage_type = Some(provider.storage_type().to_string());

        let credentials = provider.secret_ref(namespace);

        match provider {
            ObjectStorage::S3(s3) => {
                self.bucket = Some(s3.bucket.clone());
                self.root = non_empty(&s3.root);
                self.endpoint = non_empty(&s3.endpoint);
                self.region = non_empty(&s3.region);
                if let Some(reference) = &credentials {
                    let mut values = secrets.lookup_strings(reference)?.into_iter();
                    self.access_key_id = values.next();
                    self.secret_access_key = values.next();
                }
            }
            ObjectStorage::Oss(oss) => {
                self.bucket = Some(oss.bucket.clone());
                self.root = non_empty(&oss.root);
                self.endpoint = non_empty(&oss.endpoint);
                self.region = non_empty(&oss.region);
                if let Some(reference) = &credentials {
                    let mut values = secrets.lookup_strings(reference)?.into_iter();
                    self.access_key_id = values.next();
                    self.access_key_secret = values.next();
                }
            }
            ObjectStorage::Gcs(gcs) => {
                self.bucket = Some(gcs.bucket.clone());
                self.root = non_empty(&gcs.root);
                self.endpoint = non_empty(&gcs.endpoint);
                self.scope = non_empty(&gcs.scope);
                // The service account JSON is passed base64 encoded.
                if let Some(reference) = &credentials {
                    self.credential = secrets
                        .lookup(reference)?
                        .into_iter()
                        .next()
                        .filter(|key| !key.is_empty())
                        .map(|key| STANDARD.encode(key));
                }
            }
            ObjectStorage::AzBlob(azblob) => {
                self.container = Some(azblob.container.clone());
                self.root = non_empty(&azblob.root);
                self.endpoint = non_empty(&azblob.endpoint);
                if let Some(reference) = &credentials {
                    let mut values = secrets.lookup_strings(reference)?.into_iter();
                    self.account_name = values.next();
                    self.account_key = values.next();
                }
            }
        }
        Ok(())
    }
}

toml_mapping! {
    pub struct WalConfig {
        dir: String => "wal.dir",
        provider: String => "wal.provider",
        broker_endpoints: Vec<String> => "wal.broker_endpoints",
    }
}

impl WalConfig {
    /// Kafka wins over `walDir`; a local directory only applies to the raft-engine WAL.
    pub fn configure(&mut self, wal: Option<&WalProviderSpec>, wal_dir: Option<&str>) -> Result<()> {
        let provider = match wal {
            Some(spec) => spec.provider()?,
            None => None,
        };
        match provider {
            Some(WalProvider::Kafka(kafka)) => {
                self.provider = Some("kafka".to_string());
                self.broker_endpoints = Some(kafka.broker_endpoints.clone());
            }
            Some(WalProvider::RaftEngine(_)) | None => {
                self.dir = wal_dir.and_then(non_empty);
            }
        }
        Ok(())
    }
}

toml_mapping! {
    pub struct LoggingConfig {
        dir: String => "logging.dir",
        level: String => "logging.level",
        log_format: String => "logging.log_format",
        enable_slow_query: bool => "logging.slow_query.enable",
        slow_query_threshold: String => "logging.slow_query.threshold",
        slow_query_sample_ratio: f64 => "logging.slow_query.sample_ratio",
    }
}

impl LoggingConfig {
    pub fn configure(&mut self, spec: Option<&LoggingSpec>) {
        let Some(spec) = spec else {
            return;
        };

        self.dir = if spec.only_log_to_stdout {
            None
        } else {
            non_empty(&spec.logs_dir)
        };
        self.level = Some(level_with_filters(spec.level.as_str(), &spec.filters));
        self.log_format = Some(spec.format.as_str().to_string());

        if let Some(slow_query) = &spec.slow_query {
            self.enable_slow_query = Some(slow_query.enabled);
            self.slow_query_threshold = Some(slow_query.threshold.clone());
            self.slow_query_sample_ratio = Some(parse_sample_ratio(&slow_query.sample_ratio));
        }
    }
}

/// `info` with `["mito2=debug"]` gives `info,mito2=debug`.
pub fn level_with_filters(level: &str, filters: &[String]) -> String {
    if filters.is_empty() {
        level.to_string()
    } else {
        format!("{},{}", level, filters.join(","))
    }
}

/// Parses the slow query sample ratio, degrading to 1.0 on garbage.
pub fn parse_sample_ratio(raw: &str) -> f64 {
    match raw.trim().parse::<f64>() {
        Ok(ratio) => ratio,
        Err(e) => {
            warn!(
                sample_ratio = %raw,
                error = %e,
                "failed to parse slow query sample ratio, using the default value 1.0"
            );
            1.0
        }
    }
}

toml_mapping! {
    pub struct MetaClientConfig {
        metasrv_addrs: Vec<String> => "meta_client.metasrv_addrs",
    }
}

impl MetaClientConfig {
    pub fn configure(&mut self, cluster: &GreptimeDBCluster) {
        let port = cluster
            .spec
            .meta
            .as_ref()
            .map_or(DEFAULT_META_RPC_PORT, |m| m.rpc_port);
        self.metasrv_addrs = Some(vec![format!(
            "{}.{}.svc.cluster.local:{}",
            cluster.resource_name(RoleKind::Meta, None),
            cluster.namespace().unwrap_or_default(),
            port
        )]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::common::{LoggingLevel, SlowQuery};
    use crate::api::v1alpha1::storage::{GcsStorage, KafkaWal, S3Storage};
    use crate::tests::fixtures::secret;

    #[test]
    fn test_level_with_filters() {
        let filters = vec!["mito2=debug".to_string(), "index=warn".to_string()];
        assert_eq!(level_with_filters("info", &filters), "info,mito2=debug,index=warn");
        assert_eq!(level_with_filters("warn", &[]), "warn");
    }

    #[test]
    fn test_bad_sample_ratio_defaults_to_one() {
        assert_eq!(parse_sample_ratio("abc"), 1.0);
        assert_eq!(parse_sample_ratio("0.25"), 0.25);
    }

    #[test]
    fn test_logging_stdout_only_omits_dir() {
        let mut logging = LoggingConfig::default();
        logging.configure(Some(&LoggingSpec {
            level: LoggingLevel::Debug,
            only_log_to_stdout: true,
            slow_query: Some(SlowQuery {
                enabled: true,
                threshold: "5s".into(),
                sample_ratio: "abc".into(),
            }),
            ..Default::default()
        }));
        assert_eq!(logging.dir, None);
        assert_eq!(logging.level.as_deref(), Some("debug"));
        assert_eq!(logging.slow_query_sample_ratio, Some(1.0));
        assert_eq!(logging.enable_slow_query, Some(true));
    }

    #[test]
    fn test_wal_dir_ignored_with_kafka() {
        let spec = WalProviderSpec {
            kafka: Some(KafkaWal {
                broker_endpoints: vec!["kafka:9092".into()],
            }),
            ..Default::default()
        };
        let mut wal = WalConfig::default();
        wal.configure(Some(&spec), Some("/wal")).unwrap();
        assert_eq!(wal.dir, None);
        assert_eq!(wal.provider.as_deref(), Some("kafka"));

        let mut wal = WalConfig::default();
        wal.configure(None, Some("/wal")).unwrap();
        assert_eq!(wal.dir.as_deref(), Some("/wal"));
    }

    #[test]
    fn test_s3_credentials_from_secret() {
        let mut secrets = SecretStore::default();
        secrets.insert(secret(
            "default",
            "s3-creds",
            &[("access-key-id", "AKID"), ("secret-access-key", "SECRET")],
        ));
        let spec = ObjectStorageProviderSpec {
            s3: Some(S3Storage {
                bucket: "greptime".into(),
                region: "us-west-2".into(),
                secret_name: Some("s3-creds".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut storage = StorageConfig::default();
        storage.configure_object_storage("default", &spec, &secrets).unwrap();
        assert_eq!(storage.storage_type.as_deref(), Some("S3"));
        assert_eq!(storage.access_key_id.as_deref(), Some("AKID"));
        assert_eq!(storage.secret_access_key.as_deref(), Some("SECRET"));
        assert_eq!(storage.root, None);
    }

    #[test]
    fn test_gcs_credential_is_base64() {
        let mut secrets = SecretStore::default();
        secrets.insert(secret("default", "gcs-creds", &[("service-account-key", "{}")]));
        let spec = ObjectStorageProviderSpec {
            gcs: Some(GcsStorage {
                bucket: "b".into(),
                scope: "https://www.googleapis.com/auth/devstorage.read_write".into(),
                secret_name: Some("gcs-creds".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut storage = StorageConfig::default();
        storage.configure_object_storage("default", &spec, &secrets).unwrap();
        assert_eq!(storage.storage_type.as_deref(), Some("Gcs"));
        assert_eq!(storage.credential.as_deref(), Some("e30="));
    }

    #[test]
    fn test_missing_secret_fails_synthesis() {
        let spec = ObjectStorageProviderSpec {
            s3: Some(S3Storage {
                secret_name: Some("absent".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = StorageConfig::default()
            .configure_object_storage("default", &spec, &SecretStore::default())
            .unwrap_err();
        assert!(err.to_string().contains("absent"));
    }
}
