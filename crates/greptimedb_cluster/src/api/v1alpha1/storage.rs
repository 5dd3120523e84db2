use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::FileStorage;
use super::*;
use crate::validation::ValidationError;

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct S3Storage {
    pub bucket: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    /// Secret with `access-key-id` and `secret-access-key`.
    pub secret_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OssStorage {
    pub bucket: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub region: String,
    /// Secret with `access-key-id` and `access-key-secret`.
    pub secret_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GcsStorage {
    pub bucket: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub scope: String,
    /// Secret with `service-account-key`.
    pub secret_name: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AzBlobStorage {
    pub container: String,
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub endpoint: String,
    /// Secret with `account-name` and `account-key`.
    pub secret_name: Option<String>,
}

/// Object storage selector. At most one backend may be set.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectStorageProviderSpec {
    pub s3: Option<S3Storage>,
    pub oss: Option<OssStorage>,
    pub gcs: Option<GcsStorage>,
    pub azblob: Option<AzBlobStorage>,
    /// Local read cache in front of the object store.
    pub cache: Option<FileStorage>,
    pub cache_capacity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObjectStorage<'a> {
    S3(&'a S3Storage),
    Oss(&'a OssStorage),
    Gcs(&'a GcsStorage),
    AzBlob(&'a AzBlobStorage),
}

impl<'a> ObjectStorage<'a> {
    /// The value the database expects in `storage.type`.
    pub fn storage_type(&self) -> &'static str {
        match self {
            ObjectStorage::S3(_) => "S3",
            ObjectStorage::Oss(_) => "Oss",
            ObjectStorage::Gcs(_) => "Gcs",
            ObjectStorage::AzBlob(_) => "Azblob",
        }
    }

    pub fn secret_ref(&self, namespace: &str) -> Option<SecretReference> {
        let (name, keys): (&Option<String>, &'static [&'static str]) = match self {
            ObjectStorage::S3(s) => (&s.secret_name, &[ACCESS_KEY_ID_SECRET_KEY, SECRET_ACCESS_KEY_SECRET_KEY]),
            ObjectStorage::Oss(s) => (&s.secret_name, &[ACCESS_KEY_ID_SECRET_KEY, ACCESS_KEY_SECRET_SECRET_KEY]),
            ObjectStorage::Gcs(s) => (&s.secret_name, &[SERVICE_ACCOUNT_KEY]),
            ObjectStorage::AzBlob(s) => (&s.secret_name, &[ACCOUNT_NAME_SECRET_KEY, ACCOUNT_KEY_SECRET_KEY]),
        };
        name.as_deref()
            .filter(|n| !n.is_empty())
            .map(|n| SecretReference::new(namespace, n, keys))
    }
}

impl ObjectStorageProviderSpec {
    pub fn provider(&self) -> Result<Option<ObjectStorage<'_>>, ValidationError> {
        let mut set = Vec::with_capacity(1);
        if let Some(s3) = &self.s3 {
            set.push(ObjectStorage::S3(s3));
        }
        if let Some(oss) = &self.oss {
            set.push(ObjectStorage::Oss(oss));
        }
        if let Some(gcs) = &self.gcs {
            set.push(ObjectStorage::Gcs(gcs));
        }
        if let Some(azblob) = &self.azblob {
            set.push(ObjectStorage::AzBlob(azblob));
        }
        match set.len() {
            0 => Ok(None),
            1 => Ok(set.pop()),
            _ => Err(ValidationError::MultipleObjectStorageProviders),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RaftEngineWal {
    pub fs: Option<FileStorage>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KafkaWal {
    pub broker_endpoints: Vec<String>,
}

/// WAL selector. At most one provider may be set.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WalProviderSpec {
    pub raft_engine: Option<RaftEngineWal>,
    pub kafka: Option<KafkaWal>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WalProvider<'a> {
    RaftEngine(&'a RaftEngineWal),
    Kafka(&'a KafkaWal),
}

impl WalProviderSpec {
    pub fn provider(&self) -> Result<Option<WalProvider<'_>>, ValidationError> {
        match (&self.raft_engine, &self.kafka) {
            (Some(_), Some(_)) => Err(ValidationError::MultipleWalProviders),
            (Some(raft), None) => Ok(Some(WalProvider::RaftEngine(raft))),
            (None, Some(kafka)) => Ok(Some(WalProvider::Kafka(kafka))),
            (None, None) => Ok(None),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtcdStorage {
    pub endpoints: Vec<String>,
    pub store_key_prefix: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SqlStorage {
    pub host: String,
    pub port: i32,
    pub database: String,
    /// Table holding the metadata key-values.
    pub table: Option<String>,
    /// Secret with `username` and `password`.
    pub credentials_secret_name: String,
}

/// Meta backend selector. At most one backend may be set.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetaBackendStorageSpec {
    pub etcd: Option<EtcdStorage>,
    pub mysql: Option<SqlStorage>,
    pub postgresql: Option<SqlStorage>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetaBackend<'a> {
    Etcd(&'a EtcdStorage),
    MySql(&'a SqlStorage),
    PostgreSql(&'a SqlStorage),
}

impl<'a> MetaBackend<'a> {
    /// The value the meta server expects in `backend`.
    pub fn backend(&self) -> &'static str {
        match self {
            MetaBackend::Etcd(_) => "etcd_store",
            MetaBackend::MySql(_) => "mysql_store",
            MetaBackend::PostgreSql(_) => "postgres_store",
        }
    }

    pub fn secret_ref(&self, namespace: &str) -> Option<SecretReference> {
        match self {
            MetaBackend::Etcd(_) => None,
            MetaBackend::MySql(s) | MetaBackend::PostgreSql(s) => Some(SecretReference::new(
                namespace,
                &s.credentials_secret_name,
                &[META_DATABASE_USERNAME_KEY, META_DATABASE_PASSWORD_KEY],
            ))
            .filter(|r| !r.name.is_empty()),
        }
    }
}

impl MetaBackendStorageSpec {
    pub fn backend(&self) -> Result<Option<MetaBackend<'_>>, ValidationError> {
        let mut set = Vec::with_capacity(1);
        if let Some(etcd) = &self.etcd {
            set.push(MetaBackend::Etcd(etcd));
        }
        if let Some(mysql) = &self.mysql {
            set.push(MetaBackend::MySql(mysql));
        }
        if let Some(pg) = &self.postgresql {
            set.push(MetaBackend::PostgreSql(pg));
        }
        match set.len() {
            0 => Ok(None),
            1 => Ok(set.pop()),
            _ => Err(ValidationError::MultipleMetaBackendStorages),
        }
    }
}
