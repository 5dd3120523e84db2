use super::common::{LoggingConfig, SecretStore};
use super::ConfigDocument;
use crate::api::v1alpha1::greptimedbcluster::{GreptimeDBCluster, MetaSpec};
use crate::api::v1alpha1::storage::MetaBackend;
use crate::util::errors::Result;
use kube::ResourceExt;

toml_mapping! {
    pub struct MetaFields {
        bind_addr: String => "bind_addr",
        http_addr: String => "http.addr",
        backend: String => "backend",
        store_addrs: Vec<String> => "store_addrs",
        store_key_prefix: String => "store_key_prefix",
        meta_table_name: String => "meta_table_name",
        enable_region_failover: bool => "enable_region_failover",
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetaConfig {
    pub fields: MetaFields,
    pub logging: LoggingConfig,
}

impl MetaConfig {
    pub fn configure(cluster: &GreptimeDBCluster, spec: &MetaSpec, secrets: &SecretStore) -> Result<Self> {
        let namespace = cluster.namespace().unwrap_or_default();
        let mut fields = MetaFields {
            bind_addr: Some(format!("0.0.0.0:{}", spec.rpc_port)),
            http_addr: Some(format!("0.0.0.0:{}", spec.http_port)),
            enable_region_failover: Some(spec.enable_region_failover),
            store_key_prefix: spec.store_key_prefix.clone(),
            ..Default::default()
        };

        match spec.backend()? {
            Some(MetaBackend::Etcd(etcd)) => {
                fields.backend = Some(MetaBackend::Etcd(etcd).backend().to_string());
                fields.store_addrs = Some(etcd.endpoints.clone());
                if etcd.store_key_prefix.is_some() {
                    fields.store_key_prefix = etcd.store_key_prefix.clone();
                }
            }
            Some(backend @ MetaBackend::MySql(sql)) => {
                let (username, password) = credentials(&backend, &namespace, secrets)?;
                fields.backend = Some(backend.backend().to_string());
                fields.store_addrs = Some(vec![format!(
                    "mysql://{}:{}@{}:{}/{}",
                    username, password, sql.host, sql.port, sql.database
                )]);
                fields.meta_table_name = sql.table.clone();
            }
            Some(backend @ MetaBackend::PostgreSql(sql)) => {
                let (username, password) = credentials(&backend, &namespace, secrets)?;
                fields.backend = Some(backend.backend().to_string());
                fields.store_addrs = Some(vec![format!(
                    "password={} user={} host={} port={} dbname={}",
                    password, username, sql.host, sql.port, sql.database
                )]);
                fields.meta_table_name = sql.table.clone();
            }
            None if !spec.etcd_endpoints.is_empty() => {
                fields.backend = Some("etcd_store".to_string());
                fields.store_addrs = Some(spec.etcd_endpoints.clone());
            }
            None => {}
        }

        let mut logging = LoggingConfig::default();
        logging.configure(cluster.logging_for(&spec.component));

        Ok(MetaConfig { fields, logging })
    }

    pub fn write_to(&self, doc: &mut ConfigDocument) -> Result<()> {
        self.fields.write_to(doc)?;
        self.logging.write_to(doc)
    }
}

fn credentials(backend: &MetaBackend<'_>, namespace: &str, secrets: &SecretStore) -> Result<(String, String)> {
    let Some(reference) = backend.secret_ref(namespace) else {
        return Ok((String::new(), String::new()));
    };
    let mut values = secrets.lookup_strings(&reference)?.into_iter();
    Ok((values.next().unwrap_or_default(), values.next().unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::greptimedbcluster::GreptimeDBClusterSpec;
    use crate::api::v1alpha1::storage::{MetaBackendStorageSpec, SqlStorage};
    use crate::tests::fixtures::{cluster, secret};

    fn postgres_meta() -> MetaSpec {
        MetaSpec {
            rpc_port: 3002,
            http_port: 4000,
            backend_storage: Some(MetaBackendStorageSpec {
                postgresql: Some(SqlStorage {
                    host: "pg.default".into(),
                    port: 5432,
                    database: "meta".into(),
                    table: Some("greptime_metakv".into()),
                    credentials_secret_name: "pg-creds".into(),
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_postgres_backend_rendering() {
        let meta = postgres_meta();
        let cluster = cluster(GreptimeDBClusterSpec {
            meta: Some(meta.clone()),
            ..Default::default()
        });
        let mut secrets = SecretStore::default();
        secrets.insert(secret("default", "pg-creds", &[("username", "greptime"), ("password", "hunter2")]));

        let config = MetaConfig::configure(&cluster, &meta, &secrets).unwrap();
        assert_eq!(config.fields.backend.as_deref(), Some("postgres_store"));
        assert_eq!(
            config.fields.store_addrs,
            Some(vec!["password=hunter2 user=greptime host=pg.default port=5432 dbname=meta".to_string()])
        );
        assert_eq!(config.fields.meta_table_name.as_deref(), Some("greptime_metakv"));
    }

    #[test]
    fn test_missing_password_names_the_key() {
        let meta = postgres_meta();
        let cluster = cluster(GreptimeDBClusterSpec {
            meta: Some(meta.clone()),
            ..Default::default()
        });
        let mut secrets = SecretStore::default();
        secrets.insert(secret("default", "pg-creds", &[("username", "greptime")]));

        let err = MetaConfig::configure(&cluster, &meta, &secrets).unwrap_err();
        assert!(err.to_string().contains("'password'"), "{err}");
    }

    #[test]
    fn test_legacy_etcd_endpoints() {
        let meta = MetaSpec {
            etcd_endpoints: vec!["etcd.default:2379".into()],
            ..Default::default()
        };
        let cluster = cluster(GreptimeDBClusterSpec::default());
        let config = MetaConfig::configure(&cluster, &meta, &SecretStore::default()).unwrap();
        assert_eq!(config.fields.backend.as_deref(), Some("etcd_store"));
        assert_eq!(config.fields.store_addrs, Some(vec!["etcd.default:2379".to_string()]));
    }
}
