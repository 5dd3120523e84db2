use super::common::{LoggingConfig, MetaClientConfig, SecretStore, StorageConfig, WalConfig};
use super::ConfigDocument;
use crate::api::v1alpha1::greptimedbcluster::{DatanodeSpec, GreptimeDBCluster};
use crate::util::errors::Result;
use kube::ResourceExt;

// node_id and grpc.server_addr differ per pod and are passed on the command line.
toml_mapping! {
    pub struct DatanodeFields {
        rpc_bind_addr: String => "grpc.bind_addr",
        http_addr: String => "http.addr",
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatanodeConfig {
    pub fields: DatanodeFields,
    pub meta_client: MetaClientConfig,
    pub storage: StorageConfig,
    pub wal: WalConfig,
    pub logging: LoggingConfig,
}

impl DatanodeConfig {
    pub fn configure(cluster: &GreptimeDBCluster, spec: &DatanodeSpec, secrets: &SecretStore) -> Result<Self> {
        let mut config = DatanodeConfig {
            fields: DatanodeFields {
                rpc_bind_addr: Some(format!("0.0.0.0:{}", spec.rpc_port)),
                http_addr: Some(format!("0.0.0.0:{}", spec.http_port)),
            },
            ..Default::default()
        };

        config.meta_client.configure(cluster);

        if let Some(object_storage) = &cluster.spec.object_storage {
            config.storage.configure_object_storage(
                &cluster.namespace().unwrap_or_default(),
                object_storage,
                secrets,
            )?;
        }

        if let Some(storage) = spec.storage.as_ref().filter(|s| !s.data_home.is_empty()) {
            config.storage.data_home = Some(storage.data_home.clone());
        }

        config
            .wal
            .configure(cluster.spec.wal.as_ref(), cluster.spec.wal_dir.as_deref())?;

        config.logging.configure(cluster.logging_for(&spec.component));

        Ok(config)
    }

    pub fn write_to(&self, doc: &mut ConfigDocument) -> Result<()> {
        self.fields.write_to(doc)?;
        self.meta_client.write_to(doc)?;
        self.storage.write_to(doc)?;
        self.wal.write_to(doc)?;
        self.logging.write_to(doc)
    }
}
