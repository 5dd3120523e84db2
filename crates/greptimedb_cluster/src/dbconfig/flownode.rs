use super::common::{LoggingConfig, MetaClientConfig};
use super::ConfigDocument;
use crate::api::v1alpha1::greptimedbcluster::{FlownodeSpec, GreptimeDBCluster};
use crate::util::errors::Result;

toml_mapping! {
    pub struct FlownodeFields {
        rpc_bind_addr: String => "grpc.bind_addr",
        http_addr: String => "http.addr",
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlownodeConfig {
    pub fields: FlownodeFields,
    pub meta_client: MetaClientConfig,
    pub logging: LoggingConfig,
}

impl FlownodeConfig {
    pub fn configure(cluster: &GreptimeDBCluster, spec: &FlownodeSpec) -> Result<Self> {
        let mut config = FlownodeConfig {
            fields: FlownodeFields {
                rpc_bind_addr: Some(format!("0.0.0.0:{}", spec.rpc_port)),
                http_addr: Some(format!("0.0.0.0:{}", spec.http_port)),
            },
            ..Default::default()
        };
        config.meta_client.configure(cluster);
        config.logging.configure(cluster.logging_for(&spec.component));
        Ok(config)
    }

    pub fn write_to(&self, doc: &mut ConfigDocument) -> Result<()> {
        self.fields.write_to(doc)?;
        self.meta_client.write_to(doc)?;
        self.logging.write_to(doc)
    }
}
