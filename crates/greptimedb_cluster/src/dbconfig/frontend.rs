use super::common::{LoggingConfig, MetaClientConfig};
use super::ConfigDocument;
use crate::api::v1alpha1::greptimedbcluster::{FrontendSpec, GreptimeDBCluster};
use crate::util::errors::Result;

/// Mount point of the frontend TLS secret.
pub const TLS_DIR: &str = "/etc/greptimedb/frontend-tls";

toml_mapping! {
    pub struct FrontendFields {
        http_addr: String => "http.addr",
        grpc_bind_addr: String => "grpc.bind_addr",
        mysql_addr: String => "mysql.addr",
        postgres_addr: String => "postgres.addr",
    }
}

toml_mapping! {
    pub struct TlsConfig {
        grpc_mode: String => "grpc.tls.mode",
        grpc_cert_path: String => "grpc.tls.cert_path",
        grpc_key_path: String => "grpc.tls.key_path",
        mysql_mode: String => "mysql.tls.mode",
        mysql_cert_path: String => "mysql.tls.cert_path",
        mysql_key_path: String => "mysql.tls.key_path",
        postgres_mode: String => "postgres.tls.mode",
        postgres_cert_path: String => "postgres.tls.cert_path",
        postgres_key_path: String => "postgres.tls.key_path",
    }
}

impl TlsConfig {
    fn require(cert_path: String, key_path: String) -> Self {
        let mode = Some("require".to_string());
        TlsConfig {
            grpc_mode: mode.clone(),
            grpc_cert_path: Some(cert_path.clone()),
            grpc_key_path: Some(key_path.clone()),
            mysql_mode: mode.clone(),
            mysql_cert_path: Some(cert_path.clone()),
            mysql_key_path: Some(key_path.clone()),
            postgres_mode: mode,
            postgres_cert_path: Some(cert_path),
            postgres_key_path: Some(key_path),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontendConfig {
    pub fields: FrontendFields,
    pub meta_client: MetaClientConfig,
    pub tls: TlsConfig,
    pub logging: LoggingConfig,
}

impl FrontendConfig {
    pub fn configure(cluster: &GreptimeDBCluster, spec: &FrontendSpec) -> Result<Self> {
        let ports = &cluster.spec;
        let mut config = FrontendConfig {
            fields: FrontendFields {
                http_addr: Some(format!("0.0.0.0:{}", ports.http_port)),
                grpc_bind_addr: Some(format!("0.0.0.0:{}", ports.rpc_port)),
                mysql_addr: Some(format!("0.0.0.0:{}", ports.mysql_port)),
                postgres_addr: Some(format!("0.0.0.0:{}", ports.postgresql_port)),
            },
            ..Default::default()
        };

        config.meta_client.configure(cluster);

        if spec.tls.as_ref().is_some_and(|t| !t.secret_name.is_empty()) {
            config.tls = TlsConfig::require(format!("{TLS_DIR}/tls.crt"), format!("{TLS_DIR}/tls.key"));
        }

        config.logging.configure(cluster.logging_for(&spec.component));

        Ok(config)
    }

    pub fn write_to(&self, doc: &mut ConfigDocument) -> Result<()> {
        self.fields.write_to(doc)?;
        self.meta_client.write_to(doc)?;
        self.tls.write_to(doc)?;
        self.logging.write_to(doc)
    }
}
