use core::fmt;
use std::fmt::Display;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod common;
pub mod greptimedbcluster;
pub mod greptimedbstandalone;
pub mod podmonitor;
pub mod storage;

pub const API_GROUP: &str = "greptime.io";
pub const API_VERSION: &str = "greptime.io/v1alpha1";

// Keys a referenced secret must carry, per secret kind.
pub const TLS_CRT_SECRET_KEY: &str = "tls.crt";
pub const TLS_KEY_SECRET_KEY: &str = "tls.key";
pub const ACCESS_KEY_ID_SECRET_KEY: &str = "access-key-id";
pub const SECRET_ACCESS_KEY_SECRET_KEY: &str = "secret-access-key";
pub const ACCESS_KEY_SECRET_SECRET_KEY: &str = "access-key-secret";
pub const SERVICE_ACCOUNT_KEY: &str = "service-account-key";
pub const ACCOUNT_NAME_SECRET_KEY: &str = "account-name";
pub const ACCOUNT_KEY_SECRET_KEY: &str = "account-key";
pub const META_DATABASE_USERNAME_KEY: &str = "username";
pub const META_DATABASE_PASSWORD_KEY: &str = "password";

pub const DEFAULT_HTTP_PORT: i32 = 4000;
pub const DEFAULT_RPC_PORT: i32 = 4001;
pub const DEFAULT_MYSQL_PORT: i32 = 4002;
pub const DEFAULT_POSTGRESQL_PORT: i32 = 4003;
pub const DEFAULT_META_RPC_PORT: i32 = 3002;
pub const DEFAULT_IMAGE: &str = "greptime/greptimedb:latest";
pub const DEFAULT_VECTOR_IMAGE: &str = "timberio/vector:nightly-alpine";

/// The functional part of a cluster a set of objects belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Meta,
    Datanode,
    Frontend,
    Flownode,
    Standalone,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Meta => "meta",
            RoleKind::Datanode => "datanode",
            RoleKind::Frontend => "frontend",
            RoleKind::Flownode => "flownode",
            RoleKind::Standalone => "standalone",
        }
    }
}

impl Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle phase of a cluster or standalone instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Phase {
    Starting,
    Running,
    Updating,
    Error,
    Terminating,
}

impl Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::Starting => write!(f, "Starting"),
            Phase::Running => write!(f, "Running"),
            Phase::Updating => write!(f, "Updating"),
            Phase::Error => write!(f, "Error"),
            Phase::Terminating => write!(f, "Terminating"),
        }
    }
}

/// A secret the cluster depends on, with the keys it must contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretReference {
    pub namespace: String,
    pub name: String,
    pub keys: &'static [&'static str],
}

impl SecretReference {
    pub fn new(namespace: &str, name: &str, keys: &'static [&'static str]) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            keys,
        }
    }
}

pub fn conditions_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
    serde_json::from_value(serde_json::json!({
        "type": "array",
        "x-kubernetes-list-type": "map",
        "x-kubernetes-list-map-keys": ["type"],
        "items": {
            "type": "object",
            "properties": {
                "lastTransitionTime": { "format": "date-time", "type": "string" },
                "message": { "type": "string" },
                "observedGeneration": { "type": "integer", "format": "int64", "default": 0 },
                "reason": { "type": "string" },
                "status": { "type": "string" },
                "type": { "type": "string" }
            },
            "required": [
                "lastTransitionTime",
                "message",
                "reason",
                "status",
                "type"
            ],
        },
    }))
    .unwrap_or(schemars::schema::Schema::Bool(true))
}
