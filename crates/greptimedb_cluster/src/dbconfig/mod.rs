//! Synthesis of the TOML configuration file each GreptimeDB role reads at startup.
//!
//! Every role gets a [`RoleConfig`] built fresh from the cluster spec on each
//! reconcile. Structured fields are declared with [`toml_mapping!`], which ties
//! each field to the dotted key it occupies in the rendered document. The
//! user's raw `config` fragment is kept verbatim and merged at render time.

use sha2::{Digest, Sha256};
use toml::{Table, Value};

use crate::api::v1alpha1::common::ComponentSpec;
use crate::api::v1alpha1::greptimedbcluster::{
    DatanodeSpec, FlownodeSpec, FrontendSpec, GreptimeDBCluster, MetaSpec,
};
use crate::api::v1alpha1::RoleKind;
use crate::util::errors::{Result, StdError};

/// Declares a struct of optional fields, each bound to a dotted TOML key.
macro_rules! toml_mapping {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty => $path:literal, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: Option<$ty>, )*
        }

        impl $name {
            #[allow(dead_code)]
            pub const KEYS: &'static [&'static str] = &[$($path),*];

            pub fn write_to(&self, doc: &mut $crate::dbconfig::ConfigDocument) -> $crate::util::errors::Result<()> {
                $( doc.set_opt($path, self.$field.clone())?; )*
                Ok(())
            }
        }
    };
}

pub mod common;
pub mod datanode;
pub mod flownode;
pub mod frontend;
pub mod meta;

pub use common::SecretStore;

/// Name of the rendered file inside the role's ConfigMap.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Where the ConfigMap is mounted in the main container.
pub const CONFIG_DIR: &str = "/etc/greptimedb";

/// A TOML table addressed by dotted key paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument(Table);

impl ConfigDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let mut segments = path.split('.').peekable();
        let mut table = &mut self.0;
        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                table.insert(segment.to_string(), value.into());
                return Ok(());
            }
            let entry = table
                .entry(segment.to_string())
                .or_insert_with(|| Value::Table(Table::new()));
            table = match entry {
                Value::Table(t) => t,
                _ => {
                    return Err(StdError::ConfigRenderError(format!(
                        "key '{segment}' of '{path}' is not a table"
                    ))
                    .into())
                }
            };
        }
        Err(StdError::ConfigRenderError(format!("empty key path '{path}'")).into())
    }

    pub fn set_opt<V: Into<Value>>(&mut self, path: &str, value: Option<V>) -> Result<()> {
        match value {
            Some(v) => self.set(path, v),
            None => Ok(()),
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.0.get(first)?, |value, segment| value.as_table()?.get(segment))
    }

    /// Merges a raw TOML fragment over the document. Fragment values win on leaf collisions.
    pub fn merge(&mut self, fragment: &str) -> Result<()> {
        let overlay: Table = fragment
            .parse()
            .map_err(|e: toml::de::Error| StdError::ConfigRenderError(e.to_string()))?;
        merge_tables(&mut self.0, overlay);
        Ok(())
    }

    pub fn render(&self) -> Result<String> {
        toml::to_string(&self.0).map_err(|e| StdError::ConfigRenderError(e.to_string()).into())
    }
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => merge_tables(existing, incoming),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Hex sha256 of a rendered document. Stamped on pod templates to roll pods on config change.
pub fn config_hash(rendered: &str) -> String {
    hex::encode(Sha256::digest(rendered.as_bytes()))
}

/// The role spec a config or object set is generated for.
#[derive(Debug, Clone, Copy)]
pub enum ComponentRef<'a> {
    Meta(&'a MetaSpec),
    Datanode(&'a DatanodeSpec),
    Frontend(&'a FrontendSpec),
    Flownode(&'a FlownodeSpec),
}

impl<'a> ComponentRef<'a> {
    pub fn role(&self) -> RoleKind {
        match self {
            ComponentRef::Meta(_) => RoleKind::Meta,
            ComponentRef::Datanode(_) => RoleKind::Datanode,
            ComponentRef::Frontend(_) => RoleKind::Frontend,
            ComponentRef::Flownode(_) => RoleKind::Flownode,
        }
    }

    pub fn component(&self) -> &'a ComponentSpec {
        match self {
            ComponentRef::Meta(s) => &s.component,
            ComponentRef::Datanode(s) => &s.component,
            ComponentRef::Frontend(s) => &s.component,
            ComponentRef::Flownode(s) => &s.component,
        }
    }

    /// Group name for members of `datanodeGroups` / `frontendGroups`.
    pub fn group(&self) -> Option<&'a str> {
        match self {
            ComponentRef::Datanode(s) => s.name.as_deref(),
            ComponentRef::Frontend(s) => s.name.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RoleFields {
    Meta(meta::MetaConfig),
    Datanode(datanode::DatanodeConfig),
    Frontend(frontend::FrontendConfig),
    Flownode(flownode::FlownodeConfig),
}

/// Synthesized configuration of one role, consumed by the builder pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleConfig {
    pub fields: RoleFields,
    /// The user's `config` fragment, untouched.
    pub raw: Option<String>,
}

impl RoleConfig {
    pub fn from_cluster(
        cluster: &GreptimeDBCluster,
        component: ComponentRef<'_>,
        secrets: &SecretStore,
    ) -> Result<Self> {
        let fields = match component {
            ComponentRef::Meta(spec) => RoleFields::Meta(meta::MetaConfig::configure(cluster, spec, secrets)?),
            ComponentRef::Datanode(spec) => {
                RoleFields::Datanode(datanode::DatanodeConfig::configure(cluster, spec, secrets)?)
            }
            ComponentRef::Frontend(spec) => {
                RoleFields::Frontend(frontend::FrontendConfig::configure(cluster, spec)?)
            }
            ComponentRef::Flownode(spec) => {
                RoleFields::Flownode(flownode::FlownodeConfig::configure(cluster, spec)?)
            }
        };
        Ok(RoleConfig {
            fields,
            raw: component.component().config().map(str::to_string),
        })
    }

    pub fn document(&self) -> Result<ConfigDocument> {
        let mut doc = ConfigDocument::new();
        match &self.fields {
            RoleFields::Meta(c) => c.write_to(&mut doc)?,
            RoleFields::Datanode(c) => c.write_to(&mut doc)?,
            RoleFields::Frontend(c) => c.write_to(&mut doc)?,
            RoleFields::Flownode(c) => c.write_to(&mut doc)?,
        }
        if let Some(raw) = &self.raw {
            doc.merge(raw)?;
        }
        Ok(doc)
    }

    pub fn render(&self) -> Result<String> {
        self.document()?.render()
    }
}
