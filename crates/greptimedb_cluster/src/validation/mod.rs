//! Structural validation of cluster and standalone specs. No I/O.

pub mod check;

use std::collections::HashSet;

use thiserror::Error;

use crate::api::v1alpha1::common::{ComponentSpec, FileStorage};
use crate::api::v1alpha1::greptimedbcluster::GreptimeDBCluster;
use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandalone;
use crate::api::v1alpha1::storage::{ObjectStorageProviderSpec, WalProvider, WalProviderSpec};
use crate::api::v1alpha1::RoleKind;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("invalid {role} toml config: {source}")]
    InvalidConfigSyntax {
        role: RoleKind,
        #[source]
        source: toml::de::Error,
    },

    #[error("the {0} group name must be specified")]
    MissingGroupName(RoleKind),

    #[error("duplicate {role} group name '{name}'")]
    DuplicateGroupName { role: RoleKind, name: String },

    #[error("datanode and datanodeGroups cannot be set at the same time")]
    DatanodeAndGroupsConflict,

    #[error("only one object storage provider can be set")]
    MultipleObjectStorageProviders,

    #[error("only one of 'raftEngine' or 'kafka' can be set")]
    MultipleWalProviders,

    #[error("only one meta backend storage can be set")]
    MultipleMetaBackendStorages,

    #[error("{field} is required in file storage")]
    FileStorageFieldMissing { field: &'static str },
}

/// Spec-level consistency checks, run at admission time and at the start of every reconcile.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Roles are checked one at a time in the order frontend, meta, datanode,
/// flownode; each role's raw config is parsed before its groups and storage.
/// The selectors (WAL, object storage) and the monitoring standalone follow.
/// The first failure is returned.
impl Validate for GreptimeDBCluster {
    fn validate(&self) -> Result<(), ValidationError> {
        let spec = &self.spec;

        if let Some(frontend) = &spec.frontend {
            validate_toml_config(RoleKind::Frontend, &frontend.component)?;
        }
        validate_groups(
            RoleKind::Frontend,
            spec.frontend_groups.iter().map(|g| (g.name.as_deref(), &g.component)),
        )?;

        if let Some(meta) = &spec.meta {
            validate_toml_config(RoleKind::Meta, &meta.component)?;
            meta.backend()?;
        }

        if spec.datanode.is_some() && !spec.datanode_groups.is_empty() {
            return Err(ValidationError::DatanodeAndGroupsConflict);
        }
        if let Some(datanode) = &spec.datanode {
            validate_toml_config(RoleKind::Datanode, &datanode.component)?;
            if let Some(fs) = datanode.storage.as_ref().and_then(|s| s.fs.as_ref()) {
                validate_file_storage(fs)?;
            }
        }
        validate_groups(
            RoleKind::Datanode,
            spec.datanode_groups.iter().map(|g| (g.name.as_deref(), &g.component)),
        )?;

        if let Some(flownode) = &spec.flownode {
            validate_toml_config(RoleKind::Flownode, &flownode.component)?;
        }

        if let Some(wal) = &spec.wal {
            validate_wal_provider(wal)?;
        }
        if let Some(object_storage) = &spec.object_storage {
            validate_object_storage(object_storage)?;
        }

        if let Some(standalone) = spec.monitoring.as_ref().and_then(|m| m.standalone.as_ref()) {
            validate_toml_config(RoleKind::Standalone, &standalone.component)?;
            if let Some(wal) = &standalone.wal {
                validate_wal_provider(wal)?;
            }
            if let Some(object_storage) = &standalone.object_storage {
                validate_object_storage(object_storage)?;
            }
        }

        Ok(())
    }
}

impl Validate for GreptimeDBStandalone {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_toml_config(RoleKind::Standalone, &self.spec.component)?;
        if let Some(wal) = &self.spec.wal {
            validate_wal_provider(wal)?;
        }
        if let Some(object_storage) = &self.spec.object_storage {
            validate_object_storage(object_storage)?;
        }
        Ok(())
    }
}

/// Structural parse only. Keys are not interpreted.
fn validate_toml_config(role: RoleKind, component: &ComponentSpec) -> Result<(), ValidationError> {
    if let Some(config) = component.config() {
        config
            .parse::<toml::Table>()
            .map_err(|source| ValidationError::InvalidConfigSyntax { role, source })?;
    }
    Ok(())
}

fn validate_groups<'a>(
    role: RoleKind,
    groups: impl Iterator<Item = (Option<&'a str>, &'a ComponentSpec)>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for (name, component) in groups {
        let name = name
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingGroupName(role))?;
        if !seen.insert(name) {
            return Err(ValidationError::DuplicateGroupName {
                role,
                name: name.to_string(),
            });
        }
        validate_toml_config(role, component)?;
    }
    Ok(())
}

fn validate_wal_provider(wal: &WalProviderSpec) -> Result<(), ValidationError> {
    if let Some(WalProvider::RaftEngine(raft)) = wal.provider()? {
        if let Some(fs) = &raft.fs {
            validate_file_storage(fs)?;
        }
    }
    Ok(())
}

fn validate_object_storage(spec: &ObjectStorageProviderSpec) -> Result<(), ValidationError> {
    spec.provider()?;
    if let Some(cache) = &spec.cache {
        validate_file_storage(cache)?;
    }
    Ok(())
}

fn validate_file_storage(fs: &FileStorage) -> Result<(), ValidationError> {
    let field = if fs.name.is_empty() {
        "name"
    } else if fs.mount_path.is_empty() {
        "mountPath"
    } else if fs.storage_size.is_empty() {
        "storageSize"
    } else {
        return Ok(());
    };
    Err(ValidationError::FileStorageFieldMissing { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::v1alpha1::greptimedbcluster::{
        DatanodeSpec, FrontendSpec, GreptimeDBClusterSpec, MetaSpec, MonitoringSpec,
    };
    use crate::api::v1alpha1::greptimedbstandalone::GreptimeDBStandaloneSpec;
    use crate::api::v1alpha1::storage::{GcsStorage, RaftEngineWal, S3Storage};
    use crate::tests::fixtures::cluster;

    fn with_config(config: &str) -> ComponentSpec {
        ComponentSpec {
            config: Some(config.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_datanode_and_groups_conflict() {
        let both = cluster(GreptimeDBClusterSpec {
            datanode: Some(DatanodeSpec::default()),
            datanode_groups: vec![DatanodeSpec {
                name: Some("hot".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(matches!(both.validate(), Err(ValidationError::DatanodeAndGroupsConflict)));

        let neither = cluster(GreptimeDBClusterSpec::default());
        assert!(neither.validate().is_ok());
    }

    #[test]
    fn test_multiple_storage_providers() {
        let c = cluster(GreptimeDBClusterSpec {
            object_storage: Some(ObjectStorageProviderSpec {
                s3: Some(S3Storage::default()),
                gcs: Some(GcsStorage::default()),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(matches!(
            c.validate(),
            Err(ValidationError::MultipleObjectStorageProviders)
        ));
    }

    #[test]
    fn test_invalid_embedded_config_names_role() {
        let c = cluster(GreptimeDBClusterSpec {
            meta: Some(MetaSpec {
                component: with_config("[unterminated"),
                ..Default::default()
            }),
            ..Default::default()
        });
        let err = c.validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidConfigSyntax { role: RoleKind::Meta, .. }));
        assert!(err.to_string().starts_with("invalid meta toml config"));
    }

    #[test]
    fn test_group_names() {
        let unnamed = cluster(GreptimeDBClusterSpec {
            frontend_groups: vec![FrontendSpec::default()],
            ..Default::default()
        });
        assert!(matches!(
            unnamed.validate(),
            Err(ValidationError::MissingGroupName(RoleKind::Frontend))
        ));

        let named = |n: &str| FrontendSpec {
            name: Some(n.into()),
            ..Default::default()
        };
        let duplicated = cluster(GreptimeDBClusterSpec {
            frontend_groups: vec![named("read"), named("read")],
            ..Default::default()
        });
        assert!(matches!(
            duplicated.validate(),
            Err(ValidationError::DuplicateGroupName { .. })
        ));

        let bad_group_config = cluster(GreptimeDBClusterSpec {
            datanode_groups: vec![DatanodeSpec {
                name: Some("cold".into()),
                component: with_config("a = "),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(matches!(
            bad_group_config.validate(),
            Err(ValidationError::InvalidConfigSyntax { role: RoleKind::Datanode, .. })
        ));
    }

    #[test]
    fn test_roles_checked_in_order() {
        // Frontend groups are checked before the meta config.
        let c = cluster(GreptimeDBClusterSpec {
            frontend_groups: vec![FrontendSpec::default()],
            meta: Some(MetaSpec {
                component: with_config("[unterminated"),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(matches!(
            c.validate(),
            Err(ValidationError::MissingGroupName(RoleKind::Frontend))
        ));

        // The meta config is checked before the datanode layout.
        let c = cluster(GreptimeDBClusterSpec {
            meta: Some(MetaSpec {
                component: with_config("[unterminated"),
                ..Default::default()
            }),
            datanode: Some(DatanodeSpec::default()),
            datanode_groups: vec![DatanodeSpec {
                name: Some("hot".into()),
                ..Default::default()
            }],
            ..Default::default()
        });
        assert!(matches!(
            c.validate(),
            Err(ValidationError::InvalidConfigSyntax { role: RoleKind::Meta, .. })
        ));
    }

    #[test]
    fn test_file_storage_all_or_nothing() {
        let c = cluster(GreptimeDBClusterSpec {
            wal: Some(WalProviderSpec {
                raft_engine: Some(RaftEngineWal {
                    fs: Some(FileStorage {
                        name: "wal".into(),
                        mount_path: "/wal".into(),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        let err = c.validate().unwrap_err();
        assert_eq!(err.to_string(), "storageSize is required in file storage");
    }

    #[test]
    fn test_monitoring_standalone_is_validated() {
        let c = cluster(GreptimeDBClusterSpec {
            monitoring: Some(MonitoringSpec {
                enabled: true,
                standalone: Some(GreptimeDBStandaloneSpec {
                    component: with_config("not toml at all"),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(matches!(
            c.validate(),
            Err(ValidationError::InvalidConfigSyntax { role: RoleKind::Standalone, .. })
        ));
    }
}
