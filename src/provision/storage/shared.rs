//! Helpers shared by the storage strategies
//!
//! Volume partitioning, the PVC size law, PVC spec construction and the
//! mount rewriting that points workspace containers at their backing storage.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    EmptyDirVolumeSource, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimVolumeSource, Volume, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;

use super::quantity::{format_quantity, parse_quantity};
use crate::config::OperatorConfig;
use crate::constants::PROJECTS_VOLUME_NAME;
use crate::crd::Workspace;
use crate::error::Result;
use crate::provision::config::NamespacedConfig;
use crate::provision::pod_additions::PodAdditions;

// =============================================================================
// Volume Partitioning
// =============================================================================

/// A workspace volume with its requested size, if any
#[derive(Debug, Clone, PartialEq)]
pub(super) struct VolumeSpec {
    pub name: String,
    pub size: Option<String>,
}

/// The workspace's volumes split by backing storage class
#[derive(Debug, Default)]
pub(super) struct WorkspaceVolumes {
    /// Volumes backed by persistent storage under the active strategy
    pub persistent: Vec<VolumeSpec>,
    /// Volumes explicitly marked ephemeral; always emptyDir
    pub ephemeral: Vec<VolumeSpec>,
}

/// Partition the workspace's volume components, including the implicit
/// `projects` volume when any container mounts sources and no component
/// overrides it.
pub(super) fn collect_volumes(workspace: &Workspace) -> WorkspaceVolumes {
    let mut volumes = WorkspaceVolumes::default();
    for (name, volume) in workspace.volume_components() {
        let spec = VolumeSpec {
            name: name.to_string(),
            size: volume.size.clone(),
        };
        if volume.ephemeral.unwrap_or(false) {
            volumes.ephemeral.push(spec);
        } else {
            volumes.persistent.push(spec);
        }
    }

    let mounts_sources = workspace
        .container_components()
        .any(|(_, c)| c.mount_sources.unwrap_or(true));
    let projects_defined = workspace
        .volume_components()
        .any(|(name, _)| name == PROJECTS_VOLUME_NAME);
    if mounts_sources && !projects_defined {
        volumes.persistent.push(VolumeSpec {
            name: PROJECTS_VOLUME_NAME.to_string(),
            size: None,
        });
    }
    volumes
}

/// Whether the workspace has any volume that needs persistent storage
pub fn needs_storage(workspace: &Workspace) -> bool {
    !collect_volumes(workspace).persistent.is_empty()
}

// =============================================================================
// PVC Size Law
// =============================================================================

/// Compute the PVC size for a set of persistent volumes: the larger of the
/// configured default (or its per-namespace override) and the sum of the
/// sizes the volumes declare explicitly.
pub(super) fn calculate_pvc_size(
    volumes: &[VolumeSpec],
    default_size: &str,
    namespace_override: Option<&str>,
) -> Result<String> {
    let base = namespace_override.unwrap_or(default_size);
    let base_bytes = parse_quantity(base)?;

    let mut explicit_sum: u64 = 0;
    for volume in volumes {
        if let Some(size) = &volume.size {
            explicit_sum += parse_quantity(size)?;
        }
    }

    if explicit_sum > base_bytes {
        Ok(format_quantity(explicit_sum))
    } else {
        Ok(base.to_string())
    }
}

// =============================================================================
// Object Construction
// =============================================================================

/// Build a PVC spec for workspace storage (single-node read-write)
pub(super) fn storage_pvc(
    name: &str,
    namespace: &str,
    size: &str,
    config: &OperatorConfig,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: config.workspace.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Pod volume backed by a claim
pub(super) fn pvc_volume(volume_name: &str, claim_name: &str) -> Volume {
    Volume {
        name: volume_name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim_name.to_string(),
            read_only: None,
        }),
        ..Default::default()
    }
}

/// Pod volume backed by emptyDir, carrying the declared size as a limit
pub(super) fn ephemeral_volume(spec: &VolumeSpec) -> Volume {
    Volume {
        name: spec.name.clone(),
        empty_dir: Some(EmptyDirVolumeSource {
            size_limit: spec.size.clone().map(Quantity),
            ..Default::default()
        }),
        ..Default::default()
    }
}

// =============================================================================
// Mount Rewriting
// =============================================================================

/// Point every container mount of the named volumes at a single shared volume
/// with a per-volume subpath. Used by strategies that collapse all workspace
/// volumes onto one PVC.
pub(super) fn rewrite_mounts_to_volume(
    additions: &mut PodAdditions,
    volume_names: &[String],
    target_volume: &str,
    subpath_for: impl Fn(&str) -> String,
) {
    let rewrite = |containers: &mut [k8s_openapi::api::core::v1::Container]| {
        for container in containers {
            let Some(mounts) = container.volume_mounts.as_mut() else {
                continue;
            };
            for mount in mounts {
                if volume_names.contains(&mount.name) {
                    mount.sub_path = Some(subpath_for(&mount.name));
                    mount.name = target_volume.to_string();
                }
            }
        }
    };
    rewrite(additions.containers_mut());
    rewrite(additions.init_containers_mut());
}

/// Add emptyDir volumes for every explicitly ephemeral workspace volume
pub(super) fn add_ephemeral_volumes(
    additions: &mut PodAdditions,
    volumes: &[VolumeSpec],
) -> Result<()> {
    for spec in volumes {
        additions.add_volume(ephemeral_volume(spec))?;
    }
    Ok(())
}

/// The effective per-namespace override for the common PVC size
pub(super) fn common_size_override(namespaced: Option<&NamespacedConfig>) -> Option<&str> {
    namespaced.and_then(|c| c.common_pvc_size.as_deref())
}

/// The effective per-namespace override for per-workspace PVC sizes
pub(super) fn per_workspace_size_override(namespaced: Option<&NamespacedConfig>) -> Option<&str> {
    namespaced.and_then(|c| c.per_workspace_pvc_size.as_deref())
}
