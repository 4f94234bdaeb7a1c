//! Merging automounts that share a mount path
//!
//! Two ConfigMaps/Secrets may both target the same directory; Kubernetes
//! cannot mount two volumes at one path, so they are merged into a single
//! projected volume. Subpath mounts pin individual files and PVCs are whole
//! filesystems, so neither can participate in a projection; sharing a path
//! with one of those is a hard error.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    ConfigMapProjection, ProjectedVolumeSource, SecretProjection, Volume, VolumeMount,
    VolumeProjection,
};

use super::{AutomountResources, AutomountSource, CollectedAutomounts, FileMount};
use crate::constants::DEFAULT_ACCESS_MODE;
use crate::error::{Result, WorkspaceError};
use crate::names::projected_volume_name;

pub(super) fn merge(collected: CollectedAutomounts) -> Result<AutomountResources> {
    let mut groups: BTreeMap<String, Vec<FileMount>> = BTreeMap::new();
    for mount in collected.file_mounts {
        groups
            .entry(mount.mount.mount_path.clone())
            .or_default()
            .push(mount);
    }

    let mut resources = AutomountResources {
        env_from: collected.env_from,
        ..Default::default()
    };

    for (path, mut group) in groups {
        if group.len() == 1 {
            let mut single = group.pop().unwrap();
            // Items only matter inside a projection; plain volumes carry the
            // access mode in defaultMode already
            drop_items(&mut single.volume);
            push_volume(&mut resources.volumes, single.volume);
            resources.volume_mounts.push(single.mount);
            continue;
        }

        let contributors = group
            .iter()
            .map(|m| m.object_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if group.iter().any(|m| m.source == AutomountSource::Pvc) {
            return Err(WorkspaceError::fail(format!(
                "automounts {contributors} all mount at {path}: PVCs cannot be merged into a projected volume"
            )));
        }
        if group.iter().any(|m| m.uses_subpath) {
            return Err(WorkspaceError::fail(format!(
                "automounts {contributors} all mount at {path}: subpath mounts cannot be merged into a projected volume"
            )));
        }

        resources.volumes.push(projected_volume(&path, &group));
        resources.volume_mounts.push(VolumeMount {
            name: projected_volume_name(&path),
            mount_path: path,
            read_only: Some(true),
            ..Default::default()
        });
    }
    Ok(resources)
}

/// ConfigMap sources come before Secret sources, each ordered by name, so
/// the projection is stable across reconciles
fn projected_volume(path: &str, group: &[FileMount]) -> Volume {
    let mut sorted: Vec<&FileMount> = group.iter().collect();
    sorted.sort_by_key(|m| {
        (
            match m.source {
                AutomountSource::ConfigMap => 0,
                AutomountSource::Secret => 1,
                AutomountSource::Pvc => 2,
            },
            m.object_name.clone(),
        )
    });

    let sources = sorted
        .iter()
        .map(|m| match m.source {
            AutomountSource::ConfigMap => VolumeProjection {
                config_map: Some(ConfigMapProjection {
                    name: Some(m.object_name.clone()),
                    items: m.volume.config_map.as_ref().and_then(|s| s.items.clone()),
                    optional: None,
                }),
                ..Default::default()
            },
            _ => VolumeProjection {
                secret: Some(SecretProjection {
                    name: Some(m.object_name.clone()),
                    items: m.volume.secret.as_ref().and_then(|s| s.items.clone()),
                    optional: None,
                }),
                ..Default::default()
            },
        })
        .collect();

    Volume {
        name: projected_volume_name(path),
        projected: Some(ProjectedVolumeSource {
            default_mode: Some(DEFAULT_ACCESS_MODE),
            sources: Some(sources),
        }),
        ..Default::default()
    }
}

fn drop_items(volume: &mut Volume) {
    if let Some(source) = volume.config_map.as_mut() {
        source.items = None;
    }
    if let Some(source) = volume.secret.as_mut() {
        source.items = None;
    }
}

/// Subpath mounts of one object each carry a copy of the same volume
fn push_volume(volumes: &mut Vec<Volume>, volume: Volume) {
    if !volumes.iter().any(|v| v.name == volume.name) {
        volumes.push(volume);
    }
}
