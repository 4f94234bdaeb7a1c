//! Automounted ConfigMaps

use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapEnvSource, ConfigMapVolumeSource, EnvFromSource, KeyToPath, Volume,
    VolumeMount,
};

use super::{AutomountSource, CollectedAutomounts, FileMount, MountStyle};
use crate::cluster::ClusterStore;
use crate::constants::{
    DEFAULT_ACCESS_MODE, GITCONFIG_MOUNT_PATH, GIT_CREDENTIAL_LABEL, GIT_TLS_LABEL, MOUNT_LABEL,
};
use crate::error::Result;
use crate::names::automount_configmap_volume_name;

pub(super) async fn collect<S: ClusterStore>(
    namespace: &str,
    store: &S,
    collected: &mut CollectedAutomounts,
) -> Result<()> {
    let selector = format!("{MOUNT_LABEL}=true");
    let mut configmaps: Vec<ConfigMap> = store.list(namespace, Some(&selector)).await?;
    configmaps.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    for configmap in configmaps {
        // Git sources are rendered by the git configuration provisioner
        let labels = configmap.metadata.labels.clone().unwrap_or_default();
        if labels.contains_key(GIT_TLS_LABEL) || labels.contains_key(GIT_CREDENTIAL_LABEL) {
            continue;
        }

        let name = configmap.metadata.name.clone().unwrap_or_default();
        let options = super::mount_options(&configmap.metadata)?;
        match options.style {
            MountStyle::Env => collected.env_from.push(EnvFromSource {
                config_map_ref: Some(ConfigMapEnvSource {
                    name: Some(name),
                    optional: None,
                }),
                ..Default::default()
            }),
            MountStyle::File => {
                let path = options
                    .path
                    .clone()
                    .unwrap_or_else(|| format!("/etc/config/{name}"));
                let keys: Vec<String> = configmap.data.as_ref().map(|d| d.keys().cloned().collect()).unwrap_or_default();
                collected.file_mounts.push(FileMount {
                    source: AutomountSource::ConfigMap,
                    object_name: name.clone(),
                    volume: configmap_volume(&name, options.access_mode, &keys),
                    mount: VolumeMount {
                        name: automount_configmap_volume_name(&name),
                        mount_path: path,
                        read_only: Some(true),
                        ..Default::default()
                    },
                    uses_subpath: false,
                });
            }
            MountStyle::Subpath => {
                let base = options
                    .path
                    .clone()
                    .unwrap_or_else(|| format!("/etc/config/{name}"));
                let base = base.trim_end_matches('/').to_string();
                for (key, content) in configmap.data.clone().unwrap_or_default() {
                    let mount_path = format!("{base}/{key}");
                    if mount_path == GITCONFIG_MOUNT_PATH {
                        collected
                            .base_gitconfig
                            .push((name.clone(), content.clone()));
                    }
                    collected.file_mounts.push(FileMount {
                        source: AutomountSource::ConfigMap,
                        object_name: name.clone(),
                        volume: configmap_volume(&name, options.access_mode, &[] as &[&str]),
                        mount: VolumeMount {
                            name: automount_configmap_volume_name(&name),
                            mount_path,
                            sub_path: Some(key),
                            read_only: Some(true),
                            ..Default::default()
                        },
                        uses_subpath: true,
                    });
                }
            }
        }
    }
    Ok(())
}

/// File-style mount of a ConfigMap at its default path. The git
/// configuration provisioner adjusts path and subpath as needed.
pub(super) fn file_mount_for(name: &str) -> FileMount {
    FileMount {
        source: AutomountSource::ConfigMap,
        object_name: name.to_string(),
        volume: configmap_volume(name, DEFAULT_ACCESS_MODE, &[] as &[&str]),
        mount: VolumeMount {
            name: automount_configmap_volume_name(name),
            mount_path: format!("/etc/config/{name}"),
            read_only: Some(true),
            ..Default::default()
        },
        uses_subpath: false,
    }
}

/// Build the pod volume for an automounted ConfigMap. Non-default access
/// modes are materialized as per-key items so the mode survives merging into
/// a projected volume, where `defaultMode` applies to the whole projection.
fn configmap_volume(name: &str, access_mode: i32, keys: &[impl AsRef<str>]) -> Volume {
    let items = (access_mode != DEFAULT_ACCESS_MODE && !keys.is_empty()).then(|| {
        keys.iter()
            .map(|key| KeyToPath {
                key: key.as_ref().to_string(),
                path: key.as_ref().to_string(),
                mode: Some(access_mode),
            })
            .collect()
    });
    Volume {
        name: automount_configmap_volume_name(name),
        config_map: Some(ConfigMapVolumeSource {
            name: Some(name.to_string()),
            default_mode: Some(access_mode),
            items,
            optional: None,
        }),
        ..Default::default()
    }
}
