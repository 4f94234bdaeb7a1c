//! Automount provisioning
//!
//! ConfigMaps, Secrets and PVCs labeled `workspace.dev/mount-to-workspace`
//! are mounted into every workspace container. Annotations choose the mount
//! style (`env`, `file` or `subpath`), path, file access mode and read-only
//! flag. Several objects may share a mount path, in which case their contents
//! are merged into one projected volume. Git credentials and TLS certificates
//! get dedicated handling that renders a merged `/etc/gitconfig`.

mod configmaps;
mod git_config;
mod projected;
mod pvcs;
mod secrets;

use k8s_openapi::api::core::v1::{EnvFromSource, Volume, VolumeMount};
use kube::api::ObjectMeta;
use tracing::debug;

use crate::cluster::ClusterStore;
use crate::constants::{
    DEFAULT_ACCESS_MODE, GITCONFIG_MOUNT_PATH, MOUNT_ACCESS_MODE_ANNOTATION, MOUNT_AS_ANNOTATION,
    MOUNT_AS_ENV, MOUNT_AS_FILE, MOUNT_AS_SUBPATH, MOUNT_PATH_ANNOTATION,
    MOUNT_READ_ONLY_ANNOTATION,
};
use crate::error::{Result, WorkspaceError};
use crate::provision::pod_additions::PodAdditions;

// =============================================================================
// Resource Model
// =============================================================================

/// Everything automounting adds to the workspace pod
#[derive(Debug, Default)]
pub struct AutomountResources {
    pub volumes: Vec<Volume>,
    pub volume_mounts: Vec<VolumeMount>,
    pub env_from: Vec<EnvFromSource>,
}

/// What kind of object backs a file mount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AutomountSource {
    ConfigMap,
    Secret,
    Pvc,
}

/// One pod volume plus the mount it contributes
#[derive(Debug, Clone)]
pub(crate) struct FileMount {
    pub source: AutomountSource,
    pub object_name: String,
    pub volume: Volume,
    pub mount: VolumeMount,
    /// Subpath-style mounts pin single files and can never be merged into a
    /// projected volume
    pub uses_subpath: bool,
}

/// Intermediate collection state before projected-volume merging
#[derive(Debug, Default)]
pub(crate) struct CollectedAutomounts {
    pub file_mounts: Vec<FileMount>,
    pub env_from: Vec<EnvFromSource>,
    /// Contents of automounts that pin a file at `/etc/gitconfig`, used as
    /// the base for the generated git configuration
    pub base_gitconfig: Vec<(String, String)>,
}

// =============================================================================
// Entry Points
// =============================================================================

/// Discover the namespace's automount objects and merge the result into the
/// workspace's pod additions, rejecting path collisions with the workspace's
/// own mounts.
pub async fn provision_automount_resources_into<S: ClusterStore>(
    additions: &mut PodAdditions,
    namespace: &str,
    store: &S,
) -> Result<()> {
    let resources = collect_automount_resources(namespace, store).await?;

    for mount in &resources.volume_mounts {
        check_container_collision(additions, &mount.mount_path)?;
    }
    for volume in resources.volumes {
        additions.add_volume(volume)?;
    }
    for mount in resources.volume_mounts {
        additions.add_volume_mount(mount)?;
    }
    for source in resources.env_from {
        additions.add_env_from(source);
    }
    Ok(())
}

/// Gather all automount objects in the namespace into pod-ready resources
pub async fn collect_automount_resources<S: ClusterStore>(
    namespace: &str,
    store: &S,
) -> Result<AutomountResources> {
    let mut collected = CollectedAutomounts::default();
    configmaps::collect(namespace, store, &mut collected).await?;
    secrets::collect(namespace, store, &mut collected).await?;
    pvcs::collect(namespace, store, &mut collected).await?;

    if let Some(git_mounts) = git_config::provision(namespace, &collected, store).await? {
        // The generated gitconfig supersedes any plain automount of the file
        collected
            .file_mounts
            .retain(|m| m.mount.mount_path != GITCONFIG_MOUNT_PATH);
        collected.file_mounts.extend(git_mounts);
    }

    debug!(
        %namespace,
        mounts = collected.file_mounts.len(),
        env_sources = collected.env_from.len(),
        "collected automount resources"
    );
    projected::merge(collected)
}

fn check_container_collision(additions: &PodAdditions, mount_path: &str) -> Result<()> {
    let all = additions.containers().iter().chain(additions.init_containers());
    for container in all {
        let mounts = container.volume_mounts.as_deref().unwrap_or_default();
        if let Some(existing) = mounts.iter().find(|m| m.mount_path == mount_path) {
            return Err(WorkspaceError::fail(format!(
                "automount at {mount_path} collides with container {} volume {}",
                container.name, existing.name
            )));
        }
    }
    Ok(())
}

// =============================================================================
// Annotation Parsing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MountStyle {
    Env,
    File,
    Subpath,
}

#[derive(Debug, Clone)]
pub(crate) struct MountOptions {
    pub style: MountStyle,
    pub path: Option<String>,
    pub access_mode: i32,
    pub read_only: bool,
}

/// Parse the automount annotations of one object, applying the early
/// validation rules that can be decided without looking at other objects
pub(crate) fn mount_options(meta: &ObjectMeta) -> Result<MountOptions> {
    let name = meta.name.as_deref().unwrap_or_default();
    let annotations = meta.annotations.clone().unwrap_or_default();

    let style = match annotations.get(MOUNT_AS_ANNOTATION).map(String::as_str) {
        Some(MOUNT_AS_ENV) => MountStyle::Env,
        Some(MOUNT_AS_SUBPATH) => MountStyle::Subpath,
        Some(MOUNT_AS_FILE) | None => MountStyle::File,
        // Unrecognized values mount as files rather than failing the
        // workspace, so new styles degrade gracefully on old operators
        Some(_) => MountStyle::File,
    };

    let path = annotations.get(MOUNT_PATH_ANNOTATION).cloned();
    if let Some(path) = &path {
        if style == MountStyle::Env {
            return Err(WorkspaceError::fail(format!(
                "automount {name} requests environment mounting but sets a mount path"
            )));
        }
        if path.contains(':') {
            return Err(WorkspaceError::fail(format!(
                "automount {name} mount path must not contain ':'"
            )));
        }
        if style == MountStyle::File {
            validate_directory_mount_path(path, name)?;
        }
    }

    let access_mode = match annotations.get(MOUNT_ACCESS_MODE_ANNOTATION) {
        Some(raw) => parse_access_mode(raw, name)?,
        None => DEFAULT_ACCESS_MODE,
    };
    let read_only = annotations.get(MOUNT_READ_ONLY_ANNOTATION).map(String::as_str)
        == Some("true");

    Ok(MountOptions {
        style,
        path,
        access_mode,
        read_only,
    })
}

/// A directory mounted straight over a system directory would shadow its
/// contents and break the container
fn validate_directory_mount_path(path: &str, name: &str) -> Result<()> {
    let trimmed = path.trim_end_matches('/');
    if matches!(trimmed, "" | "/etc" | "/usr" | "/lib" | "/tmp") {
        return Err(WorkspaceError::fail(format!(
            "automount {name} must not mount a directory over {path}"
        )));
    }
    Ok(())
}

fn parse_access_mode(raw: &str, name: &str) -> Result<i32> {
    let mode = i32::from_str_radix(raw, 8).map_err(|_| {
        WorkspaceError::fail(format!(
            "automount {name} has invalid access mode '{raw}', expected an octal value"
        ))
    })?;
    if !(0..=0o777).contains(&mode) {
        return Err(WorkspaceError::fail(format!(
            "automount {name} access mode '{raw}' is out of range 0000-0777"
        )));
    }
    Ok(mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::BTreeMap;

    fn meta_with_annotations(pairs: &[(&str, &str)]) -> ObjectMeta {
        ObjectMeta {
            name: Some("obj".to_string()),
            annotations: Some(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_to_file_mounting() {
        let options = mount_options(&ObjectMeta::default()).unwrap();
        assert_eq!(options.style, MountStyle::File);
        assert_eq!(options.path, None);
        assert_eq!(options.access_mode, DEFAULT_ACCESS_MODE);
        assert!(!options.read_only);
    }

    #[test]
    fn test_unknown_mount_style_falls_back_to_file() {
        let meta = meta_with_annotations(&[(MOUNT_AS_ANNOTATION, "hologram")]);
        assert_eq!(mount_options(&meta).unwrap().style, MountStyle::File);
    }

    #[test]
    fn test_env_with_mount_path_fails() {
        let meta = meta_with_annotations(&[
            (MOUNT_AS_ANNOTATION, "env"),
            (MOUNT_PATH_ANNOTATION, "/somewhere"),
        ]);
        assert_matches!(mount_options(&meta), Err(WorkspaceError::Fail(_)));
    }

    #[test]
    fn test_colon_in_path_fails() {
        let meta = meta_with_annotations(&[(MOUNT_PATH_ANNOTATION, "/data:ro")]);
        assert_matches!(mount_options(&meta), Err(WorkspaceError::Fail(_)));
    }

    #[test]
    fn test_directory_mount_over_system_dirs_fails() {
        for path in ["/etc", "/etc/", "/usr", "/lib", "/tmp", "/"] {
            let meta = meta_with_annotations(&[(MOUNT_PATH_ANNOTATION, path)]);
            assert_matches!(mount_options(&meta), Err(WorkspaceError::Fail(_)), "{path}");
        }
        // Subdirectories are fine
        let meta = meta_with_annotations(&[(MOUNT_PATH_ANNOTATION, "/etc/config/extra")]);
        assert!(mount_options(&meta).is_ok());
    }

    #[test]
    fn test_access_mode_parsing() {
        let meta = meta_with_annotations(&[(MOUNT_ACCESS_MODE_ANNOTATION, "0444")]);
        assert_eq!(mount_options(&meta).unwrap().access_mode, 0o444);

        let meta = meta_with_annotations(&[(MOUNT_ACCESS_MODE_ANNOTATION, "1777")]);
        assert_matches!(mount_options(&meta), Err(WorkspaceError::Fail(_)));

        let meta = meta_with_annotations(&[(MOUNT_ACCESS_MODE_ANNOTATION, "rw")]);
        assert_matches!(mount_options(&meta), Err(WorkspaceError::Fail(_)));
    }

    #[test]
    fn test_container_collision_is_detected() {
        use k8s_openapi::api::core::v1::{Container, VolumeMount};

        let mut additions = PodAdditions::new();
        additions
            .add_container(Container {
                name: "dev".to_string(),
                volume_mounts: Some(vec![VolumeMount {
                    name: "data".to_string(),
                    mount_path: "/etc/config/settings".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            })
            .unwrap();

        assert_matches!(
            check_container_collision(&additions, "/etc/config/settings"),
            Err(WorkspaceError::Fail(_))
        );
        check_container_collision(&additions, "/etc/config/other").unwrap();
    }
}
