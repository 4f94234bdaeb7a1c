//! Accumulator for everything provisioning contributes to the workspace pod
//!
//! Storage and automount provisioning both append to one [`PodAdditions`]
//! value; the pod builder downstream applies it to the deployment. The
//! accumulator owns the uniqueness invariants: volume names and container
//! names are unique, and no two volume mounts claim the same path. Violations
//! are construction errors, not cluster errors, and fail the workspace.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvFromSource, LocalObjectReference, Volume, VolumeMount,
};

use crate::error::{Result, WorkspaceError};

#[derive(Debug, Clone, Default)]
pub struct PodAdditions {
    containers: Vec<Container>,
    init_containers: Vec<Container>,
    volumes: Vec<Volume>,
    volume_mounts: Vec<VolumeMount>,
    env_from: Vec<EnvFromSource>,
    pull_secrets: Vec<LocalObjectReference>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl PodAdditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&mut self, container: Container) -> Result<()> {
        if self
            .containers
            .iter()
            .chain(&self.init_containers)
            .any(|c| c.name == container.name)
        {
            return Err(WorkspaceError::fail(format!(
                "duplicate container name '{}' in workspace pod",
                container.name
            )));
        }
        self.containers.push(container);
        Ok(())
    }

    pub fn add_init_container(&mut self, container: Container) -> Result<()> {
        if self
            .containers
            .iter()
            .chain(&self.init_containers)
            .any(|c| c.name == container.name)
        {
            return Err(WorkspaceError::fail(format!(
                "duplicate init container name '{}' in workspace pod",
                container.name
            )));
        }
        self.init_containers.push(container);
        Ok(())
    }

    pub fn add_volume(&mut self, volume: Volume) -> Result<()> {
        if self.volumes.iter().any(|v| v.name == volume.name) {
            return Err(WorkspaceError::fail(format!(
                "duplicate volume name '{}' in workspace pod",
                volume.name
            )));
        }
        self.volumes.push(volume);
        Ok(())
    }

    /// Add a mount applied to every workspace container
    pub fn add_volume_mount(&mut self, mount: VolumeMount) -> Result<()> {
        if self.volume_mounts.iter().any(|m| m.mount_path == mount.mount_path) {
            return Err(WorkspaceError::fail(format!(
                "multiple volume mounts share mount path {}",
                mount.mount_path
            )));
        }
        self.volume_mounts.push(mount);
        Ok(())
    }

    pub fn add_env_from(&mut self, source: EnvFromSource) {
        self.env_from.push(source);
    }

    pub fn add_pull_secret(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.pull_secrets.iter().any(|s| s.name.as_deref() == Some(&name)) {
            self.pull_secrets.push(LocalObjectReference { name: Some(name) });
        }
    }

    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    pub fn add_annotation(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotations.insert(key.into(), value.into());
    }

    pub fn has_volume(&self, name: &str) -> bool {
        self.volumes.iter().any(|v| v.name == name)
    }

    pub fn containers(&self) -> &[Container] {
        &self.containers
    }

    pub fn init_containers(&self) -> &[Container] {
        &self.init_containers
    }

    /// Mutable access for post-hoc rewriting (e.g. pointing mounts at the
    /// shared PVC with a per-workspace subpath)
    pub fn containers_mut(&mut self) -> &mut [Container] {
        &mut self.containers
    }

    pub fn init_containers_mut(&mut self) -> &mut [Container] {
        &mut self.init_containers
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn volumes_mut(&mut self) -> &mut [Volume] {
        &mut self.volumes
    }

    pub fn volume_mounts(&self) -> &[VolumeMount] {
        &self.volume_mounts
    }

    pub fn env_from(&self) -> &[EnvFromSource] {
        &self.env_from
    }

    pub fn pull_secrets(&self) -> &[LocalObjectReference] {
        &self.pull_secrets
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }
}
