//! Workspace custom resource

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::STORAGE_TYPE_ATTRIBUTE;
use crate::error::WorkspaceError;

/// A developer workspace. The template describes the containers and volumes
/// the workspace pod is built from; attributes carry free-form configuration
/// such as the storage strategy.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workspace.dev",
    version = "v1alpha1",
    kind = "Workspace",
    namespaced,
    status = "WorkspaceStatus",
    shortname = "ws",
    printcolumn = r#"{"name":"Started", "type":"boolean", "jsonPath":".spec.started"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    /// Whether the workspace should be running
    pub started: bool,
    /// The workspace content definition
    pub template: WorkspaceTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Component>,
    /// Free-form workspace attributes, e.g. the storage strategy
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// One named piece of the workspace: a container or a volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerComponent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeComponent>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerComponent {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,
    /// Whether the implicit `projects` volume is mounted into this container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_sources: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<ComponentVolumeMount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentVolumeMount {
    /// Name of a volume component in the same template
    pub name: String,
    /// Mount path; defaults to `/<name>` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeComponent {
    /// Requested size as a Kubernetes quantity, e.g. "1Gi"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Ephemeral volumes are backed by emptyDir under every strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ephemeral: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    /// Stable identifier used to derive names of per-workspace objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<WorkspacePhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum WorkspacePhase {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl Workspace {
    /// The workspace's stable id, assigned by the lifecycle controller before
    /// provisioning starts
    pub fn workspace_id(&self) -> Result<&str, WorkspaceError> {
        self.status
            .as_ref()
            .and_then(|s| s.workspace_id.as_deref())
            .ok_or_else(|| WorkspaceError::fail("workspace has no id assigned"))
    }

    pub fn workspace_namespace(&self) -> Result<&str, WorkspaceError> {
        self.metadata
            .namespace
            .as_deref()
            .ok_or_else(|| WorkspaceError::fail("workspace has no namespace"))
    }

    pub fn is_started(&self) -> bool {
        self.spec.started
    }

    /// The raw storage strategy attribute. Empty when unset
    pub fn storage_strategy_attribute(&self) -> &str {
        self.spec
            .template
            .attributes
            .get(STORAGE_TYPE_ATTRIBUTE)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Volume components of the template, with their names
    pub fn volume_components(&self) -> impl Iterator<Item = (&str, &VolumeComponent)> {
        self.spec
            .template
            .components
            .iter()
            .filter_map(|c| c.volume.as_ref().map(|v| (c.name.as_str(), v)))
    }

    /// Container components of the template, with their names
    pub fn container_components(&self) -> impl Iterator<Item = (&str, &ContainerComponent)> {
        self.spec
            .template
            .components
            .iter()
            .filter_map(|c| c.container.as_ref().map(|v| (c.name.as_str(), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_workspace(namespace: &str, id: &str) -> Workspace {
        let mut ws = Workspace::new(
            &format!("workspace-{id}"),
            WorkspaceSpec {
                started: true,
                template: WorkspaceTemplate::default(),
            },
        );
        ws.metadata.namespace = Some(namespace.to_string());
        ws.status = Some(WorkspaceStatus {
            workspace_id: Some(id.to_string()),
            phase: Some(WorkspacePhase::Starting),
            message: None,
        });
        ws
    }

    #[test]
    fn test_storage_strategy_attribute_defaults_to_empty() {
        let ws = test_workspace("ns", "ws1");
        assert_eq!(ws.storage_strategy_attribute(), "");
    }

    #[test]
    fn test_workspace_id_requires_status() {
        let ws = Workspace::new(
            "nameless",
            WorkspaceSpec {
                started: false,
                template: WorkspaceTemplate::default(),
            },
        );
        assert!(ws.workspace_id().is_err());
    }

    #[test]
    fn test_component_accessors_split_by_type() {
        let mut ws = test_workspace("ns", "ws1");
        ws.spec.template.components = vec![
            Component {
                name: "tooling".to_string(),
                container: Some(ContainerComponent {
                    image: "tools:latest".to_string(),
                    ..Default::default()
                }),
                volume: None,
            },
            Component {
                name: "cache".to_string(),
                container: None,
                volume: Some(VolumeComponent {
                    size: Some("1Gi".to_string()),
                    ephemeral: None,
                }),
            },
        ];
        assert_eq!(ws.container_components().count(), 1);
        let (name, volume) = ws.volume_components().next().unwrap();
        assert_eq!(name, "cache");
        assert_eq!(volume.size.as_deref(), Some("1Gi"));
    }
}
