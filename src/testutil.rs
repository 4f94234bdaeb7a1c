//! Builders shared by unit tests

use crate::crd::{
    Component, ContainerComponent, VolumeComponent, Workspace, WorkspacePhase, WorkspaceSpec,
    WorkspaceStatus, WorkspaceTemplate,
};

pub(crate) fn workspace(namespace: &str, id: &str, components: &[Component]) -> Workspace {
    workspace_with_attributes(namespace, id, components, &[])
}

pub(crate) fn workspace_with_attributes(
    namespace: &str,
    id: &str,
    components: &[Component],
    attributes: &[(&str, &str)],
) -> Workspace {
    let mut ws = Workspace::new(
        &format!("workspace-{id}"),
        WorkspaceSpec {
            started: true,
            template: WorkspaceTemplate {
                components: components.to_vec(),
                attributes: attributes
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        },
    );
    ws.metadata.namespace = Some(namespace.to_string());
    ws.metadata.uid = Some(format!("uid-{id}"));
    ws.status = Some(WorkspaceStatus {
        workspace_id: Some(id.to_string()),
        phase: Some(WorkspacePhase::Starting),
        message: None,
    });
    ws
}

pub(crate) fn container_component(name: &str, mount_sources: bool) -> Component {
    Component {
        name: name.to_string(),
        container: Some(ContainerComponent {
            image: format!("{name}:latest"),
            memory_limit: None,
            mount_sources: Some(mount_sources),
            volume_mounts: Vec::new(),
        }),
        volume: None,
    }
}

pub(crate) fn volume_component(name: &str, size: Option<&str>, ephemeral: bool) -> Component {
    Component {
        name: name.to_string(),
        container: None,
        volume: Some(VolumeComponent {
            size: size.map(str::to_string),
            ephemeral: ephemeral.then_some(true),
        }),
    }
}
