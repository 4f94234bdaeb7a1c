//! Custom resource definitions

mod routing;
mod workspace;

pub use routing::{WorkspaceRouting, WorkspaceRoutingSpec, WorkspaceRoutingStatus};
pub use workspace::{
    Component, ComponentVolumeMount, ContainerComponent, VolumeComponent, Workspace,
    WorkspacePhase, WorkspaceSpec, WorkspaceStatus, WorkspaceTemplate,
};
