//! Workspace storage provisioning
//!
//! Four strategies decide how workspace volumes are backed:
//!
//! - `common`: every workspace in the namespace shares one PVC; each
//!   workspace gets a `<workspaceId>/<volume>` subtree
//! - `per-workspace`: one PVC per workspace, owned by the workspace object
//! - `async`: local emptyDir volumes synced to the shared PVC by an SSH relay
//! - `ephemeral`: everything is emptyDir, nothing survives the pod
//!
//! The strategy is selected by the `workspace.dev/storage-type` template
//! attribute; an empty attribute means `common`.

pub mod async_storage;
mod cleanup;
mod common;
mod ephemeral;
mod per_workspace;
mod quantity;
mod shared;

pub use quantity::{format_quantity, parse_quantity};
pub use shared::needs_storage;

use crate::cluster::ClusterStore;
use crate::config::OperatorConfig;
use crate::constants::{
    ASYNC_STORAGE_TYPE, COMMON_STORAGE_TYPE, EPHEMERAL_STORAGE_TYPE, PER_WORKSPACE_STORAGE_TYPE,
};
use crate::crd::Workspace;
use crate::error::{Result, WorkspaceError};
use crate::provision::config::NamespacedConfig;
use crate::provision::pod_additions::PodAdditions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvisioner {
    Common,
    PerWorkspace,
    Async,
    Ephemeral,
}

impl StorageProvisioner {
    /// Select the strategy from the workspace's storage-type attribute
    pub fn for_workspace(workspace: &Workspace) -> Result<Self> {
        match workspace.storage_strategy_attribute() {
            "" | COMMON_STORAGE_TYPE => Ok(StorageProvisioner::Common),
            PER_WORKSPACE_STORAGE_TYPE => Ok(StorageProvisioner::PerWorkspace),
            ASYNC_STORAGE_TYPE => Ok(StorageProvisioner::Async),
            EPHEMERAL_STORAGE_TYPE => Ok(StorageProvisioner::Ephemeral),
            other => Err(WorkspaceError::fail(format!(
                "unsupported storage strategy '{other}'"
            ))),
        }
    }

    /// Whether stopping or deleting the workspace leaves cluster storage that
    /// this strategy must clean up (and hence whether a finalizer is needed).
    /// Per-workspace PVCs are cascade-deleted through their owner reference.
    pub fn needs_storage(&self, workspace: &Workspace) -> bool {
        match self {
            StorageProvisioner::Common | StorageProvisioner::Async => needs_storage(workspace),
            StorageProvisioner::PerWorkspace | StorageProvisioner::Ephemeral => false,
        }
    }

    /// Provision backing storage for the workspace and rewrite the pod
    /// additions so every volume mount points at it
    pub async fn provision<S: ClusterStore>(
        &self,
        workspace: &Workspace,
        additions: &mut PodAdditions,
        config: &OperatorConfig,
        namespaced: Option<&NamespacedConfig>,
        store: &S,
    ) -> Result<()> {
        match self {
            StorageProvisioner::Common => {
                common::provision(workspace, additions, config, namespaced, store).await
            }
            StorageProvisioner::PerWorkspace => {
                per_workspace::provision(workspace, additions, config, namespaced, store).await
            }
            StorageProvisioner::Async => {
                async_storage::provision(workspace, additions, config, namespaced, store).await
            }
            StorageProvisioner::Ephemeral => ephemeral::provision(workspace, additions),
        }
    }

    /// Remove the workspace's data from shared storage. Invoked when the
    /// workspace is deleted (or its strategy changes away from a shared one)
    pub async fn cleanup<S: ClusterStore>(
        &self,
        workspace: &Workspace,
        config: &OperatorConfig,
        namespaced: Option<&NamespacedConfig>,
        store: &S,
    ) -> Result<()> {
        match self {
            StorageProvisioner::Common => {
                common::cleanup(workspace, config, namespaced, store).await
            }
            StorageProvisioner::Async => {
                async_storage::cleanup(workspace, config, namespaced, store).await
            }
            StorageProvisioner::PerWorkspace | StorageProvisioner::Ephemeral => Ok(()),
        }
    }
}

/// Whether any other workspace in the namespace still stores data on the
/// shared PVC (common or async strategy). Decides between deleting the claim
/// outright and scrubbing one workspace's subtree.
pub(crate) async fn other_shared_pvc_users<S: ClusterStore>(
    workspace: &Workspace,
    store: &S,
) -> Result<bool> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;
    let all: Vec<Workspace> = store.list(namespace, None).await?;
    Ok(all.iter().any(|other| {
        if other.workspace_id().map(|id| id == workspace_id).unwrap_or(true) {
            return false;
        }
        matches!(
            StorageProvisioner::for_workspace(other),
            Ok(StorageProvisioner::Common) | Ok(StorageProvisioner::Async)
        )
    }))
}
