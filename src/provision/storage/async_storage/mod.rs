//! Async storage strategy
//!
//! Workspace volumes stay local (emptyDir) for fast I/O; a sidecar container
//! mirrors them to the namespace's shared PVC through an SSH relay. Only one
//! started workspace per namespace may use this strategy, since the relay
//! serves a single workspace's subtree at a time.

mod cleanup;
mod deployment;
mod sidecar;
mod ssh;

pub(super) use cleanup::cleanup;

use tracing::debug;

use super::common::ensure_shared_pvc;
use super::shared::{add_ephemeral_volumes, collect_volumes};
use crate::cluster::ClusterStore;
use crate::config::OperatorConfig;
use crate::crd::Workspace;
use crate::error::{Result, WorkspaceError};
use crate::provision::config::NamespacedConfig;
use crate::provision::pod_additions::PodAdditions;
use crate::provision::storage::StorageProvisioner;
use crate::sync::sync_object_with_cluster;

pub(super) async fn provision<S: ClusterStore>(
    workspace: &Workspace,
    additions: &mut PodAdditions,
    config: &OperatorConfig,
    namespaced: Option<&NamespacedConfig>,
    store: &S,
) -> Result<()> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;
    let volumes = collect_volumes(workspace);

    add_ephemeral_volumes(additions, &volumes.ephemeral)?;
    if volumes.persistent.is_empty() {
        debug!(%workspace_id, "workspace needs no synced storage");
        return Ok(());
    }

    if another_started_async_workspace(workspace, store).await? {
        return Err(WorkspaceError::fail(
            "cannot provision async storage: another started workspace in this namespace already uses it",
        ));
    }

    let pvc_name = ensure_shared_pvc(namespace, &volumes.persistent, config, namespaced, store).await?;

    let ssh_config = ssh::get_or_create_ssh_config(workspace, store).await?;
    ssh::ensure_authorized_key(namespace, &ssh_config.public_key, store).await?;

    sync_object_with_cluster(
        &deployment::relay_deployment(namespace, &pvc_name, config, namespaced),
        store,
    )
    .await?;
    sync_object_with_cluster(&deployment::relay_service(namespace), store).await?;

    // Synced volumes are local emptyDirs; the sidecar mirrors them out
    add_ephemeral_volumes(additions, &volumes.persistent)?;
    additions.add_volume(sidecar::ssh_key_volume(&ssh_config.secret_name))?;
    let names: Vec<String> = volumes.persistent.iter().map(|v| v.name.clone()).collect();
    additions.add_container(sidecar::sidecar_container(workspace_id, &names, config))?;
    Ok(())
}

/// Whether any other started workspace in the namespace uses async storage
async fn another_started_async_workspace<S: ClusterStore>(
    workspace: &Workspace,
    store: &S,
) -> Result<bool> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;
    let all: Vec<Workspace> = store.list(namespace, None).await?;
    Ok(all.iter().any(|other| {
        other.workspace_id().map(|id| id != workspace_id).unwrap_or(false)
            && other.is_started()
            && matches!(
                StorageProvisioner::for_workspace(other),
                Ok(StorageProvisioner::Async)
            )
    }))
}

/// Whether any other workspace (started or not) still uses async storage,
/// which keeps the relay and its ConfigMap alive during teardown
async fn another_async_workspace<S: ClusterStore>(
    workspace: &Workspace,
    store: &S,
) -> Result<bool> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;
    let all: Vec<Workspace> = store.list(namespace, None).await?;
    Ok(all.iter().any(|other| {
        other.workspace_id().map(|id| id != workspace_id).unwrap_or(false)
            && matches!(
                StorageProvisioner::for_workspace(other),
                Ok(StorageProvisioner::Async)
            )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeStore;
    use crate::constants::STORAGE_TYPE_ATTRIBUTE;
    use crate::testutil::{volume_component, workspace_with_attributes};
    use assert_matches::assert_matches;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};

    fn async_workspace(id: &str, started: bool) -> Workspace {
        let mut ws = workspace_with_attributes(
            "ns",
            id,
            &[volume_component("data", None, false)],
            &[(STORAGE_TYPE_ATTRIBUTE, "async")],
        );
        ws.spec.started = started;
        ws
    }

    async fn provision_until_settled(ws: &Workspace, store: &FakeStore) -> Result<PodAdditions> {
        // Each pass may create one object and requeue; a handful of passes
        // reaches steady state
        for _ in 0..10 {
            let mut additions = PodAdditions::new();
            match provision(ws, &mut additions, &OperatorConfig::default(), None, store).await {
                Ok(()) => return Ok(additions),
                Err(err) if err.is_retryable() => continue,
                Err(err) => return Err(err),
            }
        }
        panic!("provisioning did not settle");
    }

    #[tokio::test]
    async fn test_provision_builds_relay_and_sidecar() {
        let store = FakeStore::new();
        let ws = async_workspace("ws1", true);
        store.seed(&ws);

        let additions = provision_until_settled(&ws, &store).await.unwrap();

        assert!(store.contains::<PersistentVolumeClaim>("ns", "workspace-storage"));
        assert!(store.contains::<Secret>("ns", "async-ssh-key-ws1"));
        assert!(store.contains::<ConfigMap>("ns", "async-storage-config"));
        assert!(store.contains::<Deployment>("ns", "async-storage"));
        assert!(store.contains::<Service>("ns", "async-storage"));

        // Volumes stay local; the sidecar mirrors them
        assert!(additions.has_volume("data"));
        assert!(additions.has_volume("async-ssh-key"));
        let sidecar = &additions.containers()[0];
        assert_eq!(sidecar.name, "async-sync-sidecar");
        assert!(sidecar
            .volume_mounts
            .as_ref()
            .unwrap()
            .iter()
            .any(|m| m.mount_path == "/data"));
    }

    #[tokio::test]
    async fn test_second_started_async_workspace_fails() {
        let store = FakeStore::new();
        let running = async_workspace("ws1", true);
        store.seed(&running);
        let second = async_workspace("ws2", true);
        store.seed(&second);

        let mut additions = PodAdditions::new();
        assert_matches!(
            provision(&second, &mut additions, &OperatorConfig::default(), None, &store).await,
            Err(WorkspaceError::Fail(_))
        );
    }

    #[tokio::test]
    async fn test_stopped_async_workspace_does_not_block() {
        let store = FakeStore::new();
        let stopped = async_workspace("ws1", false);
        store.seed(&stopped);
        let second = async_workspace("ws2", true);
        store.seed(&second);

        provision_until_settled(&second, &store).await.unwrap();
    }
}
