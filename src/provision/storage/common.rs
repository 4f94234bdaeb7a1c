//! Common storage strategy: one shared PVC per namespace
//!
//! Every workspace volume lives under `<workspaceId>/<volumeName>` on the
//! shared claim. The claim itself is created lazily with the computed size and
//! never resized afterwards.

use std::time::Duration;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use tracing::{debug, info};

use super::cleanup::run_cleanup_job;
use super::shared::{
    add_ephemeral_volumes, calculate_pvc_size, collect_volumes, common_size_override, pvc_volume,
    rewrite_mounts_to_volume, storage_pvc,
};
use super::other_shared_pvc_users;
use crate::cluster::ClusterStore;
use crate::config::OperatorConfig;
use crate::crd::Workspace;
use crate::error::{Result, WorkspaceError};
use crate::provision::config::NamespacedConfig;
use crate::provision::pod_additions::PodAdditions;
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
        debug!(%workspace_id, "workspace needs no persistent storage");
        return Ok(());
    }

    let pvc_name = ensure_shared_pvc(namespace, &volumes.persistent, config, namespaced, store).await?;

    let names: Vec<String> = volumes.persistent.iter().map(|v| v.name.clone()).collect();
    additions.add_volume(pvc_volume(&pvc_name, &pvc_name))?;
    rewrite_mounts_to_volume(additions, &names, &pvc_name, |volume| {
        format!("{workspace_id}/{volume}")
    });
    Ok(())
}

pub(super) async fn cleanup<S: ClusterStore>(
    workspace: &Workspace,
    config: &OperatorConfig,
    namespaced: Option<&NamespacedConfig>,
    store: &S,
) -> Result<()> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;

    let pvc_name = effective_pvc_name(namespace, config, store).await?;
    match store.get::<PersistentVolumeClaim>(namespace, &pvc_name).await {
        Ok(_) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    }

    if !other_shared_pvc_users(workspace, store).await? {
        info!(%namespace, %pvc_name, "last shared-storage workspace removed, deleting PVC");
        return match store.delete::<PersistentVolumeClaim>(namespace, &pvc_name).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        };
    }

    run_cleanup_job(workspace_id, namespace, &pvc_name, config, namespaced, store).await
}

/// Make sure the namespace's shared claim exists and is usable, creating it
/// with the computed size when absent. A terminating claim means a previous
/// deletion is still draining; back off briefly instead of racing it.
pub(super) async fn ensure_shared_pvc<S: ClusterStore>(
    namespace: &str,
    persistent: &[super::shared::VolumeSpec],
    config: &OperatorConfig,
    namespaced: Option<&NamespacedConfig>,
    store: &S,
) -> Result<String> {
    let pvc_name = effective_pvc_name(namespace, config, store).await?;
    match store.get::<PersistentVolumeClaim>(namespace, &pvc_name).await {
        Ok(pvc) if pvc.metadata.deletion_timestamp.is_some() => {
            return Err(WorkspaceError::retry_after(
                format!("shared PVC {pvc_name} is terminating"),
                Duration::from_secs(2),
            ));
        }
        Ok(_) => {}
        Err(err) if err.is_not_found() => {
            let size = calculate_pvc_size(
                persistent,
                &config.workspace.default_common_pvc_size,
                common_size_override(namespaced),
            )?;
            info!(%namespace, %pvc_name, %size, "creating shared storage PVC");
            sync_object_with_cluster(&storage_pvc(&pvc_name, namespace, &size, config), store)
                .await?;
        }
        Err(err) => return Err(err.into()),
    }
    Ok(pvc_name)
}

/// The claim the namespace's workspaces share. An administrator-provided
/// alternate claim wins over the configured default when it exists.
pub(super) async fn effective_pvc_name<S: ClusterStore>(
    namespace: &str,
    config: &OperatorConfig,
    store: &S,
) -> Result<String> {
    if let Some(alternate) = &config.workspace.alternate_pvc_name {
        match store.get::<PersistentVolumeClaim>(namespace, alternate).await {
            Ok(_) => return Ok(alternate.clone()),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(config.workspace.common_pvc_name.clone())
}
