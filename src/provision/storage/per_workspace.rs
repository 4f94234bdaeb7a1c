//! Per-workspace storage strategy
//!
//! Each workspace gets its own PVC named `storage-<workspaceId>`, owned by the
//! workspace object so deletion cascades without a finalizer. Volumes become
//! subpaths of that claim. When the computed size outgrows the claim and the
//! storage class permits expansion, the claim is resized in place behind the
//! experimental-features gate.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::Resource;
use tracing::info;

use super::quantity::parse_quantity;
use super::shared::{
    add_ephemeral_volumes, calculate_pvc_size, collect_volumes, per_workspace_size_override,
    pvc_volume, rewrite_mounts_to_volume, storage_pvc,
};
use crate::cluster::ClusterStore;
use crate::config::OperatorConfig;
use crate::crd::Workspace;
use crate::error::{Result, WorkspaceError};
use crate::names::per_workspace_pvc_name;
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
        return Ok(());
    }

    let pvc_name = per_workspace_pvc_name(workspace_id);
    let size = calculate_pvc_size(
        &volumes.persistent,
        &config.workspace.default_per_workspace_pvc_size,
        per_workspace_size_override(namespaced),
    )?;

    match store.get::<PersistentVolumeClaim>(namespace, &pvc_name).await {
        Ok(existing) => {
            maybe_expand(&existing, &size, config, store).await?;
        }
        Err(err) if err.is_not_found() => {
            let mut desired = storage_pvc(&pvc_name, namespace, &size, config);
            let owner_ref = workspace.controller_owner_ref(&()).ok_or_else(|| {
                WorkspaceError::fail("workspace has no uid, cannot own its storage")
            })?;
            desired.metadata.owner_references = Some(vec![owner_ref]);
            info!(%namespace, %pvc_name, %size, "creating per-workspace PVC");
            sync_object_with_cluster(&desired, store).await?;
        }
        Err(err) => return Err(err.into()),
    }

    let names: Vec<String> = volumes.persistent.iter().map(|v| v.name.clone()).collect();
    additions.add_volume(pvc_volume(&pvc_name, &pvc_name))?;
    rewrite_mounts_to_volume(additions, &names, &pvc_name, str::to_string);
    Ok(())
}

/// Grow the claim in place when the workspace now needs more space than it
/// has, the storage class allows expansion, and the experimental gate is on.
/// Shrinking is never attempted; the existing size simply wins.
async fn maybe_expand<S: ClusterStore>(
    existing: &PersistentVolumeClaim,
    desired_size: &str,
    config: &OperatorConfig,
    store: &S,
) -> Result<()> {
    if !config.enable_experimental_features {
        return Ok(());
    }
    let current = existing
        .spec
        .as_ref()
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"))
        .map(|q| q.0.as_str())
        .unwrap_or("0");
    if parse_quantity(desired_size)? <= parse_quantity(current)? {
        return Ok(());
    }

    let Some(class_name) = existing
        .spec
        .as_ref()
        .and_then(|s| s.storage_class_name.clone())
        .or_else(|| config.workspace.storage_class_name.clone())
    else {
        return Ok(());
    };
    let class = match store.get_storage_class(&class_name).await {
        Ok(class) => class,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    };
    if class.allow_volume_expansion != Some(true) {
        return Ok(());
    }

    let name = existing.metadata.name.as_deref().unwrap_or_default();
    info!(pvc = %name, %current, desired = %desired_size, "expanding per-workspace PVC");
    let mut expanded = existing.clone();
    if let Some(requests) = expanded
        .spec
        .as_mut()
        .and_then(|s| s.resources.as_mut())
        .and_then(|r| r.requests.as_mut())
    {
        requests.insert("storage".to_string(), Quantity(desired_size.to_string()));
    }
    store.update(&expanded).await?;
    Err(WorkspaceError::retry(format!(
        "waiting for PVC {name} to expand to {desired_size}"
    )))
}
