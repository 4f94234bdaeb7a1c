//! Async storage teardown
//!
//! Ordering matters: the relay is scaled down before the cleanup job runs so
//! no sidecar can write into the subtree being removed, and the relay objects
//! are only deleted once no workspace in the namespace uses async storage.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use tracing::info;

use super::{another_async_workspace, ssh};
use crate::cluster::{ClusterStore, StoreObject};
use crate::config::OperatorConfig;
use crate::constants::{
    ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME, ASYNC_RELAY_DEPLOYMENT_NAME, ASYNC_RELAY_SERVICE_NAME,
};
use crate::crd::Workspace;
use crate::error::{Result, WorkspaceError};
use crate::names::async_ssh_secret_name;
use crate::provision::config::NamespacedConfig;
use crate::provision::storage::cleanup::run_cleanup_job;
use crate::provision::storage::common::effective_pvc_name;

pub(in crate::provision::storage) async fn cleanup<S: ClusterStore>(
    workspace: &Workspace,
    config: &OperatorConfig,
    namespaced: Option<&NamespacedConfig>,
    store: &S,
) -> Result<()> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;

    scale_down_relay(namespace, store).await?;

    let pvc_name = effective_pvc_name(namespace, config, store).await?;
    let pvc_exists = match store.get::<PersistentVolumeClaim>(namespace, &pvc_name).await {
        Ok(_) => true,
        Err(err) if err.is_not_found() => false,
        Err(err) => return Err(err.into()),
    };
    if pvc_exists {
        run_cleanup_job(workspace_id, namespace, &pvc_name, config, namespaced, store).await?;
    }

    remove_workspace_key(workspace, store).await?;

    if !another_async_workspace(workspace, store).await? {
        info!(%namespace, "last async-storage workspace removed, deleting relay");
        delete_ignoring_missing::<Deployment, S>(namespace, ASYNC_RELAY_DEPLOYMENT_NAME, store)
            .await?;
        delete_ignoring_missing::<Service, S>(namespace, ASYNC_RELAY_SERVICE_NAME, store).await?;
        delete_ignoring_missing::<ConfigMap, S>(
            namespace,
            ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME,
            store,
        )
        .await?;
    }
    Ok(())
}

async fn delete_ignoring_missing<K: StoreObject, S: ClusterStore>(
    namespace: &str,
    name: &str,
    store: &S,
) -> Result<()> {
    match store.delete::<K>(namespace, name).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Stop the relay before scrubbing storage. Requeues until no replica is left
async fn scale_down_relay<S: ClusterStore>(namespace: &str, store: &S) -> Result<()> {
    let relay = match store
        .get::<Deployment>(namespace, ASYNC_RELAY_DEPLOYMENT_NAME)
        .await
    {
        Ok(relay) => relay,
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let desired_replicas = relay.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    if desired_replicas != 0 {
        let mut scaled = relay.clone();
        if let Some(spec) = scaled.spec.as_mut() {
            spec.replicas = Some(0);
        }
        store.update(&scaled).await?;
        return Err(WorkspaceError::retry("scaling async storage relay to zero"));
    }

    let running = relay.status.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    if running > 0 {
        return Err(WorkspaceError::retry(
            "waiting for async storage relay to stop",
        ));
    }
    Ok(())
}

/// Remove the workspace's public key from the relay and drop its key Secret
async fn remove_workspace_key<S: ClusterStore>(workspace: &Workspace, store: &S) -> Result<()> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;
    let secret_name = async_ssh_secret_name(workspace_id);

    match store.get::<Secret>(namespace, &secret_name).await {
        Ok(secret) => {
            if let Some(public_key) = secret
                .data
                .as_ref()
                .and_then(|d| d.get(ssh::PUBLIC_KEY_FILENAME))
                .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
            {
                ssh::remove_authorized_key(namespace, &public_key, store).await?;
            }
            match store.delete::<Secret>(namespace, &secret_name).await {
                Ok(()) => Ok(()),
                Err(err) if err.is_not_found() => Ok(()),
                Err(err) => Err(err.into()),
            }
        }
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeStore;
    use crate::constants::STORAGE_TYPE_ATTRIBUTE;
    use crate::provision::pod_additions::PodAdditions;
    use crate::testutil::{volume_component, workspace_with_attributes};
    use k8s_openapi::api::apps::v1::DeploymentStatus;
    use k8s_openapi::api::batch::v1::{Job, JobStatus};

    fn async_workspace(id: &str) -> Workspace {
        workspace_with_attributes(
            "ns",
            id,
            &[volume_component("data", None, false)],
            &[(STORAGE_TYPE_ATTRIBUTE, "async")],
        )
    }

    async fn run_until_settled(ws: &Workspace, store: &FakeStore) -> Result<()> {
        for _ in 0..20 {
            match cleanup(ws, &OperatorConfig::default(), None, store).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() => {
                    // Stand in for the controllers that react to our updates:
                    // the relay drains and the cleanup job finishes
                    if let Ok(mut relay) =
                        store.get::<Deployment>("ns", ASYNC_RELAY_DEPLOYMENT_NAME).await
                    {
                        if relay.spec.as_ref().and_then(|s| s.replicas) == Some(0) {
                            relay.status = Some(DeploymentStatus::default());
                            store.update(&relay).await.unwrap();
                        }
                    }
                    if let Ok(mut job) = store.get::<Job>("ns", "cleanup-ws1").await {
                        job.status = Some(JobStatus {
                            succeeded: Some(1),
                            ..Default::default()
                        });
                        store.update(&job).await.unwrap();
                    }
                }
                Err(err) => return Err(err),
            }
        }
        panic!("cleanup did not settle");
    }

    #[tokio::test]
    async fn test_full_teardown_removes_relay_when_last_workspace() {
        let store = FakeStore::new();
        let ws = async_workspace("ws1");
        store.seed(&ws);

        // Provision first so the relay, keys and claim exist
        for _ in 0..10 {
            let mut additions = PodAdditions::new();
            match super::super::provision(&ws, &mut additions, &OperatorConfig::default(), None, &store)
                .await
            {
                Ok(()) => break,
                Err(err) if err.is_retryable() => continue,
                Err(err) => panic!("provision failed: {err}"),
            }
        }

        run_until_settled(&ws, &store).await.unwrap();

        assert!(!store.contains::<Secret>("ns", "async-ssh-key-ws1"));
        assert!(!store.contains::<Deployment>("ns", ASYNC_RELAY_DEPLOYMENT_NAME));
        assert!(!store.contains::<Service>("ns", ASYNC_RELAY_SERVICE_NAME));
        assert!(!store.contains::<ConfigMap>("ns", ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME));
    }

    #[tokio::test]
    async fn test_relay_survives_while_other_async_workspace_exists() {
        let store = FakeStore::new();
        let ws = async_workspace("ws1");
        store.seed(&ws);
        store.seed(&async_workspace("ws2"));

        for _ in 0..10 {
            let mut additions = PodAdditions::new();
            match super::super::provision(&ws, &mut additions, &OperatorConfig::default(), None, &store)
                .await
            {
                Ok(()) => break,
                Err(err) if err.is_retryable() => continue,
                Err(err) => panic!("provision failed: {err}"),
            }
        }

        run_until_settled(&ws, &store).await.unwrap();

        assert!(!store.contains::<Secret>("ns", "async-ssh-key-ws1"));
        assert!(store.contains::<Deployment>("ns", ASYNC_RELAY_DEPLOYMENT_NAME));
        assert!(store.contains::<ConfigMap>("ns", ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME));
    }
}
