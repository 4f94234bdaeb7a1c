//! SSH key material for the async storage relay
//!
//! Each workspace gets its own ed25519 keypair, stored in a Secret owned by
//! the workspace. The public half is appended to the relay's authorized-keys
//! ConfigMap so the sidecar can push file changes over SSH.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use kube::Resource;
use rand_core::OsRng;
use ssh_key::{Algorithm, LineEnding, PrivateKey};
use tracing::info;

use crate::cluster::ClusterStore;
use crate::constants::{
    ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME, ASYNC_AUTHORIZED_KEYS_FILENAME, ASYNC_SSH_KEY_FILENAME,
    WORKSPACE_ID_LABEL,
};
use crate::crd::Workspace;
use crate::error::{Result, WorkspaceError};
use crate::names::async_ssh_secret_name;
use crate::sync::sync_object_with_cluster;

pub(super) const PUBLIC_KEY_FILENAME: &str = "id_ed25519.pub";

/// A workspace's SSH identity for the relay
pub(super) struct SshConfig {
    pub secret_name: String,
    pub public_key: String,
}

/// Fetch the workspace's SSH key Secret, generating and storing a fresh
/// keypair when it does not exist yet
pub(super) async fn get_or_create_ssh_config<S: ClusterStore>(
    workspace: &Workspace,
    store: &S,
) -> Result<SshConfig> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;
    let secret_name = async_ssh_secret_name(workspace_id);

    match store.get::<Secret>(namespace, &secret_name).await {
        Ok(secret) => {
            let public_key = secret_value(&secret, PUBLIC_KEY_FILENAME).ok_or_else(|| {
                WorkspaceError::fail(format!(
                    "SSH key secret {secret_name} is missing {PUBLIC_KEY_FILENAME}"
                ))
            })?;
            Ok(SshConfig {
                secret_name,
                public_key,
            })
        }
        Err(err) if err.is_not_found() => {
            let (private_key, public_key) = generate_keypair()?;
            info!(%namespace, %secret_name, "generated SSH keypair for async storage");
            let secret = ssh_key_secret(workspace, &secret_name, &private_key, &public_key)?;
            store.create(&secret).await?;
            Ok(SshConfig {
                secret_name,
                public_key,
            })
        }
        Err(err) => Err(err.into()),
    }
}

/// Make sure the relay's authorized-keys ConfigMap contains the given key
pub(super) async fn ensure_authorized_key<S: ClusterStore>(
    namespace: &str,
    public_key: &str,
    store: &S,
) -> Result<()> {
    let mut keys = read_authorized_keys(namespace, store).await?;
    if !keys.iter().any(|k| k == public_key) {
        keys.push(public_key.to_string());
    }
    sync_object_with_cluster(&authorized_keys_configmap(namespace, &keys), store).await?;
    Ok(())
}

/// Drop the given key from the authorized-keys ConfigMap if present
pub(super) async fn remove_authorized_key<S: ClusterStore>(
    namespace: &str,
    public_key: &str,
    store: &S,
) -> Result<()> {
    match store
        .get::<ConfigMap>(namespace, ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME)
        .await
    {
        Ok(_) => {}
        Err(err) if err.is_not_found() => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    let keys: Vec<String> = read_authorized_keys(namespace, store)
        .await?
        .into_iter()
        .filter(|k| k != public_key)
        .collect();
    sync_object_with_cluster(&authorized_keys_configmap(namespace, &keys), store).await?;
    Ok(())
}

async fn read_authorized_keys<S: ClusterStore>(
    namespace: &str,
    store: &S,
) -> Result<Vec<String>> {
    match store
        .get::<ConfigMap>(namespace, ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME)
        .await
    {
        Ok(configmap) => Ok(configmap
            .data
            .and_then(|d| d.get(ASYNC_AUTHORIZED_KEYS_FILENAME).cloned())
            .map(|raw| raw.lines().map(str::to_string).collect())
            .unwrap_or_default()),
        Err(err) if err.is_not_found() => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

fn authorized_keys_configmap(namespace: &str, keys: &[String]) -> ConfigMap {
    let mut content = keys.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            ASYNC_AUTHORIZED_KEYS_FILENAME.to_string(),
            content,
        )])),
        ..Default::default()
    }
}

fn generate_keypair() -> Result<(String, String)> {
    let private = PrivateKey::random(&mut OsRng, Algorithm::Ed25519)
        .map_err(|e| WorkspaceError::fail_with("failed to generate SSH keypair", e))?;
    let private_openssh = private
        .to_openssh(LineEnding::LF)
        .map_err(|e| WorkspaceError::fail_with("failed to encode SSH private key", e))?
        .to_string();
    let public_openssh = private
        .public_key()
        .to_openssh()
        .map_err(|e| WorkspaceError::fail_with("failed to encode SSH public key", e))?;
    Ok((private_openssh, public_openssh))
}

fn ssh_key_secret(
    workspace: &Workspace,
    secret_name: &str,
    private_key: &str,
    public_key: &str,
) -> Result<Secret> {
    let namespace = workspace.workspace_namespace()?;
    let workspace_id = workspace.workspace_id()?;
    let owner_ref = workspace
        .controller_owner_ref(&())
        .ok_or_else(|| WorkspaceError::fail("workspace has no uid, cannot own its SSH key"))?;
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(secret_name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                WORKSPACE_ID_LABEL.to_string(),
                workspace_id.to_string(),
            )])),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        data: Some(BTreeMap::from([
            (
                ASYNC_SSH_KEY_FILENAME.to_string(),
                ByteString(private_key.as_bytes().to_vec()),
            ),
            (
                PUBLIC_KEY_FILENAME.to_string(),
                ByteString(public_key.as_bytes().to_vec()),
            ),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    })
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
}
