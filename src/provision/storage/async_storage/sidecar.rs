//! The per-workspace sync sidecar
//!
//! Runs next to the workspace containers, watches the emptyDir-backed volumes
//! and pushes changes to the relay over SSH using the workspace's private key.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EnvVar, ResourceRequirements, SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::config::OperatorConfig;
use crate::constants::{ASYNC_RELAY_SERVICE_NAME, ASYNC_RELAY_SSH_PORT};

pub(super) const SIDECAR_CONTAINER_NAME: &str = "async-sync-sidecar";
const SSH_KEY_VOLUME_NAME: &str = "async-ssh-key";
const SSH_KEY_MOUNT_PATH: &str = "/etc/ssh/private";

/// Pod volume exposing the workspace's SSH key Secret
pub(super) fn ssh_key_volume(secret_name: &str) -> Volume {
    Volume {
        name: SSH_KEY_VOLUME_NAME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            default_mode: Some(0o600),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The sidecar container, mounting the key read-only and every synced volume
/// at `/<volumeName>`
pub(super) fn sidecar_container(
    workspace_id: &str,
    volume_names: &[String],
    config: &OperatorConfig,
) -> Container {
    let mut mounts = vec![VolumeMount {
        name: SSH_KEY_VOLUME_NAME.to_string(),
        mount_path: SSH_KEY_MOUNT_PATH.to_string(),
        read_only: Some(true),
        ..Default::default()
    }];
    for name in volume_names {
        mounts.push(VolumeMount {
            name: name.clone(),
            mount_path: format!("/{name}"),
            ..Default::default()
        });
    }

    Container {
        name: SIDECAR_CONTAINER_NAME.to_string(),
        image: Some(config.async_storage.sidecar_image.clone()),
        env: Some(vec![
            EnvVar {
                name: "RSYNC_REMOTE_HOST".to_string(),
                value: Some(ASYNC_RELAY_SERVICE_NAME.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "RSYNC_REMOTE_PORT".to_string(),
                value: Some(ASYNC_RELAY_SSH_PORT.to_string()),
                ..Default::default()
            },
            EnvVar {
                name: "WORKSPACE_ID".to_string(),
                value: Some(workspace_id.to_string()),
                ..Default::default()
            },
        ]),
        resources: Some(ResourceRequirements {
            limits: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity(config.async_storage.memory_limit.clone()),
            )])),
            ..Default::default()
        }),
        volume_mounts: Some(mounts),
        ..Default::default()
    }
}
