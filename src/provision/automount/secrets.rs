//! Automounted Secrets

use k8s_openapi::api::core::v1::{
    EnvFromSource, KeyToPath, Secret, SecretEnvSource, SecretVolumeSource, Volume, VolumeMount,
};

use super::{AutomountSource, CollectedAutomounts, FileMount, MountStyle};
use crate::cluster::ClusterStore;
use crate::constants::{
    DEFAULT_ACCESS_MODE, GITCONFIG_MOUNT_PATH, GIT_CREDENTIAL_LABEL, GIT_TLS_LABEL, MOUNT_LABEL,
};
use crate::error::Result;
use crate::names::automount_secret_volume_name;

pub(super) async fn collect<S: ClusterStore>(
    namespace: &str,
    store: &S,
    collected: &mut CollectedAutomounts,
) -> Result<()> {
    let selector = format!("{MOUNT_LABEL}=true");
    let mut secrets: Vec<Secret> = store.list(namespace, Some(&selector)).await?;
    secrets.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    for secret in secrets {
        let labels = secret.metadata.labels.clone().unwrap_or_default();
        if labels.contains_key(GIT_CREDENTIAL_LABEL) || labels.contains_key(GIT_TLS_LABEL) {
            continue;
        }

        let name = secret.metadata.name.clone().unwrap_or_default();
        let options = super::mount_options(&secret.metadata)?;
        match options.style {
            MountStyle::Env => collected.env_from.push(EnvFromSource {
                secret_ref: Some(SecretEnvSource {
                    name: Some(name),
                    optional: None,
                }),
                ..Default::default()
            }),
            MountStyle::File => {
                let path = options
                    .path
                    .clone()
                    .unwrap_or_else(|| format!("/etc/secret/{name}"));
                let keys: Vec<String> = secret
                    .data
                    .as_ref()
                    .map(|d| d.keys().cloned().collect())
                    .unwrap_or_default();
                collected.file_mounts.push(FileMount {
                    source: AutomountSource::Secret,
                    object_name: name.clone(),
                    volume: secret_volume(&name, options.access_mode, &keys),
                    mount: VolumeMount {
                        name: automount_secret_volume_name(&name),
                        mount_path: path,
                        read_only: Some(true),
                        ..Default::default()
                    },
                    uses_subpath: false,
                });
            }
            MountStyle::Subpath => {
                let base = options
                    .path
                    .clone()
                    .unwrap_or_else(|| format!("/etc/secret/{name}"));
                let base = base.trim_end_matches('/').to_string();
                for (key, content) in secret.data.clone().unwrap_or_default() {
                    let mount_path = format!("{base}/{key}");
                    if mount_path == GITCONFIG_MOUNT_PATH {
                        if let Ok(content) = String::from_utf8(content.0.clone()) {
                            collected.base_gitconfig.push((name.clone(), content));
                        }
                    }
                    collected.file_mounts.push(FileMount {
                        source: AutomountSource::Secret,
                        object_name: name.clone(),
                        volume: secret_volume(&name, options.access_mode, &[] as &[&str]),
                        mount: VolumeMount {
                            name: automount_secret_volume_name(&name),
                            mount_path,
                            sub_path: Some(key),
                            read_only: Some(true),
                            ..Default::default()
                        },
                        uses_subpath: true,
                    });
                }
            }
        }
    }
    Ok(())
}

/// File-style mount of a Secret at its default path. The git configuration
/// provisioner adjusts path and subpath as needed.
pub(super) fn file_mount_for(name: &str) -> FileMount {
    FileMount {
        source: AutomountSource::Secret,
        object_name: name.to_string(),
        volume: secret_volume(name, DEFAULT_ACCESS_MODE, &[] as &[&str]),
        mount: VolumeMount {
            name: automount_secret_volume_name(name),
            mount_path: format!("/etc/secret/{name}"),
            read_only: Some(true),
            ..Default::default()
        },
        uses_subpath: false,
    }
}

fn secret_volume(name: &str, access_mode: i32, keys: &[impl AsRef<str>]) -> Volume {
    let items = (access_mode != DEFAULT_ACCESS_MODE && !keys.is_empty()).then(|| {
        keys.iter()
            .map(|key| KeyToPath {
                key: key.as_ref().to_string(),
                path: key.as_ref().to_string(),
                mode: Some(access_mode),
            })
            .collect()
    });
    Volume {
        name: automount_secret_volume_name(name),
        secret: Some(SecretVolumeSource {
            secret_name: Some(name.to_string()),
            default_mode: Some(access_mode),
            items,
            optional: None,
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeStore;
    use crate::constants::MOUNT_AS_ANNOTATION;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    pub(crate) fn automount_secret(
        name: &str,
        annotations: &[(&str, &str)],
        data: &[(&str, &str)],
    ) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("test-ns".to_string()),
                labels: Some(
                    [(MOUNT_LABEL.to_string(), "true".to_string())]
                        .into_iter()
                        .collect(),
                ),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_file_mount_uses_secret_default_path() {
        let store = FakeStore::new();
        store.seed(&automount_secret("api-token", &[], &[("token", "s3cret")]));

        let mut collected = CollectedAutomounts::default();
        collect("test-ns", &store, &mut collected).await.unwrap();

        let mount = &collected.file_mounts[0];
        assert_eq!(mount.source, AutomountSource::Secret);
        assert_eq!(mount.mount.mount_path, "/etc/secret/api-token");
        assert_eq!(
            mount.volume.secret.as_ref().unwrap().secret_name.as_deref(),
            Some("api-token")
        );
    }

    #[tokio::test]
    async fn test_env_mount_produces_secret_env_from() {
        let store = FakeStore::new();
        store.seed(&automount_secret(
            "env-secrets",
            &[(MOUNT_AS_ANNOTATION, "env")],
            &[("TOKEN", "s3cret")],
        ));

        let mut collected = CollectedAutomounts::default();
        collect("test-ns", &store, &mut collected).await.unwrap();

        assert_eq!(
            collected.env_from[0].secret_ref.as_ref().unwrap().name.as_deref(),
            Some("env-secrets")
        );
    }

    #[tokio::test]
    async fn test_git_labeled_secrets_are_skipped() {
        let store = FakeStore::new();
        let mut secret = automount_secret("git-creds", &[], &[("credentials", "https://u:p@host")]);
        secret
            .metadata
            .labels
            .as_mut()
            .unwrap()
            .insert(GIT_CREDENTIAL_LABEL.to_string(), "true".to_string());
        store.seed(&secret);

        let mut collected = CollectedAutomounts::default();
        collect("test-ns", &store, &mut collected).await.unwrap();
        assert!(collected.file_mounts.is_empty());
        assert!(collected.env_from.is_empty());
    }
}
