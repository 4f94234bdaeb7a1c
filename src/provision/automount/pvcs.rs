//! Automounted PersistentVolumeClaims
//!
//! A labeled claim is mounted as a directory; env and subpath styles do not
//! apply to block/file storage. Claims are the only automount kind that can
//! be writable, so the read-only annotation is honored rather than implied.

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimVolumeSource, Volume, VolumeMount,
};

use super::{AutomountSource, CollectedAutomounts, FileMount, MountStyle};
use crate::cluster::ClusterStore;
use crate::constants::MOUNT_LABEL;
use crate::error::{Result, WorkspaceError};
use crate::names::automount_pvc_volume_name;

pub(super) async fn collect<S: ClusterStore>(
    namespace: &str,
    store: &S,
    collected: &mut CollectedAutomounts,
) -> Result<()> {
    let selector = format!("{MOUNT_LABEL}=true");
    let mut claims: Vec<PersistentVolumeClaim> = store.list(namespace, Some(&selector)).await?;
    claims.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    for claim in claims {
        let name = claim.metadata.name.clone().unwrap_or_default();
        let options = super::mount_options(&claim.metadata)?;
        if options.style == MountStyle::Env {
            return Err(WorkspaceError::fail(format!(
                "automount PVC {name} cannot be mounted as environment variables"
            )));
        }

        let path = options.path.clone().unwrap_or_else(|| format!("/tmp/{name}"));
        collected.file_mounts.push(FileMount {
            source: AutomountSource::Pvc,
            object_name: name.clone(),
            volume: Volume {
                name: automount_pvc_volume_name(&name),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: name.clone(),
                    read_only: options.read_only.then_some(true),
                }),
                ..Default::default()
            },
            mount: VolumeMount {
                name: automount_pvc_volume_name(&name),
                mount_path: path,
                read_only: options.read_only.then_some(true),
                ..Default::default()
            },
            uses_subpath: false,
        });
    }
    Ok(())
}
