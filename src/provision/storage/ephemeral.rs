//! Ephemeral storage strategy: every volume is emptyDir
//!
//! Nothing survives the pod, so there is no PVC to create and no cleanup to
//! run. Declared sizes become emptyDir size limits.

use super::shared::{add_ephemeral_volumes, collect_volumes};
use crate::crd::Workspace;
use crate::error::Result;
use crate::provision::pod_additions::PodAdditions;

pub(super) fn provision(workspace: &Workspace, additions: &mut PodAdditions) -> Result<()> {
    let volumes = collect_volumes(workspace);
    add_ephemeral_volumes(additions, &volumes.persistent)?;
    add_ephemeral_volumes(additions, &volumes.ephemeral)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{container_component, volume_component, workspace};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    #[test]
    fn test_all_volumes_become_empty_dir() {
        let ws = workspace(
            "ns",
            "ws1",
            &[
                container_component("dev", true),
                volume_component("data", Some("1Gi"), false),
                volume_component("scratch", None, true),
            ],
        );
        let mut additions = PodAdditions::new();
        provision(&ws, &mut additions).unwrap();

        // data, scratch and the implicit projects volume
        assert_eq!(additions.volumes().len(), 3);
        assert!(additions.volumes().iter().all(|v| v.empty_dir.is_some()));
        let data = additions.volumes().iter().find(|v| v.name == "data").unwrap();
        assert_eq!(
            data.empty_dir.as_ref().unwrap().size_limit,
            Some(Quantity("1Gi".to_string()))
        );
        assert!(additions.has_volume("projects"));
    }
}
