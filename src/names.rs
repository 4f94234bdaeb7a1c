//! Deterministic names for objects the operator derives from a workspace
//!
//! Every generated object's name is a pure function of the workspace id (or of
//! the source object's name), so repeated reconciles address the same cluster
//! objects without any stored state.

/// PVC name for the per-workspace storage strategy
pub fn per_workspace_pvc_name(workspace_id: &str) -> String {
    format!("storage-{workspace_id}")
}

/// Name of the batch Job that removes a workspace's files from the shared PVC
pub fn cleanup_job_name(workspace_id: &str) -> String {
    format!("cleanup-{workspace_id}")
}

/// Name of the Secret holding a workspace's async storage SSH keypair
pub fn async_ssh_secret_name(workspace_id: &str) -> String {
    format!("async-ssh-key-{workspace_id}")
}

/// Volume name for an automounted ConfigMap
pub fn automount_configmap_volume_name(configmap_name: &str) -> String {
    format!("automount-configmap-{configmap_name}")
}

/// Volume name for an automounted Secret
pub fn automount_secret_volume_name(secret_name: &str) -> String {
    format!("automount-secret-{secret_name}")
}

/// Volume name for an automounted PVC
pub fn automount_pvc_volume_name(claim_name: &str) -> String {
    format!("automount-pvc-{claim_name}")
}

/// Volume name for a projected volume merging several automounts at one path.
/// The path is sanitized into a DNS-1123-safe suffix.
pub fn projected_volume_name(mount_path: &str) -> String {
    let mut sanitized: String = mount_path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    sanitized = sanitized.trim_matches('-').to_string();
    while sanitized.contains("--") {
        sanitized = sanitized.replace("--", "-");
    }
    format!("automount-projected-{sanitized}")
}
