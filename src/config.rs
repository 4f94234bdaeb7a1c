//! Operator-level configuration
//!
//! Global defaults for storage provisioning. Per-namespace overrides live in
//! [`crate::provision::config::NamespacedConfig`] and take precedence where
//! both define a value.

use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkspaceError};

// =============================================================================
// Configuration Types
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperatorConfig {
    /// Workspace storage defaults
    pub workspace: WorkspaceDefaults,
    /// Cleanup job settings
    pub cleanup_job: CleanupJobConfig,
    /// Async storage relay settings
    pub async_storage: AsyncStorageConfig,
    /// Gates in-place PVC expansion for the per-workspace strategy
    pub enable_experimental_features: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceDefaults {
    /// Name of the shared PVC used by the common and async strategies
    pub common_pvc_name: String,
    /// Administrator-provided claim that replaces the shared PVC when present
    pub alternate_pvc_name: Option<String>,
    /// StorageClass for operator-created PVCs. `None` uses the cluster default
    pub storage_class_name: Option<String>,
    /// Default size of the shared PVC
    pub default_common_pvc_size: String,
    /// Default size of per-workspace PVCs
    pub default_per_workspace_pvc_size: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CleanupJobConfig {
    /// Image run by the cleanup job
    pub image: String,
    /// CPU limit for the cleanup container
    pub cpu_limit: String,
    /// Memory limit for the cleanup container
    pub memory_limit: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AsyncStorageConfig {
    /// Image of the rsync/ssh relay server deployment
    pub server_image: String,
    /// Image of the per-workspace sync sidecar
    pub sidecar_image: String,
    /// Memory limit for the relay container
    pub memory_limit: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            workspace: WorkspaceDefaults::default(),
            cleanup_job: CleanupJobConfig::default(),
            async_storage: AsyncStorageConfig::default(),
            enable_experimental_features: false,
        }
    }
}

impl Default for WorkspaceDefaults {
    fn default() -> Self {
        Self {
            common_pvc_name: "workspace-storage".to_string(),
            alternate_pvc_name: None,
            storage_class_name: None,
            default_common_pvc_size: "10Gi".to_string(),
            default_per_workspace_pvc_size: "5Gi".to_string(),
        }
    }
}

impl Default for CleanupJobConfig {
    fn default() -> Self {
        Self {
            image: "registry.access.redhat.com/ubi9/ubi-micro:latest".to_string(),
            cpu_limit: "100m".to_string(),
            memory_limit: "32Mi".to_string(),
        }
    }
}

impl Default for AsyncStorageConfig {
    fn default() -> Self {
        Self {
            server_image: "quay.io/workspace-dev/async-storage-server:latest".to_string(),
            sidecar_image: "quay.io/workspace-dev/async-storage-sidecar:latest".to_string(),
            memory_limit: "512Mi".to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from a YAML file, falling back to defaults for
    /// unset fields
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| WorkspaceError::fail_with(format!("failed to read config {path}"), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| WorkspaceError::fail_with(format!("failed to parse config {path}"), e))
    }
}
