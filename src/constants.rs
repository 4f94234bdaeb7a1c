//! Label and annotation contract shared with cluster operators
//!
//! Labels select objects for automounting or mark operator-managed resources;
//! annotations refine how a selected object is mounted. These strings are part
//! of the operator's public API and must stay stable across releases.

/// Label that marks a ConfigMap/Secret/PVC for automounting into workspace pods
pub const MOUNT_LABEL: &str = "workspace.dev/mount-to-workspace";

/// Annotation selecting the mount style: `env`, `file` or `subpath`
pub const MOUNT_AS_ANNOTATION: &str = "workspace.dev/mount-as";

/// Annotation selecting the mount path for file/subpath mounts
pub const MOUNT_PATH_ANNOTATION: &str = "workspace.dev/mount-path";

/// Annotation selecting the file access mode (octal, 0000-0777)
pub const MOUNT_ACCESS_MODE_ANNOTATION: &str = "workspace.dev/mount-access-mode";

/// Annotation marking an automounted PVC as read-only
pub const MOUNT_READ_ONLY_ANNOTATION: &str = "workspace.dev/read-only";

/// Label that marks a Secret as a git credentials source
pub const GIT_CREDENTIAL_LABEL: &str = "workspace.dev/git-credential";

/// Label that marks a ConfigMap as a git TLS certificate source
pub const GIT_TLS_LABEL: &str = "workspace.dev/git-tls-credential";

/// Label carrying the owning workspace's id on generated objects
pub const WORKSPACE_ID_LABEL: &str = "workspace.dev/workspace-id";

/// Label identifying which operator component created an object
pub const COMPONENT_LABEL: &str = "workspace.dev/component";

/// Label selecting the per-namespace configuration ConfigMap
pub const NAMESPACED_CONFIG_LABEL: &str = "workspace.dev/namespace-config";

/// Workspace template attribute selecting the storage strategy
pub const STORAGE_TYPE_ATTRIBUTE: &str = "workspace.dev/storage-type";

// Mount styles
pub const MOUNT_AS_ENV: &str = "env";
pub const MOUNT_AS_FILE: &str = "file";
pub const MOUNT_AS_SUBPATH: &str = "subpath";

// Storage strategy attribute values
pub const COMMON_STORAGE_TYPE: &str = "common";
pub const PER_WORKSPACE_STORAGE_TYPE: &str = "per-workspace";
pub const ASYNC_STORAGE_TYPE: &str = "async";
pub const EPHEMERAL_STORAGE_TYPE: &str = "ephemeral";

/// Name of the implicit volume backing project sources
pub const PROJECTS_VOLUME_NAME: &str = "projects";

/// Path where project sources are mounted in workspace containers
pub const PROJECTS_MOUNT_PATH: &str = "/projects";

/// Where the shared PVC is mounted inside the cleanup job
pub const PVC_CLEANUP_MOUNT_PATH: &str = "/tmp/workspaces";

/// Canonical system-wide gitconfig path
pub const GITCONFIG_MOUNT_PATH: &str = "/etc/gitconfig";

// Fixed names of namespace-scoped objects owned by the async storage strategy
pub const ASYNC_RELAY_DEPLOYMENT_NAME: &str = "async-storage";
pub const ASYNC_RELAY_SERVICE_NAME: &str = "async-storage";
pub const ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME: &str = "async-storage-config";
pub const ASYNC_AUTHORIZED_KEYS_FILENAME: &str = "authorized_keys";
pub const ASYNC_SSH_KEY_FILENAME: &str = "id_ed25519";
pub const ASYNC_RELAY_SSH_PORT: i32 = 2222;

// Fixed names of generated git configuration objects
pub const GIT_CREDENTIALS_SECRET_NAME: &str = "workspace-merged-git-credentials";
pub const GIT_CREDENTIALS_SECRET_KEY: &str = "credentials";
pub const GITCONFIG_CONFIGMAP_NAME: &str = "workspace-gitconfig";
pub const GITCONFIG_CONFIGMAP_KEY: &str = "gitconfig";

// Per-namespace configuration ConfigMap keys
pub const NAMESPACED_CONFIG_COMMON_PVC_SIZE_KEY: &str = "commonPVCSize";
pub const NAMESPACED_CONFIG_PER_WORKSPACE_PVC_SIZE_KEY: &str = "perWorkspacePVCSize";
pub const NAMESPACED_CONFIG_NODE_SELECTOR_KEY: &str = "nodeSelector";
pub const NAMESPACED_CONFIG_POD_TOLERATIONS_KEY: &str = "podTolerations";

/// Default access mode for automounted ConfigMap/Secret files (0640 octal)
pub const DEFAULT_ACCESS_MODE: i32 = 0o640;
