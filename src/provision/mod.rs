//! Provisioners that turn a workspace definition into cluster resources

pub mod automount;
pub mod config;
pub mod pod_additions;
pub mod storage;

pub use self::automount::{
    collect_automount_resources, provision_automount_resources_into, AutomountResources,
};
pub use self::config::{read_namespaced_config, NamespacedConfig};
pub use self::pod_additions::PodAdditions;
pub use self::storage::StorageProvisioner;
