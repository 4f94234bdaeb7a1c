//! Cluster object store: trait, kube-backed implementation, test fake

mod kube;
mod store;

#[cfg(test)]
pub mod fake;

pub use self::kube::KubeStore;
pub use self::store::{kind_of, ClusterStore, StoreError, StoreObject};
