//! Workspace Operator - Provisioning Core
//!
//! A Kubernetes operator library that turns workspace definitions into
//! cluster resources: persistent storage under one of four strategies,
//! and automounted configuration from labeled namespace objects.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Workspace Reconciler                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────────────┐   ┌───────────────────────────────┐  │
//! │  │  Storage Provisioner  │   │   Automount Provisioner       │  │
//! │  │  common / per-ws /    │   │   ConfigMaps / Secrets /      │  │
//! │  │  async / ephemeral    │   │   PVCs / git configuration    │  │
//! │  └───────────┬───────────┘   └──────────────┬────────────────┘  │
//! │              │        PodAdditions          │                   │
//! │              └──────────────┬───────────────┘                   │
//! │                  ┌──────────┴──────────┐                        │
//! │                  │     Sync Engine     │                        │
//! │                  │  (diff + converge)  │                        │
//! │                  └──────────┬──────────┘                        │
//! │                  ┌──────────┴──────────┐                        │
//! │                  │    ClusterStore     │                        │
//! │                  │  (kube-rs client)   │                        │
//! │                  └─────────────────────┘                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`crd`]: Workspace and WorkspaceRouting custom resources
//! - [`sync`]: Generic desired-vs-cluster convergence engine
//! - [`cluster`]: Typed access to the Kubernetes API
//! - [`provision`]: Storage strategies, automounts and pod additions
//! - [`error`]: Error taxonomy mapped to reconcile actions

pub mod cluster;
pub mod config;
pub mod constants;
pub mod crd;
pub mod error;
pub mod names;
pub mod provision;
pub mod sync;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use cluster::{ClusterStore, KubeStore, StoreError};
pub use crd::{
    Component, ComponentVolumeMount, ContainerComponent, VolumeComponent, Workspace,
    WorkspacePhase, WorkspaceRouting, WorkspaceSpec, WorkspaceStatus,
};
pub use error::{ReconcileAction, Result, WorkspaceError};
pub use provision::{PodAdditions, StorageProvisioner};
pub use sync::{sync_object_with_cluster, SyncError, SyncReason, Syncable};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
