//! Generic sync engine
//!
//! [`sync_object_with_cluster`] drives one desired object toward the cluster:
//! create it if absent, compare it to the cluster's copy under the kind's diff
//! policy, and update or delete-and-recreate as that policy dictates. A call
//! that mutated the cluster returns [`SyncError::NotInSync`] so the caller
//! requeues and verifies convergence on the next pass; only an unchanged,
//! matching object is returned as `Ok`.

mod diff;

use std::fmt;

use thiserror::Error;
use tracing::{debug, info};

pub use diff::{Diff, Syncable};

use crate::cluster::{kind_of, ClusterStore, StoreError};

// =============================================================================
// Sync Outcomes
// =============================================================================

/// Why an object is not yet in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncReason {
    /// The object was just created
    Created,
    /// The object was just updated
    Updated,
    /// The object was deleted so it can be recreated
    Deleted,
    /// A race (conflict or concurrent delete) was detected; retry resolves it
    NeedRetry,
}

impl fmt::Display for SyncReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncReason::Created => write!(f, "created"),
            SyncReason::Updated => write!(f, "updated"),
            SyncReason::Deleted => write!(f, "deleted"),
            SyncReason::NeedRetry => write!(f, "needs retry"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// The cluster was mutated (or a race detected); requeue and re-verify
    #[error("{kind} {name} is not in sync: {reason}")]
    NotInSync {
        kind: String,
        name: String,
        reason: SyncReason,
    },

    /// The desired object was rejected by the API server and retrying the
    /// same object cannot succeed
    #[error("cannot sync {kind} {name}: {message}")]
    Unrecoverable {
        kind: String,
        name: String,
        message: String,
    },

    /// Store I/O failure outside the sync protocol
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Drive `desired` toward the cluster. Returns the in-sync cluster object, or
/// [`SyncError::NotInSync`] when this call changed cluster state.
pub async fn sync_object_with_cluster<K, S>(desired: &K, store: &S) -> Result<K, SyncError>
where
    K: Syncable,
    S: ClusterStore,
{
    let kind = kind_of::<K>();
    let name = object_name(desired, &kind)?;
    let namespace = object_namespace(desired, &kind, &name)?;

    let cluster = match store.get::<K>(&namespace, &name).await {
        Ok(obj) => obj,
        Err(err) if err.is_not_found() => return create_object(desired, store).await,
        Err(err) => return Err(err.into()),
    };

    // Immutable kinds are never updated or recreated once they exist
    if !K::MUTABLE {
        return Ok(cluster);
    }

    let diff = K::diff(desired, &cluster);
    if diff.recreate {
        info!(%kind, %namespace, %name, "deleting out-of-sync object for recreation");
        return match store.delete::<K>(&namespace, &name).await {
            Ok(()) => Err(not_in_sync(&kind, &name, SyncReason::Deleted)),
            Err(err) if err.is_not_found() => {
                Err(not_in_sync(&kind, &name, SyncReason::NeedRetry))
            }
            Err(err) => Err(err.into()),
        };
    }
    if diff.update {
        return update_object(desired, &cluster, store).await;
    }

    debug!(%kind, %namespace, %name, "object is in sync");
    Ok(cluster)
}

async fn create_object<K, S>(desired: &K, store: &S) -> Result<K, SyncError>
where
    K: Syncable,
    S: ClusterStore,
{
    let kind = kind_of::<K>();
    let name = object_name(desired, &kind)?;
    match store.create(desired).await {
        Ok(_) => {
            info!(%kind, %name, "created object");
            Err(not_in_sync(&kind, &name, SyncReason::Created))
        }
        // Lost a creation race; pick up the existing object and update it
        Err(StoreError::AlreadyExists { .. }) => {
            let namespace = object_namespace(desired, &kind, &name)?;
            match store.get::<K>(&namespace, &name).await {
                Ok(cluster) => update_object(desired, &cluster, store).await,
                Err(err) if err.is_not_found() => {
                    Err(not_in_sync(&kind, &name, SyncReason::NeedRetry))
                }
                Err(err) => Err(err.into()),
            }
        }
        Err(StoreError::Invalid { message, .. }) => Err(SyncError::Unrecoverable {
            kind,
            name,
            message,
        }),
        Err(err) => Err(err.into()),
    }
}

async fn update_object<K, S>(desired: &K, cluster: &K, store: &S) -> Result<K, SyncError>
where
    K: Syncable,
    S: ClusterStore,
{
    let kind = kind_of::<K>();
    let name = object_name(desired, &kind)?;

    // Carry the cluster's resourceVersion so the replace is optimistic
    let mut updated = desired.clone();
    updated.meta_mut().resource_version = cluster.meta().resource_version.clone();

    match store.update(&updated).await {
        Ok(_) => {
            info!(%kind, %name, "updated object");
            Err(not_in_sync(&kind, &name, SyncReason::Updated))
        }
        Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound { .. }) => {
            Err(not_in_sync(&kind, &name, SyncReason::NeedRetry))
        }
        Err(StoreError::Invalid { message, .. }) => Err(SyncError::Unrecoverable {
            kind,
            name,
            message,
        }),
        Err(err) => Err(err.into()),
    }
}

fn not_in_sync(kind: &str, name: &str, reason: SyncReason) -> SyncError {
    SyncError::NotInSync {
        kind: kind.to_string(),
        name: name.to_string(),
        reason,
    }
}

fn object_name<K: Syncable>(obj: &K, kind: &str) -> Result<String, SyncError> {
    obj.meta().name.clone().ok_or_else(|| SyncError::Unrecoverable {
        kind: kind.to_string(),
        name: String::new(),
        message: "desired object has no name".to_string(),
    })
}

fn object_namespace<K: Syncable>(obj: &K, kind: &str, name: &str) -> Result<String, SyncError> {
    obj.meta()
        .namespace
        .clone()
        .ok_or_else(|| SyncError::Unrecoverable {
            kind: kind.to_string(),
            name: name.to_string(),
            message: "desired object has no namespace".to_string(),
        })
}
