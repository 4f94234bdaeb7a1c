//! Cluster object store port
//!
//! Everything the provisioning core does to the cluster goes through
//! [`ClusterStore`]. The production implementation wraps the kube client
//! ([`super::kube::KubeStore`]); tests use an in-memory fake.

use async_trait::async_trait;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::core::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Bound for namespaced objects the store can hold. Blanket-implemented for
/// every `k8s-openapi` namespaced kind and for our CRDs.
pub trait StoreObject:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + std::fmt::Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + std::fmt::Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

// =============================================================================
// Store Errors
// =============================================================================

/// Classified outcome of a store operation. The sync engine branches on the
/// first four variants; anything else stays an opaque `Api` error.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("conflicting update to {kind} {name}")]
    Conflict { kind: String, name: String },

    #[error("{kind} {name} is invalid: {message}")]
    Invalid {
        kind: String,
        name: String,
        message: String,
    },

    #[error("api error for {kind} {name}: {message}")]
    Api {
        kind: String,
        name: String,
        message: String,
    },
}

impl StoreError {
    /// Classify a kube client error by HTTP status and reason
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        let kind = kind.to_string();
        let name = name.to_string();
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound { kind, name },
            kube::Error::Api(resp) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                StoreError::AlreadyExists { kind, name }
            }
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict { kind, name },
            kube::Error::Api(resp) if resp.code == 422 => StoreError::Invalid {
                kind,
                name,
                message: resp.message.clone(),
            },
            _ => StoreError::Api {
                kind,
                name,
                message: err.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

// =============================================================================
// Store Port
// =============================================================================

/// Namespace-scoped CRUD over cluster objects, plus the single cluster-scoped
/// read the provisioner needs (StorageClass, for the expansion gate).
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch one object by namespace and name
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError>;

    /// List objects in a namespace, optionally filtered by a label selector
    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, StoreError>;

    /// Create an object. The object's metadata must carry namespace and name
    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object. The object's `resource_version` must match the
    /// cluster's or the call fails with [`StoreError::Conflict`]
    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Delete an object by namespace and name
    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// Fetch a cluster-scoped StorageClass by name
    async fn get_storage_class(&self, name: &str) -> Result<StorageClass, StoreError>;
}

/// Kind name of `K` for error messages and log fields
pub fn kind_of<K: StoreObject>() -> String {
    K::kind(&()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;

    #[test]
    fn test_kube_error_classification() {
        let not_found = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "configmaps \"cfg\" not found".into(),
            reason: "NotFound".into(),
            code: 404,
        });
        assert!(StoreError::from_kube("ConfigMap", "cfg", not_found).is_not_found());

        let already_exists = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "configmaps \"cfg\" already exists".into(),
            reason: "AlreadyExists".into(),
            code: 409,
        });
        assert!(matches!(
            StoreError::from_kube("ConfigMap", "cfg", already_exists),
            StoreError::AlreadyExists { .. }
        ));

        let conflict = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "the object has been modified".into(),
            reason: "Conflict".into(),
            code: 409,
        });
        assert!(matches!(
            StoreError::from_kube("ConfigMap", "cfg", conflict),
            StoreError::Conflict { .. }
        ));

        let invalid = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "spec is immutable".into(),
            reason: "Invalid".into(),
            code: 422,
        });
        assert!(matches!(
            StoreError::from_kube("ConfigMap", "cfg", invalid),
            StoreError::Invalid { .. }
        ));
    }

    #[test]
    fn test_kind_of() {
        assert_eq!(kind_of::<ConfigMap>(), "ConfigMap");
    }
}
