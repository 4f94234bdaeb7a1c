//! In-memory cluster store for tests
//!
//! Objects are held as JSON values keyed by kind, namespace and name, so one
//! store instance can hold arbitrary kinds at once. The store counts mutating
//! calls (used by idempotence tests) and can inject a one-shot update conflict.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::storage::v1::StorageClass;

use super::store::{kind_of, ClusterStore, StoreError, StoreObject};

type Key = (String, String, String);

#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<Key, serde_json::Value>>,
    storage_classes: Mutex<HashMap<String, StorageClass>>,
    conflicts: Mutex<HashSet<Key>>,
    mutations: AtomicUsize,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an object in the store without counting a mutation. A missing
    /// `resource_version` is set to "1".
    pub fn seed<K: StoreObject>(&self, obj: &K) {
        let mut value = serde_json::to_value(obj).unwrap();
        let key = Self::key_of::<K>(&value);
        if value["metadata"]["resourceVersion"].is_null() {
            value["metadata"]["resourceVersion"] = "1".into();
        }
        self.objects.lock().unwrap().insert(key, value);
    }

    pub fn seed_storage_class(&self, sc: &StorageClass) {
        let name = sc.metadata.name.clone().unwrap();
        self.storage_classes.lock().unwrap().insert(name, sc.clone());
    }

    /// Fail the next update of the given object with a conflict
    pub fn inject_conflict<K: StoreObject>(&self, namespace: &str, name: &str) {
        self.conflicts.lock().unwrap().insert((
            kind_of::<K>(),
            namespace.to_string(),
            name.to_string(),
        ));
    }

    /// Number of create/update/delete calls performed so far
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn contains<K: StoreObject>(&self, namespace: &str, name: &str) -> bool {
        let key = (
            kind_of::<K>(),
            namespace.to_string(),
            name.to_string(),
        );
        self.objects.lock().unwrap().contains_key(&key)
    }

    fn key_of<K: StoreObject>(value: &serde_json::Value) -> Key {
        (
            kind_of::<K>(),
            value["metadata"]["namespace"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
            value["metadata"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        )
    }

    fn matches_selector(value: &serde_json::Value, selector: &str) -> bool {
        selector.split(',').all(|pair| {
            let Some((k, v)) = pair.split_once('=') else {
                return false;
            };
            value["metadata"]["labels"][k.trim()].as_str() == Some(v.trim())
        })
    }
}

#[async_trait]
impl ClusterStore for FakeStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        let key = (
            kind_of::<K>(),
            namespace.to_string(),
            name.to_string(),
        );
        let objects = self.objects.lock().unwrap();
        let value = objects.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: kind_of::<K>(),
            name: name.to_string(),
        })?;
        Ok(serde_json::from_value(value.clone()).unwrap())
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, StoreError> {
        let kind = kind_of::<K>();
        let objects = self.objects.lock().unwrap();
        let items = objects
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && ns == namespace)
            .filter(|(_, value)| {
                label_selector.map_or(true, |sel| Self::matches_selector(value, sel))
            })
            .map(|(_, value)| serde_json::from_value(value.clone()).unwrap())
            .collect();
        Ok(items)
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut value = serde_json::to_value(obj).unwrap();
        let key = Self::key_of::<K>(&value);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: key.0,
                name: key.2,
            });
        }
        value["metadata"]["resourceVersion"] = "1".into();
        objects.insert(key, value.clone());
        Ok(serde_json::from_value(value).unwrap())
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let mut value = serde_json::to_value(obj).unwrap();
        let key = Self::key_of::<K>(&value);
        if self.conflicts.lock().unwrap().remove(&key) {
            return Err(StoreError::Conflict {
                kind: key.0,
                name: key.2,
            });
        }
        let mut objects = self.objects.lock().unwrap();
        let stored = objects.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: key.0.clone(),
            name: key.2.clone(),
        })?;
        let stored_version = stored["metadata"]["resourceVersion"].as_str().unwrap_or("1");
        match value["metadata"]["resourceVersion"].as_str() {
            Some(v) if v != stored_version => {
                return Err(StoreError::Conflict {
                    kind: key.0,
                    name: key.2,
                });
            }
            _ => {}
        }
        let next: u64 = stored_version.parse::<u64>().unwrap_or(1) + 1;
        value["metadata"]["resourceVersion"] = next.to_string().into();
        objects.insert(key, value.clone());
        Ok(serde_json::from_value(value).unwrap())
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        let key = (
            kind_of::<K>(),
            namespace.to_string(),
            name.to_string(),
        );
        let mut objects = self.objects.lock().unwrap();
        if objects.remove(&key).is_none() {
            return Err(StoreError::NotFound {
                kind: kind_of::<K>(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn get_storage_class(&self, name: &str) -> Result<StorageClass, StoreError> {
        self.storage_classes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: "StorageClass".to_string(),
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn configmap(namespace: &str, name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(
                    [("app".to_string(), "test".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_get_update_delete() {
        let store = FakeStore::new();
        let cm = configmap("ns1", "cfg");
        let created = store.create(&cm).await.unwrap();
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));

        let fetched: ConfigMap = store.get("ns1", "cfg").await.unwrap();
        assert_eq!(fetched.metadata.name.as_deref(), Some("cfg"));

        let updated = store.update(&fetched).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));

        store.delete::<ConfigMap>("ns1", "cfg").await.unwrap();
        assert!(store
            .get::<ConfigMap>("ns1", "cfg")
            .await
            .unwrap_err()
            .is_not_found());
        assert_eq!(store.mutation_count(), 3);
    }

    #[tokio::test]
    async fn test_stale_resource_version_conflicts() {
        let store = FakeStore::new();
        let cm = configmap("ns1", "cfg");
        let created = store.create(&cm).await.unwrap();
        store.update(&created).await.unwrap();

        // resourceVersion "1" is now stale
        assert!(matches!(
            store.update(&created).await.unwrap_err(),
            StoreError::Conflict { .. }
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_label_selector() {
        let store = FakeStore::new();
        store.seed(&configmap("ns1", "a"));
        let mut unlabeled = configmap("ns1", "b");
        unlabeled.metadata.labels = None;
        store.seed(&unlabeled);

        let all: Vec<ConfigMap> = store.list("ns1", None).await.unwrap();
        assert_eq!(all.len(), 2);

        let labeled: Vec<ConfigMap> = store.list("ns1", Some("app=test")).await.unwrap();
        assert_eq!(labeled.len(), 1);
        assert_eq!(labeled[0].metadata.name.as_deref(), Some("a"));
    }
}
