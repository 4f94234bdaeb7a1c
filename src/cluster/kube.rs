//! Kube-client-backed cluster store

use async_trait::async_trait;
use k8s_openapi::api::storage::v1::StorageClass;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

use super::store::{kind_of, ClusterStore, StoreError, StoreObject};

/// Production [`ClusterStore`] implementation over a shared kube [`Client`]
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn object_coords<K: StoreObject>(obj: &K) -> Result<(String, String), StoreError> {
        let meta = obj.meta();
        let name = meta.name.clone().ok_or_else(|| StoreError::Invalid {
            kind: kind_of::<K>(),
            name: String::new(),
            message: "object has no name".to_string(),
        })?;
        let namespace = meta.namespace.clone().ok_or_else(|| StoreError::Invalid {
            kind: kind_of::<K>(),
            name: name.clone(),
            message: "object has no namespace".to_string(),
        })?;
        Ok((namespace, name))
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(|e| StoreError::from_kube(&kind_of::<K>(), name, e))
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<K>, StoreError> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self
            .api::<K>(namespace)
            .list(&params)
            .await
            .map_err(|e| StoreError::from_kube(&kind_of::<K>(), "", e))?;
        Ok(list.items)
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = Self::object_coords(obj)?;
        debug!(kind = %kind_of::<K>(), %namespace, %name, "creating object");
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(&kind_of::<K>(), &name, e))
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let (namespace, name) = Self::object_coords(obj)?;
        debug!(kind = %kind_of::<K>(), %namespace, %name, "updating object");
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(&kind_of::<K>(), &name, e))
    }

    async fn delete<K: StoreObject>(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        debug!(kind = %kind_of::<K>(), %namespace, %name, "deleting object");
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(&kind_of::<K>(), name, e))
    }

    async fn get_storage_class(&self, name: &str) -> Result<StorageClass, StoreError> {
        let api: Api<StorageClass> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| StoreError::from_kube("StorageClass", name, e))
    }
}
