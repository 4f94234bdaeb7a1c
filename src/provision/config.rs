//! Per-namespace configuration
//!
//! Administrators drop one ConfigMap labeled
//! `workspace.dev/namespace-config=true` into a namespace to override storage
//! sizes and to pin operator-created pods (cleanup jobs, the async relay) to
//! specific nodes.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ConfigMap, Toleration};

use crate::cluster::ClusterStore;
use crate::constants::{
    NAMESPACED_CONFIG_COMMON_PVC_SIZE_KEY, NAMESPACED_CONFIG_LABEL,
    NAMESPACED_CONFIG_NODE_SELECTOR_KEY, NAMESPACED_CONFIG_PER_WORKSPACE_PVC_SIZE_KEY,
    NAMESPACED_CONFIG_POD_TOLERATIONS_KEY,
};
use crate::error::{Result, WorkspaceError};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NamespacedConfig {
    /// Overrides the default size of the shared PVC
    pub common_pvc_size: Option<String>,
    /// Overrides the default size of per-workspace PVCs
    pub per_workspace_pvc_size: Option<String>,
    /// Node selector applied to operator-created pods in the namespace
    pub node_selector: Option<BTreeMap<String, String>>,
    /// Tolerations applied to operator-created pods in the namespace
    pub pod_tolerations: Option<Vec<Toleration>>,
}

/// Read the namespace's configuration ConfigMap. `Ok(None)` when the
/// namespace has none; more than one is an administrator error and fails the
/// workspace rather than picking one arbitrarily.
pub async fn read_namespaced_config<S: ClusterStore>(
    namespace: &str,
    store: &S,
) -> Result<Option<NamespacedConfig>> {
    let selector = format!("{NAMESPACED_CONFIG_LABEL}=true");
    let mut configmaps: Vec<ConfigMap> = store.list(namespace, Some(&selector)).await?;
    match configmaps.len() {
        0 => return Ok(None),
        1 => {}
        n => {
            return Err(WorkspaceError::fail(format!(
                "found {n} ConfigMaps labeled {NAMESPACED_CONFIG_LABEL} in namespace {namespace}, expected at most one"
            )))
        }
    }
    let configmap = configmaps.remove(0);
    let name = configmap.metadata.name.as_deref().unwrap_or_default().to_string();
    let data = configmap.data.unwrap_or_default();

    let node_selector = data
        .get(NAMESPACED_CONFIG_NODE_SELECTOR_KEY)
        .map(|raw| {
            serde_json::from_str(raw).map_err(|e| {
                WorkspaceError::fail_with(
                    format!("invalid {NAMESPACED_CONFIG_NODE_SELECTOR_KEY} in ConfigMap {name}"),
                    e,
                )
            })
        })
        .transpose()?;
    let pod_tolerations = data
        .get(NAMESPACED_CONFIG_POD_TOLERATIONS_KEY)
        .map(|raw| {
            serde_json::from_str(raw).map_err(|e| {
                WorkspaceError::fail_with(
                    format!("invalid {NAMESPACED_CONFIG_POD_TOLERATIONS_KEY} in ConfigMap {name}"),
                    e,
                )
            })
        })
        .transpose()?;

    Ok(Some(NamespacedConfig {
        common_pvc_size: data.get(NAMESPACED_CONFIG_COMMON_PVC_SIZE_KEY).cloned(),
        per_workspace_pvc_size: data
            .get(NAMESPACED_CONFIG_PER_WORKSPACE_PVC_SIZE_KEY)
            .cloned(),
        node_selector,
        pod_tolerations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeStore;
    use assert_matches::assert_matches;
    use kube::api::ObjectMeta;

    fn config_configmap(name: &str, data: &[(&str, &str)]) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("test-ns".to_string()),
                labels: Some(
                    [(NAMESPACED_CONFIG_LABEL.to_string(), "true".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            data: Some(
                data.iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_config_is_none() {
        let store = FakeStore::new();
        assert_eq!(read_namespaced_config("test-ns", &store).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reads_sizes_and_scheduling() {
        let store = FakeStore::new();
        store.seed(&config_configmap(
            "ns-config",
            &[
                ("commonPVCSize", "20Gi"),
                ("nodeSelector", r#"{"disktype": "ssd"}"#),
                (
                    "podTolerations",
                    r#"[{"key": "dedicated", "operator": "Equal", "value": "workspaces", "effect": "NoSchedule"}]"#,
                ),
            ],
        ));

        let config = read_namespaced_config("test-ns", &store).await.unwrap().unwrap();
        assert_eq!(config.common_pvc_size.as_deref(), Some("20Gi"));
        assert_eq!(config.per_workspace_pvc_size, None);
        assert_eq!(
            config.node_selector.unwrap().get("disktype").map(String::as_str),
            Some("ssd")
        );
        assert_eq!(config.pod_tolerations.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_multiple_configs_fail() {
        let store = FakeStore::new();
        store.seed(&config_configmap("config-a", &[]));
        store.seed(&config_configmap("config-b", &[]));
        assert_matches!(
            read_namespaced_config("test-ns", &store).await,
            Err(WorkspaceError::Fail(_))
        );
    }

    #[tokio::test]
    async fn test_malformed_node_selector_fails() {
        let store = FakeStore::new();
        store.seed(&config_configmap("ns-config", &[("nodeSelector", "not-json")]));
        assert_matches!(
            read_namespaced_config("test-ns", &store).await,
            Err(WorkspaceError::Fail(_))
        );
    }
}
