//! WorkspaceRouting custom resource
//!
//! Owned by a workspace; a routing controller picks it up by `routing_class`
//! and exposes the workspace pod. From the provisioning core's point of view
//! this kind matters for one property: changing the routing class swaps
//! controllers, so the sync engine recreates rather than updates.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "workspace.dev",
    version = "v1alpha1",
    kind = "WorkspaceRouting",
    namespaced,
    status = "WorkspaceRoutingStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRoutingSpec {
    /// Which routing controller serves this object. Unset means the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_class: Option<String>,
    /// Id of the owning workspace
    #[serde(default)]
    pub workspace_id: String,
    /// Selector matching the workspace pod to route to
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pod_selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRoutingStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}
