//! Per-kind diff policies for the sync engine
//!
//! Each syncable kind decides how drift between the desired and cluster copy
//! is resolved: converge silently, update in place, or delete and recreate
//! (for fields the API server treats as immutable). Server-populated fields
//! (status, resourceVersion, defaulted spec fields like `nodePort`) are never
//! compared, so a freshly applied object reads as in sync.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, PersistentVolumeClaim, PodTemplateSpec, Secret, Service, ServicePort,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::api::ObjectMeta;

use crate::cluster::StoreObject;
use crate::crd::WorkspaceRouting;

/// Resolution for an out-of-sync object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diff {
    /// The object must be deleted and recreated (immutable field changed)
    pub recreate: bool,
    /// The object can be brought in sync with an in-place update
    pub update: bool,
}

impl Diff {
    pub fn converged() -> Self {
        Self::default()
    }

    pub fn update() -> Self {
        Self {
            recreate: false,
            update: true,
        }
    }

    pub fn recreate() -> Self {
        Self {
            recreate: true,
            update: false,
        }
    }

    pub fn in_sync(&self) -> bool {
        !self.recreate && !self.update
    }
}

/// A kind the sync engine can manage
pub trait Syncable: StoreObject {
    /// Whether the kind tolerates in-place updates at all. Immutable kinds
    /// converge unconditionally once they exist in the cluster
    const MUTABLE: bool = true;

    /// Compare desired against the cluster copy
    fn diff(desired: &Self, cluster: &Self) -> Diff;
}

// =============================================================================
// Comparison Helpers
// =============================================================================

/// Check that every desired label and annotation is present on the cluster
/// object with the same value. Extra cluster-side entries are tolerated so
/// that webhooks and other controllers can annotate our objects freely.
fn metadata_is_subset(desired: &ObjectMeta, cluster: &ObjectMeta) -> bool {
    map_is_subset(&desired.labels, &cluster.labels)
        && map_is_subset(&desired.annotations, &cluster.annotations)
}

fn map_is_subset(
    desired: &Option<BTreeMap<String, String>>,
    cluster: &Option<BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else { return true };
    desired
        .iter()
        .all(|(k, v)| cluster.as_ref().and_then(|c| c.get(k)) == Some(v))
}

fn sorted_by<T: Clone, K: Ord>(items: &Option<Vec<T>>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut items = items.clone().unwrap_or_default();
    items.sort_by_key(|item| key(item));
    items
}

/// Allow-list comparison of container lists, matched by name and ignoring
/// order. Server-defaulted fields (probes, securityContext inherited from
/// admission, terminationMessage settings) are not compared.
fn containers_match(desired: &Option<Vec<Container>>, cluster: &Option<Vec<Container>>) -> bool {
    let desired = desired.as_deref().unwrap_or_default();
    let cluster = cluster.as_deref().unwrap_or_default();
    if desired.len() != cluster.len() {
        return false;
    }
    desired.iter().all(|d| {
        cluster.iter().any(|c| {
            c.name == d.name
                && c.image == d.image
                && c.command == d.command
                && c.args == d.args
                && sorted_by(&c.env, |e| e.name.clone()) == sorted_by(&d.env, |e| e.name.clone())
                && c.env_from == d.env_from
                && sorted_by(&c.volume_mounts, |m| m.mount_path.clone())
                    == sorted_by(&d.volume_mounts, |m| m.mount_path.clone())
                && sorted_by(&c.ports, |p| p.container_port)
                    == sorted_by(&d.ports, |p| p.container_port)
                && c.resources == d.resources
        })
    })
}

/// Whether a desired pod template differs from the cluster's under the
/// allow-list comparison
pub(crate) fn pod_template_drifted(desired: &PodTemplateSpec, cluster: &PodTemplateSpec) -> bool {
    let (Some(d), Some(c)) = (&desired.spec, &cluster.spec) else {
        return desired.spec != cluster.spec;
    };
    !containers_match(&d.containers.clone().into(), &c.containers.clone().into())
        || !containers_match(&d.init_containers, &c.init_containers)
        || sorted_by(&d.volumes, |v| v.name.clone()) != sorted_by(&c.volumes, |v| v.name.clone())
        || d.service_account_name != c.service_account_name
        || d.node_selector != c.node_selector
        || d.tolerations != c.tolerations
        || d.image_pull_secrets != c.image_pull_secrets
        || !map_is_subset(&desired.metadata.as_ref().and_then(|m| m.labels.clone()),
            &cluster.metadata.as_ref().and_then(|m| m.labels.clone()))
}

/// Compare service ports ignoring the server-assigned `nodePort`
fn service_ports_match(desired: &Option<Vec<ServicePort>>, cluster: &Option<Vec<ServicePort>>) -> bool {
    let strip = |ports: &Option<Vec<ServicePort>>| {
        let mut ports = ports.clone().unwrap_or_default();
        for p in &mut ports {
            p.node_port = None;
        }
        ports.sort_by_key(|p| p.port);
        ports
    };
    strip(desired) == strip(cluster)
}

// =============================================================================
// Per-kind Policies
// =============================================================================

/// PVC specs are immutable; an existing claim is always accepted as in sync.
/// Size growth is handled out of band by the storage expansion gate.
impl Syncable for PersistentVolumeClaim {
    const MUTABLE: bool = false;

    fn diff(_desired: &Self, _cluster: &Self) -> Diff {
        Diff::converged()
    }
}

impl Syncable for ConfigMap {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        if desired.data != cluster.data
            || desired.binary_data != cluster.binary_data
            || !metadata_is_subset(&desired.metadata, &cluster.metadata)
        {
            return Diff::update();
        }
        Diff::converged()
    }
}

impl Syncable for Secret {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        if desired.data != cluster.data
            || desired.type_ != cluster.type_
            || !metadata_is_subset(&desired.metadata, &cluster.metadata)
        {
            return Diff::update();
        }
        Diff::converged()
    }
}

impl Syncable for Deployment {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        let (Some(d), Some(c)) = (&desired.spec, &cluster.spec) else {
            return Diff::update();
        };
        // The selector is immutable on apps/v1 Deployments
        if d.selector != c.selector {
            return Diff::recreate();
        }
        if d.replicas != c.replicas
            || pod_template_drifted(&d.template, &c.template)
            || !metadata_is_subset(&desired.metadata, &cluster.metadata)
        {
            return Diff::update();
        }
        Diff::converged()
    }
}

impl Syncable for Service {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        let (Some(d), Some(c)) = (&desired.spec, &cluster.spec) else {
            return Diff::recreate();
        };
        // Selector and port changes are applied by recreation to avoid
        // leaving stale endpoints behind
        if d.selector != c.selector || !service_ports_match(&d.ports, &c.ports) {
            return Diff::recreate();
        }
        if !metadata_is_subset(&desired.metadata, &cluster.metadata) {
            return Diff::update();
        }
        Diff::converged()
    }
}

/// The Job template is immutable once created
impl Syncable for Job {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        let (Some(d), Some(c)) = (&desired.spec, &cluster.spec) else {
            return Diff::recreate();
        };
        if pod_template_drifted(&d.template, &c.template) {
            return Diff::recreate();
        }
        Diff::converged()
    }
}

impl Syncable for Role {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        if desired.rules != cluster.rules
            || !metadata_is_subset(&desired.metadata, &cluster.metadata)
        {
            return Diff::update();
        }
        Diff::converged()
    }
}

impl Syncable for RoleBinding {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        // roleRef is immutable on RoleBindings
        if desired.role_ref != cluster.role_ref {
            return Diff::recreate();
        }
        if desired.subjects != cluster.subjects
            || !metadata_is_subset(&desired.metadata, &cluster.metadata)
        {
            return Diff::update();
        }
        Diff::converged()
    }
}

impl Syncable for WorkspaceRouting {
    fn diff(desired: &Self, cluster: &Self) -> Diff {
        // Switching routing class means tearing down one router's objects and
        // building another's, so start over from a fresh object
        if desired.spec.routing_class != cluster.spec.routing_class {
            return Diff::recreate();
        }
        if desired.spec != cluster.spec
            || !metadata_is_subset(&desired.metadata, &cluster.metadata)
        {
            return Diff::update();
        }
        Diff::converged()
    }
}
