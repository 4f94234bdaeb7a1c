//! The async storage relay: an SSH/rsync server fronting the shared PVC

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, ResourceRequirements, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;

use crate::config::OperatorConfig;
use crate::constants::{
    ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME, ASYNC_RELAY_DEPLOYMENT_NAME, ASYNC_RELAY_SERVICE_NAME,
    ASYNC_RELAY_SSH_PORT, COMPONENT_LABEL,
};
use crate::provision::config::NamespacedConfig;

const STORAGE_MOUNT_PATH: &str = "/async-storage";

fn relay_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(
        COMPONENT_LABEL.to_string(),
        ASYNC_RELAY_DEPLOYMENT_NAME.to_string(),
    )])
}

/// The relay deployment: one replica mounting the shared claim and the
/// namespace's authorized keys
pub(super) fn relay_deployment(
    namespace: &str,
    pvc_name: &str,
    config: &OperatorConfig,
    namespaced: Option<&NamespacedConfig>,
) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(ASYNC_RELAY_DEPLOYMENT_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(relay_labels()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(relay_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(relay_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    node_selector: namespaced.and_then(|c| c.node_selector.clone()),
                    tolerations: namespaced.and_then(|c| c.pod_tolerations.clone()),
                    containers: vec![Container {
                        name: ASYNC_RELAY_DEPLOYMENT_NAME.to_string(),
                        image: Some(config.async_storage.server_image.clone()),
                        ports: Some(vec![ContainerPort {
                            container_port: ASYNC_RELAY_SSH_PORT,
                            protocol: Some("TCP".to_string()),
                            ..Default::default()
                        }]),
                        resources: Some(ResourceRequirements {
                            limits: Some(BTreeMap::from([(
                                "memory".to_string(),
                                Quantity(config.async_storage.memory_limit.clone()),
                            )])),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![
                            VolumeMount {
                                name: "storage".to_string(),
                                mount_path: STORAGE_MOUNT_PATH.to_string(),
                                ..Default::default()
                            },
                            VolumeMount {
                                name: "authorized-keys".to_string(),
                                mount_path: "/.ssh".to_string(),
                                read_only: Some(true),
                                ..Default::default()
                            },
                        ]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![
                        Volume {
                            name: "storage".to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: pvc_name.to_string(),
                                read_only: None,
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: "authorized-keys".to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: Some(ASYNC_AUTHORIZED_KEYS_CONFIGMAP_NAME.to_string()),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The service the sidecars connect to
pub(super) fn relay_service(namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(ASYNC_RELAY_SERVICE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(relay_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(relay_labels()),
            ports: Some(vec![ServicePort {
                name: Some("ssh".to_string()),
                port: ASYNC_RELAY_SSH_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
