//! Cleanup job: scrub one workspace's subtree off the shared PVC
//!
//! Shared claims outlive workspaces, so stopping or deleting a workspace runs
//! a short batch Job that mounts the claim and removes the workspace's
//! directory. The caller requeues until the Job finishes; a Job that cannot
//! even start its pod (bad image, crash loop) fails the workspace instead of
//! retrying forever.

use std::time::Duration;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, PersistentVolumeClaimVolumeSource, Pod, PodSpec, PodTemplateSpec, ResourceRequirements,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use tracing::{debug, info};

use crate::cluster::ClusterStore;
use crate::config::OperatorConfig;
use crate::constants::{PVC_CLEANUP_MOUNT_PATH, WORKSPACE_ID_LABEL};
use crate::error::{Result, WorkspaceError};
use crate::names::cleanup_job_name;
use crate::provision::config::NamespacedConfig;
use crate::sync::sync_object_with_cluster;

/// Container states that mean the job's pod will never run
const UNRECOVERABLE_WAITING_REASONS: &[&str] = &[
    "ImagePullBackOff",
    "ErrImagePull",
    "CrashLoopBackOff",
    "CreateContainerError",
];

const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Ensure the cleanup job for the workspace exists and has finished.
/// Returns `Ok` only once the job reports success.
pub(super) async fn run_cleanup_job<S: ClusterStore>(
    workspace_id: &str,
    namespace: &str,
    pvc_name: &str,
    config: &OperatorConfig,
    namespaced: Option<&NamespacedConfig>,
    store: &S,
) -> Result<()> {
    let desired = cleanup_job(workspace_id, namespace, pvc_name, config, namespaced);
    let job = sync_object_with_cluster(&desired, store).await?;
    check_job_status(&job, namespace, store).await
}

async fn check_job_status<S: ClusterStore>(job: &Job, namespace: &str, store: &S) -> Result<()> {
    let name = job.metadata.name.as_deref().unwrap_or_default();
    let status = job.status.as_ref();

    if status.and_then(|s| s.succeeded).unwrap_or(0) > 0 {
        info!(%namespace, job = %name, "cleanup job succeeded");
        return Ok(());
    }
    let failed = status
        .and_then(|s| s.conditions.as_ref())
        .map(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Failed" && c.status == "True")
        })
        .unwrap_or(false);
    if failed {
        return Err(WorkspaceError::fail(format!(
            "cleanup job {name} failed, shared storage may hold stale data"
        )));
    }

    // Not finished yet. A pod stuck in a known-bad state will never finish
    let selector = format!("job-name={name}");
    let pods: Vec<Pod> = store.list(namespace, Some(&selector)).await?;
    for pod in &pods {
        if let Some(reason) = unrecoverable_pod_reason(pod) {
            return Err(WorkspaceError::fail(format!(
                "cleanup job {name} cannot start: {reason}"
            )));
        }
    }

    debug!(%namespace, job = %name, "cleanup job still running");
    Err(WorkspaceError::retry_after(
        format!("waiting for cleanup job {name}"),
        POLL_INTERVAL,
    ))
}

fn unrecoverable_pod_reason(pod: &Pod) -> Option<String> {
    let statuses = pod
        .status
        .as_ref()?
        .container_statuses
        .as_ref()?;
    for status in statuses {
        if let Some(waiting) = status.state.as_ref().and_then(|s| s.waiting.as_ref()) {
            if let Some(reason) = &waiting.reason {
                if UNRECOVERABLE_WAITING_REASONS.contains(&reason.as_str()) {
                    return Some(reason.clone());
                }
            }
        }
    }
    None
}

fn cleanup_job(
    workspace_id: &str,
    namespace: &str,
    pvc_name: &str,
    config: &OperatorConfig,
    namespaced: Option<&NamespacedConfig>,
) -> Job {
    let resources = [
        ("cpu", config.cleanup_job.cpu_limit.clone()),
        ("memory", config.cleanup_job.memory_limit.clone()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), Quantity(v)))
    .collect();

    Job {
        metadata: ObjectMeta {
            name: Some(cleanup_job_name(workspace_id)),
            namespace: Some(namespace.to_string()),
            labels: Some(
                [(WORKSPACE_ID_LABEL.to_string(), workspace_id.to_string())]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(3),
            ttl_seconds_after_finished: Some(300),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(
                        [(WORKSPACE_ID_LABEL.to_string(), workspace_id.to_string())]
                            .into_iter()
                            .collect(),
                    ),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    node_selector: namespaced.and_then(|c| c.node_selector.clone()),
                    tolerations: namespaced.and_then(|c| c.pod_tolerations.clone()),
                    containers: vec![Container {
                        name: "cleanup".to_string(),
                        image: Some(config.cleanup_job.image.clone()),
                        command: Some(vec![
                            "/bin/sh".to_string(),
                            "-c".to_string(),
                            format!("rm -rf {PVC_CLEANUP_MOUNT_PATH}/{workspace_id}"),
                        ]),
                        resources: Some(ResourceRequirements {
                            limits: Some(
                                [
                                    ("cpu".to_string(), Quantity(config.cleanup_job.cpu_limit.clone())),
                                    (
                                        "memory".to_string(),
                                        Quantity(config.cleanup_job.memory_limit.clone()),
                                    ),
                                ]
                                .into_iter()
                                .collect(),
                            ),
                            requests: Some(resources),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![VolumeMount {
                            name: "storage".to_string(),
                            mount_path: PVC_CLEANUP_MOUNT_PATH.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "storage".to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: pvc_name.to_string(),
                            read_only: None,
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::FakeStore;
    use assert_matches::assert_matches;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
    use k8s_openapi::api::core::v1::{
        ContainerState, ContainerStateWaiting, ContainerStatus, PodStatus,
    };

    fn finished_job(workspace_id: &str, succeeded: bool) -> Job {
        let mut job = cleanup_job(workspace_id, "ns", "workspace-storage", &OperatorConfig::default(), None);
        job.status = Some(if succeeded {
            JobStatus {
                succeeded: Some(1),
                ..Default::default()
            }
        } else {
            JobStatus {
                conditions: Some(vec![JobCondition {
                    type_: "Failed".to_string(),
                    status: "True".to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }
        });
        job
    }

    #[tokio::test]
    async fn test_first_pass_creates_job_and_retries() {
        let store = FakeStore::new();
        let err = run_cleanup_job("ws1", "ns", "workspace-storage", &OperatorConfig::default(), None, &store)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.contains::<Job>("ns", "cleanup-ws1"));
    }

    #[tokio::test]
    async fn test_succeeded_job_completes_cleanup() {
        let store = FakeStore::new();
        store.seed(&finished_job("ws1", true));
        run_cleanup_job("ws1", "ns", "workspace-storage", &OperatorConfig::default(), None, &store)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_job_fails_the_workspace() {
        let store = FakeStore::new();
        store.seed(&finished_job("ws1", false));
        assert_matches!(
            run_cleanup_job("ws1", "ns", "workspace-storage", &OperatorConfig::default(), None, &store).await,
            Err(WorkspaceError::Fail(_))
        );
    }

    #[tokio::test]
    async fn test_stuck_pod_fails_the_workspace() {
        let store = FakeStore::new();
        let mut job = cleanup_job("ws1", "ns", "workspace-storage", &OperatorConfig::default(), None);
        job.status = Some(JobStatus::default());
        store.seed(&job);

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("cleanup-ws1-abc".to_string()),
                namespace: Some("ns".to_string()),
                labels: Some(
                    [("job-name".to_string(), "cleanup-ws1".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            status: Some(PodStatus {
                container_statuses: Some(vec![ContainerStatus {
                    name: "cleanup".to_string(),
                    state: Some(ContainerState {
                        waiting: Some(ContainerStateWaiting {
                            reason: Some("ImagePullBackOff".to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        store.seed(&pod);

        assert_matches!(
            run_cleanup_job("ws1", "ns", "workspace-storage", &OperatorConfig::default(), None, &store).await,
            Err(WorkspaceError::Fail(_))
        );
    }

    #[tokio::test]
    async fn test_running_job_polls_with_delay() {
        let store = FakeStore::new();
        let mut job = cleanup_job("ws1", "ns", "workspace-storage", &OperatorConfig::default(), None);
        job.status = Some(JobStatus::default());
        store.seed(&job);

        let err = run_cleanup_job("ws1", "ns", "workspace-storage", &OperatorConfig::default(), None, &store)
            .await
            .unwrap_err();
        assert_eq!(
            err.action(),
            crate::error::ReconcileAction::RequeueAfter(POLL_INTERVAL)
        );
    }
}
