/// Container inspection and normalization
///
/// Queries the engine for all containers, fetches full inspection detail
/// with a bounded worker pool, and flattens the engine-specific response
/// shapes into `ContainerRecord`. Nothing downstream of this module sees a
/// raw engine payload.

use std::collections::BTreeMap;
use std::sync::Arc;

use bollard::models::{ContainerInspectResponse, MountPointTypeEnum};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::core::engine::{ContainerEngine, EngineError};
use crate::utils::DEFAULT_INSPECT_WIDTH;

/// One inspected container, normalized.
///
/// `name` is the join key for diffing: engine ids change when a container is
/// recreated, names survive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
    pub id: String,
    /// Image reference as configured (repository:tag).
    pub image: String,
    /// Engine-assigned content id of the running image.
    pub image_id: String,
    pub state: String,
    pub created: Option<String>,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    pub mounts: Vec<MountBinding>,
    pub networks: Vec<String>,
    pub restart_policy: String,
    pub labels: BTreeMap<String, String>,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

/// One exposed or published port. `host_port` is absent for unpublished
/// ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Engine form, e.g. "32400/tcp".
    pub container_port: String,
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

/// One mounted volume binding. `named` distinguishes engine-managed volumes
/// (source is the volume name) from host-path bind mounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountBinding {
    pub source: String,
    pub target: String,
    pub mode: String,
    pub named: bool,
}

/// Optional allow/deny filter applied to container names before inspection.
/// An empty allow list admits everything; deny wins over allow.
#[derive(Debug, Clone, Default)]
pub struct InspectFilter {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
}

impl InspectFilter {
    pub fn admits(&self, name: &str) -> bool {
        if self.deny.iter().any(|d| d == name) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|a| a == name)
    }
}

/// A single container whose detail fetch failed. The batch continues.
#[derive(Debug, Clone)]
pub struct InspectFailure {
    pub container: String,
    pub error: String,
}

/// Outcome of one inspection batch.
#[derive(Debug, Default)]
pub struct InspectionReport {
    pub records: Vec<ContainerRecord>,
    pub failures: Vec<InspectFailure>,
}

pub struct Inspector {
    engine: Arc<dyn ContainerEngine>,
    include_stopped: bool,
    width: usize,
    filter: InspectFilter,
}

impl Inspector {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            include_stopped: true,
            width: DEFAULT_INSPECT_WIDTH,
            filter: InspectFilter::default(),
        }
    }

    pub fn include_stopped(mut self, include: bool) -> Self {
        self.include_stopped = include;
        self
    }

    pub fn width(mut self, width: usize) -> Self {
        self.width = width.max(1);
        self
    }

    pub fn filter(mut self, filter: InspectFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Inspect every container. The initial list call failing is fatal;
    /// individual inspect failures are collected and the batch continues.
    /// Records come back in list order regardless of completion order.
    pub async fn collect(&self) -> Result<InspectionReport, EngineError> {
        let summaries = self.engine.list_containers(self.include_stopped).await?;

        let targets: Vec<(String, String)> = summaries
            .into_iter()
            .filter_map(|s| {
                let id = s.id?;
                let name = s
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                Some((id, name))
            })
            .filter(|(_, name)| self.filter.admits(name))
            .collect();

        let inspections = futures::stream::iter(targets.into_iter().map(|(id, name)| {
            let engine = Arc::clone(&self.engine);
            async move {
                let result = engine.inspect_container(&id).await;
                (name, result)
            }
        }))
        .buffered(self.width)
        .collect::<Vec<_>>()
        .await;

        let mut report = InspectionReport::default();
        for (name, result) in inspections {
            match result {
                Ok(detail) => report.records.push(normalize(&detail)),
                Err(e) => report.failures.push(InspectFailure {
                    container: name,
                    error: e.to_string(),
                }),
            }
        }

        Ok(report)
    }
}

/// Flatten an engine inspect response into the canonical record.
pub fn normalize(detail: &ContainerInspectResponse) -> ContainerRecord {
    let name = detail
        .name
        .as_deref()
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let config = detail.config.as_ref();

    let image = config
        .and_then(|c| c.image.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let env = config
        .and_then(|c| c.env.as_ref())
        .map(|vars| {
            vars.iter()
                .filter_map(|e| e.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default();

    let labels = config
        .and_then(|c| c.labels.as_ref())
        .map(|l| l.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let mut ports: Vec<PortMapping> = detail
        .network_settings
        .as_ref()
        .and_then(|ns| ns.ports.as_ref())
        .map(|port_map| {
            port_map
                .iter()
                .map(|(container_port, bindings)| {
                    let first = bindings.as_ref().and_then(|b| b.first());
                    PortMapping {
                        container_port: container_port.clone(),
                        host_ip: first.and_then(|b| b.host_ip.clone()),
                        host_port: first.and_then(|b| b.host_port.clone()),
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    ports.sort_by(|a, b| a.container_port.cmp(&b.container_port));

    let mut mounts: Vec<MountBinding> = detail
        .mounts
        .as_ref()
        .map(|mounts| {
            mounts
                .iter()
                .filter_map(|m| {
                    let target = m.destination.clone()?;
                    let named = m.typ == Some(MountPointTypeEnum::VOLUME);
                    let source = if named {
                        m.name.clone().or_else(|| m.source.clone())?
                    } else {
                        m.source.clone()?
                    };
                    Some(MountBinding {
                        source,
                        target,
                        mode: m.mode.clone().unwrap_or_default(),
                        named,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    mounts.sort_by(|a, b| a.target.cmp(&b.target));

    let mut networks: Vec<String> = detail
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.as_ref())
        .map(|nets| nets.keys().cloned().collect())
        .unwrap_or_default();
    networks.sort();

    let restart_policy = detail
        .host_config
        .as_ref()
        .and_then(|hc| hc.restart_policy.as_ref())
        .and_then(|rp| rp.name.as_ref())
        .map(|n| n.to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "no".to_string());

    let state = detail
        .state
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    ContainerRecord {
        name,
        id: detail.id.clone().unwrap_or_default(),
        image,
        image_id: detail.image.clone().unwrap_or_default(),
        state,
        created: detail.created.clone(),
        env,
        ports,
        mounts,
        networks,
        restart_policy,
        labels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::MockContainerEngine;
    use bollard::models::{
        ContainerConfig, ContainerState, ContainerStateStatusEnum, ContainerSummary, HostConfig,
        MountPoint, NetworkSettings, PortBinding, RestartPolicy, RestartPolicyNameEnum,
    };
    use std::collections::HashMap;

    fn inspect_fixture(name: &str) -> ContainerInspectResponse {
        let mut ports = HashMap::new();
        ports.insert(
            "80/tcp".to_string(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: Some("8080".to_string()),
            }]),
        );

        ContainerInspectResponse {
            id: Some(format!("{name}-id")),
            name: Some(format!("/{name}")),
            image: Some("sha256:deadbeef".to_string()),
            created: Some("2024-01-01T00:00:00Z".to_string()),
            config: Some(ContainerConfig {
                image: Some("nginx:latest".to_string()),
                env: Some(vec![
                    "TEST_VAR=test_value".to_string(),
                    "SECRET_PASSWORD=hidden".to_string(),
                ]),
                ..Default::default()
            }),
            host_config: Some(HostConfig {
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            mounts: Some(vec![MountPoint {
                typ: Some(MountPointTypeEnum::BIND),
                source: Some("/host/path".to_string()),
                destination: Some("/container/path".to_string()),
                mode: Some("rw".to_string()),
                ..Default::default()
            }]),
            network_settings: Some(NetworkSettings {
                ports: Some(ports),
                ..Default::default()
            }),
            state: Some(ContainerState {
                status: Some(ContainerStateStatusEnum::RUNNING),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn summary_fixture(name: &str) -> ContainerSummary {
        ContainerSummary {
            id: Some(format!("{name}-id")),
            names: Some(vec![format!("/{name}")]),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_flattens_engine_shapes() {
        let record = normalize(&inspect_fixture("web"));

        assert_eq!(record.name, "web");
        assert_eq!(record.image, "nginx:latest");
        assert_eq!(record.image_id, "sha256:deadbeef");
        assert_eq!(record.state, "running");
        assert_eq!(record.restart_policy, "unless-stopped");
        assert_eq!(record.env.get("TEST_VAR").map(String::as_str), Some("test_value"));
        assert_eq!(record.ports.len(), 1);
        assert_eq!(record.ports[0].container_port, "80/tcp");
        assert_eq!(record.ports[0].host_port.as_deref(), Some("8080"));
        assert_eq!(record.mounts.len(), 1);
        assert_eq!(record.mounts[0].source, "/host/path");
        assert!(!record.mounts[0].named);
    }

    #[test]
    fn normalize_tolerates_empty_response() {
        let record = normalize(&ContainerInspectResponse::default());
        assert_eq!(record.name, "unknown");
        assert_eq!(record.restart_policy, "no");
        assert!(record.env.is_empty());
        assert!(record.ports.is_empty());
    }

    #[tokio::test]
    async fn one_failed_inspect_does_not_abort_the_batch() {
        let names = ["a", "b", "c", "d", "e"];

        let mut engine = MockContainerEngine::new();
        let summaries: Vec<ContainerSummary> = names.iter().map(|n| summary_fixture(n)).collect();
        engine
            .expect_list_containers()
            .returning(move |_| Ok(summaries.clone()));
        engine.expect_inspect_container().returning(|id| {
            if id == "c-id" {
                Err(EngineError::Api(bollard::errors::Error::from(
                    std::io::Error::new(std::io::ErrorKind::Other, "inspect failed"),
                )))
            } else {
                let name = id.trim_end_matches("-id").to_string();
                let mut detail = inspect_fixture(&name);
                detail.name = Some(format!("/{name}"));
                Ok(detail)
            }
        });

        let report = Inspector::new(Arc::new(engine)).collect().await.unwrap();

        assert_eq!(report.records.len(), 4);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].container, "c");
        // List order survives concurrent completion.
        let got: Vec<&str> = report.records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(got, vec!["a", "b", "d", "e"]);
    }

    #[tokio::test]
    async fn deny_filter_skips_containers_without_inspecting_them() {
        let mut engine = MockContainerEngine::new();
        engine
            .expect_list_containers()
            .returning(|_| Ok(vec![summary_fixture("plex"), summary_fixture("scratch")]));
        engine
            .expect_inspect_container()
            .withf(|id| id == "plex-id")
            .returning(|_| Ok(inspect_fixture("plex")));

        let filter = InspectFilter {
            allow: Vec::new(),
            deny: vec!["scratch".to_string()],
        };
        let report = Inspector::new(Arc::new(engine))
            .filter(filter)
            .collect()
            .await
            .unwrap();

        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].name, "plex");
        assert!(report.failures.is_empty());
    }

    #[test]
    fn filter_semantics() {
        let filter = InspectFilter {
            allow: vec!["a".to_string(), "b".to_string()],
            deny: vec!["b".to_string()],
        };
        assert!(filter.admits("a"));
        assert!(!filter.admits("b")); // deny wins over allow
        assert!(!filter.admits("c"));
        assert!(InspectFilter::default().admits("anything"));
    }

    #[tokio::test]
    async fn list_failure_is_fatal() {
        let mut engine = MockContainerEngine::new();
        engine.expect_list_containers().returning(|_| {
            Err(EngineError::Api(bollard::errors::Error::from(
                std::io::Error::new(std::io::ErrorKind::Other, "daemon down"),
            )))
        });

        let result = Inspector::new(Arc::new(engine)).collect().await;
        assert!(result.is_err());
    }
}
