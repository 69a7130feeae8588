/// Compose document synthesis
///
/// Derives one multi-service compose document from the normalized container
/// list. Output is byte-deterministic: service order is first-seen order
/// refined by an advisory dependency sort, env maps are sorted, and the
/// YAML mapping type preserves insertion order. The restore path creates
/// networks and volumes before any container regardless of service order,
/// so the ordering here only affects readability.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde_yaml::{Mapping, Value};

use crate::core::inspector::ContainerRecord;
use crate::utils::{DEPENDS_ON_LABEL, IMPLICIT_NETWORKS, MASK_PLACEHOLDER};

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeService {
    /// Service key (container name with underscores normalized to dashes).
    pub name: String,
    pub container_name: String,
    pub image: String,
    pub restart: String,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub environment: BTreeMap<String, String>,
    pub networks: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Derived compose artifact. Every network/volume a service references is
/// present in the top-level definitions; the unions are built from the same
/// projection, so dangling references cannot occur.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeDocument {
    pub services: Vec<ComposeService>,
    pub networks: Vec<String>,
    pub volumes: Vec<String>,
}

impl ComposeDocument {
    pub fn service_for(&self, container_name: &str) -> Option<&ComposeService> {
        self.services.iter().find(|s| s.container_name == container_name)
    }

    /// Render to YAML with a generation header, like the rest of the bundle.
    pub fn to_yaml(&self) -> Result<String> {
        let mut root = Mapping::new();
        root.insert(Value::from("version"), Value::from("3.8"));

        let mut services = Mapping::new();
        for service in &self.services {
            let mut entry = Mapping::new();
            entry.insert(Value::from("image"), Value::from(service.image.clone()));
            entry.insert(
                Value::from("container_name"),
                Value::from(service.container_name.clone()),
            );
            entry.insert(Value::from("restart"), Value::from(service.restart.clone()));

            if !service.ports.is_empty() {
                entry.insert(Value::from("ports"), string_seq(&service.ports));
            }
            if !service.volumes.is_empty() {
                entry.insert(Value::from("volumes"), string_seq(&service.volumes));
            }
            if !service.environment.is_empty() {
                let mut env = Mapping::new();
                for (k, v) in &service.environment {
                    env.insert(Value::from(k.clone()), Value::from(v.clone()));
                }
                entry.insert(Value::from("environment"), Value::Mapping(env));
            }
            if !service.networks.is_empty() {
                entry.insert(Value::from("networks"), string_seq(&service.networks));
            }
            if !service.depends_on.is_empty() {
                entry.insert(Value::from("depends_on"), string_seq(&service.depends_on));
            }

            services.insert(Value::from(service.name.clone()), Value::Mapping(entry));
        }
        root.insert(Value::from("services"), Value::Mapping(services));

        if !self.networks.is_empty() {
            root.insert(Value::from("networks"), empty_definitions(&self.networks));
        }
        if !self.volumes.is_empty() {
            root.insert(Value::from("volumes"), empty_definitions(&self.volumes));
        }

        serde_yaml::to_string(&Value::Mapping(root)).context("Failed to render compose document")
    }
}

fn string_seq(items: &[String]) -> Value {
    Value::Sequence(items.iter().map(|s| Value::from(s.clone())).collect())
}

fn empty_definitions(names: &[String]) -> Value {
    let mut map = Mapping::new();
    for name in names {
        map.insert(Value::from(name.clone()), Value::Mapping(Mapping::new()));
    }
    Value::Mapping(map)
}

/// Derive the compose document from the inspected set. Only running
/// containers become services.
pub fn synthesize(records: &[ContainerRecord]) -> ComposeDocument {
    let projected: Vec<ComposeService> = records
        .iter()
        .filter(|r| r.is_running())
        .map(project)
        .collect();

    let services = order_services(projected);

    let mut networks: Vec<String> = Vec::new();
    let mut volumes: Vec<String> = Vec::new();
    for service in &services {
        for network in &service.networks {
            if !networks.contains(network) {
                networks.push(network.clone());
            }
        }
    }
    for record in records.iter().filter(|r| r.is_running()) {
        for mount in record.mounts.iter().filter(|m| m.named) {
            if !volumes.contains(&mount.source) {
                volumes.push(mount.source.clone());
            }
        }
    }

    ComposeDocument {
        services,
        networks,
        volumes,
    }
}

fn project(record: &ContainerRecord) -> ComposeService {
    let restart = match record.restart_policy.as_str() {
        "" | "no" => "unless-stopped".to_string(),
        policy => policy.to_string(),
    };

    let ports = record
        .ports
        .iter()
        .filter_map(|p| {
            p.host_port
                .as_ref()
                .map(|host| format!("{}:{}", host, p.container_port))
        })
        .collect();

    let volumes = record
        .mounts
        .iter()
        .map(|m| {
            let mut entry = format!("{}:{}", m.source, m.target);
            if m.mode.split(',').any(|part| part == "ro") {
                entry.push_str(":ro");
            }
            entry
        })
        .collect();

    // Masked entries are dropped rather than written as placeholders: a
    // placeholder value would be booted into the service verbatim on
    // restore. The secrets template is the refill path.
    let environment = record
        .env
        .iter()
        .filter(|(_, v)| v.as_str() != MASK_PLACEHOLDER)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let networks = record
        .networks
        .iter()
        .filter(|n| !IMPLICIT_NETWORKS.contains(&n.as_str()))
        .cloned()
        .collect();

    let depends_on = record
        .labels
        .get(DEPENDS_ON_LABEL)
        .map(|value| {
            value
                .split(',')
                .filter_map(|dep| dep.split(':').next())
                .filter(|dep| !dep.is_empty())
                .map(service_name)
                .collect()
        })
        .unwrap_or_default();

    ComposeService {
        name: service_name(&record.name),
        container_name: record.name.clone(),
        image: record.image.clone(),
        restart,
        ports,
        volumes,
        environment,
        networks,
        depends_on,
    }
}

fn service_name(container_name: &str) -> String {
    container_name.replace('_', "-")
}

/// Advisory ordering: a service with an explicit depends_on label sorts
/// after its dependencies; ties and cycles fall back to first-seen order.
fn order_services(services: Vec<ComposeService>) -> Vec<ComposeService> {
    let known: Vec<String> = services.iter().map(|s| s.name.clone()).collect();
    let mut remaining: Vec<Option<ComposeService>> = services.into_iter().map(Some).collect();
    let mut placed: Vec<String> = Vec::new();
    let mut ordered = Vec::new();

    loop {
        let mut progressed = false;
        for slot in remaining.iter_mut() {
            let ready = match slot {
                Some(service) => service
                    .depends_on
                    .iter()
                    .filter(|d| known.contains(d))
                    .all(|d| placed.contains(d)),
                None => false,
            };
            if ready {
                let service = slot.take().unwrap();
                placed.push(service.name.clone());
                ordered.push(service);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    // Cycle leftovers keep first-seen order.
    for slot in remaining.into_iter().flatten() {
        ordered.push(slot);
    }

    ordered
}
