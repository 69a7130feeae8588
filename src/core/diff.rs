/// Snapshot comparison and change-log rendering
///
/// Containers are joined on name: engine ids change whenever a container is
/// recreated, names survive. Modified entries list changed field names only;
/// env comparison works on the key set so values (possibly secrets) never
/// reach the change log.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::inspector::ContainerRecord;
use crate::core::snapshot::Snapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    ContainerAdded,
    ContainerRemoved,
    ContainerModified,
    HostSettingChanged,
}

/// One detected difference, rendered as one line of the change log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub kind: ChangeKind,
    pub subject: String,
    pub detail: Option<String>,
    pub fields: Vec<String>,
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ChangeKind::ContainerAdded => match &self.detail {
                Some(image) => write!(f, "+ {} (image: {})", self.subject, image),
                None => write!(f, "+ {}", self.subject),
            },
            ChangeKind::ContainerRemoved => match &self.detail {
                Some(image) => write!(f, "- {} (image: {})", self.subject, image),
                None => write!(f, "- {}", self.subject),
            },
            ChangeKind::ContainerModified => {
                write!(f, "~ {}: {}", self.subject, self.fields.join(", "))
            }
            ChangeKind::HostSettingChanged => write!(f, "! {} changed", self.subject),
        }
    }
}

/// Compare the current snapshot against the previous one. `previous` is
/// absent on the first run, in which case every container is reported as
/// added; that is the intended baseline, not a special case.
pub fn diff_snapshots(previous: Option<&Snapshot>, current: &Snapshot) -> Vec<ChangeEntry> {
    let mut changes = Vec::new();

    let previous = match previous {
        Some(p) => p,
        None => {
            for record in &current.containers {
                changes.push(added(record));
            }
            return changes;
        }
    };

    let old_by_name: BTreeMap<&str, &ContainerRecord> = previous
        .containers
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();
    let new_by_name: BTreeMap<&str, &ContainerRecord> = current
        .containers
        .iter()
        .map(|c| (c.name.as_str(), c))
        .collect();

    for record in &current.containers {
        if !old_by_name.contains_key(record.name.as_str()) {
            changes.push(added(record));
        }
    }

    for record in &previous.containers {
        if !new_by_name.contains_key(record.name.as_str()) {
            changes.push(ChangeEntry {
                kind: ChangeKind::ContainerRemoved,
                subject: record.name.clone(),
                detail: Some(record.image.clone()),
                fields: Vec::new(),
            });
        }
    }

    for record in &current.containers {
        if let Some(old) = old_by_name.get(record.name.as_str()) {
            let fields = changed_fields(old, record);
            if !fields.is_empty() {
                changes.push(ChangeEntry {
                    kind: ChangeKind::ContainerModified,
                    subject: record.name.clone(),
                    detail: None,
                    fields,
                });
            }
        }
    }

    changes.extend(host_changes(previous, current));

    changes
}

fn added(record: &ContainerRecord) -> ChangeEntry {
    ChangeEntry {
        kind: ChangeKind::ContainerAdded,
        subject: record.name.clone(),
        detail: Some(record.image.clone()),
        fields: Vec::new(),
    }
}

/// Field-by-field comparison in a fixed order. Engine id and creation time
/// churn on every recreation and are deliberately not compared; image_id
/// catches the case that actually matters (same tag, new content).
fn changed_fields(old: &ContainerRecord, new: &ContainerRecord) -> Vec<String> {
    let mut fields = Vec::new();

    if old.image != new.image {
        fields.push("image".to_string());
    }
    if old.image_id != new.image_id {
        fields.push("image_id".to_string());
    }
    if old.state != new.state {
        fields.push("state".to_string());
    }
    if old.restart_policy != new.restart_policy {
        fields.push("restart_policy".to_string());
    }
    if old.ports != new.ports {
        fields.push("ports".to_string());
    }
    if old.mounts != new.mounts {
        fields.push("mounts".to_string());
    }
    if old.networks != new.networks {
        fields.push("networks".to_string());
    }
    // Key set only: values never leak into the log.
    if old.env.keys().ne(new.env.keys()) {
        fields.push("env".to_string());
    }
    if old.labels != new.labels {
        fields.push("labels".to_string());
    }

    fields
}

/// Shallow key-by-key comparison of the normalized host document.
fn host_changes(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeEntry> {
    let old = serde_json::to_value(&previous.host).unwrap_or_default();
    let new = serde_json::to_value(&current.host).unwrap_or_default();

    let (old, new) = match (old.as_object(), new.as_object()) {
        (Some(o), Some(n)) => (o, n),
        _ => return Vec::new(),
    };

    let mut keys: Vec<&String> = old.keys().chain(new.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .filter(|key| old.get(key.as_str()) != new.get(key.as_str()))
        .map(|key| ChangeEntry {
            kind: ChangeKind::HostSettingChanged,
            subject: key.clone(),
            detail: None,
            fields: Vec::new(),
        })
        .collect()
}

/// Plain-text rendering: commented header, then one entry per line.
pub fn render_change_log(
    changes: &[ChangeEntry],
    current: &Snapshot,
    previous: Option<&Snapshot>,
) -> String {
    let mut out = String::from("# Change log generated by Config Guardian\n");
    out.push_str(&format!("# Generated: {}\n", current.generated_at.to_rfc3339()));
    match previous {
        Some(p) => out.push_str(&format!("# Baseline: {}\n", p.generated_at.to_rfc3339())),
        None => out.push_str("# Baseline: none (first run)\n"),
    }

    if changes.is_empty() {
        out.push_str("no changes detected\n");
        return out;
    }

    out.push_str(&format!("# {} changes detected\n", changes.len()));
    for change in changes {
        out.push_str(&format!("{change}\n"));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::{HostConfig, Section};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn host() -> HostConfig {
        HostConfig {
            hostname: "tower".to_string(),
            os_version: Section::Present {
                value: "6.12.4".to_string(),
            },
            identity: Section::unavailable("not mounted"),
            shares: Section::unavailable("not mounted"),
            plugins: Section::unavailable("not mounted"),
        }
    }

    fn record(name: &str) -> ContainerRecord {
        ContainerRecord {
            name: name.to_string(),
            id: format!("{name}-id"),
            image: format!("{name}:latest"),
            image_id: "sha256:deadbeef".to_string(),
            state: "running".to_string(),
            created: None,
            env: BTreeMap::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            networks: Vec::new(),
            restart_policy: "unless-stopped".to_string(),
            labels: BTreeMap::new(),
        }
    }

    fn snapshot(names: &[&str]) -> Snapshot {
        Snapshot {
            generated_at: Utc::now(),
            host: host(),
            containers: names.iter().map(|n| record(n)).collect(),
            templates: Vec::new(),
        }
    }

    #[test]
    fn identical_snapshots_yield_no_changes() {
        let current = snapshot(&["a", "b"]);
        assert!(diff_snapshots(Some(&current), &current).is_empty());
    }

    #[test]
    fn first_run_reports_every_container_added() {
        let current = snapshot(&["a", "b", "c"]);
        let changes = diff_snapshots(None, &current);

        assert_eq!(changes.len(), 3);
        assert!(changes.iter().all(|c| c.kind == ChangeKind::ContainerAdded));
    }

    #[test]
    fn set_difference_on_names() {
        let previous = snapshot(&["a", "b"]);
        let current = snapshot(&["b", "c"]);

        let changes = diff_snapshots(Some(&previous), &current);

        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .any(|c| c.kind == ChangeKind::ContainerAdded && c.subject == "c"));
        assert!(changes
            .iter()
            .any(|c| c.kind == ChangeKind::ContainerRemoved && c.subject == "a"));
        assert!(!changes.iter().any(|c| c.subject == "b"));
    }

    #[test]
    fn modified_entries_list_field_names_only() {
        let previous = snapshot(&["a"]);
        let mut current = snapshot(&["a"]);
        current.containers[0].image = "a:2.0".to_string();
        current.containers[0]
            .env
            .insert("NEW_PASSWORD".to_string(), "hunter2".to_string());

        let changes = diff_snapshots(Some(&previous), &current);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::ContainerModified);
        assert_eq!(changes[0].fields, vec!["image".to_string(), "env".to_string()]);

        let log = render_change_log(&changes, &current, Some(&previous));
        assert!(log.contains("~ a: image, env"));
        assert!(!log.contains("hunter2"));
    }

    #[test]
    fn env_value_change_alone_is_not_reported() {
        let mut previous = snapshot(&["a"]);
        previous.containers[0]
            .env
            .insert("TZ".to_string(), "UTC".to_string());
        let mut current = snapshot(&["a"]);
        current.containers[0]
            .env
            .insert("TZ".to_string(), "America/New_York".to_string());

        assert!(diff_snapshots(Some(&previous), &current).is_empty());
    }

    #[test]
    fn recreated_container_with_same_config_is_unchanged() {
        let previous = snapshot(&["a"]);
        let mut current = snapshot(&["a"]);
        current.containers[0].id = "fresh-id".to_string();
        current.containers[0].created = Some("2026-01-01T00:00:00Z".to_string());

        assert!(diff_snapshots(Some(&previous), &current).is_empty());
    }

    #[test]
    fn host_setting_change_is_reported_by_key() {
        let previous = snapshot(&["a"]);
        let mut current = snapshot(&["a"]);
        current.host.os_version = Section::Present {
            value: "6.13.0".to_string(),
        };

        let changes = diff_snapshots(Some(&previous), &current);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::HostSettingChanged);
        assert_eq!(changes[0].subject, "os_version");
    }

    #[test]
    fn render_is_one_entry_per_line() {
        let previous = snapshot(&["a", "b"]);
        let current = snapshot(&["b", "c"]);
        let changes = diff_snapshots(Some(&previous), &current);

        let log = render_change_log(&changes, &current, Some(&previous));
        let body: Vec<&str> = log.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(body.len(), changes.len());
    }
}
