/// Snapshot persistence and bundle staging
///
/// The snapshot is the normalized state of one run and the differ's baseline
/// for the next. A prior snapshot is read-only input; it is superseded by the
/// new bundle, never mutated. Artifacts are staged in a hidden directory
/// inside the output location and moved into place per file, the snapshot
/// JSON last, so the baseline only advances once the rest of the bundle is
/// already in place.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::host::HostConfig;
use crate::core::inspector::ContainerRecord;
use crate::core::templates::TemplateBinding;
use crate::utils::{CONFIG_FILE, TEMPLATES_DIR};

/// The full persisted bundle state of one successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub generated_at: DateTime<Utc>,
    pub host: HostConfig,
    pub containers: Vec<ContainerRecord>,
    pub templates: Vec<TemplateBinding>,
}

/// Load the previous snapshot from the output directory. Missing means
/// first run; a corrupt file is reported and treated as a first run rather
/// than aborting.
pub fn load_previous(output_dir: &Path, warnings: &mut Vec<String>) -> Option<Snapshot> {
    let path = output_dir.join(CONFIG_FILE);
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(&path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warnings.push(format!("could not parse previous snapshot: {e}"));
                None
            }
        },
        Err(e) => {
            warnings.push(format!("could not read previous snapshot: {e}"));
            None
        }
    }
}

/// Stages artifacts and commits them into the output directory.
pub struct BundleWriter {
    output_dir: PathBuf,
    staging: PathBuf,
}

impl BundleWriter {
    /// Prepare a fresh staging area inside the output directory.
    pub fn create(output_dir: &Path) -> Result<Self> {
        fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

        let staging = output_dir.join(format!(".staging-{}", std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging).context("Failed to clear stale staging directory")?;
        }
        fs::create_dir_all(staging.join(TEMPLATES_DIR))
            .context("Failed to create staging directory")?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            staging,
        })
    }

    pub fn write_file(&self, name: &str, contents: &str) -> Result<()> {
        fs::write(self.staging.join(name), contents)
            .with_context(|| format!("Failed to stage {name}"))
    }

    /// Stage a file that must end up executable (the restore script).
    pub fn write_executable(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.staging.join(name);
        fs::write(&path, contents).with_context(|| format!("Failed to stage {name}"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("Failed to mark {name} executable"))?;
        }

        Ok(())
    }

    pub fn write_template(&self, file_name: &str, contents: &str) -> Result<()> {
        fs::write(self.staging.join(TEMPLATES_DIR).join(file_name), contents)
            .with_context(|| format!("Failed to stage template {file_name}"))
    }

    /// Move everything into the output directory. Each move is an atomic
    /// rename; the snapshot JSON goes last so a crash mid-commit can leave
    /// refreshed artifacts but never an advanced differ baseline over a
    /// partial bundle.
    pub fn commit(self) -> Result<()> {
        let mut deferred_config = None;

        for entry in fs::read_dir(&self.staging).context("Failed to list staging directory")? {
            let entry = entry?;
            let name = entry.file_name();
            let target = self.output_dir.join(&name);

            if name == CONFIG_FILE {
                deferred_config = Some((entry.path(), target));
                continue;
            }

            if entry.path().is_dir() && target.exists() {
                fs::remove_dir_all(&target).with_context(|| {
                    format!("Failed to replace {}", target.display())
                })?;
            }
            fs::rename(entry.path(), &target)
                .with_context(|| format!("Failed to move {} into place", target.display()))?;
        }

        if let Some((staged, target)) = deferred_config {
            fs::rename(staged, &target)
                .with_context(|| format!("Failed to move {} into place", target.display()))?;
        }

        fs::remove_dir_all(&self.staging).context("Failed to remove staging directory")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::host::{HostCollector, HostPaths};
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn snapshot_fixture() -> Snapshot {
        let host = HostCollector::new(HostPaths {
            ident_file: PathBuf::from("/nonexistent/ident.cfg"),
            version_files: vec![],
            shares_dir: PathBuf::from("/nonexistent/shares"),
            plugins_dir: PathBuf::from("/nonexistent/plugins"),
        })
        .collect();

        Snapshot {
            generated_at: Utc::now(),
            host,
            containers: vec![ContainerRecord {
                name: "plex".to_string(),
                id: "abc".to_string(),
                image: "lscr.io/linuxserver/plex:latest".to_string(),
                image_id: "sha256:deadbeef".to_string(),
                state: "running".to_string(),
                created: None,
                env: BTreeMap::new(),
                ports: Vec::new(),
                mounts: Vec::new(),
                networks: Vec::new(),
                restart_policy: "unless-stopped".to_string(),
                labels: BTreeMap::new(),
            }],
            templates: Vec::new(),
        }
    }

    #[test]
    fn snapshot_round_trips_through_the_bundle() {
        let dir = tempdir().unwrap();
        let snapshot = snapshot_fixture();

        let writer = BundleWriter::create(dir.path()).unwrap();
        writer
            .write_file(CONFIG_FILE, &serde_json::to_string_pretty(&snapshot).unwrap())
            .unwrap();
        writer.write_file("changes.log", "no changes detected\n").unwrap();
        writer.commit().unwrap();

        let mut warnings = Vec::new();
        let loaded = load_previous(dir.path(), &mut warnings).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded.containers.len(), 1);
        assert_eq!(loaded.containers[0].name, "plex");

        // Staging area is gone after commit.
        assert!(!dir
            .path()
            .read_dir()
            .unwrap()
            .flatten()
            .any(|e| e.file_name().to_string_lossy().starts_with(".staging-")));
    }

    #[test]
    fn missing_previous_snapshot_is_a_first_run() {
        let dir = tempdir().unwrap();
        let mut warnings = Vec::new();
        assert!(load_previous(dir.path(), &mut warnings).is_none());
        assert!(warnings.is_empty());
    }

    #[test]
    fn corrupt_previous_snapshot_warns_and_resets() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "{not json").unwrap();

        let mut warnings = Vec::new();
        assert!(load_previous(dir.path(), &mut warnings).is_none());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn commit_replaces_the_templates_directory() {
        let dir = tempdir().unwrap();

        let writer = BundleWriter::create(dir.path()).unwrap();
        writer.write_template("my-old.xml", "<Container/>").unwrap();
        writer.commit().unwrap();

        let writer = BundleWriter::create(dir.path()).unwrap();
        writer.write_template("my-new.xml", "<Container/>").unwrap();
        writer.commit().unwrap();

        let templates = dir.path().join(TEMPLATES_DIR);
        assert!(templates.join("my-new.xml").exists());
        assert!(!templates.join("my-old.xml").exists());
    }
}
