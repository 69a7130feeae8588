/// Host configuration collection
///
/// Reads the host-level configuration files (identity, OS version, share
/// descriptors, plugin descriptors) into one normalized document. These are
/// optional bind-mounts, so access is best-effort: a missing file becomes an
/// explicit `Unavailable` section, never a failed run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::utils::{HOST_IDENT_FILE, HOST_PLUGINS_DIR, HOST_SHARES_DIR, HOST_VERSION_FILES};

/// Explicit presence-or-absence for an optional host source. Downstream
/// consumers must handle the absent case; there is no null to pun on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Section<T> {
    Present { value: T },
    Unavailable { reason: String },
}

impl<T> Section<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Section::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Section::Present { value } => Some(value),
            Section::Unavailable { .. } => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Section::Present { .. })
    }
}

/// One user share descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShareConfig {
    pub name: String,
    pub settings: BTreeMap<String, String>,
}

/// Normalized host document. Part of the snapshot; the differ compares it
/// key by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    pub hostname: String,
    pub os_version: Section<String>,
    pub identity: Section<BTreeMap<String, String>>,
    pub shares: Section<Vec<ShareConfig>>,
    pub plugins: Section<Vec<String>>,
}

impl HostConfig {
    /// One warning per unavailable section, for the run summary.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let sections: [(&str, bool, Option<&str>); 4] = [
            ("os_version", self.os_version.is_present(), reason(&self.os_version)),
            ("identity", self.identity.is_present(), reason(&self.identity)),
            ("shares", self.shares.is_present(), reason(&self.shares)),
            ("plugins", self.plugins.is_present(), reason(&self.plugins)),
        ];
        for (name, present, why) in sections {
            if !present {
                warnings.push(format!(
                    "host {} unavailable: {}",
                    name,
                    why.unwrap_or("unknown")
                ));
            }
        }
        warnings
    }
}

fn reason<T>(section: &Section<T>) -> Option<&str> {
    match section {
        Section::Unavailable { reason } => Some(reason.as_str()),
        Section::Present { .. } => None,
    }
}

/// Where to look for each host source. Defaults match the Unraid flash
/// layout; deployments override via bind-mount paths.
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub ident_file: PathBuf,
    pub version_files: Vec<PathBuf>,
    pub shares_dir: PathBuf,
    pub plugins_dir: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self {
            ident_file: PathBuf::from(HOST_IDENT_FILE),
            version_files: HOST_VERSION_FILES.iter().map(PathBuf::from).collect(),
            shares_dir: PathBuf::from(HOST_SHARES_DIR),
            plugins_dir: PathBuf::from(HOST_PLUGINS_DIR),
        }
    }
}

pub struct HostCollector {
    paths: HostPaths,
}

impl HostCollector {
    pub fn new(paths: HostPaths) -> Self {
        Self { paths }
    }

    /// Collect all sections. Never fails; absence is recorded per section.
    pub fn collect(&self) -> HostConfig {
        let identity = self.read_identity();
        let hostname = identity
            .value()
            .and_then(|map| map.get("NAME").cloned())
            .or_else(sysinfo::System::host_name)
            .unwrap_or_else(|| "unknown".to_string());

        HostConfig {
            hostname,
            os_version: self.read_version(),
            identity,
            shares: self.read_shares(),
            plugins: self.read_plugins(),
        }
    }

    fn read_identity(&self) -> Section<BTreeMap<String, String>> {
        match fs::read_to_string(&self.paths.ident_file) {
            Ok(content) => Section::Present {
                value: parse_cfg(&content),
            },
            Err(e) => Section::unavailable(format!("{}: {}", self.paths.ident_file.display(), e)),
        }
    }

    fn read_version(&self) -> Section<String> {
        for path in &self.paths.version_files {
            if let Ok(content) = fs::read_to_string(path) {
                return Section::Present {
                    value: content.trim().to_string(),
                };
            }
        }
        Section::unavailable("no version file present")
    }

    fn read_shares(&self) -> Section<Vec<ShareConfig>> {
        let entries = match fs::read_dir(&self.paths.shares_dir) {
            Ok(entries) => entries,
            Err(e) => {
                return Section::unavailable(format!("{}: {}", self.paths.shares_dir.display(), e))
            }
        };

        let mut shares: Vec<ShareConfig> = entries
            .flatten()
            .filter(|e| e.path().extension().map(|x| x == "cfg").unwrap_or(false))
            .filter_map(|e| {
                let name = e.path().file_stem()?.to_string_lossy().to_string();
                let content = fs::read_to_string(e.path()).ok()?;
                Some(ShareConfig {
                    name,
                    settings: parse_cfg(&content),
                })
            })
            .collect();

        shares.sort_by(|a, b| a.name.cmp(&b.name));
        Section::Present { value: shares }
    }

    fn read_plugins(&self) -> Section<Vec<String>> {
        let entries = match fs::read_dir(&self.paths.plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                return Section::unavailable(format!("{}: {}", self.paths.plugins_dir.display(), e))
            }
        };

        let mut plugins: Vec<String> = entries
            .flatten()
            .filter(|e| e.path().extension().map(|x| x == "plg").unwrap_or(false))
            .filter_map(|e| {
                e.path()
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
            })
            .collect();

        plugins.sort();
        Section::Present { value: plugins }
    }
}

/// Parse KEY="value" lines. Comments and blank lines are skipped; quotes are
/// stripped. Empty values are kept as empty strings, mirroring the env
/// tolerance in the masker.
fn parse_cfg(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            (
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            )
        })
        .collect()
}

/// Convenience constructor rooting every default path under `root`, used by
/// deployments that bind-mount the flash device somewhere else.
pub fn paths_under(root: &Path) -> HostPaths {
    HostPaths {
        ident_file: root.join("config/ident.cfg"),
        version_files: vec![root.join("version"), root.join("config/version")],
        shares_dir: root.join("config/shares"),
        plugins_dir: root.join("config/plugins"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn collects_identity_and_shares() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config/shares")).unwrap();
        fs::write(
            dir.path().join("config/ident.cfg"),
            "# ident\nNAME=\"tower\"\ntimeZone=\"UTC\"\n",
        )
        .unwrap();
        fs::write(dir.path().join("version"), "6.12.4\n").unwrap();
        fs::write(
            dir.path().join("config/shares/media.cfg"),
            "shareComment=\"movies\"\nshareAllocator=\"highwater\"\n",
        )
        .unwrap();

        let config = HostCollector::new(paths_under(dir.path())).collect();

        assert_eq!(config.hostname, "tower");
        assert_eq!(config.os_version.value().map(String::as_str), Some("6.12.4"));
        let shares = config.shares.value().unwrap();
        assert_eq!(shares.len(), 1);
        assert_eq!(shares[0].name, "media");
        assert_eq!(
            shares[0].settings.get("shareAllocator").map(String::as_str),
            Some("highwater")
        );
    }

    #[test]
    fn missing_files_become_unavailable_sections() {
        let dir = tempdir().unwrap();

        let config = HostCollector::new(paths_under(dir.path())).collect();

        assert!(!config.identity.is_present());
        assert!(!config.os_version.is_present());
        assert!(!config.shares.is_present());
        assert!(!config.plugins.is_present());
        assert_eq!(config.warnings().len(), 4);
        // Hostname falls back rather than failing.
        assert!(!config.hostname.is_empty());
    }

    #[test]
    fn cfg_parser_strips_quotes_and_comments() {
        let parsed = parse_cfg("# comment\nNAME=\"tower\"\nEMPTY=\n\nUSE_SSL=no\n");
        assert_eq!(parsed.get("NAME").map(String::as_str), Some("tower"));
        assert_eq!(parsed.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(parsed.get("USE_SSL").map(String::as_str), Some("no"));
        assert!(!parsed.contains_key("# comment"));
    }
}
