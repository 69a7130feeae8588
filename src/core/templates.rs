/// Native template resolution
///
/// Matches live containers against the host's cached dockerMan XML template
/// files. A matched native file is authoritative for restore and copied
/// verbatim: it carries host-specific metadata (icons, WebUI URLs, categories)
/// that live inspection cannot reconstruct. Containers without a native
/// template get a minimal synthesized stub. The cache is never written.

use std::fs;
use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::inspector::ContainerRecord;
use crate::utils::{image_repository, image_tag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingState {
    /// Native template found; content preserved verbatim.
    Matched,
    /// No native template; minimal stub generated from the record.
    Synthesized,
    /// Native template found but its declared image disagrees with the
    /// running one. Flagged, never auto-corrected.
    Stale,
}

/// Association between a container and its template file in the bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateBinding {
    pub container: String,
    pub state: BindingState,
    pub file_name: String,
    pub warning: Option<String>,
    /// File content for the bundle. Not persisted in the snapshot; the
    /// templates/ directory holds it.
    #[serde(skip_serializing, default)]
    pub content: String,
}

#[derive(Debug)]
struct CachedTemplate {
    file_name: String,
    name: Option<String>,
    repository: Option<String>,
    content: String,
}

pub struct TemplateResolver {
    cache_dir: PathBuf,
    name_re: Regex,
    repo_re: Regex,
}

impl TemplateResolver {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            name_re: Regex::new(r"<Name>([^<]*)</Name>").unwrap(),
            repo_re: Regex::new(r"<Repository>([^<]*)</Repository>").unwrap(),
        }
    }

    /// Resolve a binding for every record. Never fails: an unreadable cache
    /// degrades to synthesized stubs with a warning.
    pub fn resolve(&self, records: &[ContainerRecord]) -> (Vec<TemplateBinding>, Vec<String>) {
        let mut warnings = Vec::new();
        let cache = self.load_cache(&mut warnings);

        let bindings = records
            .iter()
            .map(|record| self.bind(record, &cache, &mut warnings))
            .collect();

        (bindings, warnings)
    }

    fn load_cache(&self, warnings: &mut Vec<String>) -> Vec<CachedTemplate> {
        let entries = match fs::read_dir(&self.cache_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warnings.push(format!(
                    "template cache unavailable at {}: {}",
                    self.cache_dir.display(),
                    e
                ));
                return Vec::new();
            }
        };

        let mut cache: Vec<CachedTemplate> = entries
            .flatten()
            .filter(|e| e.path().extension().map(|x| x == "xml").unwrap_or(false))
            .filter_map(|e| {
                let file_name = e.file_name().to_string_lossy().to_string();
                match fs::read_to_string(e.path()) {
                    Ok(content) => {
                        let name = self.extract(&self.name_re, &content);
                        let repository = self.extract(&self.repo_re, &content);
                        Some(CachedTemplate {
                            file_name,
                            name,
                            repository,
                            content,
                        })
                    }
                    Err(err) => {
                        warnings.push(format!("skipping unreadable template {file_name}: {err}"));
                        None
                    }
                }
            })
            .collect();

        cache.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        cache
    }

    fn extract(&self, re: &Regex, content: &str) -> Option<String> {
        re.captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn bind(
        &self,
        record: &ContainerRecord,
        cache: &[CachedTemplate],
        warnings: &mut Vec<String>,
    ) -> TemplateBinding {
        // Exact name match first, then image repository with tag/digest
        // ignored.
        let by_name: Vec<&CachedTemplate> = cache
            .iter()
            .filter(|t| t.name.as_deref() == Some(record.name.as_str()))
            .collect();

        let candidates = if by_name.is_empty() {
            let repo = image_repository(&record.image);
            cache
                .iter()
                .filter(|t| {
                    t.repository
                        .as_deref()
                        .map(|r| image_repository(r) == repo)
                        .unwrap_or(false)
                })
                .collect()
        } else {
            by_name
        };

        let template = match candidates.first() {
            Some(t) => *t,
            None => return synthesize(record),
        };

        if candidates.len() > 1 {
            warnings.push(format!(
                "ambiguous template match for {}: {} candidates, using {}",
                record.name,
                candidates.len(),
                template.file_name
            ));
        }

        let declared = template.repository.as_deref().unwrap_or_default();
        let stale = !declared.is_empty()
            && (image_repository(declared) != image_repository(&record.image)
                || image_tag(declared) != image_tag(&record.image));

        if stale {
            let warning = format!(
                "template {} declares image {}, container {} is running {}",
                template.file_name, declared, record.name, record.image
            );
            warnings.push(warning.clone());
            TemplateBinding {
                container: record.name.clone(),
                state: BindingState::Stale,
                file_name: template.file_name.clone(),
                warning: Some(warning),
                content: template.content.clone(),
            }
        } else {
            TemplateBinding {
                container: record.name.clone(),
                state: BindingState::Matched,
                file_name: template.file_name.clone(),
                warning: None,
                content: template.content.clone(),
            }
        }
    }
}

/// Build a minimal stub template from the record. Env values arrive already
/// masked when masking is enabled.
fn synthesize(record: &ContainerRecord) -> TemplateBinding {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<Container version=\"2\">\n");
    xml.push_str(&format!("  <Name>{}</Name>\n", xml_escape(&record.name)));
    xml.push_str(&format!(
        "  <Repository>{}</Repository>\n",
        xml_escape(&record.image)
    ));

    let network = record
        .networks
        .first()
        .map(String::as_str)
        .unwrap_or("bridge");
    xml.push_str(&format!("  <Network>{}</Network>\n", xml_escape(network)));

    for (key, value) in &record.env {
        xml.push_str(&format!(
            "  <Config Name=\"{k}\" Target=\"{k}\" Type=\"Variable\">{v}</Config>\n",
            k = xml_escape(key),
            v = xml_escape(value)
        ));
    }

    for port in &record.ports {
        if let Some(host_port) = &port.host_port {
            xml.push_str(&format!(
                "  <Config Name=\"Port {t}\" Target=\"{t}\" Type=\"Port\">{h}</Config>\n",
                t = xml_escape(&port.container_port),
                h = xml_escape(host_port)
            ));
        }
    }

    for mount in &record.mounts {
        xml.push_str(&format!(
            "  <Config Name=\"{t}\" Target=\"{t}\" Mode=\"{m}\" Type=\"Path\">{s}</Config>\n",
            t = xml_escape(&mount.target),
            m = xml_escape(&mount.mode),
            s = xml_escape(&mount.source)
        ));
    }

    xml.push_str("</Container>\n");

    TemplateBinding {
        container: record.name.clone(),
        state: BindingState::Synthesized,
        file_name: format!("my-{}.xml", record.name),
        warning: None,
        content: xml,
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    fn record(name: &str, image: &str) -> ContainerRecord {
        ContainerRecord {
            name: name.to_string(),
            id: format!("{name}-id"),
            image: image.to_string(),
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

    fn write_template(dir: &std::path::Path, file: &str, name: &str, repo: &str) -> String {
        let content = format!(
            "<?xml version=\"1.0\"?>\n<Container version=\"2\">\n  <Name>{name}</Name>\n  <Repository>{repo}</Repository>\n  <WebUI>http://[IP]:[PORT:32400]</WebUI>\n</Container>\n"
        );
        fs::write(dir.join(file), &content).unwrap();
        content
    }

    #[test]
    fn exact_name_match_copies_verbatim() {
        let dir = tempdir().unwrap();
        let content = write_template(dir.path(), "my-plex.xml", "plex", "lscr.io/linuxserver/plex:1.0");

        let records = vec![record("plex", "lscr.io/linuxserver/plex:1.0")];
        let (bindings, warnings) = TemplateResolver::new(dir.path()).resolve(&records);

        assert_eq!(bindings[0].state, BindingState::Matched);
        assert_eq!(bindings[0].file_name, "my-plex.xml");
        assert_eq!(bindings[0].content, content);
        assert!(warnings.is_empty());
    }

    #[test]
    fn tag_mismatch_is_stale_but_still_copied() {
        let dir = tempdir().unwrap();
        let content = write_template(dir.path(), "my-plex.xml", "plex", "lscr.io/linuxserver/plex:1.0");

        let records = vec![record("plex", "lscr.io/linuxserver/plex:1.1")];
        let (bindings, warnings) = TemplateResolver::new(dir.path()).resolve(&records);

        assert_eq!(bindings[0].state, BindingState::Stale);
        assert_eq!(bindings[0].content, content);
        assert!(bindings[0].warning.as_deref().unwrap().contains("1.0"));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn falls_back_to_repository_match() {
        let dir = tempdir().unwrap();
        write_template(dir.path(), "my-mediaserver.xml", "mediaserver", "nginx:latest");

        let records = vec![record("web", "nginx:latest")];
        let (bindings, _) = TemplateResolver::new(dir.path()).resolve(&records);

        assert_eq!(bindings[0].state, BindingState::Matched);
        assert_eq!(bindings[0].file_name, "my-mediaserver.xml");
    }

    #[test]
    fn missing_cache_synthesizes_with_warning() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        let records = vec![record("plex", "lscr.io/linuxserver/plex:latest")];
        let (bindings, warnings) = TemplateResolver::new(&missing).resolve(&records);

        assert_eq!(bindings[0].state, BindingState::Synthesized);
        assert_eq!(bindings[0].file_name, "my-plex.xml");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("template cache unavailable"));
    }

    #[test]
    fn synthesized_stub_carries_record_fields() {
        let mut rec = record("plex", "lscr.io/linuxserver/plex:latest");
        rec.env.insert("PLEX_CLAIM".to_string(), "***MASKED***".to_string());
        rec.env.insert("TZ".to_string(), "UTC".to_string());
        rec.ports.push(crate::core::inspector::PortMapping {
            container_port: "32400/tcp".to_string(),
            host_ip: None,
            host_port: Some("32400".to_string()),
        });

        let binding = synthesize(&rec);

        assert!(binding.content.contains("<Name>plex</Name>"));
        assert!(binding.content.contains("lscr.io/linuxserver/plex:latest"));
        assert!(binding.content.contains(">***MASKED***</Config>"));
        assert!(binding.content.contains("Target=\"32400/tcp\""));
        assert!(!binding.content.contains("abc123"));
    }
}
