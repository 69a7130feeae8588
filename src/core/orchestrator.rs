/// Backup orchestration
///
/// Sequences the pipeline: inspect, mask, resolve templates, synthesize the
/// compose document, collect host config, diff against the previous
/// snapshot, emit the restore script, persist the bundle. Holds the only
/// mutable shared state in the system: the single-flight run lock and the
/// output directory. A second trigger while a run is in progress is
/// rejected, not queued.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::core::compose::{self, ComposeDocument};
use crate::core::diff::{diff_snapshots, render_change_log, ChangeEntry};
use crate::core::engine::{ContainerEngine, EngineError};
use crate::core::host::{HostCollector, HostPaths};
use crate::core::inspector::{ContainerRecord, InspectFilter, Inspector};
use crate::core::restore::emit_restore_script;
use crate::core::secrets::{mask_records, MaskPolicy, SecretsTemplate};
use crate::core::snapshot::{self, BundleWriter, Snapshot};
use crate::core::templates::TemplateResolver;
use crate::utils::{
    CHANGES_FILE, COMPOSE_FILE, CONFIG_FILE, DEFAULT_INSPECT_WIDTH, DEFAULT_QUERY_TIMEOUT,
    DEFAULT_TEMPLATE_DIR, README_FILE, RESTORE_FILE, SECRETS_FILE,
};

#[derive(Debug, Error)]
pub enum RunError {
    /// Distinct signal for concurrent triggers; the caller decides how to
    /// surface it (CLI message, HTTP 409).
    #[error("a backup run is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("engine query phase timed out after {0:?}")]
    Timeout(Duration),

    #[error("output location {path} is not writable: {source}")]
    OutputUnwritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist bundle: {0}")]
    Persist(String),
}

impl RunError {
    /// Fatal errors abort before any output mutation; the prior snapshot
    /// stands untouched.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, RunError::AlreadyRunning)
    }
}

/// Trigger parameters: start-run(output-location, mask-secrets).
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub output_dir: PathBuf,
    pub mask_secrets: bool,
}

/// What the caller gets back from a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub containers: usize,
    pub failed_inspections: usize,
    pub warnings: Vec<String>,
    pub changes: usize,
    pub first_run: bool,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub struct GuardianSettings {
    pub template_dir: PathBuf,
    pub host_paths: HostPaths,
    pub include_stopped: bool,
    pub inspect_width: usize,
    pub query_timeout: Duration,
    pub filter: InspectFilter,
}

impl Default for GuardianSettings {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from(DEFAULT_TEMPLATE_DIR),
            host_paths: HostPaths::default(),
            include_stopped: true,
            inspect_width: DEFAULT_INSPECT_WIDTH,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            filter: InspectFilter::default(),
        }
    }
}

struct Assembled {
    snapshot: Snapshot,
    compose: ComposeDocument,
    secrets: SecretsTemplate,
    warnings: Vec<String>,
    failed_inspections: usize,
}

pub struct Guardian {
    engine: Arc<dyn ContainerEngine>,
    settings: GuardianSettings,
    run_lock: Mutex<()>,
}

impl Guardian {
    pub fn new(engine: Arc<dyn ContainerEngine>, settings: GuardianSettings) -> Self {
        Self {
            engine,
            settings,
            run_lock: Mutex::new(()),
        }
    }

    pub fn engine(&self) -> &Arc<dyn ContainerEngine> {
        &self.engine
    }

    pub fn settings(&self) -> &GuardianSettings {
        &self.settings
    }

    /// Run the full pipeline and persist the bundle.
    pub async fn run_backup(&self, opts: &BackupOptions) -> Result<RunSummary, RunError> {
        let _flight = self
            .run_lock
            .try_lock()
            .map_err(|_| RunError::AlreadyRunning)?;

        let started = Instant::now();

        probe_output(&opts.output_dir)?;

        let mut warnings = Vec::new();
        let previous = snapshot::load_previous(&opts.output_dir, &mut warnings);
        let first_run = previous.is_none();

        let Assembled {
            snapshot,
            compose,
            secrets,
            warnings: assembly_warnings,
            failed_inspections,
        } = self.assemble(opts.mask_secrets).await?;
        warnings.extend(assembly_warnings);

        let changes = diff_snapshots(previous.as_ref(), &snapshot);
        let change_log = render_change_log(&changes, &snapshot, previous.as_ref());

        let restore_script = emit_restore_script(
            &compose,
            &snapshot.templates,
            &snapshot.host.hostname,
            &snapshot.generated_at,
        );

        self.persist(opts, &snapshot, &compose, &secrets, &change_log, &restore_script)?;

        Ok(RunSummary {
            containers: snapshot.containers.len(),
            failed_inspections,
            warnings,
            changes: changes.len(),
            first_run,
            duration: started.elapsed(),
        })
    }

    /// Dry run for the diff command: compare live state against the
    /// persisted snapshot without writing anything.
    pub async fn preview_changes(
        &self,
        output_dir: &Path,
    ) -> Result<(Vec<ChangeEntry>, String, Vec<String>), RunError> {
        let mut warnings = Vec::new();
        let previous = snapshot::load_previous(output_dir, &mut warnings);

        let assembled = self.assemble(true).await?;
        warnings.extend(assembled.warnings);

        let changes = diff_snapshots(previous.as_ref(), &assembled.snapshot);
        let log = render_change_log(&changes, &assembled.snapshot, previous.as_ref());

        Ok((changes, log, warnings))
    }

    /// Inspect all containers with default masking, for the status command
    /// and the dashboard.
    pub async fn inspect_containers(
        &self,
    ) -> Result<(Vec<ContainerRecord>, Vec<String>), RunError> {
        let report = timeout(
            self.settings.query_timeout,
            self.inspector().collect(),
        )
        .await
        .map_err(|_| RunError::Timeout(self.settings.query_timeout))??;

        let warnings = report
            .failures
            .iter()
            .map(|f| format!("inspect failed for {}: {}", f.container, f.error))
            .collect();

        let mut records = report.records;
        mask_records(&MaskPolicy::default(), &mut records);

        Ok((records, warnings))
    }

    fn inspector(&self) -> Inspector {
        Inspector::new(Arc::clone(&self.engine))
            .include_stopped(self.settings.include_stopped)
            .width(self.settings.inspect_width)
            .filter(self.settings.filter.clone())
    }

    /// Everything up to (and excluding) persistence. The bundle is only
    /// assembled once all inspections, successful or individually failed,
    /// have completed.
    async fn assemble(&self, mask_secrets: bool) -> Result<Assembled, RunError> {
        let report = timeout(self.settings.query_timeout, self.inspector().collect())
            .await
            .map_err(|_| RunError::Timeout(self.settings.query_timeout))??;

        let mut warnings: Vec<String> = report
            .failures
            .iter()
            .map(|f| format!("inspect failed for {}: {}", f.container, f.error))
            .collect();
        let failed_inspections = report.failures.len();

        let mut records = report.records;
        let policy = MaskPolicy::with_enabled(mask_secrets);
        let secrets = mask_records(&policy, &mut records);

        let resolver = TemplateResolver::new(&self.settings.template_dir);
        let (bindings, template_warnings) = resolver.resolve(&records);
        warnings.extend(template_warnings);

        let compose = compose::synthesize(&records);

        let host = HostCollector::new(self.settings.host_paths.clone()).collect();
        warnings.extend(host.warnings());

        let snapshot = Snapshot {
            generated_at: Utc::now(),
            host,
            containers: records,
            templates: bindings,
        };

        Ok(Assembled {
            snapshot,
            compose,
            secrets,
            warnings,
            failed_inspections,
        })
    }

    fn persist(
        &self,
        opts: &BackupOptions,
        snapshot: &Snapshot,
        compose: &ComposeDocument,
        secrets: &SecretsTemplate,
        change_log: &str,
        restore_script: &str,
    ) -> Result<(), RunError> {
        let persist_err = |e: anyhow::Error| RunError::Persist(format!("{e:#}"));

        let compose_yaml = format!(
            "# Generated by Config Guardian\n# {}\n\n{}",
            snapshot.generated_at.to_rfc3339(),
            compose.to_yaml().map_err(persist_err)?
        );

        let snapshot_json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| RunError::Persist(e.to_string()))?;

        let writer = BundleWriter::create(&opts.output_dir).map_err(persist_err)?;

        writer
            .write_file(COMPOSE_FILE, &compose_yaml)
            .map_err(persist_err)?;
        for binding in &snapshot.templates {
            writer
                .write_template(&binding.file_name, &binding.content)
                .map_err(persist_err)?;
        }
        if opts.mask_secrets {
            writer
                .write_file(SECRETS_FILE, &secrets.render())
                .map_err(persist_err)?;
        }
        writer
            .write_file(CHANGES_FILE, change_log)
            .map_err(persist_err)?;
        writer
            .write_executable(RESTORE_FILE, restore_script)
            .map_err(persist_err)?;
        writer
            .write_file(README_FILE, &render_readme(snapshot))
            .map_err(persist_err)?;
        writer
            .write_file(CONFIG_FILE, &snapshot_json)
            .map_err(persist_err)?;

        writer.commit().map_err(persist_err)
    }
}

/// Verify the output location before touching anything else: an unwritable
/// destination must abort with no artifacts modified.
fn probe_output(output_dir: &Path) -> Result<(), RunError> {
    let unwritable = |source| RunError::OutputUnwritable {
        path: output_dir.to_path_buf(),
        source,
    };

    fs::create_dir_all(output_dir).map_err(unwritable)?;

    let probe = output_dir.join(".write-probe");
    fs::write(&probe, b"").map_err(unwritable)?;
    fs::remove_file(&probe).map_err(unwritable)?;

    Ok(())
}

fn render_readme(snapshot: &Snapshot) -> String {
    format!(
        "# Server Backup Documentation\n\n\
         **Generated:** {generated}\n\
         **Server:** {hostname}\n\
         **Containers:** {count}\n\n\
         ## Quick Recovery\n\n\
         1. Reinstall the host OS\n\
         2. Restore the flash/config backup\n\
         3. Run: `bash restore.sh`\n\
         4. Refill secret values from `secrets-template.env`\n\
         5. Restore application data from your data backup\n\n\
         ## Files\n\n\
         - `server-config.json` - Complete configuration snapshot\n\
         - `docker-compose.yml` - Container definitions\n\
         - `templates/` - Native container templates (copied or synthesized)\n\
         - `secrets-template.env` - Masked secret keys to refill\n\
         - `changes.log` - Changes since the previous backup\n\
         - `restore.sh` - Restoration script\n\
         - `README.md` - This file\n\n\
         Keep this documentation safe and test your restore process.\n",
        generated = snapshot.generated_at.format("%Y-%m-%d %H:%M:%S"),
        hostname = snapshot.host.hostname,
        count = snapshot.containers.len(),
    )
}
