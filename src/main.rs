use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use indicatif::{ProgressBar, ProgressStyle};

use guardian_cli::cli::{Cli, Commands};
use guardian_cli::core::inspector::InspectFilter;
use guardian_cli::core::{
    BackupOptions, DockerEngine, Guardian, GuardianSettings, RunError,
};
use guardian_cli::utils::{AppConfig, DEFAULT_OUTPUT_DIR, DEFAULT_TEMPLATE_DIR};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let endpoint = cli.endpoint.as_deref();

    match cli.command {
        None => {
            // No command - generate the bundle with defaults
            handle_backup(endpoint, None, false).await?;
        }
        Some(Commands::Backup {
            output,
            no_mask_secrets,
        }) => {
            handle_backup(endpoint, output, no_mask_secrets).await?;
        }
        Some(Commands::Status) => {
            handle_status(endpoint).await?;
        }
        Some(Commands::Diff { output }) => {
            handle_diff(endpoint, output).await?;
        }
        Some(Commands::Health) => {
            handle_health(endpoint).await?;
        }
        #[cfg(feature = "server")]
        Some(Commands::Serve { port, host, cors }) => {
            let guardian = Arc::new(build_guardian(endpoint)?);
            let output_dir = resolve_output_dir(None);
            guardian_cli::server::run(host, port, cors, guardian, output_dir).await?;
        }
    }

    Ok(())
}

/// Wire the engine and settings from config file + environment.
fn build_guardian(endpoint: Option<&str>) -> Result<Guardian> {
    let app_config = AppConfig::load().unwrap_or_default();

    let engine = DockerEngine::connect(endpoint)
        .context("Failed to connect to Docker daemon. Is Docker running?")?;

    let template_dir = std::env::var("TEMPLATE_DIR")
        .ok()
        .or(app_config.template_dir)
        .unwrap_or_else(|| DEFAULT_TEMPLATE_DIR.to_string());

    let settings = GuardianSettings {
        template_dir: PathBuf::from(template_dir),
        include_stopped: app_config.include_stopped.unwrap_or(true),
        filter: InspectFilter {
            allow: Vec::new(),
            deny: app_config.exclude_containers.unwrap_or_default(),
        },
        ..Default::default()
    };

    Ok(Guardian::new(Arc::new(engine), settings))
}

/// Output dir resolution: CLI flag, then OUTPUT_DIR, then config file, then
/// the default bind-mount location.
fn resolve_output_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| std::env::var("OUTPUT_DIR").ok().map(PathBuf::from))
        .or_else(|| {
            AppConfig::load()
                .ok()
                .and_then(|c| c.output_dir)
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

async fn handle_backup(
    endpoint: Option<&str>,
    output: Option<PathBuf>,
    no_mask_secrets: bool,
) -> Result<()> {
    let guardian = build_guardian(endpoint)?;
    let output_dir = resolve_output_dir(output);

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.set_message("Generating backup bundle...");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let opts = BackupOptions {
        output_dir: output_dir.clone(),
        mask_secrets: !no_mask_secrets,
    };
    let result = guardian.run_backup(&opts).await;
    spinner.finish_and_clear();

    match result {
        Ok(summary) => {
            let elapsed = Duration::from_millis(summary.duration.as_millis() as u64);
            println!(
                "{} Backup complete in {} -> {}",
                "✓".green(),
                humantime::format_duration(elapsed),
                output_dir.display()
            );
            println!("  Containers documented: {}", summary.containers);
            if summary.first_run {
                println!("  Changes: {} (first run baseline)", summary.changes);
            } else {
                println!("  Changes since last run: {}", summary.changes);
            }
            if summary.failed_inspections > 0 {
                println!(
                    "  {} {} container(s) could not be inspected",
                    "!".yellow(),
                    summary.failed_inspections
                );
            }
            for warning in &summary.warnings {
                println!("  {} {}", "warning:".yellow(), warning);
            }
            Ok(())
        }
        Err(RunError::AlreadyRunning) => {
            println!("{} A backup run is already in progress; not queuing another.", "✗".yellow());
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

async fn handle_status(endpoint: Option<&str>) -> Result<()> {
    let guardian = build_guardian(endpoint)?;
    let (records, warnings) = guardian.inspect_containers().await?;

    println!("Container Status\n");
    println!("{:<25} {:<12} {:<40}", "Name", "State", "Image");
    println!("{}", "-".repeat(77));

    for record in &records {
        println!(
            "{:<25} {:<12} {:<40}",
            record.name, record.state, record.image
        );
    }

    println!("\n{} containers", records.len());
    for warning in &warnings {
        eprintln!("{} {}", "warning:".yellow(), warning);
    }

    Ok(())
}

async fn handle_diff(endpoint: Option<&str>, output: Option<PathBuf>) -> Result<()> {
    let guardian = build_guardian(endpoint)?;
    let output_dir = resolve_output_dir(output);

    let (changes, log, warnings) = guardian.preview_changes(&output_dir).await?;

    print!("{log}");
    if changes.is_empty() {
        println!("{}", "✓ configuration unchanged".green());
    }
    for warning in &warnings {
        eprintln!("{} {}", "warning:".yellow(), warning);
    }

    Ok(())
}

async fn handle_health(endpoint: Option<&str>) -> Result<()> {
    let guardian = build_guardian(endpoint)?;
    let output_dir = resolve_output_dir(None);

    let engine_check = guardian
        .engine()
        .ping()
        .await
        .map_err(|e| e.to_string());

    let output_check = (|| -> std::io::Result<()> {
        std::fs::create_dir_all(&output_dir)?;
        let file = output_dir.join(".health-check");
        std::fs::write(&file, b"")?;
        std::fs::remove_file(&file)
    })()
    .map_err(|e| format!("{}: {}", output_dir.display(), e));

    let template_dir = &guardian.settings().template_dir;
    let template_check = std::fs::read_dir(template_dir)
        .map(|_| ())
        .map_err(|e| format!("{}: {}", template_dir.display(), e));

    let checks = [
        ("Engine connection", engine_check),
        ("Output directory", output_check),
        ("Template cache", template_check),
    ];

    let mut all_passed = true;
    for (name, result) in &checks {
        match result {
            Ok(()) => println!("{} {}: OK", "✓".green(), name),
            Err(detail) => {
                println!("{} {}: FAILED", "✗".red(), name);
                println!("    {detail}");
                all_passed = false;
            }
        }
    }

    if all_passed {
        println!("\n{}", "All health checks passed".green());
        Ok(())
    } else {
        println!("\n{}", "One or more health checks failed".red());
        std::process::exit(1);
    }
}
