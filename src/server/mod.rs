/// HTTP dashboard module
/// Presentation wrapper over the pipeline: REST endpoints plus an embedded UI

#[cfg(feature = "server")]
pub mod routes;

#[cfg(feature = "server")]
pub mod handlers;

#[cfg(feature = "server")]
pub mod static_files;

#[cfg(feature = "server")]
pub use routes::create_router;

#[cfg(feature = "server")]
pub async fn run(
    host: String,
    port: u16,
    enable_cors: bool,
    guardian: std::sync::Arc<crate::core::Guardian>,
    output_dir: std::path::PathBuf,
) -> anyhow::Result<()> {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    let state = handlers::AppState {
        guardian,
        status: Arc::new(RwLock::new(handlers::BackupStatus::default())),
        output_dir,
    };

    let app = create_router(enable_cors, state);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("Config Guardian Dashboard");
    println!("   Web UI: http://{}", addr);
    println!("   API:    http://{}/api", addr);
    println!();
    println!("API Endpoints:");
    println!("   GET  /api/containers     - List inspected containers");
    println!("   GET  /api/system         - Host + version info");
    println!("   POST /api/backup/start   - Trigger a backup run (409 if busy)");
    println!("   GET  /api/backup/status  - Status of the current/last run");
    println!("   GET  /api/backups        - List bundle files");
    println!("   GET  /download/:filename - Download a bundle file");
    println!("   GET  /api/health         - Engine health check");
    println!();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
