/// CLI argument parsing and command handling

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build timestamp injected at compile time
pub const BUILD_TIMESTAMP: &str = env!("BUILD_TIMESTAMP");
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

// Get version with timestamp
pub fn get_version() -> &'static str {
    VERSION_WITH_BUILD
}

#[derive(Parser)]
#[command(name = "guardian-cli")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// Engine endpoint (socket path or http/tcp URL). Defaults to the
    /// platform Docker socket.
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate the backup bundle (default when no command is given)
    Backup {
        /// Output directory for the bundle
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write secret env values in clear text instead of masking them
        #[arg(long)]
        no_mask_secrets: bool,
    },

    /// Show container status
    Status,

    /// Compare live state against the last persisted snapshot
    Diff {
        /// Directory holding the previous bundle
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run deployment health checks
    Health,

    /// Run the web dashboard
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "7842")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,
    },
}
