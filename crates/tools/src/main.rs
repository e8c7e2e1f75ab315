use std::path::PathBuf;
use std::sync::Arc;

use browser::{Session, SessionConfig};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Browser automation tools over MCP stdio.
#[derive(Debug, Parser)]
#[command(name = "agent-browse", version)]
struct Args {
    /// Chrome executable to launch instead of the platform default.
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// DevTools debugging port.
    #[arg(long, default_value_t = 9222)]
    debug_port: u16,

    /// Browser profile directory.
    #[arg(long)]
    profile_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), tools::server::ServerError> {
    // stdout carries the protocol; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let session = Arc::new(Session::new(SessionConfig {
        chrome_path: args.chrome_path,
        debug_port: args.debug_port,
        profile_dir: args.profile_dir,
    }));

    tools::server::run(session).await
}
