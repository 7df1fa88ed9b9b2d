//! Sandbox Proxy Server
//!
//! Runs one of the host-side proxies a sandboxed container talks to over a
//! Unix socket: `gh-proxy` for an allowlisted subset of the GitHub CLI, or
//! `clipboard-proxy` for the most recent screenshot.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sandbox_proxy::shutdown::shutdown_trigger;
use sandbox_proxy::{
    ClipboardProxyConfig, ExecLimits, GhProxyConfig, ProxyServer, ProxyService, RepoSlug,
    default_screenshots_dir,
};

/// Sandbox Proxy - host-side gatekeepers for a sandboxed container
#[derive(Parser, Debug)]
#[command(name = "sandbox-proxy")]
#[command(about = "Host-side gh and clipboard proxies for a sandboxed container")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve allowlisted gh commands
    GhProxy(GhArgs),
    /// Serve the most recent screenshot
    ClipboardProxy(ClipboardArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Unix socket to listen on (absolute path)
    #[arg(long)]
    socket: PathBuf,

    /// Audit log file [default: next to the socket]
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Keep running after the parent process exits
    #[arg(long)]
    no_parent_watch: bool,
}

#[derive(Args, Debug)]
struct GhArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Workspace checkout; gh runs here
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// gh executable
    #[arg(long, default_value = "gh")]
    gh_binary: PathBuf,

    /// Kill gh after this many seconds
    #[arg(long, default_value_t = 120)]
    timeout_secs: u64,

    /// Maximum bytes captured per output stream
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    max_output_bytes: usize,

    /// Workspace repository (owner/name) [default: from the git remote]
    #[arg(long)]
    repo: Option<RepoSlug>,
}

#[derive(Args, Debug)]
struct ClipboardArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Directory to take screenshots from [default: ~/Pictures/Screenshots]
    #[arg(long, env = "CLIPBOARD_SCREENSHOTS_DIR")]
    screenshots_dir: Option<PathBuf>,

    /// Ignore screenshots older than this many seconds
    #[arg(long, default_value_t = 120)]
    max_age_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::GhProxy(args) => {
            check_socket_path(&args.common.socket)?;
            let workspace = std::fs::canonicalize(&args.workspace)
                .with_context(|| format!("workspace {} not found", args.workspace.display()))?;
            let config = GhProxyConfig {
                socket: args.common.socket,
                audit_log: args.common.audit_log,
                workspace,
                gh_binary: args.gh_binary,
                limits: ExecLimits {
                    timeout: Duration::from_secs(args.timeout_secs),
                    max_output_bytes: args.max_output_bytes,
                },
                repo: args.repo,
                watch_parent: !args.common.no_parent_watch,
            };
            let service = config.build_service().await;
            serve(&config.socket, service, config.watch_parent).await
        }
        Command::ClipboardProxy(args) => {
            check_socket_path(&args.common.socket)?;
            let config = ClipboardProxyConfig {
                socket: args.common.socket,
                audit_log: args.common.audit_log,
                screenshots_dir: args.screenshots_dir.unwrap_or_else(default_screenshots_dir),
                max_age: Duration::from_secs(args.max_age_secs),
                watch_parent: !args.common.no_parent_watch,
            };
            tracing::info!(
                "Serving screenshots from {}",
                config.screenshots_dir.display()
            );
            let service = config.build_service();
            serve(&config.socket, service, config.watch_parent).await
        }
    }
}

fn check_socket_path(socket: &std::path::Path) -> anyhow::Result<()> {
    if !socket.is_absolute() {
        bail!("--socket must be an absolute path, got {}", socket.display());
    }
    Ok(())
}

async fn serve<S>(socket: &std::path::Path, service: S, watch_parent: bool) -> anyhow::Result<()>
where
    S: ProxyService + 'static,
{
    let server = ProxyServer::bind(socket, Arc::new(service))
        .with_context(|| format!("failed to start server on {}", socket.display()))?;
    server.serve_with_shutdown(shutdown_trigger(watch_parent)).await;
    Ok(())
}
