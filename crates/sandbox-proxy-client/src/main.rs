//! Proxy Client
//!
//! The in-container side of the sandbox proxies. `proxy-client gh <args>`
//! forwards its arguments to the gh proxy untouched; `proxy-client
//! read-image` asks the clipboard proxy for the latest screenshot. Output and
//! exit code mirror the response exactly.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use sandbox_proxy::{ClipboardCommand, ClipboardRequest, GhRequest, ProxyClient, Response};

/// Proxy Client - forward a request to a sandbox proxy
#[derive(Parser, Debug)]
#[command(name = "proxy-client")]
#[command(about = "Forward a command to a host-side sandbox proxy")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a gh command through the gh proxy
    #[command(disable_help_flag = true)]
    Gh {
        /// gh proxy socket
        #[arg(long, env = "GH_PROXY_SOCKET", default_value = "/run/sandbox/gh-proxy.sock")]
        socket: PathBuf,

        /// Arguments for gh, passed through verbatim
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Print the latest screenshot to stdout
    ReadImage {
        /// Clipboard proxy socket
        #[arg(
            long,
            env = "CLIPBOARD_PROXY_SOCKET",
            default_value = "/run/sandbox/clipboard-proxy.sock"
        )]
        socket: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("proxy-client: failed to start runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let (name, result) = runtime.block_on(async {
        match cli.command {
            Command::Gh { socket, args } => (
                "gh",
                ProxyClient::new(socket).call(&GhRequest { args }).await,
            ),
            Command::ReadImage { socket } => (
                "read-image",
                ProxyClient::new(socket)
                    .call(&ClipboardRequest::new(ClipboardCommand::ReadImage))
                    .await,
            ),
        }
    });

    match result {
        Ok(response) => emit(name, &response),
        Err(e) => {
            eprintln!("{name}: proxy error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Write the response's output and turn its exit code into ours.
fn emit(name: &str, response: &Response) -> ExitCode {
    let stdout = match response.stdout_bytes() {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{name}: proxy error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut out = std::io::stdout().lock();
    if out.write_all(&stdout).and_then(|()| out.flush()).is_err() {
        return ExitCode::FAILURE;
    }
    let mut err = std::io::stderr().lock();
    let _ = err.write_all(response.stderr.as_bytes());

    ExitCode::from(u8::try_from(response.exit_code).unwrap_or(1))
}
