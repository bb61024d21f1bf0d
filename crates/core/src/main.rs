use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use chainreview_wire::transport::{read_requests, ChainReviewTransport};

mod agents;
mod cancel;
mod context;
mod findings;
mod orchestrator;
mod router;
mod run_store;
mod turn;

use context::{Context, DynWrite, Transport};

/// A ChainReview process reviews exactly one repository, read over stdin as
/// newline-delimited JSON-RPC-like requests and answered over stdout plus a
/// side event stream. There is no server to bind and no other surface: the
/// host process owns the lifecycle.
#[derive(Parser, Debug)]
#[command(name = "chainreview", version)]
struct Cli {
    /// Repository root this process reviews. Defaults to the current
    /// working directory.
    #[arg(long, default_value = ".")]
    repo_root: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let repo_root = match cli.repo_root.canonicalize() {
        Ok(p) if p.is_dir() => p,
        _ => {
            tracing::error!(path = %cli.repo_root.display(), "repo_root does not exist or is not a directory");
            std::process::exit(2);
        }
    };

    let transport = Arc::new(build_transport(&repo_root));

    let ctx = match Context::bootstrap(repo_root, transport).await {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            tracing::error!(error = %e, "failed to start up");
            std::process::exit(2);
        }
    };

    tracing::info!("chainreview ready, reading requests from stdin");

    let reader_ctx = ctx.clone();
    let read_result = read_requests(tokio::io::stdin(), move |parsed| match parsed {
        Ok(request) => {
            let ctx = reader_ctx.clone();
            tokio::spawn(async move { router::dispatch(ctx, request).await });
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed request line");
        }
    })
    .await;

    ctx.mcp.shutdown().await;

    match read_result {
        Ok(()) => {
            tracing::info!("stdin closed, shutting down");
            std::process::exit(0);
        }
        Err(e) => {
            tracing::error!(error = %e, "primary stream read error");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .json()
        .init();
}

/// Primary stream is stdout; the side event stream is file descriptor 3
/// when the host opened one for us, falling back to a tagged single stream
/// on stdout otherwise (see DESIGN.md's wire stream layout decision — there
/// is no teacher analog for two independent outbound sinks).
fn build_transport(repo_root: &std::path::Path) -> Transport {
    let limits = chainreview_domain::config::Config::load(repo_root).limits;
    let primary_out: DynWrite = Box::new(tokio::io::stdout());
    let side_out: DynWrite = open_side_sink();
    ChainReviewTransport::new(primary_out, side_out, limits)
}

#[cfg(unix)]
fn open_side_sink() -> DynWrite {
    use std::os::unix::io::FromRawFd;

    let file = unsafe { std::fs::File::from_raw_fd(3) };
    if file.metadata().is_ok() {
        tracing::info!("side event stream opened on fd 3");
        Box::new(tokio::io::BufWriter::new(tokio::fs::File::from_std(file)))
    } else {
        std::mem::forget(file); // not our fd; don't close it on drop
        tracing::warn!("fd 3 not available, falling back to tagged single-stream mode on stdout");
        Box::new(tokio::io::stdout())
    }
}

#[cfg(not(unix))]
fn open_side_sink() -> DynWrite {
    tracing::warn!("non-unix platform, falling back to tagged single-stream mode on stdout");
    Box::new(tokio::io::stdout())
}
