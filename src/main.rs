mod calc;
mod config;
mod db;
mod error;
mod history;
mod ipc;
mod logging;
mod model;
mod record;
mod store;
mod summary;
mod sync;
mod transmute;

use anyhow::Context;
use clap::Parser;
use config::EngineConfig;
use serde_json::json;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

/// Class record grade engine sidecar: JSON requests on stdin, one JSON
/// response per line on stdout.
#[derive(Parser, Debug)]
#[command(name = "classrecordd", version, about)]
struct Args {
    /// TOML engine configuration
    #[arg(long, env = "CLASSRECORDD_CONFIG")]
    config: Option<PathBuf>,

    /// Autosave quiescence window, overrides the config file
    #[arg(long, env = "CLASSRECORDD_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", env = "CLASSRECORDD_LOG_LEVEL")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init(&args.log_level);

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(ms) = args.debounce_ms {
        config.sync.debounce_ms = ms;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building runtime")?;
    runtime.block_on(serve(config))
}

async fn serve(config: EngineConfig) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "classrecordd starting");
    let mut state = ipc::AppState::new(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<ipc::Request>(&line) {
            Ok(req) => ipc::handle_request(&mut state, req).await,
            Err(e) => {
                // No id to answer to.
                warn!(error = %e, "unparseable request");
                json!({ "ok": false, "error": { "code": "bad_json", "message": e.to_string() } })
            }
        };
        let mut out =
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string());
        out.push('\n');
        stdout.write_all(out.as_bytes()).await.context("writing stdout")?;
        stdout.flush().await.context("flushing stdout")?;
    }

    ipc::shutdown(&mut state).await;
    info!("stdin closed, exiting");
    Ok(())
}
