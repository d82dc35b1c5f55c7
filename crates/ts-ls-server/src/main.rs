//! `ts-ls-server` - Language Server Protocol entry point wiring the
//! workspace orchestration core to a TypeScript analysis host.

mod handlers;
mod workspace;

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use ts_ls_core::config::ServerConfig;
use ts_ls_core::dispatcher::Dispatcher;
use ts_ls_core::uri::path_to_uri;

use crate::workspace::Workspace;

/// Command-line flags, falling back to the matching environment variables
/// (`TS_LS_STRICT`, `RUST_LOG`) when unset, per the `strict` flag's
/// CLI-plus-env-fallback convention (§6).
#[derive(Debug, Parser)]
#[command(name = "ts-ls-server", version)]
struct Cli {
    /// Workspace root directory. Defaults to the current directory.
    #[arg(long)]
    root: Option<std::path::PathBuf>,

    /// Never read the local filesystem directly; all content must come
    /// through editor RPCs (`workspace/xfiles`, `textDocument/xcontent`).
    #[arg(long)]
    strict: bool,

    /// `tracing-subscriber` `EnvFilter` directive, e.g. `info` or `debug`.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let mut config = ServerConfig::default().with_env_overrides();
    if cli.strict {
        config.strict = true;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_level.clone()))
        .with_writer(std::io::stderr)
        .init();

    let root_path = cli.root.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));
    let root = match path_to_uri(&root_path) {
        Ok(uri) => uri,
        Err(err) => {
            tracing::error!(error = %err, "invalid workspace root");
            std::process::exit(1);
        }
    };

    info!(%root, strict = config.strict, "starting ts-ls-server");

    let workspace = Workspace::new(config, root, None);

    let mut dispatcher = Dispatcher::new();
    handlers::register_all(&mut dispatcher, workspace);
    let dispatcher = Arc::new(dispatcher);

    let mut transport = ts_ls_core::transport::stdio();
    match dispatcher.run(&mut transport).await {
        Ok(()) => std::process::exit(0),
        Err(err) => {
            tracing::error!(error = %err, "server loop exited with an error");
            std::process::exit(1);
        }
    }
}
