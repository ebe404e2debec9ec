//! TRC server binary.

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use trc_core::{Config, ConfigError};
use trc_server::bootstrap::{load_config, resolve_config_input};
use trc_server::logging::init_tracing;
use trc_server::{AppState, create_router};

/// TRC - a remote build cache server
#[derive(Parser, Debug)]
#[command(name = "trc")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the resolved configuration (secrets redacted) and exit
    #[arg(long, conflicts_with = "check_config")]
    print_config: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    // Non-UTF-8 variables cannot hold config values; skip them.
    let env: HashMap<String, String> = std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect();

    match run(args, env) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(config_err) = err.downcast_ref::<ConfigError>() {
                print_config_issues(config_err);
                ExitCode::from(1)
            } else {
                eprintln!("Error: {err:#}");
                ExitCode::from(2)
            }
        }
    }
}

fn print_config_issues(err: &ConfigError) {
    eprintln!("{}", err.message);
    for issue in &err.issues {
        eprintln!("- {}: {}", issue.path, issue.message);
    }
}

fn run(args: Args, env: HashMap<String, String>) -> Result<()> {
    let resolved = resolve_config_input(args.config.as_deref(), &env);
    for warning in &resolved.warnings {
        eprintln!("{warning}");
    }

    let config = load_config(&resolved.input, &env)?;

    if args.print_config {
        let yaml = serde_yaml::to_string(&config.to_document(true))
            .context("failed to render configuration")?;
        print!("{yaml}");
        if !yaml.ends_with('\n') {
            println!();
        }
        return Ok(());
    }

    if args.check_config {
        println!("Config OK");
        return Ok(());
    }

    init_tracing(&config.logging, &env)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?
        .block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    tracing::info!("TRC v{}", env!("CARGO_PKG_VERSION"));

    let storage = trc_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage")?;
    tracing::info!(backend = storage.backend_name(), "Storage backend initialized");

    // Fail fast when storage is unreachable instead of serving errors.
    storage
        .health_check()
        .await
        .context("storage health check failed")?;
    tracing::info!("Storage backend connectivity verified");

    let addr = config.server.bind_address();
    let state = AppState::new(config, storage);
    tracing::info!(auth = state.auth.kind(), "Auth gate configured");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    let local_addr = listener.local_addr().context("failed to read bound address")?;
    tracing::info!("Listening on http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
