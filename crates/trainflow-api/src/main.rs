//! trainflow CLI and webhook server entry point.
//!
//! Binary name: `tflow`
//!
//! Parses CLI arguments, sets up tracing, then either handles a
//! file-only command (validate, plan, completions) directly or wires the
//! engine (`AppState`) and dispatches.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use trainflow_observe::tracing_setup::{
    LogFormat, TracingOptions, filter_for_verbosity, init_tracing, otel_requested, shutdown_tracing,
};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "tflow", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        default_filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        format: if cli.json { LogFormat::Json } else { LogFormat::Text },
        otel: otel_requested(),
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate { file } => cli::workflow::validate(&file, cli.json),

        Commands::Plan { file } => cli::workflow::plan(&file, cli.json),

        Commands::Run { file, runner } => {
            let state = AppState::init(runner).await?;
            cli::workflow::run(&file, &state, cli.json, cli.quiet).await
        }

        Commands::Runs { command } => {
            let state = AppState::init(None).await?;
            cli::runs::handle_runs_command(command, &state, cli.json).await
        }

        Commands::Datasets { command } => {
            let state = AppState::init(None).await?;
            cli::datasets::handle_datasets_command(command, &state, cli.json).await
        }

        Commands::Serve { port, host, runner } => {
            let state = AppState::init(runner).await?;
            serve(state, host, port).await
        }

        Commands::Completions { .. } => Ok(()),
    }
}

async fn serve(state: AppState, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let workflows_dir = state.workflows_dir();
    let registered = state.load_triggers(&workflows_dir)?;
    if state.webhook_secret.is_none() {
        tracing::warn!(
            env = state.config.webhook_secret_env.as_str(),
            "no webhook secret set; push webhooks are accepted unsigned"
        );
    }

    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} trainflow listening on {}",
        console::style("▶").cyan().bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!(
        "  {} workflows from {}",
        registered,
        workflows_dir.display()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let executor = std::sync::Arc::clone(&state.executor);
    let router = http::router::build_router(state);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Runs started by webhooks stop with the server.
    executor.cancel_all();
    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {e}");
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
                tracing::error!("failed to install SIGTERM handler: {e}");
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
}
