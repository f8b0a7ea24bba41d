//! tutorlab CLI and REST API entry point.
//!
//! Binary name: `tutorlab`
//!
//! Parses CLI arguments, initializes database and services, then dispatches
//! to the appropriate command handler or starts the REST API server.

mod cli;
mod http;
mod state;
mod token_store;

use clap::Parser;
use clap_complete::generate;
use tokio_util::sync::CancellationToken;

use tutorlab_infra::config::{load_app_config, load_app_config_from};
use tutorlab_infra::filesystem::resolve_data_dir;
use tutorlab_observe::tracing_setup::{
    TracingOptions, filter_for_verbosity, init_tracing, shutdown_tracing,
};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "tutorlab", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing(&TracingOptions {
        default_filter: filter_for_verbosity(cli.verbose, cli.quiet).to_string(),
        json: cli.log_json,
        otel: cli.otel,
    })
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = resolve_data_dir();
    let config = match &cli.config {
        Some(path) => load_app_config_from(path).await,
        None => load_app_config(&data_dir).await,
    };

    // Initialize application state (DB, services)
    let state = AppState::init(data_dir, config).await?;
    cli::users::seed_configured(&state).await?;

    match cli.command {
        Commands::Serve {
            port,
            host,
            no_scheduler,
        } => serve(state, host, port, no_scheduler).await?,

        Commands::Status => {
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Sweep => {
            cli::sweep::sweep(&state, cli.json).await?;
        }

        Commands::Reconcile { session_id } => {
            cli::sweep::reconcile(&state, session_id, cli.json).await?;
        }

        Commands::SeedUsers { students, group } => {
            cli::users::seed_users(&state, students, group, cli.json).await?;
        }

        Commands::SetQuota {
            student,
            max_turns,
            target_turns,
        } => {
            cli::users::set_quota(&state, &student, max_turns, target_turns, cli.json).await?;
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn serve(
    state: AppState,
    host: Option<String>,
    port: Option<u16>,
    no_scheduler: bool,
) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| state.config.server.host.clone());
    let port = port.unwrap_or(state.config.server.port);

    let shutdown = CancellationToken::new();
    let scheduler = if state.config.scheduler.enabled && !no_scheduler {
        Some(
            state
                .scheduler
                .clone()
                .spawn(shutdown.clone(), state.config.scheduler.catch_up_on_start),
        )
    } else {
        tracing::info!("reset scheduler disabled for this process");
        None
    };

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    println!(
        "  {} tutorlab API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let tokens = state.tokens.clone();
    let router = http::router::build_router(state);

    let signal = shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(handle) = scheduler {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "scheduler task ended abnormally");
        }
    }
    if !tokens.is_empty() {
        let revoked = tokens.clear();
        tracing::info!(revoked, "sessions dropped");
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
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
    tracing::info!("shutdown signal received");
}
