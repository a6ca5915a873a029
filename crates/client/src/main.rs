//! Fuzzboard - headless dashboard for the fuzzing platform.
//!
//! Loads the task list over REST, follows live updates over WebSocket and logs
//! what changes until Ctrl+C.
//!
//! Usage: `fuzzboard [TASK_ID...]`

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fuzzboard_client::{listener, App, ClientConfig};
use fuzzboard_protocol::{events, TaskId};

/// Cancels `cancel_token` on Ctrl+C or SIGTERM.
fn setup_shutdown_signal(cancel_token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                    tracing::error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
            _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
        }

        cancel_token.cancel();
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fuzzboard_client=debug,fuzzboard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fuzzboard");

    let cancel_token = CancellationToken::new();
    setup_shutdown_signal(cancel_token.clone());

    let task_ids = std::env::args()
        .skip(1)
        .map(|arg| {
            arg.parse::<TaskId>()
                .with_context(|| format!("invalid task id `{arg}`"))
        })
        .collect::<Result<Vec<_>>>()?;

    let config = ClientConfig::from_env();
    tracing::info!("Configuration loaded");
    tracing::info!("  WebSocket: {}", config.ws_url);
    tracing::info!("  API: {}", config.api_url);

    let app = App::build(config);

    if let Err(e) = app.task_service.refresh().await {
        tracing::warn!("Continuing without an initial task list: {}", e);
    }
    if let Err(e) = app.task_service.refresh_dashboard().await {
        tracing::warn!("Continuing without initial dashboard stats: {}", e);
    }

    app.client.on(
        events::CONNECTION_EXHAUSTED,
        listener(|payload| tracing::error!("Cannot reach the server ({})", payload)),
    );
    app.client.on(
        events::ERROR,
        listener(|payload| {
            let message = payload
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            tracing::error!("Server: {}", message);
        }),
    );

    let handle = tokio::select! {
        _ = cancel_token.cancelled() => {
            app.shutdown();
            return Ok(());
        }
        connected = app.client.connect() => {
            connected.context("failed to connect to the real-time endpoint")?
        }
    };
    tracing::info!(epoch = handle.epoch(), "Live updates enabled");

    app.client.subscribe_dashboard();
    for task_id in &task_ids {
        app.client.subscribe_task(*task_id);
    }

    let mut tasks = app.tasks.watch();
    let mut dashboard = app.dashboard.watch();
    let mut connection = app.client.observer();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            changed = tasks.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = tasks.borrow_and_update().clone();
                for task in state.tasks.iter().filter(|t| {
                    t.id().is_some_and(|id| task_ids.is_empty() || task_ids.contains(&id))
                }) {
                    tracing::info!(
                        id = ?task.id(),
                        name = task.name().unwrap_or("-"),
                        status = task.status().map(|s| s.as_str()).unwrap_or("-"),
                        "Task"
                    );
                }
            }
            changed = dashboard.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(stats) = app.dashboard.stats() {
                    tracing::info!(
                        total = stats.total_tasks,
                        running = stats.running_tasks,
                        crashes = stats.total_crashes,
                        coverage = stats.avg_coverage,
                        "Dashboard"
                    );
                }
            }
            state = connection.changed() => {
                match state {
                    Some(state) => tracing::info!("Connection {}", state),
                    None => break,
                }
            }
        }
    }

    app.shutdown();
    Ok(())
}
