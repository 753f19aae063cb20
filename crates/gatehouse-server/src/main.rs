//! Gatehouse server binary.
//!
//! Loads configuration, restores the engine from its database (running
//! genesis on first start) and serves the HTTP API with graceful shutdown
//! on SIGTERM/SIGINT.

use gatehouse_db::{
    create_pool, restore_or_bootstrap, run_migrations, DbError, DbRuntimeSettings,
    MigrationError, PoolError, SqliteJournal,
};
use gatehouse_engine::Engine;
use gatehouse_server::{app, config, AppState};
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Reasons the server can fail to start or stop cleanly.
#[derive(Debug, Error)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error("engine.root must be set to a non-zero address")]
    MissingRoot,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error("failed to restore engine state: {0}")]
    Restore(#[from] DbError),
    #[error("server io error: {0}")]
    Io(#[from] std::io::Error),
}

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("GATEHOUSE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)?;

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    let engine_config = config.engine;
    if engine_config.root.is_zero() {
        return Err(StartupError::MissingRoot);
    }

    let pool = create_pool(
        &config.database.path,
        DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )?;

    let state = {
        let mut conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        if applied > 0 {
            tracing::info!(count = applied, "applied database migrations");
        }
        restore_or_bootstrap(
            &mut conn,
            engine_config.root,
            engine_config.policy.bootstrap_all_roles,
        )?
    };

    let engine = Engine::from_state(
        state,
        engine_config.ledger_caller,
        engine_config.policy,
        Box::new(SqliteJournal::new(pool.clone())),
    );
    tracing::info!(ledger_caller = %engine.ledger_caller(), "engine ready");

    let app = app(AppState::new(pool, engine));
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, "starting gatehouse server");

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gatehouse server shut down");
    Ok(())
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
