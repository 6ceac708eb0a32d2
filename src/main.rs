use std::net::SocketAddr;

use axum::ServiceExt;
use axum::extract::Request;
use tokio::signal;

use cookbook::app::{AppState, build_app};
use cookbook::core::auth::service::SESSION_SWEEP_INTERVAL;
use cookbook::core::config::Config;
use cookbook::core::db::{create_pool, create_pool_with_migrations};
use cookbook::core::logging::init_tracing;
use cookbook::core::response::init_timezone;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = Config::from_env()?;
    init_timezone(config.tz);

    tracing::info!(
        "Config loaded: env={:?}, prefix={}, github={}, google={}, admin={}",
        config.env,
        config.prefix,
        config.has_github(),
        config.has_google(),
        config.has_admin()
    );

    let pool = if config.db_table_create {
        create_pool_with_migrations(&config.database).await?
    } else {
        create_pool(&config.database).await?
    };

    let addr = config.addr;
    let admin = config.admin.clone();
    let state = AppState::new(config, pool)?;

    match admin {
        Some(admin) => {
            let user = state.auth.ensure_admin(&admin).await?;
            tracing::info!(user_id = user.id, "Admin account ready");
        }
        None => tracing::warn!("ADMIN_* variables not set, skipping admin bootstrap"),
    }

    let sweeper = state.auth.spawn_session_sweeper(SESSION_SWEEP_INTERVAL);

    let app = build_app(state);

    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to install signal handler: {}", err);
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
}
