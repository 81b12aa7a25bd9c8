use anyhow::Context;
use axum::extract::Request;
use axum::ServiceExt;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use contact_book::config::Config;
use contact_book::router::build_app;
use contact_book::schema::{establish_connection_pool, run_migrations};
use contact_book::AppState;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("contact_book=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env().context("invalid configuration")?;
    let pool = establish_connection_pool(&config)
        .await
        .context("failed to create database pool")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    let addr = config.bind_addr;
    let app = build_app(AppState::new(pool, config));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "server running");

    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
