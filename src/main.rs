use std::time::Duration;

use dotenvy::dotenv;
use ladybug_hosting::{config::Config, db, routes, AppState, ExpiredDeletion, SeaOrmStore};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ladybug_hosting=info,tower_http=info")))
        .init();

    let config = Config::from_env()?;
    info!(
        addr = %config.bind_addr,
        production = config.production,
        "starting ladybug-hosting"
    );

    let conn = db::connect(&config.database).await?;

    let cleanup_every = Duration::from_secs(config.session_cleanup_secs.max(1));
    tokio::spawn(delete_expired_sessions(SeaOrmStore::new(conn.clone()), cleanup_every));

    let bind_addr = config.bind_addr;
    let app = routes::app(AppState::new(conn, config));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("listening on http://{bind_addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn delete_expired_sessions(store: SeaOrmStore, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if let Err(e) = store.delete_expired().await {
            error!(error = %e, "failed to delete expired sessions");
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
