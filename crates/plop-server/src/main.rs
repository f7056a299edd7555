mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use plop_api::session::SessionManager;
use plop_api::{AppStateInner, router};
use plop_crypto::PasswordHasher;
use plop_db::Database;
use plop_storage::UploadResolver;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plop_server=debug,plop_api=debug,plop_db=info,plop_storage=info,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    let db = Database::open(&config.db_path, PasswordHasher::new(config.hash))?;
    let uploads = UploadResolver::new(config.upload_dir.clone(), config.upload_extensions.clone()).await?;
    info!(
        "Password hashing: pbkdf2-sha256, {} rounds, {}-byte salt",
        config.hash.iterations(),
        config.hash.salt_len()
    );
    if !config.registration {
        info!("Registration is closed");
    }

    let state = Arc::new(AppStateInner {
        db,
        sessions: SessionManager::new(config.registration),
        uploads,
    });

    let app = router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Plop listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
