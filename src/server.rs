use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use crate::access::TaskService;
use crate::api::{router, AppState};
use crate::auth::{Authenticator, TokenSigner, UserDirectory};
use crate::config::ServerConfig;
use crate::store::{InMemoryTaskStore, JsonFile, JsonFileTaskStore, TaskStore};

/// Wires the stores and the auth gate according to `config`.
pub async fn build_state(config: &ServerConfig) -> anyhow::Result<AppState> {
    let (store, users): (Arc<dyn TaskStore>, UserDirectory) = match &config.data_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "using JSON file storage");
            let store: Arc<dyn TaskStore> =
                Arc::new(JsonFileTaskStore::open(dir.join("tasks.json")).await?);
            let users = UserDirectory::open(JsonFile::new(dir.join("users.json"))).await?;
            (store, users)
        }
        None => {
            tracing::info!("using in-memory storage; data is lost on exit");
            let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
            (store, UserDirectory::in_memory())
        }
    };

    let signer = match &config.token_secret {
        Some(secret) => TokenSigner::new(secret.as_bytes(), config.token_ttl),
        None => {
            tracing::warn!("TASKMATE_TOKEN_SECRET not set; tokens will not survive a restart");
            TokenSigner::ephemeral(config.token_ttl)
        }
    };

    Ok(AppState::new(
        TaskService::new(store),
        Authenticator::new(users, signer),
    ))
}

pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let state = build_state(&config).await?;
    let listener = TcpListener::bind(config.address()).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
