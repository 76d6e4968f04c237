//! RelayDesk API server

use relaydesk_api::{config::StoreBackend, create_router, AppState, Config};
use relaydesk_shared::{create_pool, run_migrations, ChatStore, MemoryChatStore, PgChatStore};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config);

    tracing::info!(
        bind_address = %config.bind_address,
        agent_delivery = ?config.agent_delivery,
        "Starting RelayDesk API"
    );

    let store = connect_store(&config.store).await?;
    let bind_address = config.bind_address.clone();
    let app = create_router(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relaydesk_api=info,relaydesk_shared=info,tower_http=info"));

    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        relaydesk_api::config::LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        relaydesk_api::config::LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn connect_store(backend: &StoreBackend) -> anyhow::Result<Arc<dyn ChatStore>> {
    match backend {
        StoreBackend::Postgres {
            database_url,
            max_connections,
            run_migrations: migrate,
        } => {
            let pool = create_pool(database_url, *max_connections).await?;
            if *migrate {
                run_migrations(&pool).await?;
                tracing::info!("Database migrations applied");
            }
            Ok(Arc::new(PgChatStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory chat store; chats are lost on restart");
            Ok(Arc::new(MemoryChatStore::new()))
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received, draining connections");
}
