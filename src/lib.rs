pub mod api;
pub mod clients;
pub mod config;
pub mod context;
pub mod error;
pub mod logic;
pub mod model;
pub mod services;
pub mod store;

use std::sync::Arc;

use tokio::net::TcpListener;

pub use api::routes::create_router;
pub use config::{AppConfig, StoreBackend};
pub use context::{AppContext, AppState};
pub use error::ApiError;
pub use model::*;
pub use store::{MemoryStore, PostgresStore, Store};

/// Build the configured store, then serve the API until the listener closes
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let app = match config.store.backend {
        StoreBackend::Postgres => {
            let database_url = config.database_url()?;
            let store = PostgresStore::new(
                &database_url,
                config.database.max_connections.unwrap_or(20),
                config.change_log_cap_bytes(),
            )
            .await?;

            log::info!("Running database migrations...");
            store.migrate().await?;

            create_router(Arc::new(AppContext::from_config(
                Arc::new(store),
                config.clone(),
            )))
        }
        StoreBackend::Memory => {
            log::warn!("Using the in-memory store; data is lost on shutdown");
            let cap = usize::try_from(config.change_log_cap_bytes()).unwrap_or(usize::MAX);
            create_router(Arc::new(AppContext::from_config(
                Arc::new(MemoryStore::new(cap)),
                config.clone(),
            )))
        }
    };

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("Inventory server running on http://{}", bind_address);
    if config.is_development() {
        log::info!(
            "API documentation available at http://{}/v2/inventory/docs",
            bind_address
        );
    }

    axum::serve(listener, app).await?;

    Ok(())
}
