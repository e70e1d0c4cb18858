use env_logger::Builder;
use inventory_db::config::AppConfig;
use log::LevelFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: env={} server={}:{} store={:?}",
        config.env,
        config.server.host,
        config.server.port,
        config.store.backend
    );

    inventory_db::run_server(config).await
}
