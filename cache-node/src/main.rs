use cache_node::serve;
use shared::config::Config;
use std::sync::Arc;
use storage_engine::MokaBackend;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load environment variables from .env file (if exists)
    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    let addr = config.node_bind_addr();

    let backend = Arc::new(MokaBackend::new("cache-node", None));
    let listener = TcpListener::bind(&addr).await?;

    info!("Cache node listening on tcp://{}", addr);

    tokio::select! {
        result = serve(listener, backend) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down cache node"),
    }

    Ok(())
}
