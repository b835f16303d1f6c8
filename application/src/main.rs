use application::Application;
use shared::config::Config;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Reset the store to its baseline and warm the cache node from it.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match dotenvy::dotenv() {
        Ok(_) => info!("Loaded environment variables from .env file"),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    let config = Config::from_env();
    let app = Application::open(&config).await?;
    app.initialize().await?;

    let front_page = app.feed.index("").await?;
    info!("Front page holds {} post(s)", front_page.len());

    Ok(())
}
