use std::net::SocketAddr;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use nl2sql_backend::api::routes;
use nl2sql_backend::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let ansi = match config.logging.style.as_str() {
        "always" => true,
        "never" => false,
        _ => std::io::IsTerminal::is_terminal(&std::io::stdout()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(ansi)
        .init();

    info!("Starting server on {}", config.server_address());
    info!("Default backend: {}", config.default_backend());
    if config.gateway.api_key.is_none() {
        info!("VANNA_API_KEY is not set; questions will fail at SQL generation");
    }

    let addr: SocketAddr = config.server_address().parse()?;
    let state = routes::build_state(config).map_err(|e| {
        error!("Failed to initialize inference gateway: {}", e);
        e
    })?;

    let app = routes::create_router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
