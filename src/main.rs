//! Kometa wizard server

use kometa_wizard::{api, core, ServerExit};

use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration (handles CLI args, env vars, and config file)
    let config = match core::config::Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            // Print error to stderr since logging isn't initialized yet
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let _logger = match core::Logger::init(&config.logging) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return Err(e);
        }
    };

    info!("Starting Kometa wizard v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        profiles_dir = ?config.storage.profiles_dir,
        output_dir = ?config.storage.output_dir,
        kometa_command = %config.execution.kometa_command,
        "Server configuration"
    );

    loop {
        let server = api::ApiServer::new(config.clone()).await?;
        info!(
            url = %format!("http://{}:{}", config.server.host, config.server.port),
            "Server ready - starting to serve requests"
        );

        match server.serve().await? {
            ServerExit::Restart => info!("Restarting server"),
            ServerExit::Stop => break,
        }
    }

    Ok(())
}
