use std::process::ExitCode;

use duelrelay::{DuelRelayServer, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let mut builder = DuelRelayServer::builder()
        .bind(&config.bind)
        .broker_config(config.broker);
    if let Some(idle) = config.idle_timeout {
        builder = builder.idle_timeout(idle);
    }

    let server = match builder.build().await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, bind = %config.bind, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}
