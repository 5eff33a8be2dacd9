//! MultiBet Ledger Server
//!
//! Runs the betting ledger behind a WebSocket API until Ctrl-C.

use std::sync::Arc;
use anyhow::Context;
use tracing::{info, error};
use tracing_subscriber::EnvFilter;

use multibet::{
    VERSION,
    config::LedgerConfig,
    network::{AuthConfig, Authenticator, LedgerServer, LedgerService, ServerConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("MultiBet Ledger v{}", VERSION);

    let ledger_config = LedgerConfig::from_env().context("loading ledger configuration")?;
    let server_config = ServerConfig::from_env().context("loading server configuration")?;
    let auth_config = AuthConfig::from_env().context("loading auth configuration")?;
    let authenticator = Authenticator::new(&auth_config, ledger_config.authority)
        .context("loading token verification key")?;

    info!("Authority: {}", ledger_config.authority);
    info!("Bind address: {}", server_config.bind_addr);

    let service = LedgerService::new(&ledger_config);
    let server = Arc::new(LedgerServer::new(server_config, authenticator, service));

    let runner = server.clone();
    let mut server_task = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = &mut server_task => {
            result.context("server task panicked")??;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Shutting down");
            server.shutdown();
        }
    }

    server_task.await.context("server task panicked")??;

    let (hash, bets) = server.service().state_hash().await;
    info!("Final state hash over {} bets: {}", bets, hex::encode(hash));

    Ok(())
}
