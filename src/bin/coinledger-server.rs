#![forbid(unsafe_code)]
//! coinledger API server entry point

use coinledger::api::{run_api_server, ApiConfig, AppState};
use coinledger::config::load_config;
use coinledger::faucet::Faucet;
use coinledger::persistence::Database;
use coinledger::user::DnsResolver;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;

    let db = Arc::new(Database::open(&config.database.path)?);
    let faucet = Arc::new(Faucet::new()?);

    let state = AppState::new(
        db,
        faucet,
        Arc::new(DnsResolver),
        ApiConfig {
            port: config.server.port,
            jwt_secret: config.server.jwt_secret,
            token_ttl_secs: config.server.token_ttl_secs,
        },
    );

    run_api_server(state).await
}
