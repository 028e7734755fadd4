//! Configuration management for coinledger

use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

pub fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    let config_str = fs::read_to_string("config.toml").unwrap_or_default();
    let config: Config = if config_str.is_empty() {
        // Provide sane defaults when config.toml is absent
        Config {
            server: ServerConfig {
                port: default_port(),
                jwt_secret: default_jwt_secret(),
                token_ttl_secs: default_token_ttl(),
            },
            database: DatabaseConfig {
                path: default_db_path(),
            },
        }
    } else {
        toml::from_str(&config_str)?
    };

    // Validate critical values
    if config.database.path.is_empty() {
        return Err("database.path must be set in config.toml".into());
    }

    if config.server.jwt_secret.is_empty() {
        return Err("server.jwt_secret must be set in config.toml".into());
    }

    Ok(config)
}

fn default_port() -> u16 {
    8080
}

fn default_jwt_secret() -> String {
    // Development fallback; deployments set their own in config.toml
    "devnet-secret".to_string()
}

fn default_token_ttl() -> u64 {
    3600
}

fn default_db_path() -> String {
    "./coinledger.db".to_string()
}
