use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Runtime settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    /// Pre-computed hash for the seeded `admin` account. No admin is seeded without it.
    pub admin_password_hash: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| Error::Config("DATABASE_URL must be set in .env".to_string()))?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let admin_password_hash = env::var("ADMIN_PASSWORD_HASH")
            .ok()
            .filter(|hash| !hash.trim().is_empty());

        Ok(Config {
            database_url,
            bind_addr,
            admin_password_hash,
        })
    }
}
