use std::{env, net::SocketAddr};

use crate::error::AppError;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub secret_key: String,
    pub default_page_size: i64,
    pub max_page_size: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://trips.db".to_string());
        let listen_addr: SocketAddr = env::var("APP_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
            .parse()
            .map_err(|err| AppError::Config(format!("invalid APP_LISTEN_ADDR: {err}")))?;

        let secret_key =
            env::var("SECRET_KEY").unwrap_or_else(|_| "hard to guess string".to_string());

        let default_page_size = page_size_var("TRIPS_DEFAULT_PAGE_SIZE", DEFAULT_PAGE_SIZE)?;
        let max_page_size = page_size_var("TRIPS_MAX_PAGE_SIZE", MAX_PAGE_SIZE)?;

        Ok(Self {
            database_url,
            listen_addr,
            secret_key,
            default_page_size,
            max_page_size,
        })
    }
}

fn page_size_var(name: &str, default: i64) -> Result<i64, AppError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|size| *size >= 0)
            .ok_or_else(|| AppError::Config(format!("invalid {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}
