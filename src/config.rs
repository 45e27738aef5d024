use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub bcrypt_cost: u32,
    pub session_ttl_hours: i64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let port = match lookup("APP_PORT") {
            Some(v) => v.parse::<u16>().with_context(|| format!("invalid APP_PORT: {v}"))?,
            None => 3000,
        };
        let bcrypt_cost = match lookup("BCRYPT_COST") {
            Some(v) => v
                .parse::<u32>()
                .with_context(|| format!("invalid BCRYPT_COST: {v}"))?,
            None => bcrypt::DEFAULT_COST,
        };
        if !(4..=31).contains(&bcrypt_cost) {
            bail!("BCRYPT_COST must be between 4 and 31, got {bcrypt_cost}");
        }
        let session_ttl_hours = match lookup("SESSION_TTL_HOURS") {
            Some(v) => v
                .parse::<i64>()
                .with_context(|| format!("invalid SESSION_TTL_HOURS: {v}"))?,
            None => crate::catalog::DEFAULT_SESSION_TTL_HOURS,
        };
        if session_ttl_hours <= 0 {
            bail!("SESSION_TTL_HOURS must be positive, got {session_ttl_hours}");
        }

        Ok(Self {
            database_path: PathBuf::from(
                lookup("DATABASE_PATH").unwrap_or_else(|| "videos.db".into()),
            ),
            host: lookup("APP_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            bcrypt_cost,
            session_ttl_hours,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
