use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 1111;
pub const DEFAULT_DB_PATH: &str = "duet.db";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
}

impl ServerConfig {
    /// Read `DUET_HOST`, `DUET_PORT` and `DUET_DB_PATH` from the environment.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let host = lookup("DUET_HOST").unwrap_or_else(|| DEFAULT_HOST.into());
        let port = match lookup("DUET_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DUET_PORT is not a port number: {raw:?}"))?,
            None => DEFAULT_PORT,
        };
        let db_path = lookup("DUET_DB_PATH")
            .unwrap_or_else(|| DEFAULT_DB_PATH.into())
            .into();

        Ok(Self { host, port, db_path })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}
