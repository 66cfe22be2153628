// Runtime configuration
// Read once at start-up from PAYMENTX_* environment variables and passed down explicitly.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::identity::IdentityHasher;

pub const DEFAULT_DATABASE: &str = "paymentx.db";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database: PathBuf,
    pub host: String,
    pub port: u16,
    /// Shared secret mixed into identity hashes; `None` keeps plain digests
    pub identity_salt: Option<String>,
    pub page_limit: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database: PathBuf::from(DEFAULT_DATABASE),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            identity_salt: None,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key → value source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = AppConfig::default();

        let port = match get("PAYMENTX_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("PAYMENTX_PORT must be a port number, got '{}'", raw))?,
            None => defaults.port,
        };

        let page_limit = match get("PAYMENTX_PAGE_LIMIT") {
            Some(raw) => raw.parse::<i64>().with_context(|| {
                format!("PAYMENTX_PAGE_LIMIT must be an integer, got '{}'", raw)
            })?,
            None => defaults.page_limit,
        };

        Ok(AppConfig {
            database: get("PAYMENTX_DATABASE")
                .map(PathBuf::from)
                .unwrap_or(defaults.database),
            host: get("PAYMENTX_HOST").unwrap_or(defaults.host),
            port,
            identity_salt: get("PAYMENTX_IDENTITY_SALT"),
            page_limit,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn identity_hasher(&self) -> IdentityHasher {
        match &self.identity_salt {
            Some(salt) => IdentityHasher::with_salt(salt.clone()),
            None => IdentityHasher::new(),
        }
    }
}
