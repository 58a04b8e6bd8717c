//! Server configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `DATABASE_URL` | `postgres://localhost/arbor` |
//! | `HOST` | `0.0.0.0` |
//! | `PORT` | `3000` |
//! | `FILE_STORAGE_PATH` | `/var/lib/arbor/files` |
//! | `MAX_UPLOAD_BYTES` | 50 MiB |
//! | `DB_MAX_CONNECTIONS` | 10 |
//! | `DB_CONNECT_TIMEOUT_SECS` | 30 |
//! | `ALLOWED_ORIGINS` | `http://localhost:5173,http://localhost:3000` |
//! | `SEED_DEMO_DATA` | `false` |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use arbor_core::{Error, Result};
use arbor_db::{PoolConfig, DEFAULT_MAX_UPLOAD_BYTES};

pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost/arbor";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_FILE_STORAGE_PATH: &str = "/var/lib/arbor/files";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:5173,http://localhost:3000";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub file_storage_path: PathBuf,
    pub max_upload_bytes: u64,
    pub pool: PoolConfig,
    pub allowed_origins: Vec<String>,
    pub seed_demo_data: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            file_storage_path: PathBuf::from(DEFAULT_FILE_STORAGE_PATH),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            pool: PoolConfig::default(),
            allowed_origins: split_origins(DEFAULT_ALLOWED_ORIGINS),
            seed_demo_data: false,
        }
    }
}

impl ServerConfig {
    /// Read the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Unset and blank values take the
    /// default; malformed numbers fail with `Error::Config`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let mut pool = defaults.pool.clone();
        if let Some(n) = parse_var::<u32>(&get, "DB_MAX_CONNECTIONS")? {
            if n == 0 {
                return Err(Error::Config(
                    "DB_MAX_CONNECTIONS must be at least 1".to_string(),
                ));
            }
            pool = pool.max_connections(n);
        }
        if let Some(secs) = parse_var::<u64>(&get, "DB_CONNECT_TIMEOUT_SECS")? {
            pool = pool.connect_timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_var(&get, "PORT")?.unwrap_or(defaults.port),
            file_storage_path: get("FILE_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_storage_path),
            max_upload_bytes: parse_var(&get, "MAX_UPLOAD_BYTES")?
                .unwrap_or(defaults.max_upload_bytes),
            pool,
            allowed_origins: get("ALLOWED_ORIGINS")
                .map(|v| split_origins(&v))
                .unwrap_or(defaults.allowed_origins),
            seed_demo_data: parse_flag(&get, "SEED_DEMO_DATA")?.unwrap_or(false),
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| Error::Config(format!("Invalid HOST/PORT {}:{}: {}", self.host, self.port, e)))
    }

    /// Request body ceiling: the upload limit plus room for multipart framing.
    pub fn body_limit_bytes(&self) -> usize {
        let limit = self.max_upload_bytes.saturating_add(1024 * 1024);
        usize::try_from(limit).unwrap_or(usize::MAX)
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| Error::Config(format!("{}={:?} is invalid: {}", key, raw, e)))
        })
        .transpose()
}

fn parse_flag(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    get(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::Config(format!("{}={:?} is not a boolean", key, raw))),
        })
        .transpose()
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
