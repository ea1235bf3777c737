use std::env;
use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{info, warn};

use crate::tls::TlsPaths;

/// Server settings, read once from `HALLRES_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls: Option<TlsPaths>,
    /// Emails that act as administrators.
    pub admins: Vec<String>,
    /// Legacy JSON export to load on startup, and the tenant it lands in.
    pub import: Option<PathBuf>,
    pub import_tenant: String,
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String, reason: String },
    Tls(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } => write!(f, "invalid {key}={value:?}: {reason}"),
            ConfigError::Tls(e) => write!(f, "TLS settings: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let tls = TlsPaths::pair(lookup("HALLRES_TLS_CERT"), lookup("HALLRES_TLS_KEY"))
            .map_err(|e| ConfigError::Tls(e.to_string()))?;
        let admins = lookup("HALLRES_ADMINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            port: try_load(&lookup, "HALLRES_PORT", "5433")?,
            bind: try_load(&lookup, "HALLRES_BIND", "0.0.0.0")?,
            data_dir: try_load(&lookup, "HALLRES_DATA_DIR", "./data")?,
            password: try_load(&lookup, "HALLRES_PASSWORD", "hallres")?,
            max_connections: try_load(&lookup, "HALLRES_MAX_CONNECTIONS", "256")?,
            compact_threshold: try_load(&lookup, "HALLRES_COMPACT_THRESHOLD", "1000")?,
            metrics_port: try_load_optional(&lookup, "HALLRES_METRICS_PORT")?,
            tls,
            admins,
            import: lookup("HALLRES_IMPORT").map(PathBuf::from),
            import_tenant: try_load(&lookup, "HALLRES_IMPORT_TENANT", "hallres")?,
        };
        if config.admins.is_empty() {
            warn!("HALLRES_ADMINS is empty: nobody can approve or reject requests");
        }
        Ok(config)
    }
}

fn try_load<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    parse(key, raw)
}

fn try_load_optional<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T::Err: Display,
{
    lookup(key).map(|raw| parse(key, raw)).transpose()
}

fn parse<T: FromStr>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value: raw,
    })
}
