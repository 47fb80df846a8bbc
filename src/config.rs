use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::providers::ProviderConfig;

pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_dir: PathBuf,
    pub providers: Vec<ProviderConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind host or port")]
    InvalidSocket,
    #[error("failed to read providers file {path}: {source}")]
    ProvidersUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("providers file {path} is not a valid provider list: {source}")]
    ProvidersMalformed {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let host = non_empty_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_port(non_empty_var("PORT"))?;
        let log_dir = non_empty_var("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("logs"));
        let providers = match non_empty_var("PROVIDERS_FILE") {
            Some(path) => load_providers(Path::new(&path))?,
            None => Vec::new(),
        };

        let config = Self {
            host,
            port,
            log_dir,
            providers,
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }
}

pub fn load_providers(path: &Path) -> Result<Vec<ProviderConfig>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::ProvidersUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&raw).map_err(|source| ConfigError::ProvidersMalformed {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_port(value: Option<String>) -> Result<u16, ConfigError> {
    value
        .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
        .transpose()
        .map(|port| port.unwrap_or(DEFAULT_PORT))
}
