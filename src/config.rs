//! Configuration management for Vanish Server

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum chunk body: 10 MiB
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 10 * 1024 * 1024;

/// Default session lifetime: 24 hours
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// Default sweep interval: 5 minutes
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub upload: UploadConfig,
    pub storage: Option<StorageConfig>,
    pub handoff: HandoffConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin; `None` allows any
    pub cors_origin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Public artifact root
    pub upload_dir: PathBuf,
    /// Root holding one chunk directory per session
    pub temp_dir: PathBuf,
    pub max_chunk_bytes: usize,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Minio,
    R2,
    S3,
    B2,
}

#[derive(Debug, Clone)]
pub struct HandoffConfig {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token -> user id
    pub tokens: HashMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                cors_origin: None,
            },
            upload: UploadConfig::with_root(PathBuf::from("uploads")),
            storage: None,
            handoff: HandoffConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for HandoffConfig {
    fn default() -> Self {
        HandoffConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl UploadConfig {
    /// Layout rooted at `root`: artifacts in `root`, chunks in `root/temp`
    pub fn with_root(root: PathBuf) -> Self {
        UploadConfig {
            temp_dir: root.join("temp"),
            upload_dir: root,
            max_chunk_bytes: DEFAULT_MAX_CHUNK_BYTES,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("uploads"));
        let mut upload = UploadConfig::with_root(upload_dir);
        if let Ok(temp) = env::var("UPLOAD_TEMP_DIR") {
            upload.temp_dir = PathBuf::from(temp);
        }
        upload.max_chunk_bytes = parse_var("MAX_CHUNK_BYTES", DEFAULT_MAX_CHUNK_BYTES)?;
        upload.session_ttl =
            Duration::from_secs(parse_var("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?);
        upload.sweep_interval =
            Duration::from_secs(parse_var("SESSION_SWEEP_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?);

        let defaults = HandoffConfig::default();
        let handoff = HandoffConfig {
            max_attempts: parse_var("HANDOFF_MAX_ATTEMPTS", defaults.max_attempts)?.max(1),
            initial_backoff: Duration::from_millis(parse_var(
                "HANDOFF_BACKOFF_MS",
                defaults.initial_backoff.as_millis() as u64,
            )?),
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000)?,
                cors_origin: env::var("CORS_ORIGIN").ok(),
            },
            upload,
            storage: StorageConfig::from_env()?,
            handoff,
            auth: AuthConfig {
                tokens: parse_tokens(&env::var("AUTH_TOKENS").unwrap_or_default())?,
            },
        })
    }
}

impl StorageConfig {
    /// Remote storage is configured only when `S3_ENDPOINT` is set
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Ok(endpoint) = env::var("S3_ENDPOINT") else {
            return Ok(None);
        };

        Ok(Some(StorageConfig {
            provider: match env::var("S3_PROVIDER").unwrap_or_else(|_| "r2".to_string()).as_str() {
                "minio" => StorageProvider::Minio,
                "s3" => StorageProvider::S3,
                "b2" => StorageProvider::B2,
                _ => StorageProvider::R2,
            },
            endpoint,
            bucket: env::var("S3_BUCKET").map_err(|_| ConfigError::Missing("S3_BUCKET"))?,
            access_key: env::var("S3_ACCESS_KEY")
                .map_err(|_| ConfigError::Missing("S3_ACCESS_KEY"))?,
            secret_key: env::var("S3_SECRET_KEY")
                .map_err(|_| ConfigError::Missing("S3_SECRET_KEY"))?,
            region: env::var("S3_REGION").ok(),
        }))
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(default),
    }
}

/// Parse `token:user,token:user`
pub fn parse_tokens(raw: &str) -> Result<HashMap<String, String>, ConfigError> {
    let mut tokens = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match pair.split_once(':') {
            Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                tokens.insert(token.to_string(), user.to_string());
            }
            _ => {
                return Err(ConfigError::Invalid {
                    name: "AUTH_TOKENS",
                    value: pair.to_string(),
                })
            }
        }
    }
    Ok(tokens)
}
