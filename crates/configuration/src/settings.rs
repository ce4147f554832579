use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// The root configuration structure for the entire application.
///
/// Every section has defaults so that running without a `config.toml` works.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub backup: BackupConfig,
    pub logging: LoggingConfig,
}

/// Settings for the embedded store and the connection pool.
///
/// Whether the network store is used instead is decided from the environment,
/// see [`crate::DatabaseSettings`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Location of the SQLite file used when the network store is disabled.
    pub sqlite_path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("db.sqlite3"),
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Shared secret required by the unauthenticated first-run restore endpoint.
    /// Falls back to the `SETUP_TOKEN` environment variable.
    pub setup_token: Option<String>,
    /// Largest accepted upload, in bytes.
    pub max_upload_bytes: usize,
    /// Minutes of inactivity after which a login token stops working.
    pub session_idle_minutes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8000)),
            setup_token: None,
            max_upload_bytes: 50 * 1024 * 1024,
            session_idle_minutes: 12 * 60,
        }
    }
}

/// Auxiliary files and directories bundled next to the database in a snapshot archive.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub assets: Vec<PathBuf>,
    /// Largest database a restore will unpack from an upload.
    pub max_database_bytes: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            max_database_bytes: 1024 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// When set, logs are also written to a daily rolling file in this directory.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            file_prefix: "matchtally.log".to_string(),
        }
    }
}
