use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod persistence;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use persistence::{DatabaseSettings, NetworkStore};
pub use settings::{BackupConfig, DatabaseConfig, LoggingConfig, ServerConfig, Settings};

/// Prefix of environment variables that override `config.toml` values,
/// e.g. `MATCHTALLY__DATABASE__SQLITE_PATH`.
pub const ENV_PREFIX: &str = "MATCHTALLY";

/// Environment variable consulted when no setup token is configured.
pub const SETUP_TOKEN: &str = "SETUP_TOKEN";

/// Loads the application configuration.
///
/// The file is optional: every section falls back to its defaults, then
/// `MATCHTALLY__<SECTION>__<KEY>` variables are layered on top.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut settings = builder.try_deserialize::<Settings>()?;

    if settings.server.setup_token.is_none() {
        settings.server.setup_token = std::env::var(SETUP_TOKEN)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
    }

    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.database.max_connections == 0 {
        return Err(ConfigError::ValidationError(
            "database.max_connections must be at least 1".to_string(),
        ));
    }
    if settings.server.session_idle_minutes == 0 {
        return Err(ConfigError::ValidationError(
            "server.session_idle_minutes must be at least 1".to_string(),
        ));
    }
    if settings.backup.max_database_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "backup.max_database_bytes must be at least 1".to_string(),
        ));
    }
    if settings.database.sqlite_path.as_os_str().is_empty() {
        return Err(ConfigError::ValidationError(
            "database.sqlite_path must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.database.max_connections, 5);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.backup.assets.is_empty());
        assert_eq!(settings.backup.max_database_bytes, 1 << 30);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[database]
sqlite_path = "data/results.sqlite3"
max_connections = 2

[server]
addr = "0.0.0.0:9000"

[backup]
assets = ["static"]
"#
        )
        .unwrap();

        let settings = load_config(&path).unwrap();
        assert_eq!(
            settings.database.sqlite_path,
            std::path::PathBuf::from("data/results.sqlite3")
        );
        assert_eq!(settings.database.max_connections, 2);
        assert_eq!(settings.server.addr.port(), 9000);
        assert_eq!(settings.backup.assets.len(), 1);
    }

    #[test]
    fn zero_connections_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[database]\nmax_connections = 0\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn zero_database_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[backup]\nmax_database_bytes = 0\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
