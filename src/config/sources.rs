use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "INGESTBOX_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/ingestbox.toml";
const ENV_PREFIX: &str = "INGESTBOX";
const ENV_SEPARATOR: &str = "__";

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // A missing .env is the common case
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config = load_from_sources(config_path)?;
    load_secrets(&mut config);

    Ok(config)
}

/// Secrets are never stored in TOML files, only in environment
fn load_secrets(config: &mut Config) {
    config.storage.access_key = env::var("S3_ACCESS_KEY")
        .or_else(|_| env::var("AWS_ACCESS_KEY_ID"))
        .ok();
    config.storage.secret_key = env::var("S3_SECRET_KEY")
        .or_else(|_| env::var("AWS_SECRET_ACCESS_KEY"))
        .ok();
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // INGESTBOX__TRANSFER__CHUNK_SIZE -> transfer.chunk_size
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageProvider;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.transfer.chunk_size.as_u64(), 20 * 1024 * 1024);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9000"
ledger_path = "/var/lib/ingestbox/ledger"

[storage]
provider = "s3"
bucket = "media"
region = "us-east-1"
endpoint = "http://minio:9000"
allow_http = true

[source]
request_timeout_secs = 15

[transfer]
chunk_size = "8MB"
key_prefix = "ingest/"

[driver]
workers = 8
chunk_attempts = 5

[retention]
job_ttl_days = 14
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9000");
        assert_eq!(config.storage.provider, StorageProvider::S3);
        assert!(config.storage.allow_http);
        assert_eq!(config.source.request_timeout_secs, 15);
        assert_eq!(config.source.connect_timeout_secs, 10);
        assert_eq!(config.transfer.chunk_size.as_u64(), 8 * 1024 * 1024);
        assert_eq!(config.transfer.key_prefix, "ingest/");
        assert_eq!(config.driver.workers, 8);
        assert_eq!(config.driver.chunk_attempts, 5);
        assert_eq!(config.driver.finish_attempts, 3);
        assert_eq!(config.retention.job_ttl_days, 14);
    }
}
