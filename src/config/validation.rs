use super::models::{Config, StorageProvider};
use thiserror::Error;

/// S3 rejects non-final multipart parts below this size
pub const S3_MIN_PART_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("transfer.chunk_size must be positive")]
    ZeroChunkSize,

    #[error("transfer.chunk_size ({actual}) is below the S3 minimum part size ({minimum})")]
    ChunkBelowPartMinimum { actual: u64, minimum: u64 },

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("driver.{field} must be at least 1")]
    InvalidDriverSetting { field: &'static str },

    #[error("Retention TTL must be positive: {field} = {value}")]
    InvalidRetentionTTL { field: String, value: u32 },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_transfer(config)?;
    validate_storage(config)?;
    validate_driver(config)?;
    validate_retention(config)?;
    Ok(())
}

fn validate_transfer(config: &Config) -> Result<(), ValidationError> {
    let chunk_size = config.transfer.chunk_size.as_u64();

    if chunk_size == 0 {
        return Err(ValidationError::ZeroChunkSize);
    }

    if config.storage.provider == StorageProvider::S3 && chunk_size < S3_MIN_PART_BYTES {
        return Err(ValidationError::ChunkBelowPartMinimum {
            actual: chunk_size,
            minimum: S3_MIN_PART_BYTES,
        });
    }

    Ok(())
}

/// Validate storage credentials when provider is S3
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3
        && (config.storage.access_key.is_none() || config.storage.secret_key.is_none())
    {
        return Err(ValidationError::MissingS3Credentials);
    }

    Ok(())
}

fn validate_driver(config: &Config) -> Result<(), ValidationError> {
    let driver = &config.driver;

    if driver.workers == 0 {
        return Err(ValidationError::InvalidDriverSetting { field: "workers" });
    }
    if driver.chunk_attempts == 0 {
        return Err(ValidationError::InvalidDriverSetting {
            field: "chunk_attempts",
        });
    }
    if driver.finish_attempts == 0 {
        return Err(ValidationError::InvalidDriverSetting {
            field: "finish_attempts",
        });
    }

    Ok(())
}

fn validate_retention(config: &Config) -> Result<(), ValidationError> {
    if config.retention.job_ttl_days == 0 {
        return Err(ValidationError::InvalidRetentionTTL {
            field: "job_ttl_days".to_string(),
            value: 0,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::ByteSize;

    #[test]
    fn test_valid_config() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_chunk_size() {
        let mut config = Config::default();
        config.transfer.chunk_size = ByteSize(0);

        assert!(matches!(validate(&config), Err(ValidationError::ZeroChunkSize)));
    }

    #[test]
    fn test_s3_chunk_minimum() {
        let mut config = Config::default();
        config.storage.provider = StorageProvider::S3;
        config.storage.access_key = Some("key".to_string());
        config.storage.secret_key = Some("secret".to_string());
        config.transfer.chunk_size = ByteSize::mib(1);

        assert!(matches!(
            validate(&config),
            Err(ValidationError::ChunkBelowPartMinimum { .. })
        ));

        config.transfer.chunk_size = ByteSize::mib(5);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_s3_credentials_missing() {
        let mut config = Config::default();
        config.storage.provider = StorageProvider::S3;
        config.storage.access_key = None;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::MissingS3Credentials)
        ));
    }

    #[test]
    fn test_zero_workers() {
        let mut config = Config::default();
        config.driver.workers = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidDriverSetting { field: "workers" })
        ));
    }

    #[test]
    fn test_zero_retention_ttl() {
        let mut config = Config::default();
        config.retention.job_ttl_days = 0;

        assert!(matches!(
            validate(&config),
            Err(ValidationError::InvalidRetentionTTL { .. })
        ));
    }
}
