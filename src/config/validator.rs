use crate::config::{Config, IndexBackend, SCHEMA_VERSION};
use crate::error::{CaselensError, Result, ValidationError};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, collecting every problem
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_storage(config, &mut errors);
        Self::validate_index(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_logging(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CaselensError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_storage(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.storage.database_path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.database_path",
                "Database path cannot be empty",
            ));
        }
    }

    fn validate_index(config: &Config, errors: &mut Vec<ValidationError>) {
        let hnsw = &config.index.hnsw;

        if hnsw.m == 0 {
            errors.push(ValidationError::new(
                "index.hnsw.m",
                "HNSW M must be greater than 0",
            ));
        }

        if hnsw.ef_construction == 0 {
            errors.push(ValidationError::new(
                "index.hnsw.ef_construction",
                "HNSW ef_construction must be greater than 0",
            ));
        }

        if hnsw.ef_search == 0 {
            errors.push(ValidationError::new(
                "index.hnsw.ef_search",
                "HNSW ef_search must be greater than 0",
            ));
        }

        if hnsw.max_elements == 0 {
            errors.push(ValidationError::new(
                "index.hnsw.max_elements",
                "HNSW max_elements must be greater than 0",
            ));
        }

        if config.index.backend == IndexBackend::Weaviate {
            let url = &config.index.weaviate.url;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ValidationError::new(
                    "index.weaviate.url",
                    format!("URL must start with http:// or https://, got '{}'", url),
                ));
            }

            if config.index.weaviate.request_timeout_secs == 0 {
                errors.push(ValidationError::new(
                    "index.weaviate.request_timeout_secs",
                    "Request timeout must be greater than 0",
                ));
            }
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.request_timeout_secs == 0 {
            errors.push(ValidationError::new(
                "embedding.request_timeout_secs",
                "Request timeout must be greater than 0",
            ));
        }

        if config.embedding.local_dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.local_dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }
    }

    fn validate_logging(config: &Config, errors: &mut Vec<ValidationError>) {
        let level = config.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            errors.push(ValidationError::new(
                "logging.level",
                format!(
                    "Level must be one of {:?}, got '{}'",
                    LOG_LEVELS, config.logging.level
                ),
            ));
        }
    }
}
