//! Configuration Loader
//!
//! Environment-aware configuration loading. A single YAML file carries the base
//! values plus optional `development`, `test` and `production` sections that are
//! merged over the base for the active environment.

use super::error::{ConfigResult, ConfigurationError};
use super::IngestConfig;
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_NAMES: [&str; 2] = ["ingest-config.yaml", "ingest-config.yml"];
const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];
const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

pub struct ConfigManager {
    config: IngestConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = crate::logging::get_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    ///
    /// Useful for tests that must not touch process environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            exchange_bucket = %config.exchange.bucket,
            max_parallel_backfills = config.backfill.max_parallel_backfills,
            "Configuration loaded successfully"
        );
        debug!(
            "Effective configuration: {}",
            serde_json::to_string(&Self::sanitize_config_for_logging(&config))
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
        }))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in CONFIG_FILE_NAMES {
            let config_path = config_directory.join(name);
            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
            searched_paths.push(config_path);
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn read_config_file(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                "configuration file is larger than 1MB",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<IngestConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
        }

        let mut config: IngestConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;
        config.environment = environment.to_string();

        Ok(config)
    }

    /// Mask secrets before the configuration is written to the log
    fn sanitize_config_for_logging(config: &IngestConfig) -> serde_json::Value {
        let mut config_json = serde_json::json!(config);
        sanitize_json_recursive(&mut config_json, &["password", "secret", "key", "token"]);
        config_json
    }
}

/// Recursively merge YAML values (environment overrides into base config)
pub(crate) fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
    match (&mut *base, override_value) {
        (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
            for (key, value) in override_map {
                if let Some(existing_value) = base_map.get_mut(&key) {
                    merge_yaml_values(existing_value, value);
                } else {
                    base_map.insert(key, value);
                }
            }
        }
        (base_ref, override_val) => {
            *base_ref = override_val;
        }
    }
}

fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                let key_lower = key.to_lowercase();
                let is_sensitive = sensitive_patterns
                    .iter()
                    .any(|pattern| key_lower.contains(pattern));

                if is_sensitive && !val.is_null() {
                    *val = serde_json::Value::String("[MASKED]".to_string());
                } else {
                    sanitize_json_recursive(val, sensitive_patterns);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for item in arr.iter_mut() {
                sanitize_json_recursive(item, sensitive_patterns);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) {
        fs::write(dir.path().join("ingest-config.yaml"), content).unwrap();
    }

    const CONFIG_YAML: &str = r#"
exchange:
  bucket: "exchange-base"
backfill:
  max_parallel_backfills: 2
workflow:
  api_token: "super-secret-token"
test:
  exchange:
    bucket: "exchange-test"
production:
  telemetry:
    json: true
"#;

    #[test]
    fn test_environment_section_overrides_base() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, CONFIG_YAML);

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        assert_eq!(manager.environment(), "test");
        assert_eq!(manager.config().exchange.bucket, "exchange-test");
        assert_eq!(manager.config().backfill.max_parallel_backfills, 2);
        assert!(!manager.config().telemetry.json);
    }

    #[test]
    fn test_unrelated_environment_keeps_base_values() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, CONFIG_YAML);

        let manager = ConfigManager::load_from_directory_with_env(
            Some(dir.path().to_path_buf()),
            "production",
        )
        .unwrap();

        assert_eq!(manager.config().exchange.bucket, "exchange-base");
        assert!(manager.config().telemetry.json);
    }

    #[test]
    fn test_missing_file_lists_searched_paths() {
        let dir = TempDir::new().unwrap();
        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");

        match result {
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                assert_eq!(searched_paths.len(), 2);
            }
            other => panic!("expected ConfigFileNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        write_config(&dir, "backfill:\n  max_parallel_backfills: 0\n");

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }

    #[test]
    fn test_secrets_are_masked_for_logging() {
        let mut config = IngestConfig::default();
        config.workflow.api_token = Some("super-secret-token".to_string());

        let sanitized = ConfigManager::sanitize_config_for_logging(&config);
        assert_eq!(sanitized["workflow"]["api_token"], "[MASKED]");
        assert_eq!(sanitized["exchange"]["bucket"], "partner-exchange");
    }

    #[test]
    fn test_merge_replaces_scalars_and_extends_maps() {
        let mut base: YamlValue = serde_yaml::from_str("a: 1\nb:\n  c: 2\n").unwrap();
        let overrides: YamlValue = serde_yaml::from_str("a: 5\nb:\n  d: 3\n").unwrap();

        merge_yaml_values(&mut base, overrides);

        assert_eq!(base["a"], YamlValue::from(5));
        assert_eq!(base["b"]["c"], YamlValue::from(2));
        assert_eq!(base["b"]["d"], YamlValue::from(3));
    }
}
