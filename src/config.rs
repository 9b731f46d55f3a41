//! Application configuration.
//!
//! Loaded from a YAML file plus environment variables. Environment
//! overrides use the `SCHOOLTABLE` prefix with `__` separators, e.g.
//! `SCHOOLTABLE__TABLE__NAME=school-prod`.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SCHOOLTABLE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SCHOOLTABLE";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Table configuration.
    pub table: TableConfig,
    /// AWS service configuration.
    pub aws: AwsConfig,
}

/// Single-table configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Table name.
    pub name: String,
    /// Secondary index name.
    pub index: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "school".to_string(),
            index: "GSI1".to_string(),
        }
    }
}

/// AWS service endpoints and resources.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    /// Custom endpoint URL (local DynamoDB / LocalStack). `None` uses the
    /// default provider chain.
    pub endpoint_url: Option<String>,
    /// SNS topic for domain events. `None` disables publication.
    pub sns_topic_arn: Option<String>,
    /// S3 bucket for file attachments.
    pub s3_bucket: Option<String>,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Sources (later overrides earlier):
    /// 1. `config.yaml` in the current directory (if present)
    /// 2. File given by `path` (if provided)
    /// 3. File named by `SCHOOLTABLE_CONFIG` (if set)
    /// 4. `SCHOOLTABLE`-prefixed environment variables
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.table.name, "school");
        assert_eq!(config.table.index, "GSI1");
        assert!(config.aws.endpoint_url.is_none());
        assert!(config.aws.sns_topic_arn.is_none());
    }
}
