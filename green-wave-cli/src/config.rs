//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use green_wave_core::EstimatorConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Traffic light coordinates (JSON)
    #[serde(default = "default_registry_file")]
    pub file: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            file: default_registry_file(),
        }
    }
}

fn default_registry_file() -> PathBuf {
    PathBuf::from("light_traffics.json")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Backend endpoint for the HTTP sink
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Output file for the JSON-lines sink
    pub output: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout(),
            output: None,
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:8000/api/green_light".to_string()
}

fn default_timeout() -> u64 {
    10
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate(&config).with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<()> {
    let problems = config.estimator.problems();
    if !problems.is_empty() {
        bail!("{}", problems.join("; "));
    }

    if config.telemetry.timeout_secs == 0 {
        bail!("telemetry.timeout_secs must be at least 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [registry]
            file = "data/lights.json"

            [estimator]
            pass_radius_m = 30.0
            history_capacity = 4

            [telemetry]
            endpoint = "https://example.org/api/green_light"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.registry.file, PathBuf::from("data/lights.json"));
        assert_eq!(config.estimator.pass_radius_m, 30.0);
        assert_eq!(config.estimator.history_capacity, 4);
        assert_eq!(config.estimator.trigger_radius_m, 1000.0);
        assert_eq!(config.telemetry.timeout_secs, 10);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.registry.file, PathBuf::from("light_traffics.json"));
        assert_eq!(config.estimator, EstimatorConfig::default());
        assert!(config.telemetry.output.is_none());
    }

    #[test]
    fn test_invalid_estimator_rejected() {
        let config: AppConfig = toml::from_str("[estimator]\nhistory_capacity = 0\n").unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[telemetry]\ntimeout_secs = 3\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.telemetry.timeout_secs, 3);

        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }
}
