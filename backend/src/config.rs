use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::DeviceSpec;

pub const CONFIG_PATH_ENV: &str = "PNEUMOSCAN_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/pneumoscan.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config file {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Startup configuration. Read once; nothing changes it afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub weights_path: PathBuf,
    pub device: DeviceSpec,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            weights_path: PathBuf::from("model/pneumonia_classifier.safetensors"),
            device: DeviceSpec::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            static_dir: PathBuf::from("static"),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// Defaults, then the YAML file (if any), then environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        Self::load_with(explicit.as_deref(), |key| std::env::var(key).ok())
    }

    pub fn load_with(
        explicit_path: Option<&Path>,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match explicit_path {
            Some(path) => Self::from_yaml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).is_file() => {
                Self::from_yaml_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_overrides(var)?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&config_str).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(path) = var("MODEL_WEIGHTS_PATH") {
            self.model.weights_path = PathBuf::from(path);
        }
        if let Some(device) = var("MODEL_DEVICE") {
            self.model.device = parse("MODEL_DEVICE", device)?;
        }
        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("PORT") {
            self.server.port = parse("PORT", port)?;
        }
        if let Some(dir) = var("STATIC_DIR") {
            self.server.static_dir = PathBuf::from(dir);
        }
        if let Some(limit) = var("MAX_UPLOAD_BYTES") {
            self.server.max_upload_bytes = parse("MAX_UPLOAD_BYTES", limit)?;
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        reason: e.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = AppConfig::load_with(
            None,
            vars(&[
                ("MODEL_WEIGHTS_PATH", "weights/resnet.ot"),
                ("MODEL_DEVICE", "cuda:1"),
                ("PORT", "9090"),
            ]),
        )
        .unwrap();

        assert_eq!(config.model.weights_path, PathBuf::from("weights/resnet.ot"));
        assert_eq!(config.model.device, DeviceSpec::Cuda(1));
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.bind_address(), "0.0.0.0:9090");
    }

    #[test]
    fn yaml_file_fills_missing_fields_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model:\n  device: cpu\nserver:\n  port: 8081").unwrap();

        let config = AppConfig::load_with(Some(file.path()), vars(&[("HOST", "127.0.0.1")])).unwrap();
        assert_eq!(config.model.device, DeviceSpec::Cpu);
        assert_eq!(config.model.weights_path, ModelConfig::default().weights_path);
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn rejects_bad_values() {
        let err = AppConfig::load_with(None, vars(&[("MODEL_DEVICE", "tpu")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "MODEL_DEVICE", .. }));

        let err = AppConfig::load_with(None, vars(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "PORT", .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "model:\n  device: quantum").unwrap();
        let err = AppConfig::load_with(Some(file.path()), vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Yaml { .. }));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let err = AppConfig::load_with(Some(Path::new("no/such/config.yaml")), vars(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
