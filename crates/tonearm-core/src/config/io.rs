//! YAML configuration loading

use std::io;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Read a YAML config file strictly
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_config<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_yaml::from_str(&contents)?))
}

/// Load a YAML config file, falling back to defaults
///
/// A missing file is expected on first start. An unreadable or invalid one
/// is logged and otherwise ignored.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    match read_config(path) {
        Ok(Some(config)) => {
            log::info!("Loaded config from {}", path.display());
            config
        }
        Ok(None) => {
            log::info!("No config at {}, using defaults", path.display());
            T::default()
        }
        Err(e) => {
            log::warn!("Ignoring {}: {}", path.display(), e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    #[serde(default)]
    struct TestConfig {
        value: i32,
        name: String,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            Self {
                value: 7,
                name: "default".to_string(),
            }
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        assert!(read_config::<TestConfig>(&path).unwrap().is_none());
        assert_eq!(load_config::<TestConfig>(&path), TestConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "value: 42\n").unwrap();

        let config: TestConfig = load_config(&path);
        assert_eq!(config.value, 42);
        assert_eq!(config.name, "default");
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "value: [not, a, number\n").unwrap();

        assert!(matches!(
            read_config::<TestConfig>(&path),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!(load_config::<TestConfig>(&path), TestConfig::default());
    }
}
