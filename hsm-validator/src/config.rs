//! Where the signing module listens and how long to wait for it.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

use hsm_module::Endpoint;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::validator::ValidatorError;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 49999;

/// Module endpoint settings.
///
/// `timeout_ms` is unset by default, meaning jobs wait as long as the OS
/// allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeout_ms: None,
        }
    }
}

impl ModuleConfig {
    /// Reads a JSON config; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ValidatorError> {
        let path = path.as_ref();
        info!("Loading module config from {:?}", path);
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn endpoint(&self) -> Endpoint {
        let endpoint = Endpoint::new(self.host.clone(), self.port);
        match self.timeout() {
            Some(timeout) => endpoint.with_timeout(timeout),
            None => endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ModuleConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 49999);
        assert_eq!(config.timeout(), None);

        let endpoint = config.endpoint();
        assert_eq!(endpoint.to_string(), "127.0.0.1:49999");
        assert_eq!(endpoint.timeout, None);
    }

    #[test]
    fn test_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("module.json");
        fs::write(&path, r#"{"port": 5000, "timeout_ms": 250}"#).unwrap();

        let config = ModuleConfig::load(&path).unwrap();
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, 5000);
        assert_eq!(config.endpoint().timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_load_rejects_bad_port() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("module.json");
        fs::write(&path, r#"{"port": 70000}"#).unwrap();

        assert!(matches!(
            ModuleConfig::load(&path),
            Err(ValidatorError::Decode(_))
        ));
    }
}
