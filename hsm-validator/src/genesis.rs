//! Genesis document for a single-validator test chain.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use hsm_module::PUBLIC_KEY_SIZE;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::validator::ValidatorError;

pub const DEFAULT_CHAIN_ID: &str = "chain-hsm-test";
pub const DEFAULT_POWER: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisPubKey {
    #[serde(rename = "type")]
    pub key_type: String,
    /// Upper-case hex of the raw key.
    pub data: String,
}

impl GenesisPubKey {
    pub fn ed25519(public_key: &[u8; PUBLIC_KEY_SIZE]) -> Self {
        Self {
            key_type: "ed25519".to_string(),
            data: hex::encode_upper(public_key),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    pub pub_key: GenesisPubKey,
    pub power: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub genesis_time: DateTime<Utc>,
    pub chain_id: String,
    pub validators: Vec<GenesisValidator>,
}

impl GenesisDoc {
    /// Genesis listing one validator, timestamped now.
    pub fn single_validator(
        chain_id: impl Into<String>,
        public_key: &[u8; PUBLIC_KEY_SIZE],
        power: i64,
    ) -> Self {
        Self {
            genesis_time: Utc::now(),
            chain_id: chain_id.into(),
            validators: vec![GenesisValidator {
                pub_key: GenesisPubKey::ed25519(public_key),
                power,
                name: String::new(),
            }],
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ValidatorError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        info!("Wrote genesis for chain {} to {:?}", self.chain_id, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_validator_layout() {
        let doc = GenesisDoc::single_validator(DEFAULT_CHAIN_ID, &[0xab; PUBLIC_KEY_SIZE], 10);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["chain_id"], "chain-hsm-test");
        let validator = &json["validators"][0];
        assert_eq!(validator["power"], 10);
        assert_eq!(validator["pub_key"]["type"], "ed25519");
        assert_eq!(validator["pub_key"]["data"], "AB".repeat(PUBLIC_KEY_SIZE));
    }

    #[test]
    fn test_save_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config").join("genesis.json");

        let doc = GenesisDoc::single_validator("other-chain", &[1; PUBLIC_KEY_SIZE], 3);
        doc.save(&path).unwrap();

        let read: GenesisDoc = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, doc);
    }
}
