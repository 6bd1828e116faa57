//! On-disk record of the validator's key material.
//!
//! The private key is stored wrapped under a module key, so the file is
//! only useful together with the HSM that produced it. Byte fields are
//! standard base64, field names match records written by earlier tooling.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::validator::ValidatorError;

/// Persisted `{encrypted private key, public key}` pair.
///
/// The module endpoint is configuration and is not part of the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFile {
    #[serde(
        rename = "EncryptedPrivKey",
        alias = "encryptedPrivateKey",
        with = "base64_bytes"
    )]
    pub encrypted_priv_key: Vec<u8>,

    #[serde(rename = "PublicKey", alias = "publicKey", with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

impl KeyFile {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ValidatorError> {
        let path = path.as_ref();
        info!("Loading validator key file from {:?}", path);
        let file = File::open(path)?;
        let record = serde_json::from_reader(BufReader::new(file))?;
        Ok(record)
    }

    /// Writes the record with owner-only permissions.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ValidatorError> {
        let path = path.as_ref();
        // Write to temp file first, then rename
        let temp_path = path.with_extension("tmp");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        {
            let file = File::create(&temp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&temp_path, path)?;
        debug!("Persisted validator key file to {:?}", path);
        Ok(())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
