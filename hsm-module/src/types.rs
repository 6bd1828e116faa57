//! Consensus messages the module signs, and the key material it hands back.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const PUBLIC_KEY_SIZE: usize = 32;
pub const WRAPPED_PRIVATE_KEY_SIZE: usize = 64;
pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 key pair created inside the module.
///
/// The private half only ever exists wrapped under a module key, so it is
/// safe to persist on the host.
#[derive(Clone, PartialEq, Eq)]
pub struct Ed25519KeyPair {
    pub public_key: [u8; PUBLIC_KEY_SIZE],
    pub wrapped_private_key: [u8; WRAPPED_PRIVATE_KEY_SIZE],
}

impl fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("expected 64 byte signature, found {0} bytes")]
pub struct SignatureLengthError(pub usize);

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }
}

impl TryFrom<&[u8]> for Signature {
    type Error = SignatureLengthError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array: [u8; SIGNATURE_SIZE] = bytes
            .try_into()
            .map_err(|_| SignatureLengthError(bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode_upper(self.0))
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode_upper(self.0))
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        Signature::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSetHeader {
    pub total: i32,
    pub hash: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockId {
    pub hash: Vec<u8>,
    pub parts: PartSetHeader,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum VoteType {
    #[default]
    Prevote = 0x01,
    Precommit = 0x02,
}

impl VoteType {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub validator_address: Vec<u8>,
    pub validator_index: i32,
    pub height: i64,
    pub round: i32,
    pub timestamp: DateTime<Utc>,
    pub vote_type: VoteType,
    pub block_id: BlockId,
    pub signature: Option<Signature>,
}

/// Round value meaning "no proof-of-lock".
pub const NO_POL_ROUND: i32 = -1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub height: i64,
    pub round: i32,
    pub timestamp: DateTime<Utc>,
    pub block_parts_header: PartSetHeader,
    pub pol_round: i32,
    pub pol_block_id: BlockId,
    pub signature: Option<Signature>,
}

impl Proposal {
    pub fn has_pol(&self) -> bool {
        self.pol_round != NO_POL_ROUND
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub validator_address: Vec<u8>,
    pub validator_index: i32,
    pub height: i64,
    pub round: i32,
    pub sequence: i32,
    pub signature: Option<Signature>,
}

/// Canonical timestamp text: UTC with millisecond precision and a `Z` suffix.
pub fn canonical_time(t: &DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
