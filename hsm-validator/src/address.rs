//! Validator addresses derived from the public key.

use std::fmt;

use hsm_module::PUBLIC_KEY_SIZE;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

pub const ADDRESS_SIZE: usize = 20;

/// Fixed-size identity the network uses for a validator.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    pub fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// One-way map from a public key to an [`Address`].
///
/// The host network decides the scheme; the validator only applies it.
pub trait AddressScheme: Send + Sync {
    fn address(&self, public_key: &[u8; PUBLIC_KEY_SIZE]) -> Address;
}

/// First 20 bytes of SHA-256 over the raw public key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Truncated;

impl AddressScheme for Sha256Truncated {
    fn address(&self, public_key: &[u8; PUBLIC_KEY_SIZE]) -> Address {
        let digest = Sha256::digest(public_key);
        let mut out = [0u8; ADDRESS_SIZE];
        out.copy_from_slice(&digest[..ADDRESS_SIZE]);
        Address(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_truncated_known_value() {
        // SHA-256 of 32 zero bytes
        let address = Sha256Truncated.address(&[0u8; PUBLIC_KEY_SIZE]);
        assert_eq!(
            address.to_string(),
            "66687AADF862BD776C8FC18B8E9F8E20089714856EE233B3902A591D0D5F2925"[..40]
        );
    }

    #[test]
    fn test_deterministic_and_key_dependent() {
        let a = Sha256Truncated.address(&[1u8; PUBLIC_KEY_SIZE]);
        let b = Sha256Truncated.address(&[1u8; PUBLIC_KEY_SIZE]);
        let c = Sha256Truncated.address(&[2u8; PUBLIC_KEY_SIZE]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
