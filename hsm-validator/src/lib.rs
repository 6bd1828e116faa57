//! Consensus private validator whose Ed25519 key never leaves an HSM.
//!
//! The key pair is generated inside the signing module; only the wrapped
//! private key and the public key are persisted here. Before the first
//! signature in each process the wrapped key is loaded back into the
//! module, after which votes, proposals and heartbeats are signed there.
//!
//! ```text
//! consensus ──► PrivValidator ──► HsmPrivValidator ──► Hsm ──► module
//!                                   (key state)
//! ```

pub mod address;
pub mod config;
pub mod genesis;
pub mod key_file;
pub mod validator;

pub use address::{Address, AddressScheme, Sha256Truncated, ADDRESS_SIZE};
pub use config::ModuleConfig;
pub use genesis::{GenesisDoc, GenesisValidator};
pub use key_file::KeyFile;
pub use validator::{HsmPrivValidator, KeyState, PrivValidator, ValidatorError};
