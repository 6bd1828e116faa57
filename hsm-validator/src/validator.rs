//! Private validator whose signing key lives in an HSM.
//!
//! ## Key state
//!
//! ```text
//!  KeysNotLoaded ── successful load-key job ──► KeysLoaded
//! ```
//!
//! Every process starts in `KeysNotLoaded`, including one that just
//! generated its key pair. Before any sign job the wrapped key is loaded
//! into the module; if that fails the sign job is never sent and the state
//! stays `KeysNotLoaded`, so the next call tries again.
//!
//! State and key bytes sit behind one mutex that is held for the whole
//! load-then-sign sequence, so concurrent callers are serialized.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use hsm_module::{
    Heartbeat, Hsm, HsmError, Proposal, Signature, Vote, PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::address::{Address, AddressScheme, Sha256Truncated};
use crate::key_file::KeyFile;

/// Errors from the private validator.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("HSM error: {0}")]
    Hsm(#[from] HsmError),

    #[error("bad signature size: expected {expected} bytes, found {actual}")]
    BadSignatureSize { expected: usize, actual: usize },

    #[error("invalid public key: expected 32 bytes, found {actual}")]
    InvalidPublicKey { actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse key file: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Whether the wrapped key has been loaded into the module by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    KeysNotLoaded,
    KeysLoaded,
}

#[derive(Debug)]
struct SigningState {
    encrypted_priv_key: Vec<u8>,
    public_key: [u8; PUBLIC_KEY_SIZE],
    key_state: KeyState,
}

impl SigningState {
    fn ensure_loaded<H: Hsm>(&mut self, hsm: &H) -> Result<(), ValidatorError> {
        if self.key_state == KeyState::KeysLoaded {
            return Ok(());
        }

        debug!("Loading wrapped key into module");
        if let Err(e) = hsm.load_keys(&self.encrypted_priv_key) {
            warn!("Failed to load keys into module: {}", e);
            return Err(e.into());
        }
        self.key_state = KeyState::KeysLoaded;
        Ok(())
    }
}

/// Caller-facing surface used by the consensus engine.
///
/// Signing methods store the signature on the message and also return it.
/// On error the message is left unsigned.
pub trait PrivValidator {
    fn address(&self) -> Address;

    fn pub_key(&self) -> [u8; PUBLIC_KEY_SIZE];

    fn sign_vote(&self, chain_id: &str, vote: &mut Vote) -> Result<Signature, ValidatorError>;

    fn sign_proposal(
        &self,
        chain_id: &str,
        proposal: &mut Proposal,
    ) -> Result<Signature, ValidatorError>;

    fn sign_heartbeat(
        &self,
        chain_id: &str,
        heartbeat: &mut Heartbeat,
    ) -> Result<Signature, ValidatorError>;
}

/// Private validator backed by an [`Hsm`].
pub struct HsmPrivValidator<H, A = Sha256Truncated> {
    state: Mutex<SigningState>,
    hsm: H,
    scheme: A,
}

impl<H: Hsm> HsmPrivValidator<H> {
    /// Generates a fresh key pair in the module.
    ///
    /// The new key is not loaded; the first sign call loads it.
    pub fn bootstrap(hsm: H) -> Result<Self, ValidatorError> {
        let pair = hsm.generate_key().map_err(|e| {
            warn!("Failed to generate key pair: {}", e);
            e
        })?;
        info!(
            "Generated validator key pair, pubkey: {}",
            hex::encode(pair.public_key)
        );

        Ok(Self::with_state(
            SigningState {
                encrypted_priv_key: pair.wrapped_private_key.to_vec(),
                public_key: pair.public_key,
                key_state: KeyState::KeysNotLoaded,
            },
            hsm,
            Sha256Truncated,
        ))
    }

    /// Builds a validator from a persisted record without contacting the
    /// module.
    pub fn new(record: KeyFile, hsm: H) -> Result<Self, ValidatorError> {
        Self::with_scheme(record, hsm, Sha256Truncated)
    }

    /// Builds a validator from a persisted record and loads its key into
    /// the module, failing if the module refuses it.
    pub fn restore(record: KeyFile, hsm: H) -> Result<Self, ValidatorError> {
        let validator = Self::new(record, hsm)?;
        validator.ensure_loaded()?;
        info!("Restored validator {}", validator.address());
        Ok(validator)
    }

    /// Reads the key file at `path`, then behaves like [`restore`].
    ///
    /// [`restore`]: HsmPrivValidator::restore
    pub fn load_from_file(path: impl AsRef<Path>, hsm: H) -> Result<Self, ValidatorError> {
        Self::restore(KeyFile::load(path)?, hsm)
    }
}

impl<H: Hsm, A: AddressScheme> HsmPrivValidator<H, A> {
    pub fn with_scheme(record: KeyFile, hsm: H, scheme: A) -> Result<Self, ValidatorError> {
        let public_key: [u8; PUBLIC_KEY_SIZE] =
            record
                .public_key
                .as_slice()
                .try_into()
                .map_err(|_| ValidatorError::InvalidPublicKey {
                    actual: record.public_key.len(),
                })?;

        Ok(Self::with_state(
            SigningState {
                encrypted_priv_key: record.encrypted_priv_key,
                public_key,
                key_state: KeyState::KeysNotLoaded,
            },
            hsm,
            scheme,
        ))
    }

    fn with_state(state: SigningState, hsm: H, scheme: A) -> Self {
        Self {
            state: Mutex::new(state),
            hsm,
            scheme,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SigningState> {
        // The state is only written after a successful load, so a panic
        // elsewhere cannot leave it half-updated.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads the wrapped key into the module unless already loaded.
    pub fn ensure_loaded(&self) -> Result<(), ValidatorError> {
        self.lock().ensure_loaded(&self.hsm)
    }

    pub fn key_state(&self) -> KeyState {
        self.lock().key_state
    }

    pub fn hsm(&self) -> &H {
        &self.hsm
    }

    /// The record to persist; never includes the load state.
    pub fn key_file(&self) -> KeyFile {
        let state = self.lock();
        KeyFile {
            encrypted_priv_key: state.encrypted_priv_key.clone(),
            public_key: state.public_key.to_vec(),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ValidatorError> {
        self.key_file().save(path)
    }

    /// Loads keys if needed, runs `job` and validates the signature length.
    fn sign_with<F>(&self, what: &str, job: F) -> Result<Signature, ValidatorError>
    where
        F: FnOnce(&H) -> Result<Vec<u8>, HsmError>,
    {
        let mut state = self.lock();
        state.ensure_loaded(&self.hsm)?;

        let raw = job(&self.hsm)?;
        let signature = Signature::try_from(raw.as_slice()).map_err(|e| {
            warn!("Module returned {} byte {} signature", e.0, what);
            ValidatorError::BadSignatureSize {
                expected: SIGNATURE_SIZE,
                actual: e.0,
            }
        })?;
        debug!("Signed {}", what);
        Ok(signature)
    }
}

impl<H: Hsm, A: AddressScheme> PrivValidator for HsmPrivValidator<H, A> {
    fn address(&self) -> Address {
        self.scheme.address(&self.pub_key())
    }

    fn pub_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.lock().public_key
    }

    fn sign_vote(&self, chain_id: &str, vote: &mut Vote) -> Result<Signature, ValidatorError> {
        let signature = self.sign_with("vote", |hsm| hsm.sign_vote(chain_id, vote))?;
        vote.signature = Some(signature);
        Ok(signature)
    }

    fn sign_proposal(
        &self,
        chain_id: &str,
        proposal: &mut Proposal,
    ) -> Result<Signature, ValidatorError> {
        let signature = self.sign_with("proposal", |hsm| hsm.sign_proposal(chain_id, proposal))?;
        proposal.signature = Some(signature);
        Ok(signature)
    }

    fn sign_heartbeat(
        &self,
        chain_id: &str,
        heartbeat: &mut Heartbeat,
    ) -> Result<Signature, ValidatorError> {
        let signature =
            self.sign_with("heartbeat", |hsm| hsm.sign_heartbeat(chain_id, heartbeat))?;
        heartbeat.signature = Some(signature);
        Ok(signature)
    }
}
