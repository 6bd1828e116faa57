//! The capability the validator needs from a signing module.

use std::sync::Arc;

use thiserror::Error;

use crate::codec::CodecError;
use crate::dispatch::TransportError;
use crate::protocol::{Job, ProtocolError};
use crate::types::{Ed25519KeyPair, Heartbeat, Proposal, Vote};

/// Errors from a module job.
#[derive(Debug, Error)]
pub enum HsmError {
    #[error("{job} job: {source}")]
    Transport {
        job: Job,
        #[source]
        source: TransportError,
    },

    #[error("{job} job: {source}")]
    Protocol {
        job: Job,
        #[source]
        source: ProtocolError,
    },

    #[error("module rejected {job} job: {message}")]
    Module { job: Job, message: String },

    #[error("module failed {job} job (code={code}): {message}")]
    Processing { job: Job, message: String, code: i32 },

    #[error("bad {which} size: got {actual}, expected {expected}")]
    BadKeySize {
        which: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("failed to encode {job} payload: {source}")]
    Encode {
        job: Job,
        #[source]
        source: CodecError,
    },
}

impl HsmError {
    /// The module itself refused or failed the job, as opposed to the
    /// round trip breaking down.
    pub fn is_module_rejection(&self) -> bool {
        matches!(self, HsmError::Module { .. } | HsmError::Processing { .. })
    }
}

/// Key management and signing performed inside the module.
///
/// Sign operations return the raw signature bytes exactly as the module
/// produced them; callers validate the length.
pub trait Hsm: Send + Sync {
    /// Loads a wrapped private key into the module.
    fn load_keys(&self, wrapped_private_key: &[u8]) -> Result<(), HsmError>;

    /// Creates a new Ed25519 key pair inside the module.
    fn generate_key(&self) -> Result<Ed25519KeyPair, HsmError>;

    /// Signs the canonical form of `vote`. The module refuses height,
    /// round or step regressions.
    fn sign_vote(&self, chain_id: &str, vote: &Vote) -> Result<Vec<u8>, HsmError>;

    /// Signs the canonical form of `proposal`, with the same regression
    /// rule as votes.
    fn sign_proposal(&self, chain_id: &str, proposal: &Proposal) -> Result<Vec<u8>, HsmError>;

    fn sign_heartbeat(&self, chain_id: &str, heartbeat: &Heartbeat) -> Result<Vec<u8>, HsmError>;
}

impl<T: Hsm + ?Sized> Hsm for Arc<T> {
    fn load_keys(&self, wrapped_private_key: &[u8]) -> Result<(), HsmError> {
        (**self).load_keys(wrapped_private_key)
    }

    fn generate_key(&self) -> Result<Ed25519KeyPair, HsmError> {
        (**self).generate_key()
    }

    fn sign_vote(&self, chain_id: &str, vote: &Vote) -> Result<Vec<u8>, HsmError> {
        (**self).sign_vote(chain_id, vote)
    }

    fn sign_proposal(&self, chain_id: &str, proposal: &Proposal) -> Result<Vec<u8>, HsmError> {
        (**self).sign_proposal(chain_id, proposal)
    }

    fn sign_heartbeat(&self, chain_id: &str, heartbeat: &Heartbeat) -> Result<Vec<u8>, HsmError> {
        (**self).sign_heartbeat(chain_id, heartbeat)
    }
}
