//! Network client for the signing machine running inside an nShield HSM.
//!
//! The machine listens on a TCP port and handles one job per connection.
//! Each method here builds the job payload, dispatches it and unpacks the
//! job-specific result.

use tracing::{debug, info, warn};

use crate::codec::{encode_all, Decoder, Value};
use crate::dispatch::{send_job, Endpoint};
use crate::hsm::{Hsm, HsmError};
use crate::protocol::{decode_response, Job, ModuleResponse};
use crate::types::{
    canonical_time, Ed25519KeyPair, Heartbeat, Proposal, Vote, PUBLIC_KEY_SIZE,
    WRAPPED_PRIVATE_KEY_SIZE,
};

/// [`Hsm`] backed by the module's network interface.
#[derive(Debug, Clone)]
pub struct ThalesHsm {
    endpoint: Endpoint,
}

impl ThalesHsm {
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Runs one job and returns the success payload.
    fn run(&self, job: Job, payload: &[u8]) -> Result<Vec<u8>, HsmError> {
        let raw = send_job(job, payload, &self.endpoint)
            .map_err(|source| HsmError::Transport { job, source })?;

        match decode_response(&raw).map_err(|source| HsmError::Protocol { job, source })? {
            ModuleResponse::Success(result) => Ok(result),
            ModuleResponse::ModuleError(message) => {
                warn!("Module rejected {} job: {}", job, message);
                Err(HsmError::Module { job, message })
            }
            ModuleResponse::ProcessingError { message, code } => {
                warn!("Module failed {} job (code={}): {}", job, code, message);
                Err(HsmError::Processing { job, message, code })
            }
        }
    }

    fn sign(&self, job: Job, payload: &[u8]) -> Result<Vec<u8>, HsmError> {
        let result = self.run(job, payload)?;
        let signature = Decoder::new(&result)
            .get_bytes()
            .map_err(|e| HsmError::Protocol {
                job,
                source: e.into(),
            })?;
        debug!("{} job returned {} signature bytes", job, signature.len());
        Ok(signature.to_vec())
    }
}

fn encode(job: Job, values: &[Value<'_>]) -> Result<Vec<u8>, HsmError> {
    encode_all(values).map_err(|source| HsmError::Encode { job, source })
}

pub fn load_key_payload(wrapped_private_key: &[u8]) -> Result<Vec<u8>, HsmError> {
    encode(Job::LoadKey, &[Value::Bytes(wrapped_private_key)])
}

pub fn vote_payload(chain_id: &str, vote: &Vote) -> Result<Vec<u8>, HsmError> {
    let timestamp = canonical_time(&vote.timestamp);
    encode(
        Job::SignVote,
        &[
            Value::Text(chain_id),
            Value::Bytes(&vote.block_id.hash),
            Value::Bytes(&vote.block_id.parts.hash),
            Value::Int32(vote.block_id.parts.total),
            Value::Int64(vote.height),
            Value::Int32(vote.round),
            Value::Text(&timestamp),
            Value::Int32(i32::from(vote.vote_type.code())),
        ],
    )
}

/// Without a proof-of-lock round the POL block id is sent as two empty
/// hashes and a zero parts total, whatever the proposal holds.
pub fn proposal_payload(chain_id: &str, proposal: &Proposal) -> Result<Vec<u8>, HsmError> {
    const EMPTY: &[u8] = &[];

    let (pol_hash, pol_parts_hash, pol_parts_total) = if proposal.has_pol() {
        (
            proposal.pol_block_id.hash.as_slice(),
            proposal.pol_block_id.parts.hash.as_slice(),
            proposal.pol_block_id.parts.total,
        )
    } else {
        (EMPTY, EMPTY, 0)
    };

    let timestamp = canonical_time(&proposal.timestamp);
    encode(
        Job::SignProposal,
        &[
            Value::Text(chain_id),
            Value::Bytes(&proposal.block_parts_header.hash),
            Value::Int32(proposal.block_parts_header.total),
            Value::Int64(proposal.height),
            Value::Bytes(pol_hash),
            Value::Bytes(pol_parts_hash),
            Value::Int32(pol_parts_total),
            Value::Int32(proposal.pol_round),
            Value::Int32(proposal.round),
            Value::Text(&timestamp),
        ],
    )
}

pub fn heartbeat_payload(chain_id: &str, heartbeat: &Heartbeat) -> Result<Vec<u8>, HsmError> {
    encode(
        Job::SignHeartbeat,
        &[
            Value::Text(chain_id),
            Value::Int64(heartbeat.height),
            Value::Int32(heartbeat.round),
            Value::Int32(heartbeat.sequence),
            Value::Bytes(&heartbeat.validator_address),
            Value::Int32(heartbeat.validator_index),
        ],
    )
}

fn parse_key_pair(result: &[u8]) -> Result<Ed25519KeyPair, HsmError> {
    let protocol = |e: crate::codec::CodecError| HsmError::Protocol {
        job: Job::GenerateKey,
        source: e.into(),
    };

    let mut dec = Decoder::new(result);
    let public_key = dec.get_bytes().map_err(protocol)?;
    let wrapped_private_key = dec.get_bytes().map_err(protocol)?;

    let public_key: [u8; PUBLIC_KEY_SIZE] =
        public_key.try_into().map_err(|_| HsmError::BadKeySize {
            which: "public key",
            expected: PUBLIC_KEY_SIZE,
            actual: public_key.len(),
        })?;
    let wrapped_private_key: [u8; WRAPPED_PRIVATE_KEY_SIZE] =
        wrapped_private_key
            .try_into()
            .map_err(|_| HsmError::BadKeySize {
                which: "private key",
                expected: WRAPPED_PRIVATE_KEY_SIZE,
                actual: wrapped_private_key.len(),
            })?;

    Ok(Ed25519KeyPair {
        public_key,
        wrapped_private_key,
    })
}

impl Hsm for ThalesHsm {
    fn load_keys(&self, wrapped_private_key: &[u8]) -> Result<(), HsmError> {
        let payload = load_key_payload(wrapped_private_key)?;
        self.run(Job::LoadKey, &payload)?;
        info!("Loaded wrapped key into module at {}", self.endpoint);
        Ok(())
    }

    fn generate_key(&self) -> Result<Ed25519KeyPair, HsmError> {
        let result = self.run(Job::GenerateKey, &[])?;
        let pair = parse_key_pair(&result)?;
        info!(
            "Module generated key pair, pubkey: {}",
            hex::encode(pair.public_key)
        );
        Ok(pair)
    }

    fn sign_vote(&self, chain_id: &str, vote: &Vote) -> Result<Vec<u8>, HsmError> {
        debug!(
            "Sign vote: chain_id={}, height={}, round={}, type={:?}",
            chain_id, vote.height, vote.round, vote.vote_type
        );
        self.sign(Job::SignVote, &vote_payload(chain_id, vote)?)
    }

    fn sign_proposal(&self, chain_id: &str, proposal: &Proposal) -> Result<Vec<u8>, HsmError> {
        debug!(
            "Sign proposal: chain_id={}, height={}, round={}, pol_round={}",
            chain_id, proposal.height, proposal.round, proposal.pol_round
        );
        self.sign(Job::SignProposal, &proposal_payload(chain_id, proposal)?)
    }

    fn sign_heartbeat(&self, chain_id: &str, heartbeat: &Heartbeat) -> Result<Vec<u8>, HsmError> {
        debug!(
            "Sign heartbeat: chain_id={}, height={}, round={}, sequence={}",
            chain_id, heartbeat.height, heartbeat.round, heartbeat.sequence
        );
        self.sign(Job::SignHeartbeat, &heartbeat_payload(chain_id, heartbeat)?)
    }
}
