//! Client side of a consensus signing module running inside an HSM.
//!
//! The validator's Ed25519 key is created inside the module and only ever
//! leaves it wrapped. Signing happens by sending a job over TCP to the
//! module, which answers with the signature.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐   TCP, one job     ┌─────────────────┐
//! │  Validator      │ ─────────────────► │  Signing module │
//! │  (ThalesHsm)    │ ◄───────────────── │  (inside HSM)   │
//! └─────────────────┘   response, close  └─────────────────┘
//! ```
//!
//! - [`codec`]: word-aligned values (byte strings, 32/64-bit ints, text)
//! - [`protocol`]: job numbers, request frames, response classification
//! - [`dispatch`]: one connection per job, optional deadline
//! - [`thales`]: job payloads and result parsing behind the [`Hsm`] trait

pub mod codec;
pub mod dispatch;
pub mod hsm;
pub mod protocol;
pub mod thales;
pub mod types;

#[cfg(test)]
mod test_util;

pub use codec::{CodecError, Value};
pub use dispatch::{send_job, Endpoint, TransportError};
pub use hsm::{Hsm, HsmError};
pub use protocol::{decode_response, Job, ModuleResponse, ProtocolError};
pub use thales::ThalesHsm;
pub use types::{
    canonical_time, BlockId, Ed25519KeyPair, Heartbeat, PartSetHeader, Proposal, Signature,
    SignatureLengthError, Vote, VoteType, NO_POL_ROUND, PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
    WRAPPED_PRIVATE_KEY_SIZE,
};
