//! Job framing and response classification for the signing module.
//!
//! Request frame (all integers little-endian):
//!
//! ```text
//! ┌──────────────────┬───────────────┬──────────────────────────┐
//! │ total_len: u32   │ job: u32      │ payload (word-aligned)   │
//! └──────────────────┴───────────────┴──────────────────────────┘
//! ```
//!
//! `total_len` covers the job number and the payload. Responses start
//! with a redundant length word, followed by a response code and a
//! code-specific body.

use std::fmt;

use thiserror::Error;

use crate::codec::{CodecError, Decoder, WORD_SIZE};

/// Operations the signing module accepts, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Job {
    LoadKey = 0,
    GenerateKey = 1,
    SignVote = 2,
    SignProposal = 3,
    SignHeartbeat = 4,
}

impl Job {
    pub const ALL: [Job; 5] = [
        Job::LoadKey,
        Job::GenerateKey,
        Job::SignVote,
        Job::SignProposal,
        Job::SignHeartbeat,
    ];

    pub fn number(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Job::LoadKey => "load-key",
            Job::GenerateKey => "generate-key",
            Job::SignVote => "sign-vote",
            Job::SignProposal => "sign-proposal",
            Job::SignHeartbeat => "sign-heartbeat",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response codes written by the module after the redundant length word.
pub const RESPONSE_OK: i32 = 0;
pub const RESPONSE_ERROR: i32 = 1;
pub const RESPONSE_PROCESSING_ERROR: i32 = 2;

/// Size of `total_len` plus the job number.
pub const FRAME_HEADER_SIZE: usize = 2 * WORD_SIZE;

/// Errors caused by a response the client cannot interpret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed module response: {0}")]
    Codec(#[from] CodecError),

    #[error("unknown response code: {0}")]
    UnknownResponseCode(i32),
}

/// A classified module response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleResponse {
    /// Job succeeded; the payload still needs job-specific decoding.
    Success(Vec<u8>),
    /// The module rejected the job.
    ModuleError(String),
    /// The module failed while running the job.
    ProcessingError { message: String, code: i32 },
}

/// Builds the request frame for `job` around an already encoded payload.
///
/// Returns `None` if the frame would not fit the 32-bit length field.
pub fn build_frame(job: Job, payload: &[u8]) -> Option<Vec<u8>> {
    let total = u32::try_from(WORD_SIZE + payload.len()).ok()?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&total.to_le_bytes());
    frame.extend_from_slice(&job.number().to_le_bytes());
    frame.extend_from_slice(payload);
    Some(frame)
}

/// Classifies a raw module response.
pub fn decode_response(raw: &[u8]) -> Result<ModuleResponse, ProtocolError> {
    let mut dec = Decoder::new(raw);
    dec.skip(WORD_SIZE)?;

    match dec.get_i32()? {
        RESPONSE_OK => Ok(ModuleResponse::Success(dec.get_bytes()?.to_vec())),
        RESPONSE_ERROR => Ok(ModuleResponse::ModuleError(dec.get_text()?)),
        RESPONSE_PROCESSING_ERROR => {
            let message = dec.get_text()?;
            let code = dec.get_i32()?;
            Ok(ModuleResponse::ProcessingError { message, code })
        }
        other => Err(ProtocolError::UnknownResponseCode(other)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::Encoder;

    /// Encodes a module response the way the module writes it.
    pub(crate) fn response_bytes(code: i32, body: &[u8]) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.put_i32((WORD_SIZE + body.len()) as i32).put_i32(code);
        let mut out = enc.into_bytes();
        out.extend_from_slice(body);
        out
    }

    pub(crate) fn success_bytes(payload: &[u8]) -> Vec<u8> {
        let mut body = Encoder::new();
        body.put_bytes(payload).unwrap();
        response_bytes(RESPONSE_OK, body.as_bytes())
    }

    #[test]
    fn test_job_numbers() {
        let numbers: Vec<u32> = Job::ALL.iter().map(|j| j.number()).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_frame_layout() {
        let payload = [1u8, 2, 3, 0];
        let frame = build_frame(Job::SignProposal, &payload).unwrap();

        assert_eq!(frame.len(), FRAME_HEADER_SIZE + payload.len());
        assert_eq!(&frame[0..4], &8u32.to_le_bytes());
        assert_eq!(&frame[4..8], &3u32.to_le_bytes());
        assert_eq!(&frame[8..], &payload);
    }

    #[test]
    fn test_frame_empty_payload() {
        let frame = build_frame(Job::GenerateKey, &[]).unwrap();
        assert_eq!(frame, vec![4, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_decode_success() {
        let raw = success_bytes(b"signature");
        assert_eq!(
            decode_response(&raw).unwrap(),
            ModuleResponse::Success(b"signature".to_vec())
        );
    }

    #[test]
    fn test_decode_module_error() {
        let mut body = Encoder::new();
        body.put_text("key not loaded").unwrap();
        let raw = response_bytes(RESPONSE_ERROR, body.as_bytes());

        assert_eq!(
            decode_response(&raw).unwrap(),
            ModuleResponse::ModuleError("key not loaded".to_string())
        );
    }

    #[test]
    fn test_decode_processing_error() {
        let mut body = Encoder::new();
        body.put_text("height regression").unwrap().put_i32(17);
        let raw = response_bytes(RESPONSE_PROCESSING_ERROR, body.as_bytes());

        assert_eq!(
            decode_response(&raw).unwrap(),
            ModuleResponse::ProcessingError {
                message: "height regression".to_string(),
                code: 17,
            }
        );
    }

    #[test]
    fn test_decode_unknown_code() {
        let raw = response_bytes(3, &[]);
        assert_eq!(
            decode_response(&raw),
            Err(ProtocolError::UnknownResponseCode(3))
        );
    }

    #[test]
    fn test_decode_short_response_is_protocol_error() {
        assert!(matches!(
            decode_response(&[0, 0]),
            Err(ProtocolError::Codec(CodecError::TruncatedInput { .. }))
        ));

        // Processing error missing its trailing code
        let mut body = Encoder::new();
        body.put_text("oops").unwrap();
        let raw = response_bytes(RESPONSE_PROCESSING_ERROR, body.as_bytes());
        assert!(matches!(
            decode_response(&raw),
            Err(ProtocolError::Codec(CodecError::TruncatedInput { .. }))
        ));
    }
}
