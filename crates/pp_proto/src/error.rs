//! The stable error-code taxonomy of the RPC surface (spec §7).
//!
//! `ErrorKind` is the wire-stable symbol; `ProtocolError` pairs it with a
//! human-readable detail string and is what every façade operation returns
//! on its error path. Serialises to the on-wire `{code, message}` shape.

use serde::Serialize;
use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    PairingTokenRequired,
    PeerPublicKeyRequired,
    InvalidPairingToken,
    InvalidPairingSecret,
    PeerAlreadyPaired,
    NotPaired,
    PeerNotPaired,
    NoPendingPairing,
    PeerKeyMismatch,
    MissingEphemeralPublicKey,
    MissingSessionId,
    MissingClientSignature,
    SessionNotFound,
    InvalidPeerPublicKey,
    InvalidClientSignature,
    InvalidTranscript,
    PeerSignatureInvalid,
    DecryptFailed,
    InvalidSeq,
    ReplayDetected,
    IdentityKeysUnavailable,
    NativeMessagingDisabled,
    MissingField,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {detail}")]
pub struct ProtocolError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl ProtocolError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }
}

/// On-wire shape: `{"code": "...", "message": "..."}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorKind,
    pub message: String,
}

impl From<&ProtocolError> for ErrorResponse {
    fn from(e: &ProtocolError) -> Self {
        ErrorResponse { code: e.kind, message: e.detail.clone() }
    }
}

impl From<ProtocolError> for ErrorResponse {
    fn from(e: ProtocolError) -> Self {
        ErrorResponse::from(&e)
    }
}
