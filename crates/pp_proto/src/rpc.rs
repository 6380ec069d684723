//! RPC request/response types shared between the façade and its transport.
//! These map directly to JSON bodies on the native-messaging wire (spec §6).

use serde::{Deserialize, Serialize};

// ── getAppIdentity ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct GetAppIdentityRequest {
    pub pairing_token: String,
    pub peer_ed_pub_b64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetAppIdentityResponse {
    pub ed_pub: String,
    pub x_pub: String,
    pub fingerprint: String,
}

// ── beginHandshake ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct BeginHandshakeRequest {
    pub ext_eph_pub_b64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BeginHandshakeResponse {
    pub host_eph_pub_b64: String,
    pub signature_b64: String,
    pub session_id: String,
}

// ── finishHandshake ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FinishHandshakeRequest {
    pub session_id: String,
    pub client_sig_b64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

// ── closeSession ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CloseSessionRequest {
    pub session_id: String,
}

// ── checkPairingStatus ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CheckPairingStatusRequest {
    pub peer_ed_pub_b64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckPairingStatusResponse {
    pub paired: bool,
}

// ── resetPairing ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ResetPairingResponse {
    pub ok: bool,
    pub cleared_sessions: usize,
    pub new_identity: String,
}

// ── data-phase (not on the named §6 surface, but used by hosts embedding the
//    façade directly rather than through RPC; kept alongside the rest of the
//    wire types since they share the same base64-envelope shape) ───────────

#[derive(Debug, Clone, Deserialize)]
pub struct SealRequest {
    pub session_id: String,
    pub plaintext_b64: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SealResponse {
    pub nonce_b64: String,
    pub ciphertext_b64: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenRequest {
    pub session_id: String,
    pub nonce_b64: String,
    pub ciphertext_b64: String,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenResponse {
    pub plaintext_b64: String,
}
