//! RPC façade (spec §4.6): a single named-dispatch entry point tying
//! identity, pairing, session store, and session manager together, with
//! required-parameter validation and the native-messaging enable gate.
//! Grounded on `dl-secure-channel/src-tauri/src/commands/vault.rs`'s
//! command-handler shape and `state.rs`'s shared-state wiring.

use std::sync::Arc;

use pp_proto::rpc::{
    BeginHandshakeRequest, BeginHandshakeResponse, CheckPairingStatusRequest, CheckPairingStatusResponse,
    CloseSessionRequest, FinishHandshakeRequest, GetAppIdentityRequest, GetAppIdentityResponse, OkResponse,
    OpenRequest, OpenResponse, ResetPairingResponse, SealRequest, SealResponse,
};
use pp_proto::{ErrorKind, ProtocolError};
use serde_json::Value;
use tracing::instrument;

use crate::identity::IdentityStore;
use crate::pairing::{PairingError, PairingManager};
use crate::session::SessionManager;
use crate::session_store::SessionStore;
use crate::util::b64_encode;
use crate::Config;

impl From<PairingError> for ProtocolError {
    fn from(e: PairingError) -> Self {
        let kind = match e {
            PairingError::PeerAlreadyPaired => ErrorKind::PeerAlreadyPaired,
            PairingError::NoPendingPairing => ErrorKind::NoPendingPairing,
            PairingError::PeerKeyMismatch => ErrorKind::PeerKeyMismatch,
            PairingError::InvalidPeerPublicKey => ErrorKind::InvalidPeerPublicKey,
        };
        ProtocolError::new(kind, e.to_string())
    }
}

/// Ties the four stateful components together behind named operations.
/// One `Facade` per running host; cheap to clone (everything inside is
/// `Arc`-wrapped).
pub struct Facade {
    identity: Arc<IdentityStore>,
    pairing: Arc<PairingManager>,
    sessions: Arc<SessionStore>,
    session_mgr: SessionManager,
    config: Config,
}

impl Facade {
    pub fn new(kv: Arc<dyn crate::kv::KvStore>, config: Config) -> Self {
        let identity = Arc::new(IdentityStore::new(kv.clone()));
        let pairing = Arc::new(PairingManager::new(kv, identity.clone()));
        let sessions = Arc::new(SessionStore::new());
        let session_mgr = SessionManager::new(identity.clone(), pairing.clone(), sessions.clone());
        Self { identity, pairing, sessions, session_mgr, config }
    }

    fn require_native_messaging(&self) -> Result<(), ProtocolError> {
        if !self.config.native_messaging_enabled {
            return Err(ProtocolError::new(ErrorKind::NativeMessagingDisabled, "native messaging is disabled"));
        }
        Ok(())
    }

    /// Returns the host's public identity after verifying the pairing token
    /// and pinning the caller's long-term public key.
    #[instrument(skip_all)]
    pub async fn get_app_identity(&self, req: GetAppIdentityRequest) -> Result<GetAppIdentityResponse, ProtocolError> {
        self.require_native_messaging()?;
        if req.pairing_token.is_empty() {
            return Err(ProtocolError::new(ErrorKind::PairingTokenRequired, "pairing token is required"));
        }
        if req.peer_ed_pub_b64.is_empty() {
            return Err(ProtocolError::new(ErrorKind::PeerPublicKeyRequired, "peer public key is required"));
        }
        if !self.pairing.verify_pairing_code(&req.pairing_token).await {
            return Err(ProtocolError::new(ErrorKind::InvalidPairingToken, "pairing token does not match"));
        }
        self.pairing.pin_peer(&req.peer_ed_pub_b64).await?;

        let identity = self.identity.get_or_create().await;
        Ok(GetAppIdentityResponse {
            ed_pub: b64_encode(&identity.ed_pub),
            x_pub: b64_encode(&identity.x_pub),
            fingerprint: IdentityStore::get_fingerprint(&identity.ed_pub),
        })
    }

    #[instrument(skip_all)]
    pub async fn begin_handshake(&self, req: BeginHandshakeRequest) -> Result<BeginHandshakeResponse, ProtocolError> {
        self.require_native_messaging()?;
        if req.ext_eph_pub_b64.is_empty() {
            return Err(ProtocolError::new(ErrorKind::MissingEphemeralPublicKey, "ext_eph_pub_b64 is required"));
        }
        let result = self.session_mgr.begin_handshake(&req.ext_eph_pub_b64).await?;
        Ok(BeginHandshakeResponse {
            host_eph_pub_b64: result.host_eph_pub_b64,
            signature_b64: result.signature_b64,
            session_id: result.session_id,
        })
    }

    #[instrument(skip_all)]
    pub async fn finish_handshake(&self, req: FinishHandshakeRequest) -> Result<OkResponse, ProtocolError> {
        self.require_native_messaging()?;
        if req.session_id.is_empty() {
            return Err(ProtocolError::new(ErrorKind::MissingSessionId, "session_id is required"));
        }
        if req.client_sig_b64.is_empty() {
            return Err(ProtocolError::new(ErrorKind::MissingClientSignature, "client_sig_b64 is required"));
        }
        self.session_mgr.finish_handshake(&req.session_id, &req.client_sig_b64).await?;
        Ok(OkResponse { ok: true })
    }

    #[instrument(skip_all)]
    pub async fn close_session(&self, req: CloseSessionRequest) -> Result<OkResponse, ProtocolError> {
        self.require_native_messaging()?;
        if req.session_id.is_empty() {
            return Err(ProtocolError::new(ErrorKind::MissingSessionId, "session_id is required"));
        }
        Ok(OkResponse { ok: self.sessions.close(&req.session_id) })
    }

    #[instrument(skip_all)]
    pub async fn check_pairing_status(
        &self,
        req: CheckPairingStatusRequest,
    ) -> Result<CheckPairingStatusResponse, ProtocolError> {
        self.require_native_messaging()?;
        if req.peer_ed_pub_b64.is_empty() {
            return Err(ProtocolError::new(ErrorKind::PeerPublicKeyRequired, "peer public key is required"));
        }
        Ok(CheckPairingStatusResponse { paired: self.pairing.is_paired(&req.peer_ed_pub_b64).await })
    }

    /// Clears every session, mints a fresh identity, and clears the peer
    /// record, in that order (sessions first so no live channel outlives the
    /// identity that authenticated it).
    #[instrument(skip_all)]
    pub async fn reset_pairing(&self) -> Result<ResetPairingResponse, ProtocolError> {
        self.require_native_messaging()?;
        let cleared_sessions = self.sessions.clear_all();
        let new_identity = self.identity.reset_keys().await;
        self.pairing.clear().await;
        Ok(ResetPairingResponse {
            ok: true,
            cleared_sessions,
            new_identity: b64_encode(&new_identity.ed_pub),
        })
    }

    #[instrument(skip_all)]
    pub async fn seal(&self, req: SealRequest) -> Result<SealResponse, ProtocolError> {
        self.require_native_messaging()?;
        if req.session_id.is_empty() {
            return Err(ProtocolError::new(ErrorKind::MissingSessionId, "session_id is required"));
        }
        let plaintext = crate::util::b64_decode(&req.plaintext_b64)
            .map_err(|e| ProtocolError::new(ErrorKind::DecryptFailed, e.to_string()))?;
        let sealed = self.session_mgr.seal(&req.session_id, &plaintext)?;
        Ok(SealResponse { nonce_b64: sealed.nonce_b64, ciphertext_b64: sealed.ciphertext_b64, seq: sealed.seq })
    }

    #[instrument(skip_all)]
    pub async fn open(&self, req: OpenRequest) -> Result<OpenResponse, ProtocolError> {
        self.require_native_messaging()?;
        if req.session_id.is_empty() {
            return Err(ProtocolError::new(ErrorKind::MissingSessionId, "session_id is required"));
        }
        let plaintext = self.session_mgr.open(&req.session_id, &req.nonce_b64, &req.ciphertext_b64, req.seq)?;
        Ok(OpenResponse { plaintext_b64: b64_encode(&plaintext) })
    }

    /// Named-dispatch entry point for a transport that hands over
    /// `(name, params)` pairs (native messaging framing is an external
    /// collaborator — see spec.md §1).
    pub async fn dispatch(&self, name: &str, params: Value) -> Result<Value, ProtocolError> {
        fn parse<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, ProtocolError> {
            serde_json::from_value(params).map_err(|e| ProtocolError::new(ErrorKind::MissingField, e.to_string()))
        }
        fn to_value<T: serde::Serialize>(v: T) -> Result<Value, ProtocolError> {
            serde_json::to_value(v).map_err(|e| ProtocolError::new(ErrorKind::MissingField, e.to_string()))
        }

        match name {
            "getAppIdentity" => to_value(self.get_app_identity(parse(params)?).await?),
            "beginHandshake" => to_value(self.begin_handshake(parse(params)?).await?),
            "finishHandshake" => to_value(self.finish_handshake(parse(params)?).await?),
            "closeSession" => to_value(self.close_session(parse(params)?).await?),
            "checkPairingStatus" => to_value(self.check_pairing_status(parse(params)?).await?),
            "resetPairing" => to_value(self.reset_pairing().await?),
            "seal" => to_value(self.seal(parse(params)?).await?),
            "open" => to_value(self.open(parse(params)?).await?),
            other => Err(ProtocolError::new(ErrorKind::MissingField, format!("unknown operation `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::test_util::InMemoryKv;
    use serde_json::json;

    fn facade() -> Facade {
        let kv: Arc<dyn crate::kv::KvStore> = Arc::new(InMemoryKv::new());
        Facade::new(kv, Config { native_messaging_enabled: true })
    }

    #[tokio::test]
    async fn disabled_native_messaging_blocks_every_operation() {
        let kv: Arc<dyn crate::kv::KvStore> = Arc::new(InMemoryKv::new());
        let f = Facade::new(kv, Config { native_messaging_enabled: false });
        let result = f
            .check_pairing_status(CheckPairingStatusRequest { peer_ed_pub_b64: "x".into() })
            .await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::NativeMessagingDisabled));
    }

    #[tokio::test]
    async fn get_app_identity_requires_valid_pairing_token() {
        let f = facade();
        let peer = pp_crypto::ed_keypair();
        let result = f
            .get_app_identity(GetAppIdentityRequest {
                pairing_token: "000000-0000".into(),
                peer_ed_pub_b64: b64_encode(&peer.public),
            })
            .await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::InvalidPairingToken));
    }

    #[tokio::test]
    async fn happy_path_pairing_then_status_then_reset() {
        let f = facade();
        let peer = pp_crypto::ed_keypair();
        let token = f.pairing.pairing_code().await;

        let identity = f
            .get_app_identity(GetAppIdentityRequest { pairing_token: token, peer_ed_pub_b64: b64_encode(&peer.public) })
            .await
            .unwrap();
        assert_eq!(identity.fingerprint.len(), 64);

        f.pairing.confirm_peer(&b64_encode(&peer.public)).await.unwrap();
        let status = f
            .check_pairing_status(CheckPairingStatusRequest { peer_ed_pub_b64: b64_encode(&peer.public) })
            .await
            .unwrap();
        assert!(status.paired);

        let reset = f.reset_pairing().await.unwrap();
        assert!(reset.ok);
        let status_after = f
            .check_pairing_status(CheckPairingStatusRequest { peer_ed_pub_b64: b64_encode(&peer.public) })
            .await
            .unwrap();
        assert!(!status_after.paired);
    }

    #[tokio::test]
    async fn second_peer_cannot_pin_over_an_existing_one() {
        let f = facade();
        let peer_a = pp_crypto::ed_keypair();
        let peer_b = pp_crypto::ed_keypair();
        let token = f.pairing.pairing_code().await;

        f.get_app_identity(GetAppIdentityRequest { pairing_token: token.clone(), peer_ed_pub_b64: b64_encode(&peer_a.public) })
            .await
            .unwrap();

        let result = f
            .get_app_identity(GetAppIdentityRequest { pairing_token: token, peer_ed_pub_b64: b64_encode(&peer_b.public) })
            .await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::PeerAlreadyPaired));
    }

    #[tokio::test]
    async fn dispatch_routes_by_name_and_rejects_unknown() {
        let f = facade();
        let err = f.dispatch("doesNotExist", json!({})).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingField);
    }
}
