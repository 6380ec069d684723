//! Session handshake and data-phase operations (spec §4.5).
//!
//! Runs the host side of the X25519 ECDH + Ed25519 transcript-signature
//! handshake, then produces/consumes XSalsa20-Poly1305 ("secretbox") frames
//! with strictly monotonic sequence numbers for replay protection.
//! Grounded on `dl_crypto::x3dh`'s DH-then-transcript-sign shape and
//! `dl_crypto::session`'s session-lifecycle idiom, simplified to the single
//! fresh-ephemeral-per-session design this spec calls for (no ratchet).

use std::sync::Arc;

use pp_proto::{ErrorKind, ProtocolError};
use zeroize::Zeroize;

use crate::identity::IdentityStore;
use crate::pairing::PairingManager;
use crate::session_store::SessionStore;
use crate::util::{b64_decode, b64_encode};

const CLIENT_FINISH_TAG: &[u8] = b"pearpass/client-finish/v1";

pub struct BeginHandshakeResult {
    pub host_eph_pub_b64: String,
    pub signature_b64: String,
    pub session_id: String,
}

pub struct SealResult {
    pub nonce_b64: String,
    pub ciphertext_b64: String,
    pub seq: u64,
}

fn decode_32(s: &str, err: ErrorKind) -> Result<[u8; 32], ProtocolError> {
    let bytes = b64_decode(s).map_err(|e| ProtocolError::new(err, e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ProtocolError::new(err, format!("expected 32 bytes, got {}", bytes.len())));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Runs handshakes and encrypted-frame operations against a shared
/// `SessionStore`, `IdentityStore`, and `PairingManager`.
pub struct SessionManager {
    identity: Arc<IdentityStore>,
    pairing: Arc<PairingManager>,
    sessions: Arc<SessionStore>,
}

impl SessionManager {
    pub fn new(identity: Arc<IdentityStore>, pairing: Arc<PairingManager>, sessions: Arc<SessionStore>) -> Self {
        Self { identity, pairing, sessions }
    }

    /// Host side of the handshake: generates an ephemeral X25519 keypair,
    /// derives the shared secret, signs the transcript with the host's
    /// long-term Ed25519 key, and stores a new session.
    pub async fn begin_handshake(&self, ext_eph_pub_b64: &str) -> Result<BeginHandshakeResult, ProtocolError> {
        let peer_ed_pub_b64 = self
            .pairing
            .peer_public_key()
            .await
            .ok_or_else(|| ProtocolError::new(ErrorKind::NotPaired, "no peer is pinned"))?;
        let peer_ed_pub = decode_32(&peer_ed_pub_b64, ErrorKind::InvalidPeerPublicKey)?;

        let ed_sk = self
            .identity
            .signing_key()
            .await
            .ok_or_else(|| ProtocolError::new(ErrorKind::IdentityKeysUnavailable, "vault is locked"))?;

        let ext_eph_pub = decode_32(ext_eph_pub_b64, ErrorKind::InvalidPeerPublicKey)?;

        let mut host_eph = pp_crypto::x_keypair();
        let shared = pp_crypto::x_ecdh(&host_eph.secret, &ext_eph_pub).map_err(|e| {
            ProtocolError::new(ErrorKind::InvalidPeerPublicKey, e.to_string())
        })?;

        let mut transcript = Vec::with_capacity(96);
        transcript.extend_from_slice(&host_eph.public);
        transcript.extend_from_slice(&ext_eph_pub);
        transcript.extend_from_slice(&peer_ed_pub);

        let signature = pp_crypto::ed_sign(&ed_sk, &transcript)
            .map_err(|e| ProtocolError::new(ErrorKind::InvalidTranscript, e.to_string()))?;

        let session_id = self.sessions.create(shared, transcript);
        host_eph.secret.zeroize();

        Ok(BeginHandshakeResult {
            host_eph_pub_b64: b64_encode(&host_eph.public),
            signature_b64: b64_encode(&signature),
            session_id,
        })
    }

    /// Host verifies the extension's signature over the session transcript.
    /// Any failure after the initial lookup closes the session.
    pub async fn finish_handshake(&self, session_id: &str, client_sig_b64: &str) -> Result<(), ProtocolError> {
        if !self.sessions.exists(session_id) {
            return Err(ProtocolError::new(ErrorKind::SessionNotFound, "no such session"));
        }
        let already_verified = self
            .sessions
            .with_session(session_id, |s| s.peer_verified)
            .unwrap_or(false);
        if already_verified {
            return Ok(());
        }

        match self.finish_handshake_inner(session_id, client_sig_b64).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.sessions.close(session_id);
                Err(e)
            }
        }
    }

    async fn finish_handshake_inner(&self, session_id: &str, client_sig_b64: &str) -> Result<(), ProtocolError> {
        let peer_ed_pub_b64 = self
            .pairing
            .peer_public_key()
            .await
            .ok_or_else(|| ProtocolError::new(ErrorKind::PeerNotPaired, "no peer pinned"))?;
        let peer_ed_pub = decode_32(&peer_ed_pub_b64, ErrorKind::InvalidPeerPublicKey)?;

        let client_sig = b64_decode(client_sig_b64)
            .map_err(|e| ProtocolError::new(ErrorKind::InvalidClientSignature, e.to_string()))?;
        if client_sig.len() != 64 {
            return Err(ProtocolError::new(
                ErrorKind::InvalidClientSignature,
                format!("expected 64 bytes, got {}", client_sig.len()),
            ));
        }

        let transcript = self
            .sessions
            .with_session(session_id, |s| s.transcript.clone())
            .ok_or_else(|| ProtocolError::new(ErrorKind::SessionNotFound, "no such session"))?;
        if transcript.is_empty() {
            return Err(ProtocolError::new(ErrorKind::InvalidTranscript, "empty transcript"));
        }

        let mut client_transcript = Vec::with_capacity(CLIENT_FINISH_TAG.len() + session_id.len() + transcript.len());
        client_transcript.extend_from_slice(CLIENT_FINISH_TAG);
        client_transcript.extend_from_slice(session_id.as_bytes());
        client_transcript.extend_from_slice(&transcript);

        let ok = pp_crypto::ed_verify(&peer_ed_pub, &client_transcript, &client_sig)
            .map_err(|e| ProtocolError::new(ErrorKind::InvalidClientSignature, e.to_string()))?;
        if !ok {
            return Err(ProtocolError::new(ErrorKind::PeerSignatureInvalid, "client transcript signature invalid"));
        }

        self.sessions.with_session(session_id, |s| s.peer_verified = true);

        // No `confirmPeer` RPC exists (spec §6); confirmation piggybacks on
        // the first successful finish here (spec §4.5/§9), which is what
        // populates the unprotected cache `checkPairingStatus` reads.
        self.pairing.confirm_peer(&peer_ed_pub_b64).await?;
        Ok(())
    }

    /// Encrypts `plaintext` under the session key with a fresh random
    /// 24-byte nonce; `seq` is the post-increment send counter.
    pub fn seal(&self, session_id: &str, plaintext: &[u8]) -> Result<SealResult, ProtocolError> {
        let (key, seq) = self
            .sessions
            .with_session(session_id, |s| {
                s.send_seq += 1;
                (s.key, s.send_seq)
            })
            .ok_or_else(|| ProtocolError::new(ErrorKind::SessionNotFound, "no such session"))?;

        let nonce = pp_crypto::random_bytes(pp_crypto::SECRETBOX_NONCE_LEN);
        let ciphertext = pp_crypto::secretbox_seal(&key, &nonce, plaintext)
            .map_err(|e| ProtocolError::new(ErrorKind::DecryptFailed, e.to_string()))?;

        Ok(SealResult { nonce_b64: b64_encode(&nonce), ciphertext_b64: b64_encode(&ciphertext), seq })
    }

    /// Decrypts a frame, then enforces replay protection via `seq`.
    pub fn open(&self, session_id: &str, nonce_b64: &str, ciphertext_b64: &str, seq: u64) -> Result<Vec<u8>, ProtocolError> {
        let key = self
            .sessions
            .with_session(session_id, |s| s.key)
            .ok_or_else(|| ProtocolError::new(ErrorKind::SessionNotFound, "no such session"))?;

        let nonce = b64_decode(nonce_b64).map_err(|e| ProtocolError::new(ErrorKind::DecryptFailed, e.to_string()))?;
        if nonce.len() != pp_crypto::SECRETBOX_NONCE_LEN {
            return Err(ProtocolError::new(ErrorKind::DecryptFailed, "nonce must be 24 bytes"));
        }
        let ciphertext =
            b64_decode(ciphertext_b64).map_err(|e| ProtocolError::new(ErrorKind::DecryptFailed, e.to_string()))?;

        let plaintext = pp_crypto::secretbox_open(&key, &nonce, &ciphertext)
            .map_err(|e| ProtocolError::new(ErrorKind::DecryptFailed, e.to_string()))?;

        self.record_incoming_seq(session_id, seq)?;
        Ok(plaintext)
    }

    /// Enforces `seq > last_recv_seq`; on success, advances `last_recv_seq`.
    pub fn record_incoming_seq(&self, session_id: &str, seq: u64) -> Result<(), ProtocolError> {
        let result = self.sessions.with_session(session_id, |s| {
            if seq > s.last_recv_seq {
                s.last_recv_seq = seq;
                Ok(())
            } else {
                Err(ProtocolError::new(ErrorKind::ReplayDetected, format!("seq {seq} already seen or stale")))
            }
        });
        match result {
            Some(inner) => inner,
            None => Err(ProtocolError::new(ErrorKind::SessionNotFound, "no such session")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::test_util::InMemoryKv;
    use std::sync::Arc as StdArc;

    async fn setup() -> (SessionManager, Arc<PairingManager>, Arc<IdentityStore>, Arc<SessionStore>) {
        let kv: Arc<dyn crate::kv::KvStore> = StdArc::new(InMemoryKv::new());
        let identity = Arc::new(IdentityStore::new(kv.clone()));
        let pairing = Arc::new(PairingManager::new(kv, identity.clone()));
        let sessions = Arc::new(SessionStore::new());
        let mgr = SessionManager::new(identity.clone(), pairing.clone(), sessions.clone());
        (mgr, pairing, identity, sessions)
    }

    fn ext_identity() -> ([u8; 32], [u8; 64]) {
        let kp = pp_crypto::ed_keypair();
        (kp.public, kp.secret)
    }

    #[tokio::test]
    async fn full_handshake_and_seal_open_roundtrip() {
        let (mgr, pairing, _identity, _sessions) = setup().await;
        let (ext_ed_pub, ext_ed_sk) = ext_identity();
        let ext_ed_pub_b64 = b64_encode(&ext_ed_pub);
        pairing.pin_peer(&ext_ed_pub_b64).await.unwrap();

        let ext_x = pp_crypto::x_keypair();
        let begin = mgr.begin_handshake(&b64_encode(&ext_x.public)).await.unwrap();

        let host_eph_pub = decode_32(&begin.host_eph_pub_b64, ErrorKind::InvalidPeerPublicKey).unwrap();
        let mut client_transcript = Vec::new();
        client_transcript.extend_from_slice(CLIENT_FINISH_TAG);
        client_transcript.extend_from_slice(begin.session_id.as_bytes());
        client_transcript.extend_from_slice(&host_eph_pub);
        client_transcript.extend_from_slice(&ext_x.public);
        client_transcript.extend_from_slice(&ext_ed_pub);
        let client_sig = pp_crypto::ed_sign(&ext_ed_sk, &client_transcript).unwrap();

        mgr.finish_handshake(&begin.session_id, &b64_encode(&client_sig)).await.unwrap();
        // idempotent
        mgr.finish_handshake(&begin.session_id, &b64_encode(&client_sig)).await.unwrap();

        let sealed = mgr.seal(&begin.session_id, b"hello").unwrap();
        assert_eq!(sealed.seq, 1);
        let opened = mgr
            .open(&begin.session_id, &sealed.nonce_b64, &sealed.ciphertext_b64, sealed.seq)
            .unwrap();
        assert_eq!(opened, b"hello");
    }

    #[tokio::test]
    async fn replay_is_rejected_then_fresh_seq_accepted() {
        let (mgr, pairing, _identity, _sessions) = setup().await;
        let (ext_ed_pub, _sk) = ext_identity();
        pairing.pin_peer(&b64_encode(&ext_ed_pub)).await.unwrap();
        let ext_x = pp_crypto::x_keypair();
        let begin = mgr.begin_handshake(&b64_encode(&ext_x.public)).await.unwrap();

        let a = mgr.seal(&begin.session_id, b"one").unwrap();
        let b = mgr.seal(&begin.session_id, b"two").unwrap();

        mgr.open(&begin.session_id, &a.nonce_b64, &a.ciphertext_b64, a.seq).unwrap();
        let replay = mgr.open(&begin.session_id, &a.nonce_b64, &a.ciphertext_b64, a.seq);
        assert!(matches!(replay, Err(e) if e.kind == ErrorKind::ReplayDetected));

        mgr.open(&begin.session_id, &b.nonce_b64, &b.ciphertext_b64, b.seq).unwrap();
    }

    #[tokio::test]
    async fn bad_client_signature_closes_session() {
        let (mgr, pairing, _identity, _sessions) = setup().await;
        let (ext_ed_pub, _sk) = ext_identity();
        pairing.pin_peer(&b64_encode(&ext_ed_pub)).await.unwrap();
        let ext_x = pp_crypto::x_keypair();
        let begin = mgr.begin_handshake(&b64_encode(&ext_x.public)).await.unwrap();

        let bogus_sig = b64_encode(&[0u8; 64]);
        let result = mgr.finish_handshake(&begin.session_id, &bogus_sig).await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::PeerSignatureInvalid));

        let after = mgr.finish_handshake(&begin.session_id, &bogus_sig).await;
        assert!(matches!(after, Err(e) if e.kind == ErrorKind::SessionNotFound));
    }

    #[tokio::test]
    async fn begin_handshake_requires_pairing() {
        let (mgr, _pairing, _identity, _sessions) = setup().await;
        let ext_x = pp_crypto::x_keypair();
        let result = mgr.begin_handshake(&b64_encode(&ext_x.public)).await;
        assert!(matches!(result, Err(e) if e.kind == ErrorKind::NotPaired));
    }
}
