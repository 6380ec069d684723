//! Pairing code derivation/verification and peer pinning (spec §4.3).
//!
//! Grounded on `dl_store::vault::Vault`'s unprotected-cache-while-locked
//! pattern and `dl_crypto::identity::DeviceCert`'s sign/verify-then-trust
//! shape, adapted to the simpler pin-then-confirm state machine this spec
//! calls for.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::identity::IdentityStore;
use crate::kv::{KvStore, KvValue};
use crate::util::b64_decode;

const KEY_PEER_DATA: &str = "peer.data";
const PAIRING_CODE_TAG: &[u8] = b"pearpass/pairingcode/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PairingState {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PeerRecord {
    #[serde(rename = "publicKey")]
    public_key: String,
    #[serde(rename = "pairingState")]
    pairing_state: PairingState,
}

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error("a different peer is already pinned")]
    PeerAlreadyPaired,
    #[error("no pending pairing to confirm")]
    NoPendingPairing,
    #[error("confirmed peer key does not match the pinned key")]
    PeerKeyMismatch,
    #[error("invalid base64 peer public key")]
    InvalidPeerPublicKey,
}

/// Derives and verifies the human-readable pairing code, pins the peer's
/// long-term public key, and tracks the two-state pairing lifecycle
/// (`absent -> PENDING -> CONFIRMED`, both states resettable to `absent`).
pub struct PairingManager {
    kv: Arc<dyn KvStore>,
    identity: Arc<IdentityStore>,
    /// Mirrors the confirmed peer's Ed25519 public key (base64). Readable
    /// while the KV store is locked. MUST remain empty while PENDING.
    unprotected_cache: RwLock<Option<String>>,
}

impl PairingManager {
    pub fn new(kv: Arc<dyn KvStore>, identity: Arc<IdentityStore>) -> Self {
        Self { kv, identity, unprotected_cache: RwLock::new(None) }
    }

    /// `fmt("%06d-%04X", u32(h[0..4]) mod 1_000_000, u16(h[4..6]))` where
    /// `h = sha256("pearpass/pairingcode/v1" || secret || pk)` (spec §4.3,
    /// documented-preimage resolution of the Open Question — see DESIGN.md).
    pub fn derive_pairing_code(pairing_secret: &[u8; 32], ed_pub: &[u8; 32]) -> String {
        let mut preimage = Vec::with_capacity(PAIRING_CODE_TAG.len() + 32 + 32);
        preimage.extend_from_slice(PAIRING_CODE_TAG);
        preimage.extend_from_slice(pairing_secret);
        preimage.extend_from_slice(ed_pub);
        let h = pp_crypto::sha256(&preimage);

        let n = u32::from_be_bytes([h[0], h[1], h[2], h[3]]) % 1_000_000;
        let tail = u16::from_be_bytes([h[4], h[5]]);
        format!("{n:06}-{tail:04X}")
    }

    /// Convenience combining identity + secret into the current pairing code.
    pub async fn pairing_code(&self) -> String {
        let identity = self.identity.get_or_create().await;
        let secret = self.identity.get_pairing_secret().await;
        Self::derive_pairing_code(&secret, &identity.ed_pub)
    }

    /// Case-insensitive, constant-time comparison against the expected code.
    /// Empty or malformed input returns `false` rather than erroring.
    pub async fn verify_pairing_code(&self, user_input: &str) -> bool {
        if user_input.is_empty() {
            return false;
        }
        let expected = self.pairing_code().await;
        pp_crypto::ct_eq(expected.to_uppercase().as_bytes(), user_input.to_uppercase().as_bytes())
    }

    async fn load_peer(&self) -> Option<PeerRecord> {
        match self.kv.kv_get(KEY_PEER_DATA).await.ok()? {
            KvValue::Present(raw) if !raw.is_empty() => serde_json::from_str(&raw).ok(),
            _ => None,
        }
    }

    async fn save_peer(&self, record: &PeerRecord) {
        if let Ok(json) = serde_json::to_string(record) {
            let _ = self.kv.kv_put(KEY_PEER_DATA, &json).await;
        }
    }

    fn decode_peer_key(peer_ed_pub_b64: &str) -> Result<[u8; 32], PairingError> {
        let bytes = b64_decode(peer_ed_pub_b64).map_err(|_| PairingError::InvalidPeerPublicKey)?;
        if bytes.len() != 32 {
            return Err(PairingError::InvalidPeerPublicKey);
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Pins the peer's public key as `PENDING`. A second call with the same
    /// key is a no-op; a call with a different key while a record already
    /// exists fails with `PeerAlreadyPaired`.
    pub async fn pin_peer(&self, peer_ed_pub_b64: &str) -> Result<(), PairingError> {
        Self::decode_peer_key(peer_ed_pub_b64)?;

        if let Some(existing) = self.load_peer().await {
            if existing.public_key == peer_ed_pub_b64 {
                return Ok(());
            }
            return Err(PairingError::PeerAlreadyPaired);
        }

        self.save_peer(&PeerRecord {
            public_key: peer_ed_pub_b64.to_string(),
            pairing_state: PairingState::Pending,
        })
        .await;
        Ok(())
    }

    /// Transitions `PENDING -> CONFIRMED` for the matching peer key, then
    /// mirrors the key into the unprotected cache.
    pub async fn confirm_peer(&self, peer_ed_pub_b64: &str) -> Result<(), PairingError> {
        let existing = self.load_peer().await.ok_or(PairingError::NoPendingPairing)?;
        if existing.public_key != peer_ed_pub_b64 {
            return Err(PairingError::PeerKeyMismatch);
        }

        self.save_peer(&PeerRecord {
            public_key: existing.public_key.clone(),
            pairing_state: PairingState::Confirmed,
        })
        .await;

        let mut cache = self.unprotected_cache.write().await;
        *cache = Some(existing.public_key);
        Ok(())
    }

    pub async fn peer_public_key(&self) -> Option<String> {
        self.load_peer().await.map(|p| p.public_key)
    }

    pub async fn peer_state(&self) -> Option<PairingState> {
        self.load_peer().await.map(|p| p.pairing_state)
    }

    /// True iff `peer_ed_pub_b64` byte-equals the peer mirrored into the
    /// unprotected cache (base64 decode compared, not the encoded strings).
    /// Backs `checkPairingStatus` (spec §6: "uses unprotected cache"), so
    /// this reads while the vault is locked and is `false` for a peer that
    /// is only `PENDING` — confirmation is what populates the cache.
    pub async fn is_paired(&self, peer_ed_pub_b64: &str) -> bool {
        let Ok(candidate) = Self::decode_peer_key(peer_ed_pub_b64) else { return false };
        let Some(cached_b64) = self.unprotected_peer_key().await else { return false };
        let Ok(cached) = Self::decode_peer_key(&cached_b64) else { return false };
        candidate == cached
    }

    /// Unprotected-cache read used by status queries that must work while
    /// the vault is locked. Empty unless a peer has reached `CONFIRMED`.
    pub async fn unprotected_peer_key(&self) -> Option<String> {
        self.unprotected_cache.read().await.clone()
    }

    /// Clears the peer record and the unprotected cache. Used by the
    /// façade's `resetPairing` orchestration (see `facade::Facade`).
    pub async fn clear(&self) {
        let _ = self.kv.kv_put(KEY_PEER_DATA, "").await;
        let mut cache = self.unprotected_cache.write().await;
        *cache = None;
    }
}
