//! Long-term identity management (spec §4.2).
//!
//! Persists the host's Ed25519 signing keypair, X25519 ECDH keypair,
//! creation timestamp, and 32-byte pairing secret via the KV store, with an
//! in-memory fallback so a locked vault doesn't block first-run pairing.
//! Grounded on `dl_store::vault::Vault`'s unlock/lock/with_key shape
//! (`Arc<RwLock<Option<...>>>`, touch-on-access) and on `dl_crypto::identity`
//! for the keypair-generation idiom.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use zeroize::ZeroizeOnDrop;

use crate::kv::{KvStore, KvValue};
use crate::util::{b64_decode, b64_encode};

const KEY_ED25519: &str = "id.ed25519";
const KEY_X25519: &str = "id.x25519";
const KEY_CREATED_AT: &str = "id.createdAt";
const KEY_PAIRING_SECRET: &str = "id.pairingSecret";

/// Full identity, including secret material. Lives only in the memory
/// cache and never crosses an API boundary in this form. Secret fields are
/// wiped on drop (grounded on `dl_crypto::identity::DeviceKeyPair`'s
/// `ZeroizeOnDrop` use); public fields and the timestamp are skipped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct IdentitySecret {
    #[zeroize(skip)]
    pub ed_pub: [u8; 32],
    pub ed_sk: [u8; 64],
    #[zeroize(skip)]
    pub x_pub: [u8; 32],
    pub x_sk: [u8; 32],
    #[zeroize(skip)]
    pub created_at: DateTime<Utc>,
    pub pairing_secret: [u8; 32],
}

/// Public-facing identity fields, safe to return to a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPublic {
    pub ed_pub: [u8; 32],
    pub x_pub: [u8; 32],
    pub created_at: DateTime<Utc>,
}

impl From<&IdentitySecret> for IdentityPublic {
    fn from(s: &IdentitySecret) -> Self {
        IdentityPublic { ed_pub: s.ed_pub, x_pub: s.x_pub, created_at: s.created_at }
    }
}

/// Persists/loads the host's long-term identity, with a memory-cache
/// fallback for when the KV store is locked (spec §4.2).
pub struct IdentityStore {
    kv: Arc<dyn KvStore>,
    mem: RwLock<Option<IdentitySecret>>,
}

fn generate_identity() -> IdentitySecret {
    let ed = pp_crypto::ed_keypair();
    let x = pp_crypto::x_keypair();
    IdentitySecret {
        ed_pub: ed.public,
        ed_sk: ed.secret,
        x_pub: x.public,
        x_sk: x.secret,
        created_at: Utc::now(),
        pairing_secret: {
            let mut s = [0u8; 32];
            s.copy_from_slice(&pp_crypto::random_bytes(32));
            s
        },
    }
}

impl IdentityStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv, mem: RwLock::new(None) }
    }

    /// Best-effort load of a complete identity from the KV store. Returns
    /// `None` if any of the four fields is missing, malformed, or the store
    /// is locked — per the "all five fields present together or the
    /// identity is considered absent" invariant (the fifth field, the
    /// pairing secret, is handled by `get_pairing_secret`).
    async fn load_from_kv(&self) -> Option<IdentitySecret> {
        let ed_b64 = match self.kv.kv_get(KEY_ED25519).await.ok()? {
            KvValue::Present(v) => v,
            KvValue::Missing => return None,
        };
        let x_b64 = match self.kv.kv_get(KEY_X25519).await.ok()? {
            KvValue::Present(v) => v,
            KvValue::Missing => return None,
        };
        let created_at_raw = match self.kv.kv_get(KEY_CREATED_AT).await.ok()? {
            KvValue::Present(v) => v,
            KvValue::Missing => return None,
        };

        let ed_bytes = b64_decode(&ed_b64).ok()?;
        if ed_bytes.len() != 96 {
            return None;
        }
        let x_bytes = b64_decode(&x_b64).ok()?;
        if x_bytes.len() != 64 {
            return None;
        }
        let created_at = DateTime::parse_from_rfc3339(&created_at_raw).ok()?.with_timezone(&Utc);

        let mut ed_pub = [0u8; 32];
        ed_pub.copy_from_slice(&ed_bytes[..32]);
        let mut ed_sk = [0u8; 64];
        ed_sk.copy_from_slice(&ed_bytes[32..]);
        let mut x_pub = [0u8; 32];
        x_pub.copy_from_slice(&x_bytes[..32]);
        let mut x_sk = [0u8; 32];
        x_sk.copy_from_slice(&x_bytes[32..]);

        // Invariant: all five fields present together or the identity is
        // considered absent — a missing pairing secret with the other four
        // fields present is partial state, not a valid identity.
        let pairing_secret = self.load_pairing_secret_from_kv().await?;

        Some(IdentitySecret { ed_pub, ed_sk, x_pub, x_sk, created_at, pairing_secret })
    }

    async fn load_pairing_secret_from_kv(&self) -> Option<[u8; 32]> {
        match self.kv.kv_get(KEY_PAIRING_SECRET).await.ok()? {
            KvValue::Present(v) => {
                let bytes = b64_decode(&v).ok()?;
                if bytes.len() != 32 {
                    return None;
                }
                let mut out = [0u8; 32];
                out.copy_from_slice(&bytes);
                Some(out)
            }
            KvValue::Missing => None,
        }
    }

    /// Best-effort persist; each write is independent and a failure is
    /// swallowed (next load tolerates partial writes — spec §4.2/§7).
    async fn persist(&self, identity: &IdentitySecret) {
        let ed_blob = {
            let mut v = Vec::with_capacity(96);
            v.extend_from_slice(&identity.ed_pub);
            v.extend_from_slice(&identity.ed_sk);
            b64_encode(&v)
        };
        let x_blob = {
            let mut v = Vec::with_capacity(64);
            v.extend_from_slice(&identity.x_pub);
            v.extend_from_slice(&identity.x_sk);
            b64_encode(&v)
        };
        let _ = self.kv.kv_init().await;
        let _ = self.kv.kv_put(KEY_ED25519, &ed_blob).await;
        let _ = self.kv.kv_put(KEY_X25519, &x_blob).await;
        let _ = self.kv.kv_put(KEY_CREATED_AT, &identity.created_at.to_rfc3339()).await;
        let _ = self.kv.kv_put(KEY_PAIRING_SECRET, &b64_encode(&identity.pairing_secret)).await;
    }

    /// Ensures an identity exists, generating one on first run. Idempotent:
    /// a second call returns the same public keys without minting new ones.
    pub async fn get_or_create(&self) -> IdentityPublic {
        {
            let cached = self.mem.read().await;
            if let Some(ref id) = *cached {
                return IdentityPublic::from(id);
            }
        }

        if let Some(loaded) = self.load_from_kv().await {
            let mut cached = self.mem.write().await;
            *cached = Some(loaded.clone());
            return IdentityPublic::from(&loaded);
        }

        let fresh = generate_identity();
        self.persist(&fresh).await;
        let public = IdentityPublic::from(&fresh);
        let mut cached = self.mem.write().await;
        *cached = Some(fresh);
        public
    }

    /// Loads, or generates and persists, the 32-byte pairing secret.
    pub async fn get_pairing_secret(&self) -> [u8; 32] {
        {
            let cached = self.mem.read().await;
            if let Some(ref id) = *cached {
                return id.pairing_secret;
            }
        }
        if let Some(secret) = self.load_pairing_secret_from_kv().await {
            return secret;
        }
        // Ensure a full identity exists (which mints a pairing secret too)
        // and read it back out of the now-populated cache.
        self.get_or_create().await;
        let cached = self.mem.read().await;
        cached.as_ref().map(|id| id.pairing_secret).unwrap_or([0u8; 32])
    }

    pub fn get_fingerprint(ed_pub: &[u8; 32]) -> String {
        hex::encode(pp_crypto::sha256(ed_pub))
    }

    /// Internal accessor for the session manager: the secret signing key,
    /// from KV if present, else the memory-cached fallback.
    pub async fn signing_key(&self) -> Option<[u8; 64]> {
        if let Some(loaded) = self.load_from_kv().await {
            return Some(loaded.ed_sk);
        }
        let cached = self.mem.read().await;
        cached.as_ref().map(|id| id.ed_sk)
    }

    /// Wipes the five identity fields and mints a fresh identity. Does NOT
    /// touch sessions or pairing state — the façade orchestrates the full
    /// `resetPairing` sequence across `SessionStore`, `PairingManager`, and
    /// this store (see `facade::Facade::reset_pairing` and DESIGN.md's
    /// resolution of the §9 layering note).
    pub async fn reset_keys(&self) -> IdentityPublic {
        let _ = self.kv.kv_put(KEY_ED25519, "").await;
        let _ = self.kv.kv_put(KEY_X25519, "").await;
        let _ = self.kv.kv_put(KEY_CREATED_AT, "").await;
        let _ = self.kv.kv_put(KEY_PAIRING_SECRET, "").await;
        {
            let mut cached = self.mem.write().await;
            *cached = None;
        }
        self.get_or_create().await
    }
}
