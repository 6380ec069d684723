//! pp_crypto — thin adapter over libsodium (NaCl) primitives.
//!
//! # Design principles
//! - NO custom crypto; every primitive is a direct call into `sodiumoxide`
//!   (a libsodium/NaCl binding), chosen the way an "audited NaCl-equivalent
//!   library" is named in the pairing/session spec this crate backs.
//! - All inputs of fixed size are length-checked before use; mismatches
//!   return `InvalidKeyLength` / `InvalidSignatureLength` / `InvalidNonceLength`
//!   rather than panicking.
//! - No branches on secret byte values — only on lengths, which are not secret.
//!
//! # Module layout
//! - `error` — unified error type for this crate

pub mod error;

pub use error::CryptoError;

use std::sync::Once;

use sodiumoxide::crypto::{hash::sha256, scalarmult::curve25519, secretbox, sign::ed25519};
use sodiumoxide::randombytes::randombytes;
use sodiumoxide::utils::memcmp;

static INIT: Once = Once::new();

/// Every public function below runs this first, so a caller that forgets
/// the explicit `init()` call still gets a correctly initialized libsodium
/// rather than undefined behaviour.
fn ensure_init() {
    INIT.call_once(|| {
        let _ = sodiumoxide::init();
    });
}

pub const ED25519_PUBLIC_LEN: usize = ed25519::PUBLICKEYBYTES;
pub const ED25519_SECRET_LEN: usize = ed25519::SECRETKEYBYTES;
pub const ED25519_SIGNATURE_LEN: usize = ed25519::SIGNATUREBYTES;
pub const X25519_LEN: usize = curve25519::GROUPELEMENTBYTES;
pub const SHA256_LEN: usize = 32;
pub const SECRETBOX_KEY_LEN: usize = secretbox::KEYBYTES;
pub const SECRETBOX_NONCE_LEN: usize = secretbox::NONCEBYTES;
pub const SECRETBOX_TAG_LEN: usize = secretbox::MACBYTES;

/// Explicit, early initialization point for callers that want libsodium set
/// up before the first request lands (`pp-cli`'s `main` calls this). Every
/// other function in this crate also self-initializes on first use, so
/// calling this is an optimization, not a correctness requirement.
pub fn init() {
    ensure_init();
}

/// An Ed25519 keypair: 32-byte public verify key, 64-byte secret sign key.
pub struct EdKeypair {
    pub public: [u8; ED25519_PUBLIC_LEN],
    pub secret: [u8; ED25519_SECRET_LEN],
}

/// An X25519 keypair: 32-byte public point, 32-byte secret scalar.
pub struct XKeypair {
    pub public: [u8; X25519_LEN],
    pub secret: [u8; X25519_LEN],
}

/// Generate a fresh Ed25519 signing keypair.
pub fn ed_keypair() -> EdKeypair {
    ensure_init();
    let (pk, sk) = ed25519::gen_keypair();
    let mut public = [0u8; ED25519_PUBLIC_LEN];
    let mut secret = [0u8; ED25519_SECRET_LEN];
    public.copy_from_slice(pk.as_ref());
    secret.copy_from_slice(sk.as_ref());
    EdKeypair { public, secret }
}

/// Sign `msg` with a 64-byte Ed25519 secret key, returning a 64-byte
/// detached signature.
pub fn ed_sign(sk: &[u8], msg: &[u8]) -> Result<[u8; ED25519_SIGNATURE_LEN], CryptoError> {
    ensure_init();
    let sk = ed25519::SecretKey::from_slice(sk).ok_or(CryptoError::InvalidKeyLength {
        expected: ED25519_SECRET_LEN,
        got: sk.len(),
    })?;
    let sig = ed25519::sign_detached(msg, &sk);
    let mut out = [0u8; ED25519_SIGNATURE_LEN];
    out.copy_from_slice(sig.as_ref());
    Ok(out)
}

/// Verify a 64-byte detached Ed25519 signature against a 32-byte public key.
pub fn ed_verify(pk: &[u8], msg: &[u8], sig: &[u8]) -> Result<bool, CryptoError> {
    ensure_init();
    let pk = ed25519::PublicKey::from_slice(pk).ok_or(CryptoError::InvalidKeyLength {
        expected: ED25519_PUBLIC_LEN,
        got: pk.len(),
    })?;
    if sig.len() != ED25519_SIGNATURE_LEN {
        return Err(CryptoError::InvalidSignatureLength {
            expected: ED25519_SIGNATURE_LEN,
            got: sig.len(),
        });
    }
    let sig = ed25519::Signature::from_bytes(sig)
        .map_err(|_| CryptoError::InvalidSignatureLength { expected: ED25519_SIGNATURE_LEN, got: sig.len() })?;
    Ok(ed25519::verify_detached(&sig, msg, &pk))
}

/// Generate a fresh X25519 keypair (32-byte scalar secret, 32-byte point public).
pub fn x_keypair() -> XKeypair {
    ensure_init();
    let mut secret = [0u8; X25519_LEN];
    secret.copy_from_slice(&randombytes(X25519_LEN));
    let scalar = curve25519::Scalar(secret);
    let public = curve25519::scalarmult_base(&scalar).0;
    XKeypair { public, secret }
}

/// Raw X25519 Diffie-Hellman: `sk` is a 32-byte secret scalar, `peer_pk` a
/// 32-byte peer public point. Rejects an all-zero output (a low-order point
/// attack would otherwise produce one) per the contributory-behaviour guard.
pub fn x_ecdh(sk: &[u8], peer_pk: &[u8]) -> Result<[u8; X25519_LEN], CryptoError> {
    ensure_init();
    if sk.len() != X25519_LEN {
        return Err(CryptoError::InvalidKeyLength { expected: X25519_LEN, got: sk.len() });
    }
    if peer_pk.len() != X25519_LEN {
        return Err(CryptoError::InvalidKeyLength { expected: X25519_LEN, got: peer_pk.len() });
    }
    let mut scalar_bytes = [0u8; X25519_LEN];
    scalar_bytes.copy_from_slice(sk);
    let mut point_bytes = [0u8; X25519_LEN];
    point_bytes.copy_from_slice(peer_pk);

    let scalar = curve25519::Scalar(scalar_bytes);
    let point = curve25519::GroupElement(point_bytes);
    let shared = curve25519::scalarmult(&scalar, &point)
        .map_err(|_| CryptoError::ContributoryBehaviour)?;

    if shared.0.iter().all(|b| *b == 0) {
        return Err(CryptoError::ContributoryBehaviour);
    }
    Ok(shared.0)
}

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; SHA256_LEN] {
    ensure_init();
    sha256::hash(data).0
}

/// Seal `plaintext` under a 32-byte key and 24-byte nonce. Output is
/// `ciphertext || 16-byte Poly1305 tag` per secretbox convention.
pub fn secretbox_seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    ensure_init();
    let key = secretbox::Key::from_slice(key).ok_or(CryptoError::InvalidKeyLength {
        expected: SECRETBOX_KEY_LEN,
        got: key.len(),
    })?;
    let nonce = secretbox::Nonce::from_slice(nonce).ok_or(CryptoError::InvalidNonceLength {
        expected: SECRETBOX_NONCE_LEN,
        got: nonce.len(),
    })?;
    Ok(secretbox::seal(plaintext, &nonce, &key))
}

/// Open a secretbox-sealed blob; fails with `SecretboxOpen` if the tag does
/// not authenticate (including any tampering with the ciphertext).
pub fn secretbox_open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    ensure_init();
    let key = secretbox::Key::from_slice(key).ok_or(CryptoError::InvalidKeyLength {
        expected: SECRETBOX_KEY_LEN,
        got: key.len(),
    })?;
    let nonce = secretbox::Nonce::from_slice(nonce).ok_or(CryptoError::InvalidNonceLength {
        expected: SECRETBOX_NONCE_LEN,
        got: nonce.len(),
    })?;
    secretbox::open(ciphertext, &nonce, &key).map_err(|_| CryptoError::SecretboxOpen)
}

/// `n` bytes from the OS CSPRNG.
pub fn random_bytes(n: usize) -> Vec<u8> {
    ensure_init();
    randombytes(n)
}

/// Constant-time byte comparison (false immediately on length mismatch,
/// which is not secret-dependent).
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && memcmp(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ed25519_roundtrip() {
        init();
        let kp = ed_keypair();
        let sig = ed_sign(&kp.secret, b"hello").unwrap();
        assert!(ed_verify(&kp.public, b"hello", &sig).unwrap());
        assert!(!ed_verify(&kp.public, b"goodbye", &sig).unwrap());
    }

    #[test]
    fn ed25519_rejects_bad_lengths() {
        init();
        assert!(matches!(
            ed_sign(&[0u8; 10], b"x"),
            Err(CryptoError::InvalidKeyLength { .. })
        ));
        let kp = ed_keypair();
        assert!(matches!(
            ed_verify(&kp.public, b"x", &[0u8; 3]),
            Err(CryptoError::InvalidSignatureLength { .. })
        ));
    }

    #[test]
    fn x25519_ecdh_agrees_both_directions() {
        init();
        let a = x_keypair();
        let b = x_keypair();
        let shared_a = x_ecdh(&a.secret, &b.public).unwrap();
        let shared_b = x_ecdh(&b.secret, &a.public).unwrap();
        assert_eq!(shared_a, shared_b);
    }

    #[test]
    fn secretbox_roundtrip() {
        init();
        let key = random_bytes(SECRETBOX_KEY_LEN);
        let nonce = random_bytes(SECRETBOX_NONCE_LEN);
        let ct = secretbox_seal(&key, &nonce, b"hunter2").unwrap();
        assert_eq!(ct.len(), 7 + SECRETBOX_TAG_LEN);
        let pt = secretbox_open(&key, &nonce, &ct).unwrap();
        assert_eq!(pt, b"hunter2");
    }

    #[test]
    fn secretbox_open_rejects_tampering() {
        init();
        let key = random_bytes(SECRETBOX_KEY_LEN);
        let nonce = random_bytes(SECRETBOX_NONCE_LEN);
        let mut ct = secretbox_seal(&key, &nonce, b"hunter2").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(matches!(secretbox_open(&key, &nonce, &ct), Err(CryptoError::SecretboxOpen)));
    }

    #[test]
    fn ct_eq_behaves_like_eq() {
        assert!(ct_eq(b"abc", b"abc"));
        assert!(!ct_eq(b"abc", b"abd"));
        assert!(!ct_eq(b"abc", b"ab"));
    }

    #[test]
    fn sha256_is_deterministic() {
        assert_eq!(sha256(b"x"), sha256(b"x"));
        assert_ne!(sha256(b"x"), sha256(b"y"));
    }
}
