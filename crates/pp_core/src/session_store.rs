//! In-memory session table (spec §4.4).
//!
//! Sessions are never persisted — loss on restart is expected and callers
//! must tolerate `SessionNotFound` at any time. The map itself is the one
//! hot shared resource the concurrency model (spec §5) calls out: guarded
//! by a `parking_lot::Mutex` held only for the duration of a single
//! mutation, never across an `.await` (grounded on the teacher's own use of
//! `parking_lot` for exactly this kind of shared, synchronous state —
//! `alissonlinneker-nova-protocol`'s workspace dependency list).

use std::collections::HashMap;

use parking_lot::Mutex;
use zeroize::ZeroizeOnDrop;

/// Live, authenticated-but-maybe-not-yet-verified channel state. The
/// secretbox key is wiped on drop; the transcript is public-key material,
/// not secret, and is left alone.
#[derive(ZeroizeOnDrop)]
pub struct Session {
    #[zeroize(skip)]
    pub session_id: String,
    pub key: [u8; 32],
    #[zeroize(skip)]
    pub transcript: Vec<u8>,
    #[zeroize(skip)]
    pub send_seq: u64,
    #[zeroize(skip)]
    pub last_recv_seq: u64,
    #[zeroize(skip)]
    pub peer_verified: bool,
}

impl Session {
    fn new(session_id: String, key: [u8; 32], transcript: Vec<u8>) -> Self {
        Self { session_id, key, transcript, send_seq: 0, last_recv_seq: 0, peer_verified: false }
    }
}

#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session keyed by 128 random bits, hex-encoded.
    pub fn create(&self, key: [u8; 32], transcript: Vec<u8>) -> String {
        let session_id = hex::encode(pp_crypto::random_bytes(16));
        let session = Session::new(session_id.clone(), key, transcript);
        self.sessions.lock().insert(session_id.clone(), session);
        session_id
    }

    /// Runs `f` against the session's mutable state under the map lock;
    /// returns `None` if no such session exists (`SessionNotFound` at the
    /// call site is the caller's job, not this store's).
    pub fn with_session<R>(&self, session_id: &str, f: impl FnOnce(&mut Session) -> R) -> Option<R> {
        let mut guard = self.sessions.lock();
        guard.get_mut(session_id).map(f)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    /// Removes a session; returns whether it existed.
    pub fn close(&self, session_id: &str) -> bool {
        self.sessions.lock().remove(session_id).is_some()
    }

    /// Removes every session, returning how many were cleared.
    pub fn clear_all(&self) -> usize {
        let mut guard = self.sessions.lock();
        let n = guard.len();
        guard.clear();
        n
    }

    /// Debug/test helper: a stable, non-secret description of live sessions.
    pub fn live_session_ids(&self) -> Vec<String> {
        self.sessions.lock().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_close_round_trips() {
        let store = SessionStore::new();
        let id = store.create([1u8; 32], vec![1, 2, 3]);
        assert!(store.exists(&id));
        assert!(store.close(&id));
        assert!(!store.exists(&id));
        assert!(!store.close(&id)); // already gone
    }

    #[test]
    fn clear_all_reports_count_and_empties() {
        let store = SessionStore::new();
        store.create([1u8; 32], vec![]);
        store.create([2u8; 32], vec![]);
        assert_eq!(store.clear_all(), 2);
        assert_eq!(store.clear_all(), 0);
    }

    #[test]
    fn with_session_mutates_in_place() {
        let store = SessionStore::new();
        let id = store.create([1u8; 32], vec![]);
        store.with_session(&id, |s| s.send_seq += 1);
        let seq = store.with_session(&id, |s| s.send_seq).unwrap();
        assert_eq!(seq, 1);
    }
}
