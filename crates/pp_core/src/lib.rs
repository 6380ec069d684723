//! pp_core — identity, pairing, session-store, session-manager, and RPC
//! façade for the pairing/session protocol. Crypto primitives live in
//! `pp_crypto`; wire types and the error taxonomy live in `pp_proto`.
//!
//! Module layout mirrors the teacher's `dl_store`/`dl-secure-channel`
//! split: one module per stateful component, plus a `facade` that wires
//! them together behind named operations.

pub mod facade;
pub mod identity;
pub mod kv;
pub mod pairing;
pub mod session;
pub mod session_store;
mod util;

pub use facade::Facade;
pub use identity::{IdentityPublic, IdentityStore};
pub use kv::{KvError, KvStatus, KvStore, KvValue};
pub use pairing::{PairingError, PairingManager, PairingState};
pub use session::SessionManager;
pub use session_store::SessionStore;

/// The tagged-sum error type this core raises internally. Identical in
/// shape to `pp_proto::ProtocolError` — the wire and internal
/// representations coincide, so no separate enum is kept in lockstep with
/// it (see DESIGN.md's resolution of the §9 "error-as-exception" note).
pub type CoreError = pp_proto::ProtocolError;

/// The one external flag the façade consumes (spec §4.6/§6): whether the
/// native-messaging surface is enabled at all. Everything else (transport
/// framing, the KV store, the vault's auto-lock) is an external
/// collaborator this crate never configures.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub native_messaging_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { native_messaging_enabled: true }
    }
}
