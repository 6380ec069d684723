//! The opaque encrypted key-value store contract the vault exposes to the
//! core (spec §1, §6). The core never implements this — it's an external
//! collaborator — but needs a trait to call through and a normalised value
//! shape, since the source's `kvGet` can return `string | {data: string} |
//! null` (spec §9's design note). We fold both shapes into one `KvValue`
//! at the boundary instead of carrying the ambiguity further in.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvValue {
    Missing,
    Present(String),
}

impl KvValue {
    pub fn into_option(self) -> Option<String> {
        match self {
            KvValue::Missing => None,
            KvValue::Present(s) => Some(s),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KvStatus {
    pub initialized: bool,
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("kv store unavailable: {0}")]
    Unavailable(String),
}

/// The vault's encrypted key-value store, as consumed by this core.
/// Implementations live outside this crate; see `InMemoryKv` (test-only)
/// for the shape a real implementation must satisfy.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn kv_status(&self) -> KvStatus;

    /// Idempotent — "already initialized" must not be surfaced as an error.
    async fn kv_init(&self) -> Result<(), KvError>;

    async fn kv_get(&self, key: &str) -> Result<KvValue, KvError>;

    async fn kv_put(&self, key: &str, value: &str) -> Result<(), KvError>;
}

/// Test-only in-memory `KvStore`. A real encrypted KV store is an external
/// collaborator of this core (spec §1) and is never implemented here.
#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryKv {
        initialized: RwLock<bool>,
        data: RwLock<HashMap<String, String>>,
        /// When true, every `kv_get`/`kv_put` fails — simulates a locked vault.
        pub locked: RwLock<bool>,
    }

    impl InMemoryKv {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn set_locked(&self, locked: bool) {
            *self.locked.write().await = locked;
        }
    }

    #[async_trait]
    impl KvStore for InMemoryKv {
        async fn kv_status(&self) -> KvStatus {
            KvStatus { initialized: *self.initialized.read().await }
        }

        async fn kv_init(&self) -> Result<(), KvError> {
            *self.initialized.write().await = true;
            Ok(())
        }

        async fn kv_get(&self, key: &str) -> Result<KvValue, KvError> {
            if *self.locked.read().await {
                return Err(KvError::Unavailable("locked".into()));
            }
            let data = self.data.read().await;
            Ok(match data.get(key) {
                Some(v) => KvValue::Present(v.clone()),
                None => KvValue::Missing,
            })
        }

        async fn kv_put(&self, key: &str, value: &str) -> Result<(), KvError> {
            if *self.locked.read().await {
                return Err(KvError::Unavailable("locked".into()));
            }
            self.data.write().await.insert(key.to_string(), value.to_string());
            Ok(())
        }
    }
}
