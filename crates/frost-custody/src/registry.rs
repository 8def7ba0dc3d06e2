//! Key directory: which signers hold shares of which key

use crate::{Error, Result};
use dashmap::DashMap;
use frost_core::sign::SignerEndpoint;
use frost_core::{Identifier, PublicKeyPackage};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Public key material of one key and the endpoints of its share holders
///
/// Clones share one attempt lock, so signing attempts on a key never overlap.
#[derive(Clone)]
pub struct KeyEntry {
    pub public: PublicKeyPackage,
    pub endpoints: BTreeMap<Identifier, Arc<dyn SignerEndpoint>>,
    attempts: Arc<Mutex<()>>,
}

impl KeyEntry {
    /// Pair `public` with its signer endpoints
    ///
    /// Each endpoint must belong to a participant of the key and appear once.
    pub fn new(public: PublicKeyPackage, endpoints: Vec<Arc<dyn SignerEndpoint>>) -> Result<Self> {
        let mut by_id = BTreeMap::new();
        for endpoint in endpoints {
            let id = endpoint.identifier();
            public.verifying_share(&id)?;
            if by_id.insert(id, endpoint).is_some() {
                return Err(frost_core::Error::DuplicateIdentifier(id).into());
            }
        }
        Ok(Self {
            public,
            endpoints: by_id,
            attempts: Arc::new(Mutex::new(())),
        })
    }

    /// Wait until no other signing attempt runs on this key
    pub(crate) async fn lock_attempts(&self) -> OwnedMutexGuard<()> {
        self.attempts.clone().lock_owned().await
    }
}

/// Resolves key ids for the custody service
pub trait KeyDirectory: Send + Sync {
    /// Look up `key_id`, failing with [`Error::UnknownKey`]
    fn lookup(&self, key_id: &str) -> Result<KeyEntry>;
}

/// Key directory held in memory
#[derive(Clone, Default)]
pub struct InMemoryKeyDirectory {
    keys: Arc<DashMap<String, KeyEntry>>,
}

impl InMemoryKeyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace `key_id`
    pub fn insert(&self, key_id: impl Into<String>, entry: KeyEntry) {
        self.keys.insert(key_id.into(), entry);
    }

    pub fn remove(&self, key_id: &str) -> bool {
        self.keys.remove(key_id).is_some()
    }
}

impl KeyDirectory for InMemoryKeyDirectory {
    fn lookup(&self, key_id: &str) -> Result<KeyEntry> {
        self.keys
            .get(key_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownKey(key_id.to_string()))
    }
}
