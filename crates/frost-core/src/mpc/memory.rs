//! In-memory relay implementation for local ceremonies and tests

use super::{async_trait, Relay};
use crate::{Error, Identifier, Result, SessionId};
use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default collection deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// In-memory message relay shared by participants of one process
#[derive(Clone)]
pub struct MemoryRelay {
    /// Broadcast messages: (session_id, round) -> Vec<message_bytes>
    broadcasts: Arc<DashMap<(SessionId, u32), Vec<Vec<u8>>>>,
    /// Direct messages: (session_id, round, to) -> Vec<message_bytes>
    directs: Arc<DashMap<(SessionId, u32, Identifier), Vec<Vec<u8>>>>,
    /// Notification channel
    notify: broadcast::Sender<()>,
    /// How long a collect call waits before giving up
    timeout: Duration,
}

impl MemoryRelay {
    /// Create a new in-memory relay
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(100);
        Self {
            broadcasts: Arc::new(DashMap::new()),
            directs: Arc::new(DashMap::new()),
            notify,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the collection deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Drop every message of a finished or abandoned session
    ///
    /// Broadcasts are only removed here, once all participants are done.
    pub fn clear_session(&self, session_id: &SessionId) {
        self.broadcasts.retain(|(session, _), _| session != session_id);
        self.directs.retain(|(session, _, _), _| session != session_id);
    }

    async fn wait_for<K, T>(
        &self,
        store: &DashMap<K, Vec<Vec<u8>>>,
        key: K,
        count: usize,
    ) -> Result<Vec<T>>
    where
        K: std::hash::Hash + Eq + Send + Sync,
        T: DeserializeOwned,
    {
        let mut rx = self.notify.subscribe();
        let deadline = Instant::now() + self.timeout;

        loop {
            let available = store.get(&key).map(|m| m.len()).unwrap_or(0);
            if available >= count {
                if let Some(messages) = store.get(&key) {
                    return messages
                        .iter()
                        .take(count)
                        .map(|bytes| deserialize(bytes))
                        .collect();
                }
            }

            tokio::select! {
                _ = rx.recv() => continue,
                _ = tokio::time::sleep(POLL_INTERVAL) => continue,
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(Error::QuorumUnavailable {
                        required: count,
                        available,
                    });
                }
            }
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| Error::Deserialization(e.to_string()))
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;

        self.broadcasts
            .entry((*session_id, round))
            .or_default()
            .push(bytes);

        let _ = self.notify.send(());
        Ok(())
    }

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: Identifier,
        message: &T,
    ) -> Result<()> {
        let bytes = serialize(message)?;

        self.directs
            .entry((*session_id, round, to))
            .or_default()
            .push(bytes);

        let _ = self.notify.send(());
        Ok(())
    }

    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<T>> {
        self.wait_for(&self.broadcasts, (*session_id, round), count)
            .await
    }

    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: Identifier,
        count: usize,
    ) -> Result<Vec<T>> {
        let key = (*session_id, round, my_id);
        let messages = self.wait_for(&self.directs, key, count).await?;
        self.directs.remove(&key);
        Ok(messages)
    }
}
