//! Message relay between ceremony participants
//!
//! Messages are keyed by session id and round number. A ceremony uses one
//! session id for all of its rounds, so a relay can serve many ceremonies at
//! once without mixing their traffic.

use crate::{Identifier, Result, SessionId};
use serde::{de::DeserializeOwned, Serialize};

pub use ::async_trait::async_trait;

/// Transport for the messages of a multi-round ceremony
///
/// Implementations must deliver messages reliably or fail explicitly. Each
/// collect call waits until `count` messages are present for its key and
/// gives up with [`crate::Error::QuorumUnavailable`] once the relay's
/// deadline passes, reporting how many had arrived.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Publish `message` under `(session_id, round)` for every participant
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        message: &T,
    ) -> Result<()>;

    /// Queue `message` under `(session_id, round)` for participant `to` only
    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: Identifier,
        message: &T,
    ) -> Result<()>;

    /// Wait for `count` broadcasts of `(session_id, round)`
    ///
    /// Broadcasts include the caller's own message, so a full round of `n`
    /// participants is collected with `count = n`. Broadcasts stay readable
    /// by every participant until the session is cleared.
    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<T>>;

    /// Wait for `count` direct messages of `(session_id, round)` sent to `my_id`
    ///
    /// A participant never sends to itself, so a full round among `n`
    /// participants is collected with `count = n - 1`. Collected messages are
    /// removed from the relay.
    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: Identifier,
        count: usize,
    ) -> Result<Vec<T>>;
}

/// Relay shared by tasks of one process
pub mod memory;

pub use memory::MemoryRelay;
