//! Distributed Key Generation (DKG) module
//!
//! Implements Pedersen-style DKG with Feldman commitments and proofs of
//! knowledge: every participant deals a random polynomial, the shares are
//! verified against the broadcast commitments, and each participant ends up
//! with a share of a group key that nobody ever held in full.

mod dkg;
mod messages;
mod participant;
mod proof;

pub use dkg::run_dkg;
pub use messages::*;
pub use participant::{DkgParticipant, DkgState};
pub use proof::ProofOfKnowledge;

#[cfg(test)]
pub(crate) use participant::tests::run_local_dkg;

use crate::{Error, Identifier, Result, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const CONTEXT_PREFIX: &[u8] = b"frost-custody/dkg/v1";

/// Configuration for one participant's DKG session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DkgConfig {
    /// Session identifier, shared by all participants
    pub session_id: SessionId,

    /// Threshold (t-of-n)
    pub threshold: u16,

    /// This participant's identifier
    pub identifier: Identifier,

    /// All participants, in ascending order
    pub participants: Vec<Identifier>,
}

impl DkgConfig {
    /// Create a new DKG configuration
    pub fn new(
        session_id: SessionId,
        threshold: u16,
        identifier: Identifier,
        participants: &[Identifier],
    ) -> Result<Self> {
        let mut unique = BTreeSet::new();
        for id in participants {
            if !unique.insert(*id) {
                return Err(Error::DuplicateIdentifier(*id));
            }
        }
        if usize::from(threshold) > unique.len() {
            return Err(Error::InvalidConfig(
                "Threshold cannot exceed number of participants".into(),
            ));
        }
        if threshold < 2 {
            return Err(Error::InvalidConfig(
                "Threshold must be at least 2".into(),
            ));
        }
        if !unique.contains(&identifier) {
            return Err(Error::UnknownParticipant(identifier));
        }

        Ok(Self {
            session_id,
            threshold,
            identifier,
            participants: unique.into_iter().collect(),
        })
    }

    /// Number of participants
    pub fn n_participants(&self) -> usize {
        self.participants.len()
    }

    /// Every participant except this one
    pub fn others(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.participants
            .iter()
            .copied()
            .filter(move |id| *id != self.identifier)
    }

    /// Context string bound into every proof of knowledge of this session
    pub fn context(&self) -> Vec<u8> {
        let mut context = Vec::with_capacity(CONTEXT_PREFIX.len() + self.session_id.len());
        context.extend_from_slice(CONTEXT_PREFIX);
        context.extend_from_slice(&self.session_id);
        context
    }
}
