//! DKG message types

use super::ProofOfKnowledge;
use crate::group::scalar_serde;
use crate::vss::VerifiableSecretSharingCommitment;
use crate::Identifier;
use k256::Scalar;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// Round 1 message: commitment to the sender's polynomial, broadcast to all
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round1Package {
    /// Sender identifier
    pub sender: Identifier,
    /// Commitments to polynomial coefficients (Feldman VSS)
    pub commitment: VerifiableSecretSharingCommitment,
    /// Proof of knowledge of the constant term
    pub proof: ProofOfKnowledge,
}

/// Round 2 message: the sender's polynomial evaluated at the receiver
///
/// Travels point-to-point over a confidential channel.
#[derive(Clone, Serialize, Deserialize, ZeroizeOnDrop)]
pub struct Round2Package {
    /// Sender identifier
    #[zeroize(skip)]
    pub sender: Identifier,
    /// Receiver identifier
    #[zeroize(skip)]
    pub receiver: Identifier,
    /// Secret share f_sender(receiver)
    #[serde(with = "scalar_serde")]
    pub(crate) share: Scalar,
}

impl Round2Package {
    pub(crate) fn new(sender: Identifier, receiver: Identifier, share: Scalar) -> Self {
        Self {
            sender,
            receiver,
            share,
        }
    }
}

impl fmt::Debug for Round2Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Round2Package")
            .field("sender", &self.sender)
            .field("receiver", &self.receiver)
            .field("share", &"<redacted>")
            .finish()
    }
}
