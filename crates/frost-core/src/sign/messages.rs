//! Signing message types

use crate::group::{self, point_serde, scalar_serde};
use crate::{Error, Identifier, Result, SessionId};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Round 1 message: commitments to one signer's (hiding, binding) nonce pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningCommitments {
    /// Commitment to the hiding nonce
    #[serde(with = "point_serde")]
    pub hiding: ProjectivePoint,
    /// Commitment to the binding nonce
    #[serde(with = "point_serde")]
    pub binding: ProjectivePoint,
}

impl SigningCommitments {
    /// Encoding as hiding || binding
    pub fn to_bytes(&self) -> [u8; 2 * group::POINT_LEN] {
        let mut bytes = [0u8; 2 * group::POINT_LEN];
        bytes[..group::POINT_LEN].copy_from_slice(&group::encode_point(&self.hiding));
        bytes[group::POINT_LEN..].copy_from_slice(&group::encode_point(&self.binding));
        bytes
    }
}

/// Everything a signer needs for round 2: the message and the commitments of
/// the fixed signer set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPackage {
    /// Signing attempt this package belongs to
    pub session_id: SessionId,
    /// Message to be signed
    pub message: Vec<u8>,
    /// Commitments of every signer in the quorum
    pub commitments: BTreeMap<Identifier, SigningCommitments>,
}

impl SigningPackage {
    /// Create a new signing package
    pub fn new(
        session_id: SessionId,
        message: Vec<u8>,
        commitments: BTreeMap<Identifier, SigningCommitments>,
    ) -> Self {
        Self {
            session_id,
            message,
            commitments,
        }
    }

    /// The signer set S
    pub fn signers(&self) -> BTreeSet<Identifier> {
        self.commitments.keys().copied().collect()
    }

    /// Commitments published by `id`
    pub fn commitments_for(&self, id: &Identifier) -> Result<&SigningCommitments> {
        self.commitments
            .get(id)
            .ok_or(Error::UnknownParticipant(*id))
    }
}

/// Round 2 message: one signer's contribution to the signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureShare(#[serde(with = "scalar_serde")] pub(crate) Scalar);

impl SignatureShare {
    /// Wrap a raw share scalar
    pub fn new(share: Scalar) -> Self {
        Self(share)
    }

    /// The share scalar z_i
    pub fn to_scalar(&self) -> Scalar {
        self.0
    }
}
