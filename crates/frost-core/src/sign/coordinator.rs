//! Coordinator-side state machine for one signing attempt

use super::frost::{aggregate, SigningContext};
use super::{SignatureShare, SigningCommitments, SigningPackage};
use crate::types::PublicKeyPackage;
use crate::{Error, Identifier, Result, SessionId, Signature};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Progress of a signing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningState {
    /// Accepting nonce commitments from invited signers
    CommitmentsCollecting,
    /// Signer set fixed, binding factors and challenge derived
    BindingComputed,
    /// Accepting signature shares
    SharesCollecting,
    /// Signature produced
    Aggregated,
    /// Attempt failed; start a new one
    Failed,
}

impl SigningState {
    fn name(&self) -> &'static str {
        match self {
            SigningState::CommitmentsCollecting => "CommitmentsCollecting",
            SigningState::BindingComputed => "BindingComputed",
            SigningState::SharesCollecting => "SharesCollecting",
            SigningState::Aggregated => "Aggregated",
            SigningState::Failed => "Failed",
        }
    }
}

/// Drives one signing attempt from commitment collection to aggregation
///
/// The signer set S is whoever committed before [`close_commitments`]; every
/// later commitment is refused with [`Error::LateCommitment`].
///
/// [`close_commitments`]: SigningCoordinator::close_commitments
pub struct SigningCoordinator {
    public: PublicKeyPackage,
    session_id: SessionId,
    message: Vec<u8>,
    invited: BTreeSet<Identifier>,
    commitments: BTreeMap<Identifier, SigningCommitments>,
    package: Option<SigningPackage>,
    shares: BTreeMap<Identifier, SignatureShare>,
    state: SigningState,
}

impl SigningCoordinator {
    /// Start an attempt inviting `invited` to sign `message`
    pub fn new(
        public: PublicKeyPackage,
        session_id: SessionId,
        message: Vec<u8>,
        invited: BTreeSet<Identifier>,
    ) -> Result<Self> {
        for id in &invited {
            public.verifying_share(id)?;
        }
        let required = usize::from(public.threshold);
        if invited.len() < required {
            return Err(Error::QuorumUnavailable {
                required,
                available: invited.len(),
            });
        }

        Ok(Self {
            public,
            session_id,
            message,
            invited,
            commitments: BTreeMap::new(),
            package: None,
            shares: BTreeMap::new(),
            state: SigningState::CommitmentsCollecting,
        })
    }

    /// Current state
    pub fn state(&self) -> SigningState {
        self.state
    }

    /// Session identifier of this attempt
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Signers that have committed so far, or the fixed set S once closed
    pub fn signers(&self) -> BTreeSet<Identifier> {
        self.commitments.keys().copied().collect()
    }

    /// Signers in S that have not delivered a share yet
    pub fn missing_shares(&self) -> Vec<Identifier> {
        self.commitments
            .keys()
            .filter(|id| !self.shares.contains_key(id))
            .copied()
            .collect()
    }

    fn expect_state(&self, expected: &[SigningState]) -> Result<()> {
        if !expected.contains(&self.state) {
            return Err(Error::UnexpectedState {
                expected: expected[0].name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    /// Record the nonce commitments of an invited signer
    pub fn add_commitments(&mut self, from: Identifier, commitments: SigningCommitments) -> Result<()> {
        if self.state != SigningState::CommitmentsCollecting {
            warn!(from = %from, "Commitment arrived after the signer set was fixed");
            return Err(Error::LateCommitment { from });
        }
        if !self.invited.contains(&from) {
            return Err(Error::UnknownParticipant(from));
        }
        if self.commitments.contains_key(&from) {
            return Err(Error::DuplicateIdentifier(from));
        }

        self.commitments.insert(from, commitments);
        Ok(())
    }

    /// Fix the signer set and derive the signing package
    pub fn close_commitments(&mut self) -> Result<SigningPackage> {
        self.expect_state(&[SigningState::CommitmentsCollecting])?;

        let required = usize::from(self.public.threshold);
        if self.commitments.len() < required {
            self.state = SigningState::Failed;
            return Err(Error::QuorumUnavailable {
                required,
                available: self.commitments.len(),
            });
        }

        let package = SigningPackage::new(
            self.session_id,
            self.message.clone(),
            self.commitments.clone(),
        );
        if let Err(e) = SigningContext::new(&self.public, &package) {
            self.state = SigningState::Failed;
            return Err(e);
        }

        debug!(
            session = hex::encode(self.session_id),
            signers = ?self.signers(),
            "Signer set fixed"
        );
        self.package = Some(package.clone());
        self.state = SigningState::BindingComputed;
        Ok(package)
    }

    /// Record a signature share from a member of S
    pub fn add_share(&mut self, from: Identifier, share: SignatureShare) -> Result<()> {
        self.expect_state(&[SigningState::SharesCollecting, SigningState::BindingComputed])?;
        if !self.commitments.contains_key(&from) {
            return Err(Error::UnknownParticipant(from));
        }
        if self.shares.contains_key(&from) {
            return Err(Error::DuplicateIdentifier(from));
        }

        self.shares.insert(from, share);
        self.state = SigningState::SharesCollecting;
        Ok(())
    }

    /// Verify all shares and combine them into the final signature
    pub fn aggregate(&mut self) -> Result<Signature> {
        self.expect_state(&[SigningState::SharesCollecting])?;
        let package = self.package.as_ref().ok_or(Error::UnexpectedState {
            expected: "SharesCollecting with a signing package",
            actual: "SharesCollecting",
        })?;

        match aggregate(&self.public, package, &self.shares) {
            Ok(signature) => {
                self.state = SigningState::Aggregated;
                info!(
                    session = hex::encode(self.session_id),
                    signers = ?self.signers(),
                    "Signature aggregated"
                );
                Ok(signature)
            }
            Err(e) => {
                warn!(session = hex::encode(self.session_id), error = %e, "Aggregation failed");
                self.state = SigningState::Failed;
                Err(e)
            }
        }
    }
}
