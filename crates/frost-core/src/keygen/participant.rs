//! Per-participant DKG state machine

use super::{DkgConfig, ProofOfKnowledge, Round1Package, Round2Package};
use crate::parallel::first_failure;
use crate::types::{GroupVerificationKey, PublicKeyPackage, SigningShare, VerifyingShare};
use crate::vss::{self, Polynomial, VerifiableSecretSharingCommitment};
use crate::{Error, Identifier, KeyShare, Result};
use k256::{ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// DKG progress of one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DkgState {
    /// Created; the round 1 package may be generated
    Initialized,
    /// Every other participant's round 1 package verified
    Round1Published,
    /// Every pairwise share has arrived
    Round2Distributed,
    /// Key share produced
    Finalized,
    /// A verification failed; the ceremony cannot complete
    Aborted,
}

impl DkgState {
    fn name(&self) -> &'static str {
        match self {
            DkgState::Initialized => "Initialized",
            DkgState::Round1Published => "Round1Published",
            DkgState::Round2Distributed => "Round2Distributed",
            DkgState::Finalized => "Finalized",
            DkgState::Aborted => "Aborted",
        }
    }
}

/// One participant's view of a DKG ceremony
///
/// Any verification failure moves the participant to [`DkgState::Aborted`]
/// and wipes its secret material; there is no way back.
pub struct DkgParticipant {
    config: DkgConfig,
    state: DkgState,
    polynomial: Option<Polynomial>,
    own_share: Option<Zeroizing<Scalar>>,
    commitments: BTreeMap<Identifier, VerifiableSecretSharingCommitment>,
    received_shares: BTreeMap<Identifier, Zeroizing<Scalar>>,
}

impl DkgParticipant {
    /// Create a new participant for the given session
    pub fn new(config: DkgConfig) -> Self {
        Self {
            config,
            state: DkgState::Initialized,
            polynomial: None,
            own_share: None,
            commitments: BTreeMap::new(),
            received_shares: BTreeMap::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> DkgState {
        self.state
    }

    /// This participant's identifier
    pub fn identifier(&self) -> Identifier {
        self.config.identifier
    }

    fn expect_state(&self, expected: DkgState) -> Result<()> {
        if self.state != expected {
            return Err(Error::UnexpectedState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.state = DkgState::Aborted;
        self.polynomial = None;
        self.own_share = None;
        self.received_shares.clear();
    }

    /// Generate the polynomial, its commitment and proof of knowledge
    pub fn round1<R: RngCore + CryptoRng>(&mut self, rng: &mut R) -> Result<Round1Package> {
        self.expect_state(DkgState::Initialized)?;
        if self.polynomial.is_some() {
            return Err(Error::UnexpectedState {
                expected: "Initialized",
                actual: "Initialized with round 1 package already generated",
            });
        }

        let polynomial = vss::generate_polynomial(usize::from(self.config.threshold), None, rng)?;
        let commitment = polynomial.commit();
        let proof = ProofOfKnowledge::prove(
            self.config.identifier,
            &self.config.context(),
            polynomial.secret(),
            &commitment.constant_term()?,
            rng,
        );

        self.commitments
            .insert(self.config.identifier, commitment.clone());
        self.polynomial = Some(polynomial);

        Ok(Round1Package {
            sender: self.config.identifier,
            commitment,
            proof,
        })
    }

    /// Verify every other participant's round 1 package
    pub fn receive_round1(&mut self, packages: Vec<Round1Package>) -> Result<()> {
        self.expect_state(DkgState::Initialized)?;
        if self.polynomial.is_none() {
            return Err(Error::UnexpectedState {
                expected: "Initialized with round 1 package generated",
                actual: "Initialized",
            });
        }

        if let Err(e) = self.check_round1(&packages) {
            warn!(participant = %self.config.identifier, error = %e, "DKG round 1 rejected, aborting");
            self.abort();
            return Err(e);
        }

        for package in packages {
            self.commitments.insert(package.sender, package.commitment);
        }
        self.state = DkgState::Round1Published;
        debug!(participant = %self.config.identifier, "DKG round 1 verified");
        Ok(())
    }

    fn check_round1(&self, packages: &[Round1Package]) -> Result<()> {
        let expected: BTreeSet<Identifier> = self.config.others().collect();
        let mut seen = BTreeSet::new();

        for package in packages {
            if !expected.contains(&package.sender) {
                return Err(Error::UnknownParticipant(package.sender));
            }
            if !seen.insert(package.sender) {
                return Err(Error::DuplicateIdentifier(package.sender));
            }
            if package.commitment.len() != usize::from(self.config.threshold) {
                return Err(Error::VerificationFailed(format!(
                    "Commitment from participant {} has {} coefficients, expected {}",
                    package.sender,
                    package.commitment.len(),
                    self.config.threshold
                )));
            }
        }
        if seen.len() != expected.len() {
            return Err(Error::QuorumUnavailable {
                required: expected.len(),
                available: seen.len(),
            });
        }

        let context = self.config.context();
        let failed = first_failure(packages, |package| {
            let constant = package.commitment.constant_term().ok()?;
            package
                .proof
                .verify(package.sender, &context, &constant)
                .err()
                .map(|_| package.sender)
        });
        match failed {
            Some(from) => Err(Error::InvalidProofOfKnowledge { from }),
            None => Ok(()),
        }
    }

    /// Evaluate the polynomial for every other participant
    ///
    /// The polynomial is destroyed afterwards; only this participant's own
    /// evaluation is retained.
    pub fn round2(&mut self) -> Result<Vec<Round2Package>> {
        self.expect_state(DkgState::Round1Published)?;
        let polynomial = self.polynomial.take().ok_or(Error::UnexpectedState {
            expected: "Round1Published with shares not yet distributed",
            actual: "Round1Published with shares already distributed",
        })?;

        let me = self.config.identifier;
        let packages = self
            .config
            .others()
            .map(|receiver| Round2Package::new(me, receiver, polynomial.evaluate(receiver)))
            .collect();
        self.own_share = Some(Zeroizing::new(polynomial.evaluate(me)));

        Ok(packages)
    }

    /// Accept the shares addressed to this participant
    pub fn receive_round2(&mut self, packages: Vec<Round2Package>) -> Result<()> {
        self.expect_state(DkgState::Round1Published)?;
        if self.own_share.is_none() {
            return Err(Error::UnexpectedState {
                expected: "Round1Published with shares distributed",
                actual: "Round1Published",
            });
        }

        let me = self.config.identifier;
        let expected: BTreeSet<Identifier> = self.config.others().collect();
        let mut received = BTreeMap::new();

        for package in &packages {
            let check = if package.receiver != me {
                Err(Error::VerificationFailed(format!(
                    "Share from participant {} is addressed to {}",
                    package.sender, package.receiver
                )))
            } else if !expected.contains(&package.sender) {
                Err(Error::UnknownParticipant(package.sender))
            } else if received.contains_key(&package.sender) {
                Err(Error::DuplicateIdentifier(package.sender))
            } else {
                Ok(())
            };
            if let Err(e) = check {
                warn!(participant = %me, error = %e, "DKG round 2 rejected, aborting");
                self.abort();
                return Err(e);
            }
            received.insert(package.sender, Zeroizing::new(package.share));
        }

        if received.len() != expected.len() {
            let e = Error::QuorumUnavailable {
                required: expected.len(),
                available: received.len(),
            };
            warn!(participant = %me, error = %e, "DKG round 2 incomplete, aborting");
            self.abort();
            return Err(e);
        }

        self.received_shares = received;
        self.state = DkgState::Round2Distributed;
        debug!(participant = %me, "DKG round 2 shares received");
        Ok(())
    }

    /// Verify the received shares and derive the key share
    pub fn finalize(&mut self) -> Result<KeyShare> {
        self.expect_state(DkgState::Round2Distributed)?;

        if let Some(from) = self.find_invalid_share() {
            warn!(participant = %self.config.identifier, from = %from, "Share failed Feldman verification, aborting");
            self.abort();
            return Err(Error::InvalidShare { from });
        }

        let own_share = self.own_share.take().ok_or(Error::UnexpectedState {
            expected: "Round2Distributed with own share",
            actual: "Round2Distributed",
        })?;
        let signing_share = self
            .received_shares
            .values()
            .fold(*own_share, |acc, share| acc + **share);

        let public = self.public_key_package()?;
        let key_share = KeyShare::new(
            self.config.identifier,
            SigningShare::new(signing_share),
            public,
        );
        key_share.verify()?;

        self.received_shares.clear();
        self.state = DkgState::Finalized;
        Ok(key_share)
    }

    fn find_invalid_share(&self) -> Option<Identifier> {
        let me = self.config.identifier;
        let checks: Vec<(Identifier, &Scalar, &VerifiableSecretSharingCommitment)> = self
            .received_shares
            .iter()
            .filter_map(|(from, share)| {
                self.commitments
                    .get(from)
                    .map(|commitment| (*from, &**share, commitment))
            })
            .collect();

        first_failure(&checks, |(from, share, commitment)| {
            (!vss::verify_share(share, me, commitment)).then_some(*from)
        })
    }

    /// Group key and every participant's verification share, from public commitments only
    fn public_key_package(&self) -> Result<PublicKeyPackage> {
        let threshold = usize::from(self.config.threshold);

        // Coefficient-wise sum of all commitments commits to the summed polynomial
        let mut summed = vec![ProjectivePoint::IDENTITY; threshold];
        for commitment in self.commitments.values() {
            for (acc, coefficient) in summed.iter_mut().zip(commitment.coefficients()) {
                *acc += coefficient;
            }
        }
        let summed = VerifiableSecretSharingCommitment::new(summed);

        let group_public = GroupVerificationKey::new(summed.constant_term()?);
        let verifying_shares = self
            .config
            .participants
            .iter()
            .map(|id| (*id, VerifyingShare::new(summed.evaluate(*id))))
            .collect();

        Ok(PublicKeyPackage {
            threshold: self.config.threshold,
            group_public,
            verifying_shares,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vss::reconstruct_secret;
    use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};

    pub(crate) fn ids(n: u16) -> Vec<Identifier> {
        (1..=n).map(|i| Identifier::new(i).unwrap()).collect()
    }

    fn participants(n: u16, t: u16) -> Vec<DkgParticipant> {
        let all = ids(n);
        all.iter()
            .map(|id| DkgParticipant::new(DkgConfig::new([7u8; 32], t, *id, &all).unwrap()))
            .collect()
    }

    fn exchange_round1(parties: &mut [DkgParticipant], round1: &[Round1Package]) -> Vec<Result<()>> {
        parties
            .iter_mut()
            .map(|p| {
                let me = p.identifier();
                let others = round1.iter().filter(|m| m.sender != me).cloned().collect();
                p.receive_round1(others)
            })
            .collect()
    }

    /// Run a complete in-memory DKG
    pub(crate) fn run_local_dkg(n: u16, t: u16, seed: u64) -> Vec<KeyShare> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut parties = participants(n, t);

        let round1: Vec<_> = parties.iter_mut().map(|p| p.round1(&mut rng).unwrap()).collect();
        for result in exchange_round1(&mut parties, &round1) {
            result.unwrap();
        }

        let round2: Vec<_> = parties
            .iter_mut()
            .flat_map(|p| p.round2().unwrap())
            .collect();
        for p in parties.iter_mut() {
            let me = p.identifier();
            let mine = round2.iter().filter(|m| m.receiver == me).cloned().collect();
            p.receive_round2(mine).unwrap();
        }

        parties.iter_mut().map(|p| p.finalize().unwrap()).collect()
    }

    #[test]
    fn test_dkg_shares_reconstruct_group_key() {
        let shares = run_local_dkg(5, 3, 42);

        let public = &shares[0].public;
        for share in &shares {
            assert_eq!(&share.public, public);
            share.verify().unwrap();
        }

        for subset in [[0usize, 1, 2], [0, 2, 3], [1, 3, 4], [2, 3, 4]] {
            let points: Vec<_> = subset
                .iter()
                .map(|i| (shares[*i].identifier, *shares[*i].signing_share().expose()))
                .collect();
            let secret = reconstruct_secret(&points).unwrap();
            assert_eq!(
                ProjectivePoint::GENERATOR * secret,
                public.group_public.to_element()
            );
        }
    }

    #[test]
    fn test_invalid_proof_aborts_everyone() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let mut parties = participants(4, 3);

        let mut round1: Vec<_> = parties.iter_mut().map(|p| p.round1(&mut rng).unwrap()).collect();
        round1[2].proof = round1[2].proof.corrupted();
        let cheater = round1[2].sender;

        let results = exchange_round1(&mut parties, &round1);
        for (party, result) in parties.iter().zip(results) {
            if party.identifier() == cheater {
                // The cheater verifies everyone else's honest proofs
                assert!(result.is_ok());
                continue;
            }
            assert!(matches!(result, Err(Error::InvalidProofOfKnowledge { from }) if from == cheater));
            assert_eq!(party.state(), DkgState::Aborted);
        }

        for party in parties.iter_mut().filter(|p| p.identifier() != cheater) {
            assert!(party.round2().is_err());
            assert!(matches!(party.finalize(), Err(Error::UnexpectedState { .. })));
        }
    }

    #[test]
    fn test_tampered_share_is_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(6);
        let mut parties = participants(3, 2);

        let round1: Vec<_> = parties.iter_mut().map(|p| p.round1(&mut rng).unwrap()).collect();
        for result in exchange_round1(&mut parties, &round1) {
            result.unwrap();
        }

        let mut round2: Vec<_> = parties
            .iter_mut()
            .flat_map(|p| p.round2().unwrap())
            .collect();
        let victim = parties[0].identifier();
        let tampered = round2
            .iter_mut()
            .find(|m| m.receiver == victim)
            .unwrap();
        tampered.share += Scalar::ONE;
        let from = tampered.sender;

        let mine = round2.iter().filter(|m| m.receiver == victim).cloned().collect();
        parties[0].receive_round2(mine).unwrap();
        assert!(matches!(parties[0].finalize(), Err(Error::InvalidShare { from: f }) if f == from));
        assert_eq!(parties[0].state(), DkgState::Aborted);
    }

    #[test]
    fn test_missing_round1_package() {
        let mut rng = ChaCha20Rng::seed_from_u64(8);
        let mut parties = participants(3, 2);
        let round1: Vec<_> = parties.iter_mut().map(|p| p.round1(&mut rng).unwrap()).collect();

        let only_one = vec![round1[1].clone()];
        assert!(matches!(
            parties[0].receive_round1(only_one),
            Err(Error::QuorumUnavailable { required: 2, available: 1 })
        ));
        assert_eq!(parties[0].state(), DkgState::Aborted);
    }

    #[test]
    fn test_rounds_out_of_order() {
        let mut parties = participants(3, 2);
        assert!(matches!(
            parties[0].round2(),
            Err(Error::UnexpectedState { .. })
        ));
        assert!(matches!(
            parties[0].receive_round1(Vec::new()),
            Err(Error::UnexpectedState { .. })
        ));
    }
}
