//! FROST signing algebra
//!
//! Binding factors, group commitment, challenge, signature shares and their
//! aggregation. All functions here are synchronous and side-effect free.

use super::{SignatureShare, SigningNonces, SigningPackage};
use crate::group;
use crate::parallel::first_failure;
use crate::types::{GroupVerificationKey, PublicKeyPackage, VerifyingShare};
use crate::vss::lagrange_coefficient;
use crate::{Error, Identifier, KeyShare, Result, Signature};
use k256::{elliptic_curve::Group, ProjectivePoint, Scalar};
use std::collections::{BTreeMap, BTreeSet};
use subtle::ConstantTimeEq;

const BINDING_DOMAIN: &[u8] = b"frost-custody/sign/rho";
const MESSAGE_DOMAIN: &[u8] = b"frost-custody/sign/msg";
const COMMITMENT_LIST_DOMAIN: &[u8] = b"frost-custody/sign/com";
const CHALLENGE_DOMAIN: &[u8] = b"frost-custody/sign/chal";

/// Schnorr challenge `c = H(R, Y, m)`
pub(crate) fn challenge(r: &ProjectivePoint, key: &GroupVerificationKey, message: &[u8]) -> Scalar {
    group::hash_to_scalar(
        CHALLENGE_DOMAIN,
        &[&group::encode_point(r), &key.to_bytes(), message],
    )
}

/// Per-signer binding factors `rho_i = H(Y, H(m), H(S, commitments), i)`
///
/// Every binding factor depends on the message, the whole signer set and all
/// published commitments, so a commitment cannot be replayed against another
/// message or quorum.
pub fn compute_binding_factors(
    group_public: &GroupVerificationKey,
    package: &SigningPackage,
) -> BTreeMap<Identifier, Scalar> {
    let message_hash = group::hash_to_bytes(MESSAGE_DOMAIN, &[&package.message]);

    let mut encoded = Vec::with_capacity(package.commitments.len() * 68);
    for (id, commitments) in &package.commitments {
        encoded.extend_from_slice(&id.to_bytes());
        encoded.extend_from_slice(&commitments.to_bytes());
    }
    let commitment_hash = group::hash_to_bytes(COMMITMENT_LIST_DOMAIN, &[&encoded]);
    let key_bytes = group_public.to_bytes();

    package
        .commitments
        .keys()
        .map(|id| {
            let rho = group::hash_to_scalar(
                BINDING_DOMAIN,
                &[&key_bytes, &message_hash, &commitment_hash, &id.to_bytes()],
            );
            (*id, rho)
        })
        .collect()
}

/// Group commitment `R = sum_i (D_i + rho_i·E_i)`
pub fn compute_group_commitment(
    package: &SigningPackage,
    binding_factors: &BTreeMap<Identifier, Scalar>,
) -> Result<ProjectivePoint> {
    let mut r = ProjectivePoint::IDENTITY;
    for (id, commitments) in &package.commitments {
        let rho = binding_factors
            .get(id)
            .ok_or(Error::UnknownParticipant(*id))?;
        r += commitments.hiding + commitments.binding * rho;
    }

    if bool::from(r.is_identity()) {
        return Err(Error::VerificationFailed(
            "Group commitment is the identity".into(),
        ));
    }
    Ok(r)
}

/// Values shared by every signer and the coordinator for one signing package
#[derive(Debug, Clone)]
pub struct SigningContext {
    signers: BTreeSet<Identifier>,
    binding_factors: BTreeMap<Identifier, Scalar>,
    group_commitment: ProjectivePoint,
    challenge: Scalar,
}

impl SigningContext {
    /// Derive binding factors, group commitment and challenge for `package`
    pub fn new(public: &PublicKeyPackage, package: &SigningPackage) -> Result<Self> {
        let signers = package.signers();
        if signers.len() < usize::from(public.threshold) {
            return Err(Error::QuorumUnavailable {
                required: usize::from(public.threshold),
                available: signers.len(),
            });
        }
        for id in &signers {
            public.verifying_share(id)?;
        }

        let binding_factors = compute_binding_factors(&public.group_public, package);
        let group_commitment = compute_group_commitment(package, &binding_factors)?;
        let challenge = challenge(&group_commitment, &public.group_public, &package.message);

        Ok(Self {
            signers,
            binding_factors,
            group_commitment,
            challenge,
        })
    }

    /// Group commitment R
    pub fn group_commitment(&self) -> ProjectivePoint {
        self.group_commitment
    }

    /// Schnorr challenge c
    pub fn challenge(&self) -> Scalar {
        self.challenge
    }

    fn binding_factor(&self, id: &Identifier) -> Result<Scalar> {
        self.binding_factors
            .get(id)
            .copied()
            .ok_or(Error::UnknownParticipant(*id))
    }

    /// Check `G·z_i == D_i + rho_i·E_i + lambda_i·c·Y_i`
    pub fn verify_share(
        &self,
        id: Identifier,
        share: &SignatureShare,
        package: &SigningPackage,
        verifying_share: &VerifyingShare,
    ) -> Result<()> {
        let commitments = package.commitments_for(&id)?;
        let rho = self.binding_factor(&id)?;
        let lambda = lagrange_coefficient(id, &self.signers)?;

        let lhs = ProjectivePoint::GENERATOR * share.to_scalar();
        let rhs = commitments.hiding
            + commitments.binding * rho
            + verifying_share.to_element() * (lambda * self.challenge);

        if bool::from(lhs.ct_eq(&rhs)) {
            Ok(())
        } else {
            Err(Error::InvalidSignatureShare { from: id })
        }
    }
}

/// Compute this signer's share `z_i = d_i + rho_i·e_i + lambda_i·c·s_i`
///
/// The nonces are taken by value and wiped when this function returns.
pub(crate) fn compute_signature_share(
    key_share: &KeyShare,
    nonces: SigningNonces,
    package: &SigningPackage,
) -> Result<SignatureShare> {
    let id = key_share.identifier;
    let published = package.commitments_for(&id)?;
    if *published != nonces.commitments() {
        return Err(Error::VerificationFailed(format!(
            "Commitments of participant {} in the signing package do not match its nonces",
            id
        )));
    }

    let context = SigningContext::new(&key_share.public, package)?;
    let rho = context.binding_factor(&id)?;
    let lambda = lagrange_coefficient(id, &context.signers)?;

    let z = nonces.hiding
        + nonces.binding * rho
        + lambda * context.challenge * key_share.signing_share().expose();

    Ok(SignatureShare::new(z))
}

/// Verify every share and sum them into the final signature
///
/// Fails with `InvalidSignatureShare` naming the first signer (by
/// identifier order) whose share does not verify.
pub fn aggregate(
    public: &PublicKeyPackage,
    package: &SigningPackage,
    shares: &BTreeMap<Identifier, SignatureShare>,
) -> Result<Signature> {
    let context = SigningContext::new(public, package)?;

    for id in shares.keys() {
        if !context.signers.contains(id) {
            return Err(Error::UnknownParticipant(*id));
        }
    }
    if shares.len() != context.signers.len() {
        return Err(Error::QuorumUnavailable {
            required: context.signers.len(),
            available: shares.len(),
        });
    }

    let checks: Vec<(Identifier, &SignatureShare, &VerifyingShare)> = shares
        .iter()
        .map(|(id, share)| Ok((*id, share, public.verifying_share(id)?)))
        .collect::<Result<_>>()?;
    let failed = first_failure(&checks, |(id, share, verifying_share)| {
        context
            .verify_share(*id, share, package, verifying_share)
            .err()
            .map(|_| *id)
    });
    if let Some(from) = failed {
        return Err(Error::InvalidSignatureShare { from });
    }

    let s = shares
        .values()
        .fold(Scalar::ZERO, |acc, share| acc + share.to_scalar());
    let signature = Signature::new(context.group_commitment, s);
    signature.verify(&public.group_public, &package.message)?;

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::run_local_dkg;
    use crate::sign::SigningCommitments;
    use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};

    fn sign_with(
        key_shares: &[KeyShare],
        quorum: &[usize],
        message: &[u8],
        rng: &mut ChaCha20Rng,
    ) -> (SigningPackage, BTreeMap<Identifier, SignatureShare>) {
        let nonces: Vec<_> = quorum
            .iter()
            .map(|i| SigningNonces::generate(key_shares[*i].signing_share(), rng))
            .collect();
        let commitments: BTreeMap<Identifier, SigningCommitments> = quorum
            .iter()
            .zip(&nonces)
            .map(|(i, n)| (key_shares[*i].identifier, n.commitments()))
            .collect();
        let package = SigningPackage::new([9u8; 32], message.to_vec(), commitments);

        let shares = quorum
            .iter()
            .zip(nonces)
            .map(|(i, n)| {
                let share = compute_signature_share(&key_shares[*i], n, &package).unwrap();
                (key_shares[*i].identifier, share)
            })
            .collect();
        (package, shares)
    }

    #[test]
    fn test_quorum_signature_verifies() {
        let key_shares = run_local_dkg(5, 3, 100);
        let public = &key_shares[0].public;
        let mut rng = ChaCha20Rng::seed_from_u64(1);

        let (package, shares) = sign_with(&key_shares, &[0, 2, 3], b"transfer:42", &mut rng);
        let signature = aggregate(public, &package, &shares).unwrap();

        signature.verify(&public.group_public, b"transfer:42").unwrap();
        assert!(matches!(
            signature.verify(&public.group_public, b"transfer:43"),
            Err(Error::InvalidSignature)
        ));
    }

    #[test]
    fn test_larger_quorum_signs() {
        let key_shares = run_local_dkg(5, 3, 101);
        let public = &key_shares[0].public;
        let mut rng = ChaCha20Rng::seed_from_u64(2);

        let (package, shares) = sign_with(&key_shares, &[0, 1, 2, 3, 4], b"all five", &mut rng);
        aggregate(public, &package, &shares).unwrap();
    }

    #[test]
    fn test_bad_share_names_signer() {
        let key_shares = run_local_dkg(4, 3, 102);
        let public = &key_shares[0].public;
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        let (package, mut shares) = sign_with(&key_shares, &[0, 1, 3], b"msg", &mut rng);
        let culprit = key_shares[1].identifier;
        let bad = shares[&culprit].to_scalar() + Scalar::ONE;
        shares.insert(culprit, SignatureShare::new(bad));

        assert!(matches!(
            aggregate(public, &package, &shares),
            Err(Error::InvalidSignatureShare { from }) if from == culprit
        ));
    }

    #[test]
    fn test_binding_factors_depend_on_message_and_quorum() {
        let key_shares = run_local_dkg(4, 2, 103);
        let public = &key_shares[0].public;
        let mut rng = ChaCha20Rng::seed_from_u64(4);

        let (package, _) = sign_with(&key_shares, &[0, 1, 2], b"one", &mut rng);
        let base = compute_binding_factors(&public.group_public, &package);

        let mut other_message = package.clone();
        other_message.message = b"two".to_vec();
        let changed = compute_binding_factors(&public.group_public, &other_message);
        assert_ne!(base, changed);

        let mut smaller = package.clone();
        let dropped = *smaller.commitments.keys().last().unwrap();
        smaller.commitments.remove(&dropped);
        let changed = compute_binding_factors(&public.group_public, &smaller);
        for (id, rho) in &changed {
            assert_ne!(base[id], *rho);
        }
    }

    #[test]
    fn test_below_threshold_is_rejected() {
        let key_shares = run_local_dkg(5, 3, 104);
        let public = &key_shares[0].public;
        let mut rng = ChaCha20Rng::seed_from_u64(5);

        let nonces: Vec<_> = [0usize, 1]
            .iter()
            .map(|i| SigningNonces::generate(key_shares[*i].signing_share(), &mut rng))
            .collect();
        let commitments = [0usize, 1]
            .iter()
            .zip(&nonces)
            .map(|(i, n)| (key_shares[*i].identifier, n.commitments()))
            .collect();
        let package = SigningPackage::new([0u8; 32], b"msg".to_vec(), commitments);

        assert!(matches!(
            SigningContext::new(public, &package),
            Err(Error::QuorumUnavailable { required: 3, available: 2 })
        ));
    }
}
