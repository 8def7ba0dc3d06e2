//! Shamir secret sharing with Feldman verifiable commitments

use crate::group::point_vec_serde;
use crate::{Error, Identifier, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret sharing polynomial of degree t-1
///
/// Owned by the participant that generated it and wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Number of coefficients (the threshold)
    pub fn threshold(&self) -> usize {
        self.coefficients.len()
    }

    /// Constant term, i.e. the shared secret
    pub(crate) fn secret(&self) -> &Scalar {
        &self.coefficients[0]
    }

    /// Feldman commitment: one `G·a_i` per coefficient
    pub fn commit(&self) -> VerifiableSecretSharingCommitment {
        VerifiableSecretSharingCommitment {
            coefficients: self
                .coefficients
                .iter()
                .map(|coef| ProjectivePoint::GENERATOR * coef)
                .collect(),
        }
    }

    /// Evaluate at a participant identifier using Horner's rule
    pub fn evaluate(&self, id: Identifier) -> Scalar {
        let x = id.to_scalar();
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coef| acc * x + coef)
    }
}

/// Draw a polynomial with `threshold` coefficients
///
/// When `secret` is given it becomes the constant term; plain DKG always
/// passes `None`.
pub fn generate_polynomial<R: RngCore + CryptoRng>(
    threshold: usize,
    secret: Option<Scalar>,
    rng: &mut R,
) -> Result<Polynomial> {
    if threshold == 0 {
        return Err(Error::InvalidConfig("Threshold must be positive".into()));
    }

    let mut coefficients = Vec::with_capacity(threshold);
    coefficients.push(secret.unwrap_or_else(|| Scalar::random(&mut *rng)));
    for _ in 1..threshold {
        coefficients.push(Scalar::random(&mut *rng));
    }

    Ok(Polynomial { coefficients })
}

/// Public commitment to a sharing polynomial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableSecretSharingCommitment {
    #[serde(with = "point_vec_serde")]
    coefficients: Vec<ProjectivePoint>,
}

impl VerifiableSecretSharingCommitment {
    /// Build a commitment from its coefficient elements
    pub fn new(coefficients: Vec<ProjectivePoint>) -> Self {
        Self { coefficients }
    }

    /// Committed coefficients, constant term first
    pub fn coefficients(&self) -> &[ProjectivePoint] {
        &self.coefficients
    }

    /// Number of committed coefficients
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    /// Whether the commitment is empty
    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Commitment to the constant term
    pub fn constant_term(&self) -> Result<ProjectivePoint> {
        self.coefficients
            .first()
            .copied()
            .ok_or_else(|| Error::VerificationFailed("Empty commitment".into()))
    }

    /// `sum_i C_i · id^i`, the public image of the share for `id`
    pub fn evaluate(&self, id: Identifier) -> ProjectivePoint {
        let x = id.to_scalar();
        self.coefficients
            .iter()
            .rev()
            .fold(ProjectivePoint::IDENTITY, |acc, coef| acc * x + coef)
    }
}

/// Feldman check: `G·share == sum_i C_i · id^i`
pub fn verify_share(
    share: &Scalar,
    id: Identifier,
    commitment: &VerifiableSecretSharingCommitment,
) -> bool {
    if commitment.is_empty() {
        return false;
    }
    let expected = ProjectivePoint::GENERATOR * share;
    bool::from(expected.ct_eq(&commitment.evaluate(id)))
}

/// Lagrange basis coefficient at x = 0 for `id` within `quorum`
pub fn lagrange_coefficient(id: Identifier, quorum: &BTreeSet<Identifier>) -> Result<Scalar> {
    if !quorum.contains(&id) {
        return Err(Error::UnknownParticipant(id));
    }

    let x_i = id.to_scalar();
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;

    for other in quorum.iter().filter(|other| **other != id) {
        let x_j = other.to_scalar();
        numerator *= x_j;
        denominator *= x_j - x_i;
    }

    // Identifiers are distinct and non-zero, so the denominator is invertible
    Option::<Scalar>::from(denominator.invert())
        .map(|inv| numerator * inv)
        .ok_or_else(|| Error::InvalidConfig("Degenerate interpolation set".into()))
}

/// Interpolate the shared secret at x = 0 from `(id, share)` pairs
pub fn reconstruct_secret(shares: &[(Identifier, Scalar)]) -> Result<Scalar> {
    let mut quorum = BTreeSet::new();
    for (id, _) in shares {
        if !quorum.insert(*id) {
            return Err(Error::DuplicateIdentifier(*id));
        }
    }

    shares.iter().try_fold(Scalar::ZERO, |acc, (id, share)| {
        Ok(acc + lagrange_coefficient(*id, &quorum)? * share)
    })
}
