//! Schnorr proof of knowledge of a polynomial's constant term

use crate::group::{self, scalar_serde};
use crate::{Error, Identifier, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

const POK_DOMAIN: &[u8] = b"frost-custody/dkg/pok";

/// Proof that the sender knows `a_0` behind the commitment `G·a_0`
///
/// The challenge binds the prover's identifier and the ceremony context, so a
/// proof cannot be replayed under another identity or in another ceremony.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfKnowledge {
    #[serde(with = "scalar_serde")]
    challenge: Scalar,
    #[serde(with = "scalar_serde")]
    response: Scalar,
}

fn pok_challenge(
    id: Identifier,
    context: &[u8],
    public: &ProjectivePoint,
    nonce_commitment: &ProjectivePoint,
) -> Scalar {
    group::hash_to_scalar(
        POK_DOMAIN,
        &[
            context,
            &id.to_bytes(),
            &group::encode_point(public),
            &group::encode_point(nonce_commitment),
        ],
    )
}

impl ProofOfKnowledge {
    /// Prove knowledge of `secret` for `public = G·secret`
    pub fn prove<R: RngCore + CryptoRng>(
        id: Identifier,
        context: &[u8],
        secret: &Scalar,
        public: &ProjectivePoint,
        rng: &mut R,
    ) -> Self {
        let mut k = Scalar::random(&mut *rng);
        let nonce_commitment = ProjectivePoint::GENERATOR * k;
        let challenge = pok_challenge(id, context, public, &nonce_commitment);
        let response = k + *secret * challenge;
        k.zeroize();

        Self {
            challenge,
            response,
        }
    }

    /// Verify the proof for `public` as published by `id`
    pub fn verify(&self, id: Identifier, context: &[u8], public: &ProjectivePoint) -> Result<()> {
        let nonce_commitment = ProjectivePoint::GENERATOR * self.response - *public * self.challenge;
        let expected = pok_challenge(id, context, public, &nonce_commitment);

        if bool::from(expected.ct_eq(&self.challenge)) {
            Ok(())
        } else {
            Err(Error::InvalidProofOfKnowledge { from: id })
        }
    }

    /// A proof whose response has been tampered with
    #[cfg(test)]
    pub(crate) fn corrupted(&self) -> Self {
        Self {
            challenge: self.challenge,
            response: self.response + Scalar::ONE,
        }
    }
}
