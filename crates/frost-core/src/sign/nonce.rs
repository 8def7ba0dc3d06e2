//! Single-use signing nonces

use super::SigningCommitments;
use crate::group;
use crate::types::SigningShare;
use k256::{ProjectivePoint, Scalar};
use rand_core::{CryptoRng, RngCore};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_DOMAIN: &[u8] = b"frost-custody/sign/nonce";

/// Secret (hiding, binding) nonce pair for exactly one signing attempt
///
/// Not cloneable; consumed by value when the signature share is computed and
/// wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SigningNonces {
    pub(crate) hiding: Scalar,
    pub(crate) binding: Scalar,
    #[zeroize(skip)]
    commitments: SigningCommitments,
}

/// Nonce from 32 fresh random bytes hashed together with the signing share
fn generate_nonce<R: RngCore + CryptoRng>(secret: &SigningShare, rng: &mut R) -> Scalar {
    let mut random_bytes = [0u8; 32];
    rng.fill_bytes(&mut random_bytes);
    let mut secret_bytes = group::encode_scalar(secret.expose());

    let nonce = group::hash_to_scalar(NONCE_DOMAIN, &[&random_bytes, &secret_bytes]);

    random_bytes.zeroize();
    secret_bytes.zeroize();
    nonce
}

impl SigningNonces {
    pub(crate) fn generate<R: RngCore + CryptoRng>(secret: &SigningShare, rng: &mut R) -> Self {
        let hiding = generate_nonce(secret, rng);
        let binding = generate_nonce(secret, rng);
        let commitments = SigningCommitments {
            hiding: ProjectivePoint::GENERATOR * hiding,
            binding: ProjectivePoint::GENERATOR * binding,
        };

        Self {
            hiding,
            binding,
            commitments,
        }
    }

    /// Public commitments to this nonce pair
    pub fn commitments(&self) -> SigningCommitments {
        self.commitments
    }
}

impl fmt::Debug for SigningNonces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningNonces")
            .field("commitments", &self.commitments)
            .finish_non_exhaustive()
    }
}
