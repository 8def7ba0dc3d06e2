//! Two-round FROST threshold signing
//!
//! Round 1: each signer in the quorum commits to a fresh (hiding, binding)
//! nonce pair. Round 2: once the signer set is fixed, each signer derives the
//! binding factors and the group commitment from the full commitment list and
//! returns its signature share. The coordinator verifies every share before
//! summing them into a Schnorr signature under the group key.
//!
//! Nonces are single-use: a [`Signer`] refuses to sign twice with the same
//! pair, and an abandoned attempt burns its nonces.

mod coordinator;
mod endpoint;
mod frost;
mod messages;
mod nonce;
mod signer;

pub use coordinator::{SigningCoordinator, SigningState};
pub use endpoint::{spawn_signer, SignerEndpoint, SignerHandle};
pub use frost::{aggregate, compute_binding_factors, compute_group_commitment, SigningContext};
pub use messages::{SignatureShare, SigningCommitments, SigningPackage};
pub use nonce::SigningNonces;
pub use signer::{Signer, DEFAULT_NONCE_LIFETIME};

pub(crate) use frost::challenge;
