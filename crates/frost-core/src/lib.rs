//! # FROST Core
//!
//! Core cryptographic primitives for FROST threshold Schnorr signatures over
//! secp256k1.
//!
//! This crate provides the fundamental building blocks for:
//! - Distributed Key Generation (DKG) with Feldman commitments
//! - Two-round threshold signing with single-use nonces
//! - Share verification and aggregation into a plain Schnorr signature
//!
//! ## Protocol Overview
//!
//! A `t`-of-`n` group key is generated without a trusted dealer. Any `t`
//! participants can later produce a signature that verifies under the group
//! key like an ordinary single-party Schnorr signature. Fewer than `t` learn
//! nothing about the group secret.
//!
//! ## Example
//!
//! ```rust,ignore
//! use frost_core::{keygen, sign};
//!
//! // Run distributed key generation
//! let key_share = keygen::run_dkg(&config, &relay).await?;
//!
//! // Hand the share to a signer task and sign through its handle
//! let handle = sign::spawn_signer(sign::Signer::new(key_share));
//! let commitments = handle.commit(session_id).await?;
//! ```

pub mod error;
pub mod group;
pub mod keygen;
pub mod mpc;
pub mod sign;
pub mod types;
pub mod vss;

mod parallel;

pub use error::{Error, Result};
pub use types::{
    random_session_id, GroupVerificationKey, Identifier, KeyShare, PublicKeyPackage, SessionId,
    Signature, SigningShare, VerifyingShare,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
