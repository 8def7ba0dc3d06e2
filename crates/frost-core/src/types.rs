//! Core types shared by key generation and signing

use crate::group::{self, point_serde, scalar_serde};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Unique identifier for a session (one DKG run or one signing attempt)
pub type SessionId = [u8; 32];

/// Draw a fresh random session identifier
pub fn random_session_id() -> SessionId {
    rand::random()
}

/// Non-zero identifier of a participant, stable across DKG and signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Identifier(u16);

impl Identifier {
    /// Create an identifier, rejecting zero
    pub fn new(value: u16) -> Result<Self> {
        if value == 0 {
            return Err(Error::InvalidConfig("Identifier must be non-zero".into()));
        }
        Ok(Self(value))
    }

    /// Raw identifier value
    pub fn get(&self) -> u16 {
        self.0
    }

    /// The identifier as a point on the x-axis of the sharing polynomial
    pub fn to_scalar(&self) -> Scalar {
        Scalar::from(u64::from(self.0))
    }

    /// Encoded form used inside protocol hashes
    pub(crate) fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl TryFrom<u16> for Identifier {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self> {
        Identifier::new(value)
    }
}

impl From<Identifier> for u16 {
    fn from(id: Identifier) -> u16 {
        id.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant's long-lived secret share of the group key
///
/// Cannot be cloned, serialized or printed. Access to the scalar is limited
/// to the signing code inside this crate.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SigningShare(Scalar);

impl SigningShare {
    pub(crate) fn new(scalar: Scalar) -> Self {
        Self(scalar)
    }

    pub(crate) fn expose(&self) -> &Scalar {
        &self.0
    }
}

impl fmt::Debug for SigningShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningShare(<redacted>)")
    }
}

/// The group's public key: the sum of every participant's constant-term commitment
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupVerificationKey(#[serde(with = "point_serde")] ProjectivePoint);

impl GroupVerificationKey {
    pub(crate) fn new(point: ProjectivePoint) -> Self {
        Self(point)
    }

    /// The key as a group element
    pub fn to_element(&self) -> ProjectivePoint {
        self.0
    }

    /// Compressed encoding
    pub fn to_bytes(&self) -> [u8; group::POINT_LEN] {
        group::encode_point(&self.0)
    }
}

impl fmt::Debug for GroupVerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupVerificationKey({})", hex::encode(self.to_bytes()))
    }
}

/// Public counterpart of one participant's signing share
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingShare(#[serde(with = "point_serde")] ProjectivePoint);

impl VerifyingShare {
    pub(crate) fn new(point: ProjectivePoint) -> Self {
        Self(point)
    }

    /// The share as a group element
    pub fn to_element(&self) -> ProjectivePoint {
        self.0
    }
}

impl fmt::Debug for VerifyingShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VerifyingShare({})",
            hex::encode(group::encode_point(&self.0))
        )
    }
}

/// Public output of a completed DKG, identical for every participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyPackage {
    /// Minimum number of signers
    pub threshold: u16,
    /// Group verification key
    pub group_public: GroupVerificationKey,
    /// Verification share of every participant
    pub verifying_shares: BTreeMap<Identifier, VerifyingShare>,
}

impl PublicKeyPackage {
    /// Number of participants holding a share
    pub fn participants(&self) -> usize {
        self.verifying_shares.len()
    }

    /// Participant identifiers in ascending order
    pub fn identifiers(&self) -> Vec<Identifier> {
        self.verifying_shares.keys().copied().collect()
    }

    /// Look up a participant's verification share
    pub fn verifying_share(&self, id: &Identifier) -> Result<&VerifyingShare> {
        self.verifying_shares
            .get(id)
            .ok_or(Error::UnknownParticipant(*id))
    }
}

/// Key share held by a participant after DKG
pub struct KeyShare {
    /// This participant's identifier
    pub identifier: Identifier,

    /// Secret share, only usable through the signing code
    signing_share: SigningShare,

    /// Public key material shared by all participants
    pub public: PublicKeyPackage,
}

impl KeyShare {
    pub(crate) fn new(
        identifier: Identifier,
        signing_share: SigningShare,
        public: PublicKeyPackage,
    ) -> Self {
        Self {
            identifier,
            signing_share,
            public,
        }
    }

    pub(crate) fn signing_share(&self) -> &SigningShare {
        &self.signing_share
    }

    /// Threshold (t-of-n)
    pub fn threshold(&self) -> u16 {
        self.public.threshold
    }

    /// Group verification key
    pub fn group_public(&self) -> GroupVerificationKey {
        self.public.group_public
    }

    /// Check that the secret share matches this participant's public verification share
    pub fn verify(&self) -> Result<()> {
        let expected = self.public.verifying_share(&self.identifier)?.to_element();
        let actual = ProjectivePoint::GENERATOR * self.signing_share.expose();
        if bool::from(actual.ct_eq(&expected)) {
            Ok(())
        } else {
            Err(Error::VerificationFailed(format!(
                "Signing share of participant {} does not match its verification share",
                self.identifier
            )))
        }
    }
}

impl fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyShare")
            .field("identifier", &self.identifier)
            .field("signing_share", &self.signing_share)
            .field("public", &self.public)
            .finish()
    }
}

/// Schnorr signature (R, s)
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Group commitment R
    #[serde(with = "point_serde")]
    pub r: ProjectivePoint,
    /// Response s
    #[serde(with = "scalar_serde")]
    pub s: Scalar,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: ProjectivePoint, s: Scalar) -> Self {
        Self { r, s }
    }

    /// Convert to bytes (R || s)
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..33].copy_from_slice(&group::encode_point(&self.r));
        bytes[33..].copy_from_slice(&group::encode_scalar(&self.s));
        bytes
    }

    /// Parse from bytes (R || s)
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(Error::Deserialization(format!(
                "Invalid signature length: {}",
                bytes.len()
            )));
        }
        Ok(Self {
            r: group::decode_point(&bytes[..33])?,
            s: group::decode_scalar(&bytes[33..])?,
        })
    }

    /// Standard Schnorr verification: s·G == R + c·Y
    pub fn verify(&self, key: &GroupVerificationKey, message: &[u8]) -> Result<()> {
        let challenge = crate::sign::challenge(&self.r, key, message);
        let lhs = ProjectivePoint::GENERATOR * self.s;
        let rhs = self.r + key.to_element() * challenge;
        if bool::from(lhs.ct_eq(&rhs)) {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.to_bytes()))
    }
}
