//! Error types for FROST operations

use crate::Identifier;
use thiserror::Error;

/// Result type alias for FROST operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during key generation and signing
///
/// Every verification failure names the participant responsible for it so
/// the failure can be audited and the participant replaced.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid ceremony configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The same identifier appears twice in one ceremony
    #[error("Duplicate participant identifier: {0}")]
    DuplicateIdentifier(Identifier),

    /// Identifier is not part of the ceremony
    #[error("Unknown participant: {0}")]
    UnknownParticipant(Identifier),

    /// A DKG round 1 proof of knowledge did not verify
    #[error("Invalid proof of knowledge from participant {from}")]
    InvalidProofOfKnowledge { from: Identifier },

    /// A DKG round 2 share is inconsistent with its sender's commitment
    #[error("Invalid secret share from participant {from}")]
    InvalidShare { from: Identifier },

    /// A signature share failed verification against its verification share
    #[error("Invalid signature share from participant {from}")]
    InvalidSignatureShare { from: Identifier },

    /// Commitments arrived after the signer set was fixed
    #[error("Late commitment from participant {from}")]
    LateCommitment { from: Identifier },

    /// Not enough participants responded in time
    #[error("Quorum unavailable: required {required}, got {available}")]
    QuorumUnavailable { required: usize, available: usize },

    /// The ceremony cannot complete
    #[error("Ceremony aborted: {reason}")]
    CeremonyAborted { reason: String },

    /// A signer was asked to sign with a nonce pair it already consumed
    #[error("Nonce reuse detected for participant {participant}")]
    NonceReuseDetected { participant: Identifier },

    /// A signer already holds nonces for an unfinished attempt
    #[error("Participant {participant} already has a signing attempt in flight")]
    NonceInFlight { participant: Identifier },

    /// A state machine was driven out of order
    #[error("Unexpected state: expected {expected}, found {actual}")]
    UnexpectedState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Message verification failed
    #[error("Message verification failed: {0}")]
    VerificationFailed(String),

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
