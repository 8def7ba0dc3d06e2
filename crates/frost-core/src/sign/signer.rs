//! Participant-side signer with nonce bookkeeping

use super::frost::compute_signature_share;
use super::{SignatureShare, SigningCommitments, SigningNonces, SigningPackage};
use crate::group::POINT_LEN;
use crate::types::PublicKeyPackage;
use crate::{Error, Identifier, KeyShare, Result, SessionId};
use rand_core::{CryptoRng, RngCore};
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long an uncollected nonce pair blocks new attempts
pub const DEFAULT_NONCE_LIFETIME: Duration = Duration::from_secs(60);

struct InFlight {
    session_id: SessionId,
    nonces: SigningNonces,
    since: Instant,
}

/// A participant's signing endpoint for one key
///
/// Holds at most one nonce pair at a time. Once a pair is used, abandoned or
/// expired its session and commitments are remembered and any later request
/// touching them is refused with [`Error::NonceReuseDetected`].
///
/// A pair that is neither signed nor abandoned within the nonce lifetime is
/// burned by the next `commit` for another session, so a coordinator that
/// disappears mid-attempt cannot block this signer for good.
///
/// The consumed sets grow by one entry per attempt for the lifetime of the
/// signer. They are never pruned: forgetting an entry would make its
/// nonce pair signable again.
pub struct Signer {
    key_share: KeyShare,
    in_flight: Option<InFlight>,
    nonce_lifetime: Duration,
    consumed_sessions: HashSet<SessionId>,
    consumed_commitments: HashSet<[u8; 2 * POINT_LEN]>,
}

impl Signer {
    /// Create a signer from a DKG key share
    pub fn new(key_share: KeyShare) -> Self {
        Self {
            key_share,
            in_flight: None,
            nonce_lifetime: DEFAULT_NONCE_LIFETIME,
            consumed_sessions: HashSet::new(),
            consumed_commitments: HashSet::new(),
        }
    }

    /// Set how long an in-flight nonce pair is kept before it may be burned
    pub fn with_nonce_lifetime(mut self, lifetime: Duration) -> Self {
        self.nonce_lifetime = lifetime;
        self
    }

    /// This participant's identifier
    pub fn identifier(&self) -> Identifier {
        self.key_share.identifier
    }

    /// Public key material of the key this signer holds a share of
    pub fn public(&self) -> &PublicKeyPackage {
        &self.key_share.public
    }

    /// Session of the attempt currently holding nonces, if any
    pub fn in_flight(&self) -> Option<SessionId> {
        self.in_flight.as_ref().map(|pending| pending.session_id)
    }

    fn burn(&mut self, pending: InFlight) {
        self.consumed_sessions.insert(pending.session_id);
        self.consumed_commitments
            .insert(pending.nonces.commitments().to_bytes());
    }

    fn reuse_detected(&self) -> Error {
        warn!(participant = %self.identifier(), "Refusing to reuse a consumed nonce pair");
        Error::NonceReuseDetected {
            participant: self.identifier(),
        }
    }

    /// Generate and commit to a fresh nonce pair for `session_id`
    ///
    /// Asking again for the same in-flight session returns the same
    /// commitments. A different session is refused until the current one is
    /// signed, abandoned or has outlived the nonce lifetime.
    pub fn commit<R: RngCore + CryptoRng>(
        &mut self,
        session_id: SessionId,
        rng: &mut R,
    ) -> Result<SigningCommitments> {
        if let Some(pending) = &self.in_flight {
            if pending.session_id == session_id {
                return Ok(pending.nonces.commitments());
            }
            if pending.since.elapsed() < self.nonce_lifetime {
                return Err(Error::NonceInFlight {
                    participant: self.identifier(),
                });
            }
        }
        if let Some(stale) = self.in_flight.take() {
            warn!(
                participant = %self.identifier(),
                session = hex::encode(stale.session_id),
                "Burning expired nonce pair"
            );
            self.burn(stale);
        }
        if self.consumed_sessions.contains(&session_id) {
            return Err(self.reuse_detected());
        }

        let nonces = SigningNonces::generate(self.key_share.signing_share(), rng);
        let commitments = nonces.commitments();
        self.in_flight = Some(InFlight {
            session_id,
            nonces,
            since: Instant::now(),
        });

        debug!(
            participant = %self.identifier(),
            session = hex::encode(session_id),
            "Nonce commitments generated"
        );
        Ok(commitments)
    }

    /// Produce this participant's signature share and destroy the nonces
    pub fn sign(&mut self, package: &SigningPackage) -> Result<SignatureShare> {
        let id = self.identifier();
        let published = *package.commitments_for(&id)?;

        if self.consumed_sessions.contains(&package.session_id)
            || self.consumed_commitments.contains(&published.to_bytes())
        {
            return Err(self.reuse_detected());
        }

        let pending = match self.in_flight.take() {
            Some(pending) if pending.session_id == package.session_id => pending,
            other => {
                self.in_flight = other;
                return Err(Error::SessionNotFound(hex::encode(package.session_id)));
            }
        };
        if pending.nonces.commitments() != published {
            self.in_flight = Some(pending);
            return Err(Error::VerificationFailed(format!(
                "Commitments of participant {} in the signing package do not match its nonces",
                id
            )));
        }

        self.consumed_sessions.insert(package.session_id);
        self.consumed_commitments.insert(published.to_bytes());

        let share = compute_signature_share(&self.key_share, pending.nonces, package)?;
        debug!(
            participant = %id,
            session = hex::encode(package.session_id),
            "Signature share produced"
        );
        Ok(share)
    }

    /// Discard the nonces of an abandoned attempt
    ///
    /// Returns whether nonces for `session_id` were held. The session can
    /// never be signed afterwards.
    pub fn abandon(&mut self, session_id: SessionId) -> bool {
        match self.in_flight.take() {
            Some(pending) if pending.session_id == session_id => {
                self.burn(pending);
                debug!(
                    participant = %self.identifier(),
                    session = hex::encode(session_id),
                    "Signing attempt abandoned"
                );
                true
            }
            other => {
                self.in_flight = other;
                false
            }
        }
    }
}
