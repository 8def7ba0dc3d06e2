//! Threshold custody service
//!
//! Turns an [`AuthorizeRequest`] into one FROST signature per spend. Each
//! spend runs signing attempts against the key's signer endpoints until one
//! succeeds; signers that time out or hand in a bad share are excluded and
//! replaced in the next attempt.

use crate::config::{CustodyConfig, QuorumPolicy};
use crate::plan::{spend_message, AuthorizationData, AuthorizeRequest, TransactionPlan};
use crate::registry::{KeyDirectory, KeyEntry};
use crate::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use frost_core::sign::{
    SignatureShare, SignerEndpoint, SigningContext, SigningCoordinator, SigningPackage,
};
use frost_core::{random_session_id, Identifier, SessionId, Signature};
use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::OwnedMutexGuard;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestStatus {
    InFlight,
    Authorized,
}

/// Releases an accepted request id unless the request was authorized
struct RequestSlot<'a> {
    requests: &'a DashMap<Uuid, RequestStatus>,
    request_id: Uuid,
    authorized: bool,
}

impl RequestSlot<'_> {
    fn authorized(mut self) {
        self.requests
            .insert(self.request_id, RequestStatus::Authorized);
        self.authorized = true;
    }
}

impl Drop for RequestSlot<'_> {
    fn drop(&mut self) {
        if !self.authorized {
            self.requests.remove(&self.request_id);
        }
    }
}

/// Signers dropped from the pool for the rest of a request
///
/// `busy` only covers the last attempt: those signers still held nonces for
/// another session and are invited again once idle signers run out.
#[derive(Debug, Default)]
struct Exclusions {
    misbehaving: BTreeSet<Identifier>,
    unresponsive: BTreeSet<Identifier>,
    busy: BTreeSet<Identifier>,
}

impl Exclusions {
    fn contains(&self, id: &Identifier) -> bool {
        self.misbehaving.contains(id) || self.unresponsive.contains(id)
    }

    fn unresponsive(&mut self, id: Identifier, reason: &str) {
        warn!(participant = %id, reason, "Excluding unresponsive signer");
        self.unresponsive.insert(id);
    }

    fn misbehaving(&mut self, id: Identifier) {
        warn!(participant = %id, "Excluding signer for an invalid signature share");
        self.misbehaving.insert(id);
    }

    fn busy(&mut self, id: Identifier) {
        info!(participant = %id, "Signer busy with another signing session");
        self.busy.insert(id);
    }

    /// Error once fewer than `required` signers remain
    fn insufficient(&self, required: usize, available: usize) -> frost_core::Error {
        if self.misbehaving.is_empty() {
            frost_core::Error::QuorumUnavailable {
                required,
                available,
            }
        } else {
            frost_core::Error::CeremonyAborted {
                reason: format!(
                    "{} signers left after excluding misbehaving signers {:?}, {} required",
                    available, self.misbehaving, required
                ),
            }
        }
    }
}

/// Tell `endpoints` to burn their nonces for `session_id`
async fn abandon_all(
    endpoints: Vec<(Identifier, Arc<dyn SignerEndpoint>)>,
    session_id: SessionId,
    deadline: Duration,
) {
    let results = join_all(endpoints.iter().map(|(id, endpoint)| async move {
        (*id, timeout(deadline, endpoint.abandon(session_id)).await)
    }))
    .await;
    for (id, result) in results {
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(participant = %id, error = %e, "Abandon failed"),
            Err(_) => debug!(participant = %id, "Abandon timed out"),
        }
    }
}

/// One signing attempt holding the key's attempt lock
///
/// If the attempt is dropped before [`AttemptGuard::finish`] completes, every
/// invited signer is told to abandon the session from a background task,
/// which keeps the lock until those abandons are answered or time out.
struct AttemptGuard {
    session_id: SessionId,
    invited: Vec<(Identifier, Arc<dyn SignerEndpoint>)>,
    deadline: Duration,
    lock: Option<OwnedMutexGuard<()>>,
    settled: bool,
}

impl AttemptGuard {
    fn new(
        entry: &KeyEntry,
        session_id: SessionId,
        invited: &BTreeSet<Identifier>,
        deadline: Duration,
        lock: OwnedMutexGuard<()>,
    ) -> Self {
        Self {
            session_id,
            invited: invited
                .iter()
                .map(|id| (*id, entry.endpoints[id].clone()))
                .collect(),
            deadline,
            lock: Some(lock),
            settled: false,
        }
    }

    /// Abandon the session on `participants` and release the key
    async fn finish(mut self, participants: &BTreeSet<Identifier>) {
        let endpoints = self
            .invited
            .iter()
            .filter(|(id, _)| participants.contains(id))
            .cloned()
            .collect();
        abandon_all(endpoints, self.session_id, self.deadline).await;
        self.settled = true;
    }
}

impl Drop for AttemptGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let endpoints = std::mem::take(&mut self.invited);
        let lock = self.lock.take();
        let (session_id, deadline) = (self.session_id, self.deadline);
        match Handle::try_current() {
            Ok(runtime) => {
                warn!(
                    session = hex::encode(session_id),
                    "Signing attempt interrupted, abandoning its nonces"
                );
                runtime.spawn(async move {
                    abandon_all(endpoints, session_id, deadline).await;
                    drop(lock);
                });
            }
            Err(_) => warn!(
                session = hex::encode(session_id),
                "Signing attempt interrupted outside a runtime, nonces left to expire"
            ),
        }
    }
}

/// Authorizes transaction plans with threshold keys
pub struct CustodyService<K> {
    config: CustodyConfig,
    keys: K,
    requests: DashMap<Uuid, RequestStatus>,
}

impl<K: KeyDirectory> CustodyService<K> {
    pub fn new(config: CustodyConfig, keys: K) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            keys,
            requests: DashMap::new(),
        })
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    /// Check policies and produce one spend authorization signature per spend
    ///
    /// A request id is accepted once. If authorization fails, or the returned
    /// future is dropped first, the id is released and the request may be
    /// resubmitted. Concurrent requests on one key take turns per attempt.
    #[instrument(skip(self, request), fields(request_id = %request.request_id, key_id = %request.key_id))]
    pub async fn authorize<P: TransactionPlan>(
        &self,
        request: AuthorizeRequest<P>,
    ) -> Result<AuthorizationData> {
        match self.requests.entry(request.request_id) {
            Entry::Occupied(_) => {
                warn!("Refusing replayed request");
                return Err(Error::ReplayedRequest(request.request_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(RequestStatus::InFlight);
            }
        }
        let slot = RequestSlot {
            requests: &self.requests,
            request_id: request.request_id,
            authorized: false,
        };

        match self.authorize_request(&request).await {
            Ok(data) => {
                slot.authorized();
                Ok(data)
            }
            Err(e) => {
                warn!(error = %e, "Authorization failed");
                Err(e)
            }
        }
    }

    /// Whether `request_id` was authorized successfully
    pub fn is_authorized(&self, request_id: &Uuid) -> bool {
        self.requests
            .get(request_id)
            .map(|status| *status == RequestStatus::Authorized)
            .unwrap_or(false)
    }

    async fn authorize_request<P: TransactionPlan>(
        &self,
        request: &AuthorizeRequest<P>,
    ) -> Result<AuthorizationData> {
        let entry = self.keys.lookup(&request.key_id)?;
        for policy in &self.config.policies {
            policy.check(request)?;
        }

        let effect_hash = request.plan.effect_hash();
        let spend_count = request.plan.spend_count();
        info!(
            effect_hash = hex::encode(effect_hash),
            spends = spend_count,
            "Authorizing plan"
        );

        let mut exclusions = Exclusions::default();
        let mut spend_auths = Vec::with_capacity(spend_count);
        let mut signers = Vec::with_capacity(spend_count);
        for index in 0..spend_count {
            let message = spend_message(&effect_hash, index);
            let (signature, quorum) = self
                .sign_spend(&entry, &message, &mut exclusions)
                .await?;
            spend_auths.push(signature);
            signers.push(quorum);
        }

        info!(spends = spend_count, "Plan authorized");
        Ok(AuthorizationData {
            key_id: request.key_id.clone(),
            effect_hash,
            spend_auths,
            signers,
        })
    }

    fn available(&self, entry: &KeyEntry, exclusions: &Exclusions) -> Vec<Identifier> {
        entry
            .endpoints
            .keys()
            .filter(|id| !exclusions.contains(id))
            .copied()
            .collect()
    }

    async fn sign_spend(
        &self,
        entry: &KeyEntry,
        message: &[u8],
        exclusions: &mut Exclusions,
    ) -> Result<(Signature, BTreeSet<Identifier>)> {
        let required = usize::from(entry.public.threshold);

        for attempt in 1..=self.config.max_attempts {
            let available = self.available(entry, exclusions);
            if available.len() < required {
                return Err(exclusions.insufficient(required, available.len()).into());
            }

            // Signers busy in the last attempt go last
            let (idle, busy): (Vec<_>, Vec<_>) = available
                .into_iter()
                .partition(|id| !exclusions.busy.contains(id));
            let candidates = idle.into_iter().chain(busy);
            let invited: BTreeSet<Identifier> = match self.config.quorum_policy {
                QuorumPolicy::FirstAvailable => candidates.take(required).collect(),
                QuorumPolicy::All => candidates.collect(),
            };
            exclusions.busy.clear();
            debug!(attempt, invited = ?invited, "Starting signing attempt");

            if let Some(signed) = self.attempt(entry, message, invited, exclusions).await? {
                return Ok(signed);
            }
        }

        let idle = self
            .available(entry, exclusions)
            .iter()
            .filter(|id| !exclusions.busy.contains(id))
            .count();
        if idle < required {
            return Err(exclusions.insufficient(required, idle).into());
        }
        Err(frost_core::Error::CeremonyAborted {
            reason: format!("no signature after {} attempts", self.config.max_attempts),
        }
        .into())
    }

    /// One signing attempt; `None` when it failed in a way a new quorum can fix
    async fn attempt(
        &self,
        entry: &KeyEntry,
        message: &[u8],
        invited: BTreeSet<Identifier>,
        exclusions: &mut Exclusions,
    ) -> Result<Option<(Signature, BTreeSet<Identifier>)>> {
        let lock = entry.lock_attempts().await;
        let session_id = random_session_id();
        let mut coordinator = SigningCoordinator::new(
            entry.public.clone(),
            session_id,
            message.to_vec(),
            invited.clone(),
        )?;
        let guard = AttemptGuard::new(
            entry,
            session_id,
            &invited,
            self.config.commit_timeout(),
            lock,
        );

        // Round 1
        let commit_timeout = self.config.commit_timeout();
        let responses = join_all(invited.iter().map(|id| async move {
            let endpoint = &entry.endpoints[id];
            (*id, timeout(commit_timeout, endpoint.commit(session_id)).await)
        }))
        .await;
        for (id, response) in responses {
            match response {
                Ok(Ok(commitments)) => coordinator.add_commitments(id, commitments)?,
                Ok(Err(frost_core::Error::NonceInFlight { .. })) => exclusions.busy(id),
                Ok(Err(e)) => exclusions.unresponsive(id, &e.to_string()),
                Err(_) => exclusions.unresponsive(id, "commitment timed out"),
            }
        }

        let package = match coordinator.close_commitments() {
            Ok(package) => package,
            Err(e @ frost_core::Error::QuorumUnavailable { .. }) => {
                debug!(error = %e, "Too few commitments");
                guard.finish(&invited).await;
                return Ok(None);
            }
            Err(e) => {
                guard.finish(&invited).await;
                return Err(e.into());
            }
        };

        // Round 2
        let share_timeout = self.config.share_timeout();
        let signers = package.signers();
        let responses = join_all(signers.iter().map(|id| {
            let package = package.clone();
            async move {
                let endpoint = &entry.endpoints[id];
                (*id, timeout(share_timeout, endpoint.sign(package)).await)
            }
        }))
        .await;
        let mut shares = BTreeMap::new();
        for (id, response) in responses {
            match response {
                Ok(Ok(share)) => {
                    coordinator.add_share(id, share)?;
                    shares.insert(id, share);
                }
                Ok(Err(e)) => exclusions.unresponsive(id, &e.to_string()),
                Err(_) => exclusions.unresponsive(id, "signature share timed out"),
            }
        }

        if !coordinator.missing_shares().is_empty() {
            guard.finish(&invited).await;
            return Ok(None);
        }

        match coordinator.aggregate() {
            Ok(signature) => {
                signature.verify(&entry.public.group_public, message)?;
                let stragglers: BTreeSet<Identifier> =
                    invited.difference(&signers).copied().collect();
                guard.finish(&stragglers).await;
                Ok(Some((signature, signers)))
            }
            Err(frost_core::Error::InvalidSignatureShare { from }) => {
                for culprit in self.invalid_shares(entry, &package, &shares) {
                    exclusions.misbehaving(culprit);
                }
                exclusions.misbehaving(from);
                guard.finish(&invited).await;
                Ok(None)
            }
            Err(e) => {
                guard.finish(&invited).await;
                Err(e.into())
            }
        }
    }

    /// Every signer in `shares` whose share does not verify
    fn invalid_shares(
        &self,
        entry: &KeyEntry,
        package: &SigningPackage,
        shares: &BTreeMap<Identifier, SignatureShare>,
    ) -> Vec<Identifier> {
        let context = match SigningContext::new(&entry.public, package) {
            Ok(context) => context,
            Err(_) => return Vec::new(),
        };
        shares
            .iter()
            .filter(|(id, share)| {
                entry
                    .public
                    .verifying_share(id)
                    .and_then(|vs| context.verify_share(**id, share, package, vs))
                    .is_err()
            })
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OpaquePlan;
    use crate::policy::{AuthPolicy, PreAuthorization, PreAuthorizationPolicy};
    use crate::registry::InMemoryKeyDirectory;
    use async_trait::async_trait;
    use ed25519_dalek::SigningKey;
    use frost_core::keygen::{DkgConfig, DkgParticipant};
    use frost_core::sign::{spawn_signer, Signer, SignerEndpoint, SignerHandle, SigningCommitments};
    use frost_core::KeyShare;
    use rand_chacha::{rand_core::SeedableRng, ChaCha20Rng};
    use std::sync::Arc;
    use std::time::Duration;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("frost_custody=debug,frost_core=debug")
            .with_test_writer()
            .try_init();
    }

    fn generate_key(n: u16, t: u16, seed: u64) -> Vec<KeyShare> {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let ids: Vec<Identifier> = (1..=n).map(|i| Identifier::new(i).unwrap()).collect();
        let mut parties: Vec<DkgParticipant> = ids
            .iter()
            .map(|id| DkgParticipant::new(DkgConfig::new([seed as u8; 32], t, *id, &ids).unwrap()))
            .collect();

        let round1: Vec<_> = parties.iter_mut().map(|p| p.round1(&mut rng).unwrap()).collect();
        for p in parties.iter_mut() {
            let me = p.identifier();
            let others = round1.iter().filter(|m| m.sender != me).cloned().collect();
            p.receive_round1(others).unwrap();
        }

        let round2: Vec<_> = parties.iter_mut().flat_map(|p| p.round2().unwrap()).collect();
        for p in parties.iter_mut() {
            let me = p.identifier();
            let mine = round2.iter().filter(|m| m.receiver == me).cloned().collect();
            p.receive_round2(mine).unwrap();
        }

        parties.iter_mut().map(|p| p.finalize().unwrap()).collect()
    }

    /// Hands in a doubled share
    struct Malicious(SignerHandle);

    #[async_trait]
    impl SignerEndpoint for Malicious {
        fn identifier(&self) -> Identifier {
            self.0.identifier()
        }

        async fn commit(&self, session_id: SessionId) -> frost_core::Result<SigningCommitments> {
            self.0.commit(session_id).await
        }

        async fn sign(&self, package: SigningPackage) -> frost_core::Result<SignatureShare> {
            let share = self.0.sign(package).await?.to_scalar();
            Ok(SignatureShare::new(share + share))
        }

        async fn abandon(&self, session_id: SessionId) -> frost_core::Result<()> {
            self.0.abandon(session_id).await
        }
    }

    /// Never answers
    struct Unresponsive(Identifier);

    #[async_trait]
    impl SignerEndpoint for Unresponsive {
        fn identifier(&self) -> Identifier {
            self.0
        }

        async fn commit(&self, _: SessionId) -> frost_core::Result<SigningCommitments> {
            std::future::pending().await
        }

        async fn sign(&self, _: SigningPackage) -> frost_core::Result<SignatureShare> {
            std::future::pending().await
        }

        async fn abandon(&self, _: SessionId) -> frost_core::Result<()> {
            std::future::pending().await
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Behaviour {
        Honest,
        Malicious,
        Unresponsive,
    }

    fn service(
        config: CustodyConfig,
        t: u16,
        behaviours: &[Behaviour],
        seed: u64,
    ) -> (CustodyService<InMemoryKeyDirectory>, KeyEntry) {
        init_tracing();
        let shares = generate_key(behaviours.len() as u16, t, seed);
        let public = shares[0].public.clone();
        let endpoints: Vec<Arc<dyn SignerEndpoint>> = shares
            .into_iter()
            .zip(behaviours)
            .map(|(share, behaviour)| -> Arc<dyn SignerEndpoint> {
                let id = share.identifier;
                let handle = spawn_signer(Signer::new(share));
                match behaviour {
                    Behaviour::Honest => Arc::new(handle),
                    Behaviour::Malicious => Arc::new(Malicious(handle)),
                    Behaviour::Unresponsive => Arc::new(Unresponsive(id)),
                }
            })
            .collect();

        let entry = KeyEntry::new(public, endpoints).unwrap();
        let keys = InMemoryKeyDirectory::new();
        keys.insert("treasury", entry.clone());
        (CustodyService::new(config, keys).unwrap(), entry)
    }

    fn plan(spends: usize) -> OpaquePlan {
        OpaquePlan {
            effect_hash: [0xab; 32],
            spend_count: spends,
        }
    }

    fn id(i: u16) -> Identifier {
        Identifier::new(i).unwrap()
    }

    fn assert_valid(entry: &KeyEntry, data: &AuthorizationData) {
        for (index, signature) in data.spend_auths.iter().enumerate() {
            let message = spend_message(&data.effect_hash, index);
            signature
                .verify(&entry.public.group_public, &message)
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_three_of_five_authorizes_every_spend() {
        let (service, entry) = service(CustodyConfig::default(), 3, &[Behaviour::Honest; 5], 1);

        let data = service
            .authorize(AuthorizeRequest::new("treasury", plan(2)))
            .await
            .unwrap();

        assert_eq!(data.spend_auths.len(), 2);
        let expected: BTreeSet<_> = [id(1), id(2), id(3)].into_iter().collect();
        assert_eq!(data.signers[0], expected);
        assert_valid(&entry, &data);
    }

    #[tokio::test]
    async fn test_malicious_signer_is_replaced() {
        let behaviours = [
            Behaviour::Honest,
            Behaviour::Malicious,
            Behaviour::Honest,
            Behaviour::Honest,
            Behaviour::Honest,
        ];
        let (service, entry) = service(CustodyConfig::default(), 3, &behaviours, 2);

        let data = service
            .authorize(AuthorizeRequest::new("treasury", plan(1)))
            .await
            .unwrap();

        let expected: BTreeSet<_> = [id(1), id(3), id(4)].into_iter().collect();
        assert_eq!(data.signers[0], expected);
        assert_valid(&entry, &data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_signer_is_replaced() {
        let behaviours = [
            Behaviour::Honest,
            Behaviour::Unresponsive,
            Behaviour::Honest,
            Behaviour::Honest,
            Behaviour::Honest,
        ];
        let (service, entry) = service(CustodyConfig::default(), 3, &behaviours, 3);

        let data = service
            .authorize(AuthorizeRequest::new("treasury", plan(2)))
            .await
            .unwrap();

        // Signer 2 stays excluded for the second spend
        let expected: BTreeSet<_> = [id(1), id(3), id(4)].into_iter().collect();
        for signers in &data.signers {
            assert_eq!(*signers, expected);
        }
        assert_valid(&entry, &data);
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_responsive_of_five_is_quorum_unavailable() {
        let config = CustodyConfig {
            quorum_policy: QuorumPolicy::All,
            ..CustodyConfig::default()
        };
        let behaviours = [
            Behaviour::Honest,
            Behaviour::Unresponsive,
            Behaviour::Honest,
            Behaviour::Unresponsive,
            Behaviour::Unresponsive,
        ];
        let (service, _) = service(config, 3, &behaviours, 4);

        let result = service
            .authorize(AuthorizeRequest::new("treasury", plan(1)))
            .await;
        assert!(matches!(
            result,
            Err(Error::Protocol(frost_core::Error::QuorumUnavailable {
                required: 3,
                available: 2
            }))
        ));
    }

    #[tokio::test]
    async fn test_too_many_malicious_signers_aborts() {
        let config = CustodyConfig {
            quorum_policy: QuorumPolicy::All,
            ..CustodyConfig::default()
        };
        let behaviours = [
            Behaviour::Malicious,
            Behaviour::Honest,
            Behaviour::Malicious,
            Behaviour::Honest,
            Behaviour::Malicious,
        ];
        let (service, _) = service(config, 3, &behaviours, 5);

        let result = service
            .authorize(AuthorizeRequest::new("treasury", plan(1)))
            .await;
        assert!(matches!(
            result,
            Err(Error::Protocol(frost_core::Error::CeremonyAborted { .. }))
        ));
    }

    #[tokio::test]
    async fn test_replayed_request_is_refused() {
        let (service, _) = service(CustodyConfig::default(), 2, &[Behaviour::Honest; 3], 6);

        let request = AuthorizeRequest::new("treasury", plan(1));
        service.authorize(request.clone()).await.unwrap();
        assert!(service.is_authorized(&request.request_id));

        assert!(matches!(
            service.authorize(request.clone()).await,
            Err(Error::ReplayedRequest(id)) if id == request.request_id
        ));
    }

    #[tokio::test]
    async fn test_policy_violation_releases_request_id() {
        let approver = SigningKey::from_bytes(&[7u8; 32]);
        let config = CustodyConfig {
            policies: vec![
                AuthPolicy::MaxSpends { limit: 4 },
                AuthPolicy::PreAuthorization(PreAuthorizationPolicy::Ed25519 {
                    required_signatures: 1,
                    allowed_signers: vec![approver.verifying_key()],
                }),
            ],
            ..CustodyConfig::default()
        };
        let (service, entry) = service(config, 2, &[Behaviour::Honest; 3], 7);

        let request = AuthorizeRequest::new("treasury", plan(1));
        assert!(matches!(
            service.authorize(request.clone()).await,
            Err(Error::PolicyViolation(_))
        ));
        assert!(!service.is_authorized(&request.request_id));

        let approved =
            request.with_pre_authorization(PreAuthorization::sign(&approver, &[0xab; 32]));
        let data = service.authorize(approved).await.unwrap();
        assert_valid(&entry, &data);

        let too_many = AuthorizeRequest::new("treasury", plan(5))
            .with_pre_authorization(PreAuthorization::sign(&approver, &[0xab; 32]));
        assert!(matches!(
            service.authorize(too_many).await,
            Err(Error::PolicyViolation(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let (service, _) = service(CustodyConfig::default(), 2, &[Behaviour::Honest; 3], 8);

        assert!(matches!(
            service.authorize(AuthorizeRequest::new("cold", plan(1))).await,
            Err(Error::UnknownKey(key)) if key == "cold"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_request_releases_signers() {
        let config = CustodyConfig {
            quorum_policy: QuorumPolicy::All,
            ..CustodyConfig::default()
        };
        let behaviours = [Behaviour::Honest, Behaviour::Honest, Behaviour::Unresponsive];
        let (service, entry) = service(config, 2, &behaviours, 9);

        // Dropped while signer 3 still owes its commitment
        let first = AuthorizeRequest::new("treasury", plan(1));
        let cancelled = timeout(Duration::from_secs(1), service.authorize(first.clone())).await;
        assert!(cancelled.is_err());

        let expected: BTreeSet<_> = [id(1), id(2)].into_iter().collect();
        for _ in 0..2 {
            let data = service
                .authorize(AuthorizeRequest::new("treasury", plan(1)))
                .await
                .unwrap();
            assert_eq!(data.signers[0], expected);
            assert_valid(&entry, &data);
        }

        // The cancelled request id was released
        let data = service.authorize(first.clone()).await.unwrap();
        assert_valid(&entry, &data);
        assert!(service.is_authorized(&first.request_id));
    }

    #[tokio::test]
    async fn test_concurrent_requests_on_one_key() {
        let (service, entry) = service(CustodyConfig::default(), 2, &[Behaviour::Honest; 3], 10);

        let (a, b) = tokio::join!(
            service.authorize(AuthorizeRequest::new("treasury", plan(1))),
            service.authorize(AuthorizeRequest::new("treasury", plan(2))),
        );

        let expected: BTreeSet<_> = [id(1), id(2)].into_iter().collect();
        for data in [a.unwrap(), b.unwrap()] {
            for signers in &data.signers {
                assert_eq!(*signers, expected);
            }
            assert_valid(&entry, &data);
        }
    }

    #[tokio::test]
    async fn test_busy_signer_is_skipped_not_excluded() {
        init_tracing();
        let shares = generate_key(3, 2, 11);
        let public = shares[0].public.clone();
        let handles: Vec<SignerHandle> = shares
            .into_iter()
            .map(|share| spawn_signer(Signer::new(share)))
            .collect();

        // Signer 1 is holding nonces for a session run by someone else
        handles[0].commit([0xee; 32]).await.unwrap();

        let endpoints = handles
            .iter()
            .map(|h| -> Arc<dyn SignerEndpoint> { Arc::new(h.clone()) })
            .collect();
        let entry = KeyEntry::new(public, endpoints).unwrap();
        let keys = InMemoryKeyDirectory::new();
        keys.insert("treasury", entry.clone());
        let service = CustodyService::new(CustodyConfig::default(), keys).unwrap();

        let data = service
            .authorize(AuthorizeRequest::new("treasury", plan(2)))
            .await
            .unwrap();
        let expected: BTreeSet<_> = [id(2), id(3)].into_iter().collect();
        for signers in &data.signers {
            assert_eq!(*signers, expected);
        }
        assert_valid(&entry, &data);

        // Once idle again it signs
        handles[0].abandon([0xee; 32]).await.unwrap();
        let data = service
            .authorize(AuthorizeRequest::new("treasury", plan(1)))
            .await
            .unwrap();
        let expected: BTreeSet<_> = [id(1), id(2)].into_iter().collect();
        assert_eq!(data.signers[0], expected);
    }
}
