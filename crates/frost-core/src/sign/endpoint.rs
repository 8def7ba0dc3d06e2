//! Asynchronous signer endpoints
//!
//! A [`Signer`] owns secret nonces and must never be shared. [`spawn_signer`]
//! moves it onto its own task and hands out a cloneable [`SignerHandle`] that
//! talks to it over a channel, so concurrent requests to one signer are
//! serialized.

use super::{SignatureShare, Signer, SigningCommitments, SigningPackage};
use crate::{Error, Identifier, Result, SessionId};
use async_trait::async_trait;
use rand::rngs::OsRng;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

const REQUEST_QUEUE: usize = 32;

/// Remote view of one signing participant
#[async_trait]
pub trait SignerEndpoint: Send + Sync {
    /// Identifier of the participant behind this endpoint
    fn identifier(&self) -> Identifier;

    /// Round 1: commit to a fresh nonce pair for `session_id`
    async fn commit(&self, session_id: SessionId) -> Result<SigningCommitments>;

    /// Round 2: produce a signature share for `package`
    async fn sign(&self, package: SigningPackage) -> Result<SignatureShare>;

    /// Drop the nonces of an abandoned attempt
    async fn abandon(&self, session_id: SessionId) -> Result<()>;
}

enum SignerRequest {
    Commit {
        session_id: SessionId,
        reply: oneshot::Sender<Result<SigningCommitments>>,
    },
    Sign {
        package: SigningPackage,
        reply: oneshot::Sender<Result<SignatureShare>>,
    },
    Abandon {
        session_id: SessionId,
        reply: oneshot::Sender<bool>,
    },
}

/// Cloneable handle to a signer running on its own task
#[derive(Clone)]
pub struct SignerHandle {
    identifier: Identifier,
    sender: mpsc::Sender<SignerRequest>,
}

/// Move `signer` onto a background task and return a handle to it
///
/// The task stops once every handle is dropped.
pub fn spawn_signer(mut signer: Signer) -> SignerHandle {
    let identifier = signer.identifier();
    let (sender, mut receiver) = mpsc::channel(REQUEST_QUEUE);

    tokio::spawn(async move {
        while let Some(request) = receiver.recv().await {
            match request {
                SignerRequest::Commit { session_id, reply } => {
                    let _ = reply.send(signer.commit(session_id, &mut OsRng));
                }
                SignerRequest::Sign { package, reply } => {
                    let _ = reply.send(signer.sign(&package));
                }
                SignerRequest::Abandon { session_id, reply } => {
                    let _ = reply.send(signer.abandon(session_id));
                }
            }
        }
        debug!(participant = %signer.identifier(), "Signer task stopped");
    });

    SignerHandle { identifier, sender }
}

fn stopped() -> Error {
    Error::Relay("signer task stopped".into())
}

impl SignerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> SignerRequest,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(build(reply))
            .await
            .map_err(|_| stopped())?;
        response.await.map_err(|_| stopped())
    }
}

#[async_trait]
impl SignerEndpoint for SignerHandle {
    fn identifier(&self) -> Identifier {
        self.identifier
    }

    async fn commit(&self, session_id: SessionId) -> Result<SigningCommitments> {
        self.request(|reply| SignerRequest::Commit { session_id, reply })
            .await?
    }

    async fn sign(&self, package: SigningPackage) -> Result<SignatureShare> {
        self.request(|reply| SignerRequest::Sign { package, reply })
            .await?
    }

    async fn abandon(&self, session_id: SessionId) -> Result<()> {
        self.request(|reply| SignerRequest::Abandon { session_id, reply })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keygen::run_local_dkg;
    use crate::sign::SigningCoordinator;
    use futures_util::future::join_all;

    #[tokio::test]
    async fn test_handles_sign_concurrently() {
        let key_shares = run_local_dkg(4, 3, 400);
        let public = key_shares[0].public.clone();
        let handles: Vec<SignerHandle> = key_shares
            .into_iter()
            .map(|k| spawn_signer(Signer::new(k)))
            .collect();
        let session_id = [1u8; 32];

        let mut coordinator = SigningCoordinator::new(
            public.clone(),
            session_id,
            b"async".to_vec(),
            handles.iter().map(|h| h.identifier()).collect(),
        )
        .unwrap();

        let commitments = join_all(handles.iter().map(|h| h.commit(session_id))).await;
        for (handle, commitments) in handles.iter().zip(commitments) {
            coordinator
                .add_commitments(handle.identifier(), commitments.unwrap())
                .unwrap();
        }
        let package = coordinator.close_commitments().unwrap();

        let shares = join_all(handles.iter().map(|h| h.sign(package.clone()))).await;
        for (handle, share) in handles.iter().zip(shares) {
            coordinator.add_share(handle.identifier(), share.unwrap()).unwrap();
        }

        let signature = coordinator.aggregate().unwrap();
        signature.verify(&public.group_public, b"async").unwrap();
    }

    #[tokio::test]
    async fn test_abandoned_session_cannot_sign() {
        let key_shares = run_local_dkg(3, 2, 401);
        let handles: Vec<SignerHandle> = key_shares
            .into_iter()
            .map(|k| spawn_signer(Signer::new(k)))
            .collect();
        let session_id = [2u8; 32];

        let mut commitments = std::collections::BTreeMap::new();
        for handle in &handles[..2] {
            let published = handle.commit(session_id).await.unwrap();
            commitments.insert(handle.identifier(), published);
        }
        let package = SigningPackage::new(session_id, b"msg".to_vec(), commitments);

        handles[0].abandon(session_id).await.unwrap();
        assert!(matches!(
            handles[0].sign(package.clone()).await,
            Err(Error::NonceReuseDetected { .. })
        ));
        handles[1].sign(package).await.unwrap();
    }
}
