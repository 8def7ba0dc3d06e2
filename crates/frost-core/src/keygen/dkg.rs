//! DKG protocol driver over a message relay

use super::{DkgConfig, DkgParticipant, Round1Package, Round2Package};
use crate::mpc::Relay;
use crate::{KeyShare, Result};
use rand::rngs::OsRng;
use tracing::{debug, info, instrument};

/// Run the distributed key generation protocol for one participant
///
/// # Arguments
/// * `config` - Session configuration
/// * `relay` - Message relay for communication
///
/// # Returns
/// The participant's key share after successful DKG. Any invalid proof or
/// share aborts the ceremony for this participant; a missing message fails
/// with `QuorumUnavailable` once the relay's deadline passes.
///
/// Round 2 messages are consumed as they are collected. Round 1 broadcasts
/// stay on the relay for slower participants; the caller drops them once
/// every participant has returned, e.g. with [`crate::mpc::MemoryRelay::clear_session`].
#[instrument(skip(relay), fields(participant = %config.identifier))]
pub async fn run_dkg<R: Relay>(config: &DkgConfig, relay: &R) -> Result<KeyShare> {
    info!(
        n_participants = config.n_participants(),
        threshold = config.threshold,
        "Starting DKG"
    );

    let me = config.identifier;
    let mut participant = DkgParticipant::new(config.clone());

    // Round 1: Commit to the secret polynomial and prove knowledge of its constant term
    debug!("DKG Round 1: Commitment");
    let package = participant.round1(&mut OsRng)?;
    relay.broadcast(&config.session_id, 1, &package).await?;

    let all_packages = relay
        .collect_broadcasts::<Round1Package>(&config.session_id, 1, config.n_participants())
        .await?;
    let others = all_packages
        .into_iter()
        .filter(|package| package.sender != me)
        .collect();
    participant.receive_round1(others)?;

    // Round 2: Send each participant its share
    debug!("DKG Round 2: Secret sharing");
    for package in participant.round2()? {
        relay
            .send_direct(&config.session_id, 2, package.receiver, &package)
            .await?;
    }

    let received = relay
        .collect_direct::<Round2Package>(
            &config.session_id,
            2,
            me,
            config.n_participants() - 1,
        )
        .await?;
    participant.receive_round2(received)?;

    // Round 3: Verify shares and compute the final key share
    debug!("DKG Round 3: Verification");
    let key_share = participant.finalize()?;

    info!(
        group_public = hex::encode(key_share.group_public().to_bytes()),
        "DKG completed successfully"
    );

    Ok(key_share)
}
