//! Transaction plans and authorization requests

use crate::policy::PreAuthorization;
use frost_core::{Identifier, Signature};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

const SPEND_CONTEXT: &str = "frost-custody 2024 spend authorization v1";

/// A transaction waiting for spend authorization
///
/// The custody service never inspects the transaction itself. It signs one
/// message per spend, each bound to the plan's effect hash.
pub trait TransactionPlan {
    /// Digest committing to everything the transaction does
    fn effect_hash(&self) -> [u8; 32];

    /// Number of spends that need an authorization signature
    fn spend_count(&self) -> usize;
}

/// A plan known only by its effect hash and spend count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaquePlan {
    #[serde(with = "hex::serde")]
    pub effect_hash: [u8; 32],
    pub spend_count: usize,
}

impl TransactionPlan for OpaquePlan {
    fn effect_hash(&self) -> [u8; 32] {
        self.effect_hash
    }

    fn spend_count(&self) -> usize {
        self.spend_count
    }
}

/// Message signed for spend `index` of a plan with `effect_hash`
pub fn spend_message(effect_hash: &[u8; 32], index: usize) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(SPEND_CONTEXT);
    hasher.update(effect_hash);
    hasher.update(&(index as u64).to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// A request to authorize every spend of `plan` with the key `key_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest<P = OpaquePlan> {
    /// Unique id; a request id is only ever authorized once
    pub request_id: Uuid,
    /// Key to sign with
    pub key_id: String,
    /// Plan to authorize
    pub plan: P,
    /// Approvals collected before submission
    #[serde(default)]
    pub pre_authorizations: Vec<PreAuthorization>,
}

impl<P: TransactionPlan> AuthorizeRequest<P> {
    /// New request with a fresh id and no pre-authorizations
    pub fn new(key_id: impl Into<String>, plan: P) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            key_id: key_id.into(),
            plan,
            pre_authorizations: Vec::new(),
        }
    }

    pub fn with_pre_authorization(mut self, pre_authorization: PreAuthorization) -> Self {
        self.pre_authorizations.push(pre_authorization);
        self
    }
}

/// Spend authorization signatures for one plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationData {
    pub key_id: String,
    #[serde(with = "hex::serde")]
    pub effect_hash: [u8; 32],
    /// One signature per spend, in spend order
    pub spend_auths: Vec<Signature>,
    /// Participants whose shares went into each signature
    pub signers: Vec<BTreeSet<Identifier>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_messages_are_distinct() {
        let hash = [7u8; 32];
        assert_ne!(spend_message(&hash, 0), spend_message(&hash, 1));
        assert_ne!(spend_message(&hash, 0), spend_message(&[8u8; 32], 0));
        assert_eq!(spend_message(&hash, 3), spend_message(&hash, 3));
    }

    #[test]
    fn test_request_json() {
        let request = AuthorizeRequest::new(
            "treasury",
            OpaquePlan {
                effect_hash: [1u8; 32],
                spend_count: 2,
            },
        );
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(&hex::encode([1u8; 32])));

        let parsed: AuthorizeRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.request_id, request.request_id);
        assert_eq!(parsed.plan, request.plan);
    }
}
