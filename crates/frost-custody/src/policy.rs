//! Spend authorization policies
//!
//! Policies are simple enough to be written by hand in the service's JSON
//! configuration. Every configured policy must pass before any signer is
//! contacted.

use crate::plan::{AuthorizeRequest, TransactionPlan};
use crate::{Error, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// An Ed25519 approval of a plan's effect hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthorization {
    #[serde(with = "verifying_key_hex")]
    pub verifying_key: VerifyingKey,
    #[serde(with = "signature_hex")]
    pub signature: Signature,
}

impl PreAuthorization {
    /// Approve the plan with `effect_hash`
    pub fn sign(signing_key: &SigningKey, effect_hash: &[u8; 32]) -> Self {
        Self {
            verifying_key: signing_key.verifying_key(),
            signature: signing_key.sign(effect_hash),
        }
    }

    fn verify(&self, effect_hash: &[u8; 32]) -> Result<()> {
        self.verifying_key
            .verify_strict(effect_hash, &self.signature)
            .map_err(|e| {
                Error::PolicyViolation(format!(
                    "pre-authorization from {} does not verify: {}",
                    hex::encode(self.verifying_key.as_bytes()),
                    e
                ))
            })
    }
}

/// Policies a request must satisfy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthPolicy {
    /// Require approvals of the effect hash from an allow-list of keys
    PreAuthorization(PreAuthorizationPolicy),
    /// Refuse plans with more than `limit` spends
    MaxSpends { limit: usize },
}

/// Pre-authorization methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum PreAuthorizationPolicy {
    Ed25519 {
        /// Distinct allowed signers that must approve; each counts once
        required_signatures: usize,
        #[serde(with = "verifying_keys_hex")]
        allowed_signers: Vec<VerifyingKey>,
    },
}

impl AuthPolicy {
    /// Reject policies that can never be satisfied
    pub fn validate(&self) -> Result<()> {
        match self {
            AuthPolicy::PreAuthorization(PreAuthorizationPolicy::Ed25519 {
                required_signatures,
                allowed_signers,
            }) => {
                if *required_signatures > allowed_signers.len() {
                    return Err(Error::Config(format!(
                        "pre-authorization requires {} signatures but allows only {} signers",
                        required_signatures,
                        allowed_signers.len()
                    )));
                }
                Ok(())
            }
            AuthPolicy::MaxSpends { .. } => Ok(()),
        }
    }

    /// Check `request` against this policy
    pub fn check<P: TransactionPlan>(&self, request: &AuthorizeRequest<P>) -> Result<()> {
        match self {
            AuthPolicy::PreAuthorization(policy) => {
                policy.check(&request.pre_authorizations, &request.plan.effect_hash())
            }
            AuthPolicy::MaxSpends { limit } => {
                let spends = request.plan.spend_count();
                if spends > *limit {
                    return Err(Error::PolicyViolation(format!(
                        "plan has {} spends, limit is {}",
                        spends, limit
                    )));
                }
                Ok(())
            }
        }
    }
}

impl PreAuthorizationPolicy {
    fn check(&self, pre_authorizations: &[PreAuthorization], effect_hash: &[u8; 32]) -> Result<()> {
        match self {
            PreAuthorizationPolicy::Ed25519 {
                required_signatures,
                allowed_signers,
            } => {
                let mut allowed: HashSet<[u8; 32]> =
                    allowed_signers.iter().map(|vk| vk.to_bytes()).collect();
                let mut seen = 0usize;

                for pre_auth in pre_authorizations {
                    // Each allowed signer counts once
                    if allowed.remove(pre_auth.verifying_key.as_bytes()) {
                        pre_auth.verify(effect_hash)?;
                        seen += 1;
                    }
                }

                if seen < *required_signatures {
                    return Err(Error::PolicyViolation(format!(
                        "required {} pre-authorization signatures but only saw {}",
                        required_signatures, seen
                    )));
                }
                Ok(())
            }
        }
    }
}

fn decode_key<E: serde::de::Error>(encoded: &str) -> std::result::Result<VerifyingKey, E> {
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(encoded, &mut bytes).map_err(E::custom)?;
    VerifyingKey::from_bytes(&bytes).map_err(E::custom)
}

mod verifying_key_hex {
    use ed25519_dalek::VerifyingKey;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &VerifyingKey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(key.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<VerifyingKey, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        super::decode_key(&encoded)
    }
}

mod verifying_keys_hex {
    use ed25519_dalek::VerifyingKey;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(keys: &[VerifyingKey], serializer: S) -> Result<S::Ok, S::Error> {
        keys.iter()
            .map(|key| hex::encode(key.as_bytes()))
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<VerifyingKey>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|encoded| super::decode_key(encoded))
            .collect()
    }
}

mod signature_hex {
    use ed25519_dalek::Signature;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(signature: &Signature, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(signature.to_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Signature, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let mut bytes = [0u8; 64];
        hex::decode_to_slice(&encoded, &mut bytes).map_err(D::Error::custom)?;
        Ok(Signature::from_bytes(&bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::OpaquePlan;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn plan_request(spends: usize) -> AuthorizeRequest {
        AuthorizeRequest::new(
            "hot-wallet",
            OpaquePlan {
                effect_hash: [42u8; 32],
                spend_count: spends,
            },
        )
    }

    fn two_of_three() -> AuthPolicy {
        AuthPolicy::PreAuthorization(PreAuthorizationPolicy::Ed25519 {
            required_signatures: 2,
            allowed_signers: vec![
                key(1).verifying_key(),
                key(2).verifying_key(),
                key(3).verifying_key(),
            ],
        })
    }

    #[test]
    fn test_pre_authorization_quorum() {
        let policy = two_of_three();
        let hash = [42u8; 32];

        let request = plan_request(1)
            .with_pre_authorization(PreAuthorization::sign(&key(1), &hash))
            .with_pre_authorization(PreAuthorization::sign(&key(3), &hash));
        policy.check(&request).unwrap();
    }

    #[test]
    fn test_same_signer_counts_once() {
        let policy = two_of_three();
        let hash = [42u8; 32];

        let request = plan_request(1)
            .with_pre_authorization(PreAuthorization::sign(&key(1), &hash))
            .with_pre_authorization(PreAuthorization::sign(&key(1), &hash));
        assert!(matches!(
            policy.check(&request),
            Err(Error::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_unlisted_and_wrong_hash_are_refused() {
        let policy = two_of_three();
        let hash = [42u8; 32];

        // Unlisted signer is ignored
        let request = plan_request(1)
            .with_pre_authorization(PreAuthorization::sign(&key(1), &hash))
            .with_pre_authorization(PreAuthorization::sign(&key(9), &hash));
        assert!(matches!(
            policy.check(&request),
            Err(Error::PolicyViolation(_))
        ));

        // Listed signer approving a different plan fails outright
        let request = plan_request(1)
            .with_pre_authorization(PreAuthorization::sign(&key(1), &hash))
            .with_pre_authorization(PreAuthorization::sign(&key(2), &[0u8; 32]));
        assert!(matches!(
            policy.check(&request),
            Err(Error::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_max_spends() {
        let policy = AuthPolicy::MaxSpends { limit: 2 };
        policy.check(&plan_request(2)).unwrap();
        assert!(matches!(
            policy.check(&plan_request(3)),
            Err(Error::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_unsatisfiable_policy_is_invalid() {
        let policy = AuthPolicy::PreAuthorization(PreAuthorizationPolicy::Ed25519 {
            required_signatures: 2,
            allowed_signers: vec![key(1).verifying_key()],
        });
        assert!(matches!(policy.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_pre_authorization_json() {
        let pre_auth = PreAuthorization::sign(&key(5), &[1u8; 32]);
        let json = serde_json::to_string(&pre_auth).unwrap();
        let parsed: PreAuthorization = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, pre_auth);
    }
}
