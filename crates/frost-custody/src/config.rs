//! Service configuration

use crate::policy::AuthPolicy;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How a signing attempt picks its quorum from the available signers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuorumPolicy {
    /// Invite exactly `t` signers, in identifier order
    #[default]
    FirstAvailable,
    /// Invite every remaining signer; the first responders form the quorum
    All,
}

/// Custody service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Quorum selection for each signing attempt
    pub quorum_policy: QuorumPolicy,
    /// How long to wait for nonce commitments, in milliseconds
    pub commit_timeout_ms: u64,
    /// How long to wait for signature shares, in milliseconds
    pub share_timeout_ms: u64,
    /// Signing attempts per spend before giving up
    pub max_attempts: usize,
    /// Policies every request must satisfy
    pub policies: Vec<AuthPolicy>,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            quorum_policy: QuorumPolicy::default(),
            commit_timeout_ms: 5_000,
            share_timeout_ms: 5_000,
            max_attempts: 3,
            policies: Vec::new(),
        }
    }
}

impl CustodyConfig {
    /// Parse a JSON configuration
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".into()));
        }
        if self.commit_timeout_ms == 0 || self.share_timeout_ms == 0 {
            return Err(Error::Config("timeouts must be non-zero".into()));
        }
        for policy in &self.policies {
            policy.validate()?;
        }
        Ok(())
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }

    pub fn share_timeout(&self) -> Duration {
        Duration::from_millis(self.share_timeout_ms)
    }
}
