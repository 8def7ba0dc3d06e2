//! # FROST Custody
//!
//! Threshold custody service built on `frost-core`.
//!
//! A key generated by distributed key generation is held by `n` signer
//! endpoints. The service checks each [`AuthorizeRequest`] against its
//! configured policies and then coordinates `t` of the signers to produce a
//! spend authorization signature for every spend in the plan.
//!
//! ## Example
//!
//! ```rust,ignore
//! use frost_custody::{AuthorizeRequest, CustodyConfig, CustodyService, InMemoryKeyDirectory, KeyEntry};
//!
//! let keys = InMemoryKeyDirectory::new();
//! keys.insert("treasury", KeyEntry::new(public, endpoints)?);
//!
//! let service = CustodyService::new(CustodyConfig::load("custody.json")?, keys)?;
//! let data = service.authorize(AuthorizeRequest::new("treasury", plan)).await?;
//! ```

pub mod config;
pub mod error;
pub mod plan;
pub mod policy;
pub mod registry;
pub mod service;

pub use config::{CustodyConfig, QuorumPolicy};
pub use error::{Error, Result};
pub use plan::{spend_message, AuthorizationData, AuthorizeRequest, OpaquePlan, TransactionPlan};
pub use policy::{AuthPolicy, PreAuthorization, PreAuthorizationPolicy};
pub use registry::{InMemoryKeyDirectory, KeyDirectory, KeyEntry};
pub use service::CustodyService;
