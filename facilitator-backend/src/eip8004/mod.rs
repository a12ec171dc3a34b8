//! EIP-8004 delegated registration and feedback authorization
//!
//! This module covers the facilitator side of the Identity Registry:
//! - Delegation: EIP-7702 authorizations checked against the chain's delegate
//! - Registrar: gas-sponsored `register` calls sent through the agent's own EOA
//! - Feedback auth: owner-signed tokens scoping a client's reputation feedback
//!
//! Payment settlement happens before any of this runs.

pub mod abi;
pub mod config;
pub mod delegation;
pub mod feedback_auth;
pub mod registrar;
pub mod types;

pub use config::NetworkRegistry;
pub use delegation::DelegationAuthorization;
pub use feedback_auth::{FeedbackAuthError, FeedbackAuthIssuer, FeedbackAuthRequest, FeedbackAuthorizationToken};
pub use registrar::{AgentRegistrar, RegistrarError, RegistrationOutcome, RegistrationRequest};
pub use types::*;
