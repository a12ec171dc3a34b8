//! EIP-8004 Contract ABI encoders
//!
//! Calldata, event decoding and the feedback-authorization struct layout.
//! Selectors are derived from signatures; no abigen! macro.

pub mod common;
pub mod feedback_auth;
pub mod identity;

pub use common::*;
pub use feedback_auth::*;
pub use identity::*;
