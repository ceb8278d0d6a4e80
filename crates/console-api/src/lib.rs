//! Typed wrappers for the recovery backend endpoints the console uses
//!
//! Every function takes an `&ApiClient`; the auth flows also take the
//! `TokenStore` they write the session into. Response bodies decode into the
//! structs below, so a backend that drifts from these shapes fails loudly.

pub mod analytics;
pub mod auth;
pub mod envelope;
pub mod error;
pub mod health;
pub mod payments;
pub mod recoveries;
pub mod retry_policies;

pub use envelope::{Envelope, EnvelopeError};
pub use error::{Error, Result};
