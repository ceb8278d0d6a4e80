//! Types shared across the recovery console crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
