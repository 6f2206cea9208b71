//! Common types shared by the key pool crates

mod error;
mod redact;
mod secret;

pub use error::{Error, Result};
pub use redact::key_hint;
pub use secret::Secret;
