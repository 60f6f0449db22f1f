//! Credential bundles, redacted secrets, and user profile payloads.

pub mod credential;
pub mod profile;
pub mod secret;

pub use credential::*;
pub use profile::*;
pub use secret::*;
