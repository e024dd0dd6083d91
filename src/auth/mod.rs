//! Google authentication module.
//!
//! Credentials are ambient: this tool never runs an interactive sign-in.

pub mod credentials;

pub use credentials::{CredentialChain, TokenSource};

/// Bearer token, cleared from memory on drop.
pub type AccessToken = zeroize::Zeroizing<String>;
