//! Per-request authentication: session tokens and signature proofs.

pub mod session;
pub mod verifier;

pub use session::{SessionRecord, SessionStore};
pub use verifier::{CredentialVerifier, RequestContext};
