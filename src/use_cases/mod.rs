//! Use cases (orchestration)
//!
//! One-shot operations over a backend: each authenticates, performs a single
//! operation and releases the session on every exit path.

mod decrypt_data;
mod fetch_certificate;
mod scoped_session;
mod sign_digest;

pub use decrypt_data::decrypt_data;
pub use fetch_certificate::{fetch_auth_certificate, fetch_certificate};
pub use sign_digest::sign_digest;
