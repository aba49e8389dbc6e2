//! One session-oriented signing and decryption contract over hardware
//! tokens, password-protected key containers and directory key stores.
//!
//! ```no_run
//! use sigfactory::{open_backend, FactoryConfig};
//! use sigfactory::{CredentialSession, CryptoExecutor};
//! use sigfactory::{Credential, Mechanism, Role, TokenIndex};
//!
//! let config = FactoryConfig::load("sigfactory.toml")?;
//! let mut backend = open_backend(&config)?;
//! let session = backend.authenticate(TokenIndex(0), &Credential::new("secret")?, Role::Signing)?;
//! let _signature = backend.sign(&session, &[0u8; 32], Mechanism::RSA_SHA256)?;
//! backend.close_session()?;
//! # Ok::<(), sigfactory::SigFactoryError>(())
//! ```

pub mod adapters;
pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logic;
pub mod model;
pub mod ports;
mod session;
pub mod shared;
pub mod use_cases;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use error::{ErrorKind, SigFactoryError, SigFactoryResult};

// Re-export public API
pub use api::{list_tokens, list_tokens_by_role, open_backend, open_shared_backend};
pub use config::FactoryConfig;
pub use dispatcher::{BackendFactory, Dispatcher};
pub use model::{
    BackendKind, Certificate, Credential, HashAlgorithm, Mechanism, Role, Session, SessionPolicy,
    SessionState, SignatureScheme, TokenIndex, TokenKeyInfo,
};
pub use ports::{CredentialSession, CryptoExecutor, SignatureBackend, TokenDirectory};
pub use shared::SharedBackend;
