//! Ports (traits) for key storage backends
//!
//! These traits define the capabilities every backend provides.
//! They represent ports in hexagonal architecture - the core depends on
//! these abstractions, not concrete implementations.
//!
//! The traits are storage agnostic - they define what operations can be
//! performed on a token, not how a hardware card, a key container or a key
//! store implements them.

mod credential_session;
mod crypto_executor;
mod token_directory;
mod token_driver;


pub use credential_session::CredentialSession;
pub use crypto_executor::CryptoExecutor;
pub use token_directory::TokenDirectory;
pub use token_driver::{DriverError, DriverHandle, DriverSlot, SlotRef, TokenDriver};

use crate::model::BackendKind;

/// Combined trait for a complete signature backend
///
/// Each backend implements the full capability set; the dispatcher selects
/// among them by declared type and hands them out as `Box<dyn SignatureBackend>`.
pub trait SignatureBackend: TokenDirectory + CredentialSession + CryptoExecutor + Send {
    /// Class of key storage behind this backend
    fn kind(&self) -> BackendKind;

    /// Type identifier, e.g. `"PKCS11"`
    fn backend_type(&self) -> &'static str {
        self.kind().type_id()
    }
}
