//! Domain types for token and session handling
//!
//! This module defines domain-specific types that wrap primitives to:
//! - Prevent primitive obsession
//! - Enforce invariants at construction
//! - Keep secrets out of logs

mod backend_kind;
mod certificate;
mod credential;
mod mechanism;
mod role;
mod session;
mod token;

pub use backend_kind::{BackendKind, BackendKindError, TYPE_JKS, TYPE_PKCS11, TYPE_PKCS12};
pub use certificate::{Certificate, CertificateError, KeyAlgorithm, KeyUsageFlags};
pub use credential::{Credential, CredentialError};
pub use mechanism::{HashAlgorithm, Mechanism, MechanismError, SignatureScheme};
pub use role::{Role, RoleError};
pub use session::{Session, SessionId, SessionPolicy, SessionState};
pub use token::{TokenIndex, TokenKeyInfo};
