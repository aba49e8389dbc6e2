//! Error types for sigfactory
//!
//! This module defines the error hierarchy for all backend operations.
//! Errors are organized hierarchically and use thiserror for implementation;
//! [`SigFactoryError::kind`] flattens them into the taxonomy callers branch on.

use thiserror::Error;

use crate::model::{Role, TokenIndex};

/// Result type alias for sigfactory operations
///
/// This is a convenience alias for `Result<T, SigFactoryError>`.
pub type SigFactoryResult<T> = Result<T, SigFactoryError>;

/// Top-level error type for all sigfactory operations
#[derive(Error, Debug)]
pub enum SigFactoryError {
    /// Backend setup and enumeration errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Authentication errors
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Session lifecycle errors
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Cryptographic operation errors
    #[error("Cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    /// Domain validation errors
    #[error("Domain validation error: {0}")]
    Domain(#[from] DomainError),
}

/// Backend setup and enumeration errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Driver missing, store unreadable or configuration incomplete
    #[error("Backend initialization failed: {reason}")]
    Initialization { reason: String },

    /// Enumeration channel could not be opened
    #[error("Token directory unavailable: {reason}")]
    DirectoryUnavailable { reason: String },

    /// No factory registered for the declared type
    #[error("No backend registered for type {type_id}")]
    UnknownType { type_id: String },
}

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Wrong PIN or password
    #[error("Invalid credential ({})", remaining(.attempts_remaining))]
    InvalidCredential { attempts_remaining: Option<u8> },

    /// Retry limit exhausted; needs an external unlock
    #[error("Token is locked - too many failed credential attempts")]
    TokenLocked,

    /// No token at this index
    #[error("No token at index {index}")]
    TokenNotFound { index: TokenIndex },

    /// Token lacks the capability for the requested role
    #[error("Token {index} does not support the {role} role")]
    UnsupportedRole { index: TokenIndex, role: Role },

    /// Another session already holds the token
    #[error("Session limit exceeded on token {index}")]
    SessionLimitExceeded { index: TokenIndex },
}

fn remaining(attempts: &Option<u8>) -> String {
    match attempts {
        Some(n) => format!("attempts remaining: {n}"),
        None => "attempts remaining: unknown".to_string(),
    }
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// Session role does not match the requested operation
    #[error("Operation requires a {expected} session, got {actual}")]
    RoleMismatch { expected: Role, actual: Role },

    /// Backend session handle is no longer valid
    #[error("Session expired: {reason}")]
    Expired { reason: String },

    /// Operation not allowed in the current lifecycle state
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

/// Cryptographic operation errors
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Backend-reported signing failure
    #[error("Failed to generate signature: {reason}")]
    SigningFailed { reason: String },

    /// Backend-reported decryption failure
    #[error("Failed to decrypt: {reason}")]
    DecryptionFailed { reason: String },

    /// Certificate slot empty or certificate type unsupported
    #[error("Certificate unavailable: {reason}")]
    CertificateUnavailable { reason: String },

    /// Digest length does not match the mechanism's hash
    #[error("Invalid digest: expected {expected} bytes, got {actual}")]
    InvalidDigest { expected: usize, actual: usize },

    /// Mechanism not applicable to the token's key
    #[error("Mechanism not supported: {mechanism}")]
    UnsupportedMechanism { mechanism: String },
}

/// Domain validation errors
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Credential error: {0}")]
    Credential(#[from] crate::model::CredentialError),

    #[error("Mechanism error: {0}")]
    Mechanism(#[from] crate::model::MechanismError),

    #[error("Role error: {0}")]
    Role(#[from] crate::model::RoleError),

    #[error("Backend kind error: {0}")]
    BackendKind(#[from] crate::model::BackendKindError),

    #[error("Certificate error: {0}")]
    Certificate(#[from] crate::model::CertificateError),
}

/// Flat error taxonomy shared by every backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InitializationError,
    DirectoryUnavailable,
    InvalidCredential,
    TokenLocked,
    TokenNotFound,
    UnsupportedRole,
    RoleMismatch,
    SessionLimitExceeded,
    SessionExpired,
    SigningFailed,
    DecryptionFailed,
    CertificateUnavailable,
    InvalidState,
    InvalidInput,
}

impl ErrorKind {
    /// Whether the same call may succeed if simply retried later
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::DirectoryUnavailable
                | ErrorKind::InvalidCredential
                | ErrorKind::SessionLimitExceeded
        )
    }

    /// Whether authenticating again is the recovery path
    pub fn recoverable_by_reauthentication(self) -> bool {
        matches!(self, ErrorKind::SessionExpired)
    }

    /// Caller logic or configuration bugs, never worth retrying
    pub fn is_caller_error(self) -> bool {
        matches!(
            self,
            ErrorKind::TokenNotFound
                | ErrorKind::UnsupportedRole
                | ErrorKind::RoleMismatch
                | ErrorKind::InvalidState
                | ErrorKind::InvalidInput
        )
    }
}

impl SigFactoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SigFactoryError::Backend(e) => match e {
                BackendError::Initialization { .. } | BackendError::UnknownType { .. } => {
                    ErrorKind::InitializationError
                }
                BackendError::DirectoryUnavailable { .. } => ErrorKind::DirectoryUnavailable,
            },
            SigFactoryError::Auth(e) => match e {
                AuthError::InvalidCredential { .. } => ErrorKind::InvalidCredential,
                AuthError::TokenLocked => ErrorKind::TokenLocked,
                AuthError::TokenNotFound { .. } => ErrorKind::TokenNotFound,
                AuthError::UnsupportedRole { .. } => ErrorKind::UnsupportedRole,
                AuthError::SessionLimitExceeded { .. } => ErrorKind::SessionLimitExceeded,
            },
            SigFactoryError::Session(e) => match e {
                SessionError::RoleMismatch { .. } => ErrorKind::RoleMismatch,
                SessionError::Expired { .. } => ErrorKind::SessionExpired,
                SessionError::InvalidState { .. } => ErrorKind::InvalidState,
            },
            SigFactoryError::Crypto(e) => match e {
                CryptoError::SigningFailed { .. } => ErrorKind::SigningFailed,
                CryptoError::DecryptionFailed { .. } => ErrorKind::DecryptionFailed,
                CryptoError::CertificateUnavailable { .. } => ErrorKind::CertificateUnavailable,
                CryptoError::InvalidDigest { .. } | CryptoError::UnsupportedMechanism { .. } => {
                    ErrorKind::InvalidInput
                }
            },
            SigFactoryError::Domain(_) => ErrorKind::InvalidInput,
        }
    }

    pub(crate) fn initialization(reason: impl Into<String>) -> Self {
        SigFactoryError::Backend(BackendError::Initialization {
            reason: reason.into(),
        })
    }

    pub(crate) fn directory_unavailable(reason: impl Into<String>) -> Self {
        SigFactoryError::Backend(BackendError::DirectoryUnavailable {
            reason: reason.into(),
        })
    }

    pub(crate) fn expired(reason: impl Into<String>) -> Self {
        SigFactoryError::Session(SessionError::Expired {
            reason: reason.into(),
        })
    }

    pub(crate) fn signing_failed(reason: impl Into<String>) -> Self {
        SigFactoryError::Crypto(CryptoError::SigningFailed {
            reason: reason.into(),
        })
    }

    pub(crate) fn decryption_failed(reason: impl Into<String>) -> Self {
        SigFactoryError::Crypto(CryptoError::DecryptionFailed {
            reason: reason.into(),
        })
    }

    pub(crate) fn certificate_unavailable(reason: impl Into<String>) -> Self {
        SigFactoryError::Crypto(CryptoError::CertificateUnavailable {
            reason: reason.into(),
        })
    }
}

/// Convert model errors to SigFactoryError (via DomainError)
impl From<crate::model::CredentialError> for SigFactoryError {
    fn from(err: crate::model::CredentialError) -> Self {
        SigFactoryError::Domain(DomainError::Credential(err))
    }
}

impl From<crate::model::MechanismError> for SigFactoryError {
    fn from(err: crate::model::MechanismError) -> Self {
        match err {
            crate::model::MechanismError::DigestLength { expected, actual } => {
                SigFactoryError::Crypto(CryptoError::InvalidDigest { expected, actual })
            }
            other => SigFactoryError::Domain(DomainError::Mechanism(other)),
        }
    }
}

impl From<crate::model::RoleError> for SigFactoryError {
    fn from(err: crate::model::RoleError) -> Self {
        SigFactoryError::Domain(DomainError::Role(err))
    }
}

impl From<crate::model::BackendKindError> for SigFactoryError {
    fn from(err: crate::model::BackendKindError) -> Self {
        SigFactoryError::Domain(DomainError::BackendKind(err))
    }
}

impl From<crate::model::CertificateError> for SigFactoryError {
    fn from(err: crate::model::CertificateError) -> Self {
        SigFactoryError::Domain(DomainError::Certificate(err))
    }
}
