//! CryptoExecutor trait - capability to run key operations through a session

use crate::error::SigFactoryResult;
use crate::model::{Certificate, Mechanism, Session};

/// Capability to sign, decrypt and fetch certificates through an open session
///
/// All methods take `&mut self`: a backend-reported failure discards the
/// session handle and moves the backend back to `Initialized`.
pub trait CryptoExecutor {
    /// Sign a caller-hashed digest
    ///
    /// The digest is not re-hashed. The signature is returned in the encoding
    /// native to the mechanism, without any container wrapping.
    ///
    /// # Errors
    ///
    /// - `SessionError::RoleMismatch` unless the session is a signing session
    /// - `CryptoError::InvalidDigest` if the digest length does not match the hash
    /// - `CryptoError::UnsupportedMechanism` if the scheme does not fit the key
    /// - `SessionError::Expired` if the session handle is no longer live
    /// - `CryptoError::SigningFailed` on a backend-reported failure
    fn sign(
        &mut self,
        session: &Session,
        digest: &[u8],
        mechanism: Mechanism,
    ) -> SigFactoryResult<Vec<u8>>;

    /// Decrypt a PKCS#1 v1.5 ciphertext with an authentication key
    ///
    /// # Errors
    ///
    /// - `SessionError::RoleMismatch` unless the session is an authentication session
    /// - `SessionError::Expired` if the session handle is no longer live
    /// - `CryptoError::DecryptionFailed` on a backend-reported failure
    fn decrypt(&mut self, session: &Session, ciphertext: &[u8]) -> SigFactoryResult<Vec<u8>>;

    /// Certificate bound to the session's token
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::CertificateUnavailable` if the slot holds no certificate
    fn certificate(&mut self, session: &Session) -> SigFactoryResult<Certificate>;

    /// Authentication certificate of the physical token behind the session
    ///
    /// Equal to [`CryptoExecutor::certificate`] when the session's token is
    /// itself authentication-capable.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::CertificateUnavailable` if the token carries no
    /// authentication certificate
    fn auth_certificate(&mut self, session: &Session) -> SigFactoryResult<Certificate>;
}
