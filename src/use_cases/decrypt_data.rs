//! Decrypt data use case
//!
//! Opens an authentication session to decrypt. On backends with the
//! [`SessionPolicy::Preempt`] policy this closes any signing session that
//! is still open on the backend; the hand-over is logged.

use tracing::info;

use super::scoped_session::ScopedSession;
use crate::error::SigFactoryResult;
use crate::model::{Credential, Role, SessionPolicy, SessionState, TokenIndex};
use crate::ports::SignatureBackend;

/// Decrypt a PKCS#1 v1.5 `ciphertext` with the authentication key of `token`
///
/// # Errors
///
/// Returns errors if authentication fails, the token has no authentication
/// key, or the backend cannot decrypt the ciphertext.
pub fn decrypt_data<B>(
    backend: &mut B,
    token: TokenIndex,
    credential: &Credential,
    ciphertext: &[u8],
) -> SigFactoryResult<Vec<u8>>
where
    B: SignatureBackend + ?Sized,
{
    if let SessionState::Authenticated {
        token: open,
        role: Role::Signing,
    } = backend.state()
    {
        if backend.session_policy() == SessionPolicy::Preempt {
            info!(signing_token = %open, "decryption closes the open signing session");
        }
    }

    let mut session = ScopedSession::open(backend, token, credential, Role::Authentication)?;
    session.decrypt(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::emulated_card::{EmulatedCard, EmulatedToken, DEFAULT_PIN};
    use crate::adapters::{DriverRegistry, HardwareBackend};
    use crate::error::ErrorKind;
    use crate::model::Mechanism;
    use crate::ports::{CredentialSession, CryptoExecutor, TokenDriver};
    use crate::test_support::rsa_key;
    use rsa::rand_core::OsRng;
    use rsa::{Pkcs1v15Encrypt, RsaPublicKey};
    use std::sync::Arc;

    fn backend() -> HardwareBackend {
        let registry = Arc::new(DriverRegistry::empty());
        registry.register_loader("emulated", || {
            Ok(Arc::new(
                EmulatedCard::new("emulated").with_token(EmulatedToken::standard("Card A")),
            ) as Arc<dyn TokenDriver>)
        });
        let mut backend = HardwareBackend::with_registry("emulated", registry);
        backend.init().unwrap();
        backend
    }

    fn pin() -> Credential {
        Credential::new(DEFAULT_PIN).unwrap()
    }

    #[test]
    fn test_decrypt_round_trip() {
        let mut backend = backend();
        let ciphertext = RsaPublicKey::from(&rsa_key(1))
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, b"session key")
            .unwrap();

        let plaintext = decrypt_data(&mut backend, TokenIndex(1), &pin(), &ciphertext).unwrap();

        assert_eq!(plaintext, b"session key");
        assert_eq!(backend.state(), SessionState::Initialized);
    }

    #[test]
    fn test_decrypt_closes_open_signing_session() {
        let mut backend = backend();
        let signing = backend
            .authenticate(TokenIndex(0), &pin(), Role::Signing)
            .unwrap();
        let ciphertext = RsaPublicKey::from(&rsa_key(1))
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, b"x")
            .unwrap();

        decrypt_data(&mut backend, TokenIndex(1), &pin(), &ciphertext).unwrap();

        let err = backend
            .sign(&signing, &[0u8; 32], Mechanism::RSA_SHA256)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionExpired);
    }

    #[test]
    fn test_wrong_pin() {
        let mut backend = backend();
        let err = decrypt_data(
            &mut backend,
            TokenIndex(1),
            &Credential::new("000000").unwrap(),
            &[0u8; 256],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCredential);
        assert_eq!(backend.state(), SessionState::Initialized);
    }
}
