//! Session guard released on every exit path

use tracing::debug;

use crate::error::SigFactoryResult;
use crate::model::{Certificate, Credential, Mechanism, Role, Session, TokenIndex};
use crate::ports::SignatureBackend;

/// Authenticated session that resets its backend when dropped
///
/// Early returns and `?` leave the backend `Initialized` rather than holding
/// a login open.
pub(crate) struct ScopedSession<'a, B: SignatureBackend + ?Sized> {
    backend: &'a mut B,
    session: Session,
}

impl<'a, B: SignatureBackend + ?Sized> ScopedSession<'a, B> {
    pub(crate) fn open(
        backend: &'a mut B,
        token: TokenIndex,
        credential: &Credential,
        role: Role,
    ) -> SigFactoryResult<Self> {
        let session = backend.authenticate(token, credential, role)?;
        Ok(Self { backend, session })
    }

    pub(crate) fn sign(&mut self, digest: &[u8], mechanism: Mechanism) -> SigFactoryResult<Vec<u8>> {
        self.backend.sign(&self.session, digest, mechanism)
    }

    pub(crate) fn decrypt(&mut self, ciphertext: &[u8]) -> SigFactoryResult<Vec<u8>> {
        self.backend.decrypt(&self.session, ciphertext)
    }

    pub(crate) fn certificate(&mut self) -> SigFactoryResult<Certificate> {
        self.backend.certificate(&self.session)
    }

    pub(crate) fn auth_certificate(&mut self) -> SigFactoryResult<Certificate> {
        self.backend.auth_certificate(&self.session)
    }
}

impl<B: SignatureBackend + ?Sized> Drop for ScopedSession<'_, B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.reset() {
            debug!(error = %e, "session release skipped");
        }
    }
}
