//! CredentialSession trait - capability to open and release authenticated sessions

use crate::error::SigFactoryResult;
use crate::model::{Credential, Role, Session, SessionPolicy, SessionState, TokenIndex};

/// Capability to guard authenticated access to one token at a time
///
/// Lifecycle: `Uninitialized → Initialized → Authenticated → Closed`.
/// Every failure leaves the backend `Initialized` or `Closed`, never holding
/// a half-open handle.
pub trait CredentialSession {
    /// Current lifecycle state
    fn state(&self) -> SessionState;

    /// What `authenticate` does while a session is already open
    fn session_policy(&self) -> SessionPolicy;

    /// One-time backend setup (load the driver, open the store)
    ///
    /// Calling it again once initialized is a no-op.
    ///
    /// # Errors
    ///
    /// - `BackendError::Initialization` on misconfiguration
    /// - `SessionError::InvalidState` once `Closed`
    fn init(&mut self) -> SigFactoryResult<()>;

    /// Authenticate against a token for one role
    ///
    /// # Arguments
    ///
    /// * `token` - Index as reported by the token directory
    /// * `credential` - PIN or password, never logged
    /// * `role` - Role the resulting session may serve
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidCredential` / `AuthError::TokenLocked` on a bad secret
    /// - `AuthError::TokenNotFound` for an unknown index
    /// - `AuthError::UnsupportedRole` if the token lacks the capability
    /// - `AuthError::SessionLimitExceeded` if the token is held elsewhere
    fn authenticate(
        &mut self,
        token: TokenIndex,
        credential: &Credential,
        role: Role,
    ) -> SigFactoryResult<Session>;

    /// Drop the authenticated handle but keep backend setup
    ///
    /// Returns `Authenticated → Initialized`; a no-op when already `Initialized`.
    fn reset(&mut self) -> SigFactoryResult<()>;

    /// Release every backend resource and enter the terminal `Closed` state
    ///
    /// Idempotent: calling it on a `Closed` backend succeeds and does nothing.
    fn close_session(&mut self) -> SigFactoryResult<()>;
}
