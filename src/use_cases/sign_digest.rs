//! Sign digest use case
//!
//! Authenticates a signing session on one token, signs a caller-hashed
//! digest and releases the session again.

use tracing::debug;

use super::scoped_session::ScopedSession;
use crate::error::SigFactoryResult;
use crate::model::{Credential, Mechanism, Role, TokenIndex};
use crate::ports::SignatureBackend;

/// Sign `digest` with the key of `token`
///
/// # Arguments
///
/// * `backend` - Initialized backend
/// * `token` - Index from the backend's token directory
/// * `credential` - PIN or password of the token
/// * `digest` - Hash of the payload, sized for `mechanism`
/// * `mechanism` - Hash algorithm and signature scheme
///
/// # Returns
///
/// Raw signature bytes in the mechanism's native encoding
///
/// # Errors
///
/// Returns errors if:
/// - Authentication fails (wrong credential, locked token, unknown index)
/// - The token cannot sign
/// - The digest length does not match the mechanism
/// - The backend reports a signing failure
pub fn sign_digest<B>(
    backend: &mut B,
    token: TokenIndex,
    credential: &Credential,
    digest: &[u8],
    mechanism: Mechanism,
) -> SigFactoryResult<Vec<u8>>
where
    B: SignatureBackend + ?Sized,
{
    let mut session = ScopedSession::open(backend, token, credential, Role::Signing)?;
    let signature = session.sign(digest, mechanism)?;
    debug!(%token, %mechanism, len = signature.len(), "digest signed");
    Ok(signature)
}
