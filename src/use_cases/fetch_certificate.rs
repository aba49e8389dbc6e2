//! Certificate retrieval use cases
//!
//! Certificates the token directory already reports are returned without
//! logging in. Otherwise a session is opened to read the certificate, which
//! needs the token's credential.

use tracing::debug;

use super::scoped_session::ScopedSession;
use crate::error::{AuthError, SigFactoryError, SigFactoryResult};
use crate::model::{Certificate, Credential, Role, TokenIndex, TokenKeyInfo};
use crate::ports::SignatureBackend;

fn token_info<B>(backend: &B, token: TokenIndex) -> SigFactoryResult<(TokenKeyInfo, Vec<TokenKeyInfo>)>
where
    B: SignatureBackend + ?Sized,
{
    let tokens = backend.list_all_tokens()?;
    let info = tokens
        .get(token.get())
        .cloned()
        .ok_or_else(|| SigFactoryError::Auth(AuthError::TokenNotFound { index: token }))?;
    Ok((info, tokens))
}

fn no_credential(token: TokenIndex) -> SigFactoryError {
    SigFactoryError::certificate_unavailable(format!(
        "token {token} lists no certificate and no credential was given to read it"
    ))
}

/// Certificate of `token` for use in `role`
///
/// # Errors
///
/// Returns `UnsupportedRole` if the token cannot act in `role`, and
/// `CertificateUnavailable` if the certificate is neither listed nor readable.
pub fn fetch_certificate<B>(
    backend: &mut B,
    token: TokenIndex,
    role: Role,
    credential: Option<&Credential>,
) -> SigFactoryResult<Certificate>
where
    B: SignatureBackend + ?Sized,
{
    let (info, _) = token_info(backend, token)?;
    if !info.supports(role) {
        return Err(SigFactoryError::Auth(AuthError::UnsupportedRole { index: token, role }));
    }
    if let Some(certificate) = info.certificate {
        debug!(%token, "certificate served from the token directory");
        return Ok(certificate);
    }

    let credential = credential.ok_or_else(|| no_credential(token))?;
    let mut session = ScopedSession::open(backend, token, credential, role)?;
    session.certificate()
}

/// Authentication certificate of the physical token holding `token`
///
/// For an authentication-capable token this is its own certificate; for a
/// signing-only token, the one of its authentication sibling.
pub fn fetch_auth_certificate<B>(
    backend: &mut B,
    token: TokenIndex,
    credential: Option<&Credential>,
) -> SigFactoryResult<Certificate>
where
    B: SignatureBackend + ?Sized,
{
    let (info, tokens) = token_info(backend, token)?;
    let listed = if info.can_authenticate {
        info.certificate.clone()
    } else {
        tokens
            .iter()
            .find(|other| other.token_name == info.token_name && other.can_authenticate)
            .and_then(|other| other.certificate.clone())
    };
    if let Some(certificate) = listed {
        return Ok(certificate);
    }

    let credential = credential.ok_or_else(|| no_credential(token))?;
    let role = if info.can_sign {
        Role::Signing
    } else {
        Role::Authentication
    };
    let mut session = ScopedSession::open(backend, token, credential, role)?;
    session.auth_certificate()
}
