//! Shared machinery for backends whose keys live in files
//!
//! A [`KeySource`] knows how to read a store's certificates and how to unlock
//! one private key with a password. [`SoftBackend`] layers the session state
//! machine, retry counting and the crypto operations on top, so the container
//! and keystore backends differ only in their source.
//!
//! Unlocked keys are held in memory for the lifetime of the session and
//! dropped (and zeroized) when it ends.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::error::{AuthError, CryptoError, ErrorKind, SigFactoryError, SigFactoryResult};
use crate::logic::{SoftKey, SoftKeyError};
use crate::model::{
    BackendKind, Certificate, Credential, Mechanism, Role, Session, SessionPolicy, SessionState,
    TokenIndex, TokenKeyInfo,
};
use crate::ports::{CredentialSession, CryptoExecutor, SignatureBackend, TokenDirectory};
use crate::session::SessionTracker;

/// One key entry read from a store
pub struct StoredToken<E> {
    pub label: String,
    pub token_name: String,
    pub certificate: Certificate,
    pub entry: E,
}

/// Reader for one kind of on-disk key store
pub trait KeySource: Send {
    /// Locator of the private key, whatever the store needs to unlock it later
    type Entry: Send;

    fn kind(&self) -> BackendKind;

    fn session_policy(&self) -> SessionPolicy;

    /// Human-readable location, for logs
    fn location(&self) -> String;

    /// Read every certificate-bearing entry, in directory order
    fn load(&self) -> SigFactoryResult<Vec<StoredToken<Self::Entry>>>;

    /// Decrypt the private key of `entry`
    ///
    /// A wrong password must surface as `AuthError::InvalidCredential`.
    fn unlock(&self, entry: &Self::Entry, credential: &Credential) -> SigFactoryResult<SoftKey>;
}

/// Map a key decoding failure, treating a failed decryption as a wrong password
pub(crate) fn unlock_error(err: SoftKeyError) -> SigFactoryError {
    match err {
        SoftKeyError::Decryption => SigFactoryError::Auth(AuthError::InvalidCredential {
            attempts_remaining: None,
        }),
        other => SigFactoryError::initialization(format!("unreadable private key: {other}")),
    }
}

struct SoftSession {
    position: usize,
    key: SoftKey,
}

pub struct SoftBackend<S: KeySource> {
    source: S,
    tokens: Vec<StoredToken<S::Entry>>,
    max_attempts: Option<u8>,
    /// Failed attempts per token name
    failures: HashMap<String, u8>,
    tracker: SessionTracker<SoftSession>,
}

impl<S: KeySource> SoftBackend<S> {
    pub fn with_source(source: S, max_attempts: Option<u8>) -> Self {
        let tracker = SessionTracker::new(source.kind(), source.session_policy());
        Self {
            source,
            tokens: Vec::new(),
            max_attempts,
            failures: HashMap::new(),
            tracker,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn check_locked(&self, token_name: &str) -> SigFactoryResult<()> {
        match (self.max_attempts, self.failures.get(token_name)) {
            (Some(max), Some(&failed)) if failed >= max => {
                Err(SigFactoryError::Auth(AuthError::TokenLocked))
            }
            _ => Ok(()),
        }
    }

    fn record_failure(&mut self, token_name: &str) -> SigFactoryError {
        let failed = self.failures.entry(token_name.to_string()).or_insert(0);
        *failed = failed.saturating_add(1);
        let attempts_remaining = self.max_attempts.map(|max| max.saturating_sub(*failed));
        if attempts_remaining == Some(0) {
            warn!(token = token_name, "retry limit reached, token locked");
        }
        SigFactoryError::Auth(AuthError::InvalidCredential { attempts_remaining })
    }

    fn settle<T>(&mut self, result: SigFactoryResult<T>) -> SigFactoryResult<T> {
        if let Err(err) = &result {
            if self.tracker.discard_on_failure(err).is_some() {
                debug!(backend = %self.source.kind(), "in-memory key dropped");
            }
        }
        result
    }
}

fn paired_with(key: SoftKey, certificate: &Certificate) -> SigFactoryResult<SoftKey> {
    let public_key = key.public_key_der().map_err(unlock_error)?;
    if public_key != certificate.public_key_der() {
        return Err(SigFactoryError::initialization(format!(
            "private key does not match certificate '{}'",
            certificate.subject()
        )));
    }
    Ok(key)
}

fn operation_error(err: SoftKeyError, mechanism: Mechanism) -> SigFactoryError {
    match err {
        SoftKeyError::MechanismMismatch { .. } => {
            SigFactoryError::Crypto(CryptoError::UnsupportedMechanism {
                mechanism: mechanism.to_string(),
            })
        }
        other => SigFactoryError::signing_failed(other.to_string()),
    }
}

impl<S: KeySource> TokenDirectory for SoftBackend<S> {
    fn list_all_tokens(&self) -> SigFactoryResult<Vec<TokenKeyInfo>> {
        self.tracker.ensure_directory()?;
        Ok(self
            .tokens
            .iter()
            .enumerate()
            .map(|(index, stored)| {
                let (can_sign, can_authenticate) = stored.certificate.capabilities();
                TokenKeyInfo {
                    backend: self.source.kind(),
                    index: TokenIndex(index),
                    label: stored.label.clone(),
                    token_name: stored.token_name.clone(),
                    can_sign,
                    can_authenticate,
                    certificate: Some(stored.certificate.clone()),
                }
            })
            .collect())
    }
}

impl<S: KeySource> CredentialSession for SoftBackend<S> {
    fn state(&self) -> SessionState {
        self.tracker.state()
    }

    fn session_policy(&self) -> SessionPolicy {
        self.tracker.policy()
    }

    fn init(&mut self) -> SigFactoryResult<()> {
        if !self.tracker.needs_init()? {
            return Ok(());
        }
        self.tokens = self.source.load()?;
        self.tracker.mark_initialized();
        info!(
            backend = %self.source.kind(),
            location = %self.source.location(),
            count = self.tokens.len(),
            "key store opened"
        );
        Ok(())
    }

    fn authenticate(
        &mut self,
        token: TokenIndex,
        credential: &Credential,
        role: Role,
    ) -> SigFactoryResult<Session> {
        if self.tracker.begin_authenticate()?.is_some() {
            debug!(backend = %self.source.kind(), "pre-empted session key dropped");
        }

        let stored = self
            .tokens
            .get(token.get())
            .ok_or_else(|| SigFactoryError::Auth(AuthError::TokenNotFound { index: token }))?;
        let (can_sign, can_authenticate) = stored.certificate.capabilities();
        let supported = match role {
            Role::Signing => can_sign,
            Role::Authentication => can_authenticate,
        };
        if !supported {
            return Err(SigFactoryError::Auth(AuthError::UnsupportedRole {
                index: token,
                role,
            }));
        }

        let token_name = stored.token_name.clone();
        self.check_locked(&token_name)?;

        let unlocked = self
            .source
            .unlock(&stored.entry, credential)
            .and_then(|key| paired_with(key, &stored.certificate));
        match unlocked {
            Ok(key) => {
                self.failures.remove(&token_name);
                Ok(self.tracker.authenticated(
                    token,
                    role,
                    SoftSession {
                        position: token.get(),
                        key,
                    },
                ))
            }
            Err(err) if err.kind() == ErrorKind::InvalidCredential => {
                Err(self.record_failure(&token_name))
            }
            Err(err) => Err(err),
        }
    }

    fn reset(&mut self) -> SigFactoryResult<()> {
        self.tracker.reset()?;
        Ok(())
    }

    fn close_session(&mut self) -> SigFactoryResult<()> {
        let (_, closed) = self.tracker.close();
        if closed {
            self.tokens.clear();
            self.failures.clear();
            debug!(location = %self.source.location(), "key store released");
        }
        Ok(())
    }
}

impl<S: KeySource> CryptoExecutor for SoftBackend<S> {
    fn sign(
        &mut self,
        session: &Session,
        digest: &[u8],
        mechanism: Mechanism,
    ) -> SigFactoryResult<Vec<u8>> {
        let result = {
            let live = self.tracker.handle(session, Some(Role::Signing), "sign")?;
            mechanism.check_digest(digest)?;
            live.key
                .sign(digest, mechanism)
                .map_err(|e| operation_error(e, mechanism))
        };
        self.settle(result)
    }

    fn decrypt(&mut self, session: &Session, ciphertext: &[u8]) -> SigFactoryResult<Vec<u8>> {
        let result = {
            let live = self
                .tracker
                .handle(session, Some(Role::Authentication), "decrypt")?;
            live.key
                .decrypt(ciphertext)
                .map_err(|e| SigFactoryError::decryption_failed(e.to_string()))
        };
        self.settle(result)
    }

    fn certificate(&mut self, session: &Session) -> SigFactoryResult<Certificate> {
        let position = self
            .tracker
            .handle(session, None, "read certificate")?
            .position;
        self.tokens
            .get(position)
            .map(|stored| stored.certificate.clone())
            .ok_or_else(|| SigFactoryError::certificate_unavailable("token no longer listed"))
    }

    fn auth_certificate(&mut self, session: &Session) -> SigFactoryResult<Certificate> {
        let position = self
            .tracker
            .handle(session, None, "read certificate")?
            .position;
        let stored = self
            .tokens
            .get(position)
            .ok_or_else(|| SigFactoryError::certificate_unavailable("token no longer listed"))?;
        if stored.certificate.capabilities().1 {
            return Ok(stored.certificate.clone());
        }

        self.tokens
            .iter()
            .find(|other| {
                other.token_name == stored.token_name && other.certificate.capabilities().1
            })
            .map(|other| other.certificate.clone())
            .ok_or_else(|| {
                SigFactoryError::certificate_unavailable(format!(
                    "no authentication certificate in '{}'",
                    stored.token_name
                ))
            })
    }
}

impl<S: KeySource> SignatureBackend for SoftBackend<S> {
    fn kind(&self) -> BackendKind {
        self.source.kind()
    }
}
