//! Driver-backed hardware token backend
//!
//! Session policy: [`SessionPolicy::Preempt`]. A card accepts one login at a
//! time, so authenticating again closes the open session first. In
//! particular, opening an authentication session to decrypt closes any
//! signing session; the pre-emption is logged.
//!
//! The token directory re-probes the driver on every call, so tokens inserted
//! or removed between calls are reflected immediately.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::driver_registry::{DriverRegistry, LoadedDriver};
use crate::error::{AuthError, CryptoError, SigFactoryError, SigFactoryResult};
use crate::model::{
    BackendKind, Certificate, Credential, Mechanism, Role, Session, SessionPolicy, SessionState,
    TokenIndex, TokenKeyInfo,
};
use crate::ports::{
    CredentialSession, CryptoExecutor, DriverError, DriverHandle, DriverSlot, SignatureBackend,
    SlotRef, TokenDirectory, TokenDriver,
};
use crate::session::SessionTracker;

/// What the backend was doing when a driver call failed
#[derive(Debug, Clone, Copy)]
enum Step {
    Probe,
    Login,
    Sign,
    Decrypt,
    ReadCertificate,
}

/// Live login on one card slot
struct CardSession {
    handle: DriverHandle,
    slot: SlotRef,
    can_authenticate: bool,
}

pub struct HardwareBackend {
    module: String,
    registry: Arc<DriverRegistry>,
    driver: Option<Arc<LoadedDriver>>,
    tracker: SessionTracker<CardSession>,
}

impl HardwareBackend {
    /// Backend over a driver module from the process-wide registry
    pub fn new(module: impl Into<String>) -> Self {
        Self::with_registry(module, DriverRegistry::global())
    }

    pub fn with_registry(module: impl Into<String>, registry: Arc<DriverRegistry>) -> Self {
        Self {
            module: module.into(),
            registry,
            driver: None,
            tracker: SessionTracker::new(BackendKind::Hardware, SessionPolicy::Preempt),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    fn driver(&self) -> SigFactoryResult<&LoadedDriver> {
        self.driver.as_deref().ok_or_else(|| {
            SigFactoryError::directory_unavailable(format!(
                "driver module '{}' not loaded",
                self.module
            ))
        })
    }

    fn probe(&self) -> SigFactoryResult<Vec<DriverSlot>> {
        self.driver()?
            .slots()
            .map_err(|e| driver_error(e, TokenIndex(0), Step::Probe))
    }

    fn release(&self, session: Option<CardSession>) {
        if let (Some(session), Some(driver)) = (session, self.driver.as_ref()) {
            debug!(slot = %session.slot, handle = %session.handle, "closing card session");
            driver.close_session(session.handle);
        }
    }

    /// Discard the session after a backend-reported failure
    fn settle<T>(&mut self, result: SigFactoryResult<T>) -> SigFactoryResult<T> {
        if let Err(err) = &result {
            let discarded = self.tracker.discard_on_failure(err);
            self.release(discarded);
        }
        result
    }
}

fn driver_error(err: DriverError, index: TokenIndex, step: Step) -> SigFactoryError {
    match err {
        DriverError::Unavailable(reason) => SigFactoryError::directory_unavailable(reason),
        DriverError::WrongPin { attempts_remaining } => {
            SigFactoryError::Auth(AuthError::InvalidCredential { attempts_remaining })
        }
        DriverError::PinLocked => SigFactoryError::Auth(AuthError::TokenLocked),
        DriverError::NoSuchSlot(_) => SigFactoryError::Auth(AuthError::TokenNotFound { index }),
        DriverError::SlotBusy(_) => {
            SigFactoryError::Auth(AuthError::SessionLimitExceeded { index })
        }
        DriverError::InvalidHandle(_) | DriverError::TokenRemoved => {
            SigFactoryError::expired(err.to_string())
        }
        DriverError::NoCertificate => SigFactoryError::certificate_unavailable(err.to_string()),
        DriverError::UnsupportedMechanism(mechanism) => {
            SigFactoryError::Crypto(CryptoError::UnsupportedMechanism {
                mechanism: mechanism.to_string(),
            })
        }
        DriverError::Device(reason) => match step {
            Step::Probe | Step::Login => SigFactoryError::directory_unavailable(reason),
            Step::Sign => SigFactoryError::signing_failed(reason),
            Step::Decrypt => SigFactoryError::decryption_failed(reason),
            Step::ReadCertificate => SigFactoryError::certificate_unavailable(reason),
        },
    }
}

impl TokenDirectory for HardwareBackend {
    fn list_all_tokens(&self) -> SigFactoryResult<Vec<TokenKeyInfo>> {
        self.tracker.ensure_directory()?;
        let slots = self.probe()?;
        debug!(module = %self.module, count = slots.len(), "probed card slots");
        Ok(slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| TokenKeyInfo {
                backend: BackendKind::Hardware,
                index: TokenIndex(index),
                label: slot.label,
                token_name: slot.slot.token,
                can_sign: slot.can_sign,
                can_authenticate: slot.can_authenticate,
                certificate: slot.certificate,
            })
            .collect())
    }
}

impl CredentialSession for HardwareBackend {
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
        self.driver = Some(self.registry.acquire(&self.module)?);
        self.tracker.mark_initialized();
        info!(module = %self.module, "hardware backend initialized");
        Ok(())
    }

    fn authenticate(
        &mut self,
        token: TokenIndex,
        credential: &Credential,
        role: Role,
    ) -> SigFactoryResult<Session> {
        let preempted = self.tracker.begin_authenticate()?;
        self.release(preempted);

        let slot = self
            .probe()?
            .into_iter()
            .nth(token.get())
            .ok_or_else(|| SigFactoryError::Auth(AuthError::TokenNotFound { index: token }))?;
        if !slot.supports(role) {
            return Err(SigFactoryError::Auth(AuthError::UnsupportedRole {
                index: token,
                role,
            }));
        }

        let handle = self
            .driver()?
            .open_session(&slot.slot, credential)
            .map_err(|e| {
                if e == DriverError::PinLocked {
                    warn!(slot = %slot.slot, "token PIN is blocked");
                }
                driver_error(e, token, Step::Login)
            })?;

        Ok(self.tracker.authenticated(
            token,
            role,
            CardSession {
                handle,
                slot: slot.slot,
                can_authenticate: slot.can_authenticate,
            },
        ))
    }

    fn reset(&mut self) -> SigFactoryResult<()> {
        let session = self.tracker.reset()?;
        self.release(session);
        Ok(())
    }

    fn close_session(&mut self) -> SigFactoryResult<()> {
        let (session, closed) = self.tracker.close();
        self.release(session);
        if closed && self.driver.take().is_some() {
            debug!(module = %self.module, "driver reference dropped");
        }
        Ok(())
    }
}

impl CryptoExecutor for HardwareBackend {
    fn sign(
        &mut self,
        session: &Session,
        digest: &[u8],
        mechanism: Mechanism,
    ) -> SigFactoryResult<Vec<u8>> {
        let handle = self.tracker.handle(session, Some(Role::Signing), "sign")?.handle;
        mechanism.check_digest(digest)?;

        let result = self
            .driver()?
            .sign(handle, digest, mechanism)
            .map_err(|e| driver_error(e, session.token(), Step::Sign));
        self.settle(result)
    }

    fn decrypt(&mut self, session: &Session, ciphertext: &[u8]) -> SigFactoryResult<Vec<u8>> {
        let handle = self
            .tracker
            .handle(session, Some(Role::Authentication), "decrypt")?
            .handle;

        let result = self
            .driver()?
            .decrypt(handle, ciphertext)
            .map_err(|e| driver_error(e, session.token(), Step::Decrypt));
        self.settle(result)
    }

    fn certificate(&mut self, session: &Session) -> SigFactoryResult<Certificate> {
        let handle = self
            .tracker
            .handle(session, None, "read certificate")?
            .handle;

        let result = self
            .driver()?
            .read_certificate(handle)
            .map_err(|e| driver_error(e, session.token(), Step::ReadCertificate));
        self.settle(result)
    }

    fn auth_certificate(&mut self, session: &Session) -> SigFactoryResult<Certificate> {
        let (can_authenticate, token) = {
            let card = self.tracker.handle(session, None, "read certificate")?;
            (card.can_authenticate, card.slot.token.clone())
        };
        if can_authenticate {
            return self.certificate(session);
        }

        // the authentication key sits in a sibling slot of the same card
        self.probe()?
            .into_iter()
            .find(|slot| slot.slot.token == token && slot.can_authenticate)
            .and_then(|slot| slot.certificate)
            .ok_or_else(|| {
                SigFactoryError::certificate_unavailable(format!(
                    "no authentication certificate on token '{token}'"
                ))
            })
    }
}

impl SignatureBackend for HardwareBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Hardware
    }
}

impl Drop for HardwareBackend {
    fn drop(&mut self) {
        let _ = self.close_session();
    }
}
