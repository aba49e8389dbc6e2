//! Session state machine shared by every backend
//!
//! [`SessionTracker`] owns the lifecycle state and the backend-specific
//! handle `H` of the one live session. Backends embed it and route every
//! state check through it, so the transition rules are the same everywhere:
//!
//! - validation failures before any backend call leave the state unchanged
//! - backend-reported failures discard the handle (`Authenticated → Initialized`)
//! - `close_session` is terminal and idempotent

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::error::{AuthError, ErrorKind, SessionError, SigFactoryError, SigFactoryResult};
use crate::model::{BackendKind, Role, Session, SessionId, SessionPolicy, SessionState, TokenIndex};

/// Session ids are drawn process-wide, so a session never matches another backend's
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

struct LiveSession<H> {
    id: SessionId,
    token: TokenIndex,
    handle: H,
}

pub(crate) struct SessionTracker<H> {
    kind: BackendKind,
    policy: SessionPolicy,
    state: SessionState,
    live: Option<LiveSession<H>>,
}

impl<H> SessionTracker<H> {
    pub(crate) fn new(kind: BackendKind, policy: SessionPolicy) -> Self {
        Self {
            kind,
            policy,
            state: SessionState::Uninitialized,
            live: None,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Whether `init()` still has setup work to do
    pub(crate) fn needs_init(&self) -> SigFactoryResult<bool> {
        match self.state {
            SessionState::Uninitialized => Ok(true),
            SessionState::Initialized | SessionState::Authenticated { .. } => Ok(false),
            SessionState::Closed => Err(self.invalid("init")),
        }
    }

    pub(crate) fn mark_initialized(&mut self) {
        debug!(backend = %self.kind, "backend initialized");
        self.state = SessionState::Initialized;
    }

    /// Gate for token directory calls
    pub(crate) fn ensure_directory(&self) -> SigFactoryResult<()> {
        match self.state {
            SessionState::Uninitialized => Err(SigFactoryError::directory_unavailable(
                "backend not initialized",
            )),
            SessionState::Closed => Err(self.invalid("list tokens")),
            _ => Ok(()),
        }
    }

    /// Make room for a new authentication according to the session policy
    ///
    /// Returns the pre-empted handle, if any, for the backend to release.
    pub(crate) fn begin_authenticate(&mut self) -> SigFactoryResult<Option<H>> {
        match self.state {
            SessionState::Initialized => Ok(None),
            SessionState::Authenticated { token, role } => match self.policy {
                SessionPolicy::Reject => {
                    Err(SigFactoryError::Auth(AuthError::SessionLimitExceeded {
                        index: token,
                    }))
                }
                SessionPolicy::Preempt => {
                    info!(
                        backend = %self.kind,
                        %token,
                        %role,
                        "closing open session before authenticating again"
                    );
                    Ok(self.discard())
                }
            },
            _ => Err(self.invalid("authenticate")),
        }
    }

    /// Record a successful authentication and mint the caller's session
    pub(crate) fn authenticated(&mut self, token: TokenIndex, role: Role, handle: H) -> Session {
        let id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        self.live = Some(LiveSession { id, token, handle });
        self.state = SessionState::Authenticated { token, role };
        debug!(backend = %self.kind, %token, %role, session = %id, "authenticated");
        Session::new(id, self.kind, token, role)
    }

    /// Handle of the live session `session` refers to
    ///
    /// Checks, in order: lifecycle state, role (when `required` is set),
    /// then that the session is the live one.
    pub(crate) fn handle(
        &self,
        session: &Session,
        required: Option<Role>,
        operation: &'static str,
    ) -> SigFactoryResult<&H> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Closed
        ) {
            return Err(self.invalid(operation));
        }
        if let Some(expected) = required {
            if session.role() != expected {
                return Err(SigFactoryError::Session(SessionError::RoleMismatch {
                    expected,
                    actual: session.role(),
                }));
            }
        }
        match &self.live {
            Some(live)
                if live.id == session.id()
                    && live.token == session.token()
                    && session.backend() == self.kind =>
            {
                Ok(&live.handle)
            }
            _ => Err(SigFactoryError::expired(format!(
                "{} is no longer open",
                session.id()
            ))),
        }
    }

    /// Drop the live session, returning its handle
    pub(crate) fn discard(&mut self) -> Option<H> {
        if self.state.is_authenticated() {
            self.state = SessionState::Initialized;
        }
        self.live.take().map(|live| live.handle)
    }

    /// Discard the live session when `err` is a backend-reported failure
    pub(crate) fn discard_on_failure(&mut self, err: &SigFactoryError) -> Option<H> {
        match err.kind() {
            ErrorKind::SigningFailed | ErrorKind::DecryptionFailed | ErrorKind::SessionExpired
                if self.state.is_authenticated() =>
            {
                debug!(backend = %self.kind, kind = ?err.kind(), "discarding session after failure");
                self.discard()
            }
            _ => None,
        }
    }

    /// `reset()` transition; `Initialized` stays put
    pub(crate) fn reset(&mut self) -> SigFactoryResult<Option<H>> {
        match self.state {
            SessionState::Initialized | SessionState::Authenticated { .. } => Ok(self.discard()),
            _ => Err(self.invalid("reset")),
        }
    }

    /// Enter `Closed`; returns the live handle and whether this call closed the backend
    pub(crate) fn close(&mut self) -> (Option<H>, bool) {
        if self.state == SessionState::Closed {
            return (None, false);
        }
        let handle = self.live.take().map(|live| live.handle);
        self.state = SessionState::Closed;
        debug!(backend = %self.kind, "backend closed");
        (handle, true)
    }

    fn invalid(&self, operation: &'static str) -> SigFactoryError {
        SigFactoryError::Session(SessionError::InvalidState {
            operation,
            state: self.state.name(),
        })
    }
}
