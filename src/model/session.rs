use std::fmt;

use super::{BackendKind, Role, TokenIndex};

/// Opaque identifier of one authenticated binding, unique within the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub(crate) u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Authenticated binding to exactly one token, in one role.
///
/// Produced by a successful `authenticate` and owned by the caller that made
/// it. Deliberately neither `Clone` nor `Copy`: a session is not to be shared
/// between concurrent operations. It stays valid until the backend is reset,
/// closed, or pre-empted by a later authentication.
#[derive(Debug, PartialEq, Eq)]
pub struct Session {
    id: SessionId,
    backend: BackendKind,
    token: TokenIndex,
    role: Role,
}

impl Session {
    pub(crate) fn new(id: SessionId, backend: BackendKind, token: TokenIndex, role: Role) -> Self {
        Self {
            id,
            backend,
            token,
            role,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn token(&self) -> TokenIndex {
        self.token
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

/// Lifecycle of a credential session.
///
/// `Uninitialized → Initialized → Authenticated → Closed`; `reset` returns
/// `Authenticated → Initialized`, and `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Authenticated { token: TokenIndex, role: Role },
    Closed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Initialized => "initialized",
            SessionState::Authenticated { .. } => "authenticated",
            SessionState::Closed => "closed",
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated { .. })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Authenticated { token, role } => {
                write!(f, "authenticated({role} on token {token})")
            }
            other => f.write_str(other.name()),
        }
    }
}

/// What a backend does when `authenticate` is called while a session is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Close the open session first; its `Session` value becomes stale
    Preempt,
    /// Refuse with `SessionLimitExceeded` until the caller resets or closes
    Reject,
}
