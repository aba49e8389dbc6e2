use std::fmt;

use super::{BackendKind, Certificate, Role};

/// Stable ordinal of a key slot within one backend's directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenIndex(pub usize);

impl TokenIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

impl From<usize> for TokenIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

impl fmt::Display for TokenIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One usable key slot as reported by a token directory.
///
/// Immutable once enumerated; a fresh set is produced on every directory refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenKeyInfo {
    pub backend: BackendKind,
    pub index: TokenIndex,
    /// Human-readable key label
    pub label: String,
    /// Name of the physical or logical token holding the key
    pub token_name: String,
    pub can_sign: bool,
    pub can_authenticate: bool,
    pub certificate: Option<Certificate>,
}

impl TokenKeyInfo {
    pub fn supports(&self, role: Role) -> bool {
        match role {
            Role::Signing => self.can_sign,
            Role::Authentication => self.can_authenticate,
        }
    }
}
