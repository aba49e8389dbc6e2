use std::fmt;

use thiserror::Error;
use zeroize::Zeroizing;

/// Secret presented at authentication time: a token PIN or a container password.
///
/// The value is wiped from memory on drop and never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    pub const MAX_LENGTH: usize = 1024;

    pub fn new(secret: impl Into<String>) -> Result<Self, CredentialError> {
        let secret = Zeroizing::new(secret.into());
        if secret.is_empty() {
            return Err(CredentialError::Empty);
        }
        if secret.len() > Self::MAX_LENGTH {
            return Err(CredentialError::TooLong);
        }
        Ok(Self(secret))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

impl TryFrom<&str> for Credential {
    type Error = CredentialError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential must not be empty")]
    Empty,

    #[error("credential must be at most {max} bytes", max = Credential::MAX_LENGTH)]
    TooLong,
}
