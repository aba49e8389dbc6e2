use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Permitted use of a key.
///
/// Some tokens provision a separate key and certificate per role, so a session
/// opened for one role is never usable for the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Signing caller-supplied digests
    Signing,
    /// Decrypting data exchanged during authentication
    Authentication,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Signing => "signing",
            Role::Authentication => "authentication",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = RoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "signing" | "sign" => Ok(Role::Signing),
            "authentication" | "auth" => Ok(Role::Authentication),
            _ => Err(RoleError::Unknown {
                role: s.to_string(),
            }),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoleError {
    #[error("Unknown role: {role}")]
    Unknown { role: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        assert_eq!("signing".parse::<Role>().unwrap(), Role::Signing);
        assert_eq!("AUTH".parse::<Role>().unwrap(), Role::Authentication);
        assert!("decrypt".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Authentication.to_string(), "authentication");
    }
}
